//! `path` shim: POSIX semantics, mirroring [`crate::vfs::path`] directly
//! (this kernel's VFS and Node's `path` module already agree on the rules).

use serde_json::{json, Value};

use super::bridge::HostBridge;
use crate::vfs::path as vpath;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    let cwd = bridge.ctx.cwd.clone();
    match method {
        "join" => {
            let parts: Vec<String> = args
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
                .unwrap_or_default();
            let mut acc = parts.first().cloned().unwrap_or_default();
            for part in parts.iter().skip(1) {
                acc = format!("{}/{}", acc.trim_end_matches('/'), part);
            }
            Ok(json!(normalize_relative(&acc)))
        }
        "resolve" => {
            let parts: Vec<String> = args
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
                .unwrap_or_default();
            let mut base = cwd;
            for part in &parts {
                base = vpath::normalize(part, &base);
            }
            Ok(json!(base))
        }
        "dirname" => Ok(json!(vpath::dirname(&arg_str(&args, 0)))),
        "basename" => {
            let p = arg_str(&args, 0);
            let base = vpath::basename(&p);
            let ext = args.get(1).and_then(|v| v.as_str());
            Ok(json!(match ext {
                Some(suffix) if base.ends_with(suffix) && base != suffix => &base[..base.len() - suffix.len()],
                _ => base,
            }))
        }
        "extname" => Ok(json!(vpath::extname(&arg_str(&args, 0)))),
        "normalize" => Ok(json!(normalize_relative(&arg_str(&args, 0)))),
        "relative" => {
            let from = vpath::normalize(&arg_str(&args, 0), "/");
            let to = vpath::normalize(&arg_str(&args, 1), "/");
            Ok(json!(relative(&from, &to)))
        }
        "parse" => {
            let p = arg_str(&args, 0);
            let base = vpath::basename(&p);
            let ext = vpath::extname(&p);
            let name = base.strip_suffix(ext).unwrap_or(base);
            Ok(json!({
                "root": if p.starts_with('/') { "/" } else { "" },
                "dir": vpath::dirname(&p),
                "base": base,
                "ext": ext,
                "name": name,
            }))
        }
        "isAbsolute" => Ok(json!(arg_str(&args, 0).starts_with('/'))),
        other => Err(format!("path.{other} is not implemented")),
    }
}

fn normalize_relative(p: &str) -> String {
    if p.starts_with('/') {
        vpath::normalize(p, "/")
    } else {
        // Keep it relative-looking the way Node's `path.normalize` does for
        // a relative input, while still collapsing `.`/`..`.
        let absolute = vpath::normalize(p, "/___cwd___");
        absolute.strip_prefix("/___cwd___/").unwrap_or(&absolute).to_string()
    }
}

fn relative(from: &str, to: &str) -> String {
    let from_parts: Vec<&str> = from.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let common = from_parts.iter().zip(to_parts.iter()).take_while(|(a, b)| a == b).count();
    let ups = from_parts.len() - common;
    let mut out: Vec<String> = (0..ups).map(|_| "..".to_string()).collect();
    out.extend(to_parts[common..].iter().map(|s| s.to_string()));
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}
