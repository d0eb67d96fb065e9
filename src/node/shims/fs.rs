//! `fs` shim: synchronous surface backed by the VFS.
//!
//! The callback and promise flavors Node scripts use are implemented in the
//! JS glue (see [`super::JS_FS`]) by wrapping these synchronous calls in a
//! `setTimeout(…, 0)` or a resolved/rejected promise -- there's no real I/O
//! latency to simulate, so "async" here only means "doesn't block this
//! turn of the engine's own command loop any differently than sync does."

use base64::Engine as _;
use serde_json::{json, Value};

use super::bridge::{posix_error_json, HostBridge};
use crate::error::Error;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn to_err(e: Error) -> String {
    match e {
        Error::Posix(p) => serde_json::to_string(&posix_error_json(&p)).unwrap_or_default(),
        other => other.to_string(),
    }
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    let vfs = &bridge.kernel.vfs;
    let cwd = bridge.ctx.cwd.clone();

    match method {
        "readFileSync" => {
            let path = arg_str(&args, 0);
            let encoding = args.get(1).and_then(|v| v.as_str()).map(str::to_string);
            let data = bridge.block_on(vfs.read_file(&path, &cwd)).map_err(to_err)?;
            Ok(match encoding.as_deref() {
                Some("utf8") | Some("utf-8") => json!(String::from_utf8_lossy(&data)),
                _ => json!({
                    "__buffer__": true,
                    "base64": base64::engine::general_purpose::STANDARD.encode(&data),
                }),
            })
        }
        "writeFileSync" | "appendFileSync" => {
            let path = arg_str(&args, 0);
            let data = decode_write_payload(&args, 1);
            let fut = if method == "writeFileSync" {
                vfs.write_file(&path, &data, &cwd)
            } else {
                vfs.append_file(&path, &data, &cwd)
            };
            bridge.block_on(fut).map_err(to_err)?;
            Ok(Value::Null)
        }
        "existsSync" => {
            let path = arg_str(&args, 0);
            Ok(json!(bridge.block_on(vfs.exists(&path, &cwd))))
        }
        "statSync" | "lstatSync" => {
            let path = arg_str(&args, 0);
            let st = bridge.block_on(vfs.stat(&path, &cwd)).map_err(to_err)?;
            Ok(json!({
                "size": st.size,
                "mtimeMs": st.mtime,
                "ctimeMs": st.ctime,
                "mode": st.mode,
                "isDirectory": st.is_dir(),
                "isFile": st.is_file(),
            }))
        }
        "readdirSync" => {
            let path = arg_str(&args, 0);
            let entries = bridge.block_on(vfs.readdir(&path, &cwd)).map_err(to_err)?;
            let with_types = args
                .get(1)
                .and_then(|o| o.get("withFileTypes"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(if with_types {
                json!(entries
                    .iter()
                    .map(|e| json!({"name": e.name, "isDirectory": e.node_type == crate::vfs::NodeType::Directory}))
                    .collect::<Vec<_>>())
            } else {
                json!(entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>())
            })
        }
        "mkdirSync" => {
            let path = arg_str(&args, 0);
            let recursive = args.get(1).and_then(|o| o.get("recursive")).and_then(|v| v.as_bool()).unwrap_or(false);
            bridge.block_on(vfs.mkdir(&path, recursive, &cwd)).map_err(to_err)?;
            Ok(Value::Null)
        }
        "rmdirSync" => {
            let path = arg_str(&args, 0);
            let recursive = args.get(1).and_then(|o| o.get("recursive")).and_then(|v| v.as_bool()).unwrap_or(false);
            let fut = if recursive { vfs.rmdir_recursive(&path, &cwd) } else { vfs.rmdir(&path, &cwd) };
            bridge.block_on(fut).map_err(to_err)?;
            Ok(Value::Null)
        }
        "unlinkSync" => {
            let path = arg_str(&args, 0);
            bridge.block_on(vfs.unlink(&path, &cwd)).map_err(to_err)?;
            Ok(Value::Null)
        }
        "renameSync" => {
            let from = arg_str(&args, 0);
            let to = arg_str(&args, 1);
            bridge.block_on(vfs.rename(&from, &to, &cwd)).map_err(to_err)?;
            Ok(Value::Null)
        }
        "copyFileSync" => {
            let from = arg_str(&args, 0);
            let to = arg_str(&args, 1);
            bridge.block_on(vfs.copy_file(&from, &to, &cwd)).map_err(to_err)?;
            Ok(Value::Null)
        }
        "realpathSync" => {
            let path = arg_str(&args, 0);
            Ok(json!(crate::vfs::path::normalize(&path, &cwd)))
        }
        // File-descriptor table entry points. This sandbox keeps fds as an
        // opaque integer mapping back to `(path, position)` on the JS side
        // (see JS_FS's `__fdTable`); the Rust side only needs whole-file
        // read/write/truncate.
        "ftruncateSync" => {
            let path = arg_str(&args, 0);
            let len = args.get(1).and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let mut data = bridge.block_on(vfs.read_file(&path, &cwd)).unwrap_or_default();
            data.resize(len, 0);
            bridge.block_on(vfs.write_file(&path, &data, &cwd)).map_err(to_err)?;
            Ok(Value::Null)
        }
        other => Err(format!("fs.{other} is not implemented")),
    }
}

fn decode_write_payload(args: &Value, i: usize) -> Vec<u8> {
    match args.get(i) {
        Some(Value::Object(obj)) if obj.get("__buffer__").is_some() => obj
            .get("base64")
            .and_then(|v| v.as_str())
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
            .unwrap_or_default(),
        Some(Value::String(s)) => s.clone().into_bytes(),
        _ => Vec::new(),
    }
}
