//! Small bundled shims for modules too minor to deserve their own file:
//! `querystring`, `url`, `crypto` (digests only), and `util`. `events` and
//! `stream` are implemented entirely in the JS glue (they're plain
//! prototype classes with no host dependency) and have no entry here.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::bridge::HostBridge;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub fn call(_bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "qsStringify" => Ok(json!(qs_stringify(&args))),
        "qsParse" => Ok(qs_parse(&arg_str(&args, 0))),
        "urlParse" => url_parse(&arg_str(&args, 0)),
        "sha256Hex" => {
            let mut hasher = Sha256::new();
            hasher.update(arg_str(&args, 0).as_bytes());
            Ok(json!(format!("{:x}", hasher.finalize())))
        }
        other => Err(format!("misc.{other} is not implemented")),
    }
}

fn qs_stringify(args: &Value) -> String {
    let obj = match args.get(0).and_then(|v| v.as_object()) {
        Some(o) => o,
        None => return String::new(),
    };
    obj.iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(&value_to_plain(v))))
        .collect::<Vec<_>>()
        .join("&")
}

fn qs_parse(s: &str) -> Value {
    let mut map = serde_json::Map::new();
    for pair in s.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let k = urldecode(parts.next().unwrap_or_default());
        let v = urldecode(parts.next().unwrap_or_default());
        map.insert(k, json!(v));
    }
    Value::Object(map)
}

fn value_to_plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn url_parse(raw: &str) -> Result<Value, String> {
    let (scheme, rest) = raw.split_once("://").ok_or_else(|| format!("Invalid URL: {raw}"))?;
    let (authority, path_and_query) = rest.split_once('/').map(|(a, p)| (a, format!("/{p}"))).unwrap_or((rest, "/".to_string()));
    let (host, port) = authority.split_once(':').map(|(h, p)| (h, Some(p))).unwrap_or((authority, None));
    let (path, query) = path_and_query.split_once('?').map(|(p, q)| (p.to_string(), Some(q.to_string()))).unwrap_or((path_and_query, None));
    Ok(json!({
        "protocol": format!("{scheme}:"),
        "host": authority,
        "hostname": host,
        "port": port,
        "pathname": path,
        "search": query.as_ref().map(|q| format!("?{q}")).unwrap_or_default(),
        "query": query.map(|q| qs_parse(&q)).unwrap_or(json!({})),
        "href": raw,
    }))
}
