//! `buffer` shim support: encoding conversions the JS-side `Buffer` class
//! (see [`super::JS_BUFFER`]) delegates to Rust for, since `boa_engine`
//! doesn't ship a `Buffer`/`Uint8Array`-to-string codec of its own beyond
//! UTF-8.

use base64::Engine as _;
use serde_json::{json, Value};

use super::bridge::HostBridge;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub fn call(_bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "toBase64" => {
            let bytes = decode_bytes(&args, 0, arg_str(&args, 1).as_str());
            Ok(json!(base64::engine::general_purpose::STANDARD.encode(&bytes)))
        }
        "fromBase64" => {
            let text = arg_str(&args, 0);
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(text.as_bytes())
                .map_err(|e| e.to_string())?;
            Ok(json!(String::from_utf8_lossy(&bytes)))
        }
        "toHex" => {
            let bytes = decode_bytes(&args, 0, arg_str(&args, 1).as_str());
            Ok(json!(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()))
        }
        "fromHex" => {
            let text = arg_str(&args, 0);
            let bytes: Vec<u8> = (0..text.len())
                .step_by(2)
                .filter_map(|i| u8::from_str_radix(&text[i..(i + 2).min(text.len())], 16).ok())
                .collect();
            Ok(json!(String::from_utf8_lossy(&bytes)))
        }
        other => Err(format!("buffer.{other} is not implemented")),
    }
}

fn decode_bytes(args: &Value, i: usize, encoding: &str) -> Vec<u8> {
    let text = arg_str(args, i);
    match encoding {
        "base64" => base64::engine::general_purpose::STANDARD.decode(text.as_bytes()).unwrap_or_default(),
        "hex" => (0..text.len())
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&text[i..(i + 2).min(text.len())], 16).ok())
            .collect(),
        _ => text.into_bytes(),
    }
}
