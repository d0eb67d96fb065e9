//! `os` shim: a handful of constants and host-describing accessors. There's
//! no real hardware underneath, so `cpus()` reports a single synthetic core
//! and `platform()`/`hostname()` are pulled from the kernel config.

use serde_json::{json, Value};

use super::bridge::HostBridge;

pub fn call(bridge: &HostBridge, method: &str, _args: Value) -> Result<Value, String> {
    match method {
        "hostname" => Ok(json!(bridge
            .ctx
            .env
            .get("HOSTNAME")
            .cloned()
            .unwrap_or_else(|| "lifo".to_string()))),
        "platform" => Ok(json!("linux")),
        "arch" => Ok(json!("x64")),
        "tmpdir" => Ok(json!("/tmp")),
        "homedir" => Ok(json!(bridge
            .ctx
            .env
            .get("HOME")
            .cloned()
            .unwrap_or_else(|| "/home/user".to_string()))),
        "cpus" => Ok(json!([{
            "model": "lifo virtual cpu",
            "speed": 2400,
            "times": {"user": 0, "nice": 0, "sys": 0, "idle": 0, "irq": 0},
        }])),
        "eol" => Ok(json!("\n")),
        "type" => Ok(json!("Linux")),
        "release" => Ok(json!("1.0.0-lifo")),
        "totalmem" => Ok(json!(1024u64 * 1024 * 1024)),
        "freemem" => Ok(json!(512u64 * 1024 * 1024)),
        other => Err(format!("os.{other} is not implemented")),
    }
}
