//! `console` shim: the only module that writes directly to the invoking
//! command's stdout/stderr streams instead of the VFS or port registry.

use serde_json::Value;

use super::bridge::HostBridge;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    let line = arg_str(&args, 0);
    match method {
        "log" | "info" | "debug" => {
            bridge.block_on(bridge.ctx.stdout.write(&line));
            bridge.block_on(bridge.ctx.stdout.write("\n"));
            Ok(Value::Null)
        }
        "error" | "warn" => {
            bridge.block_on(bridge.ctx.stderr.write(&line));
            bridge.block_on(bridge.ctx.stderr.write("\n"));
            Ok(Value::Null)
        }
        other => Err(format!("console.{other} is not implemented")),
    }
}
