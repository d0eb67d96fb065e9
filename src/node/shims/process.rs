//! `process` shim. `exit()` is handled entirely in the JS glue (it throws
//! the `__LIFO_PROCESS_EXIT__:<code>` sentinel the executor recognizes, per
//! the same error path `eval` already reports) rather than crossing this bridge -- there's nothing
//! for Rust to do there except let the throw propagate.

use serde_json::{json, Value};

use super::bridge::HostBridge;

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "cwd" => Ok(json!(bridge.ctx.cwd)),
        "chdir" => {
            // The engine thread's notion of cwd is fixed for the lifetime of
            // one `node` invocation; it never reaches back into the shell's
            // own cwd. Scripts that call `process.chdir` only affect
            // subsequent relative-path resolution within the same script,
            // which the JS glue tracks itself.
            let _ = args;
            Ok(Value::Null)
        }
        "env" => Ok(json!(bridge.ctx.env)),
        "argv" => {
            let mut argv = vec!["node".to_string(), bridge.ctx.filename.clone()];
            argv.extend(bridge.ctx.argv.clone());
            Ok(json!(argv))
        }
        "pid" => Ok(json!(bridge.ctx.pid)),
        "platform" => Ok(json!("linux")),
        "versions" => Ok(json!({"node": "20.0.0-lifo", "v8": "11.0.0-lifo"})),
        "hrtime" => Ok(json!([0, 0])),
        other => Err(format!("process.{other} is not implemented")),
    }
}
