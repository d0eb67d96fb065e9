//! `module` shim: `createRequire` and the built-in module list a script can
//! introspect at runtime. Actual resolution/loading lives in
//! [`crate::node::executor`]; this is the thin piece reachable from JS.

use serde_json::{json, Value};

use super::bridge::HostBridge;
use crate::node::resolver::BUILTIN_MODULES;

pub fn call(_bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "builtinModules" => Ok(json!(BUILTIN_MODULES)),
        "isBuiltin" => {
            let name = args.get(0).and_then(|v| v.as_str()).unwrap_or_default();
            Ok(json!(BUILTIN_MODULES.contains(&name)))
        }
        other => Err(format!("module.{other} is not implemented")),
    }
}
