//! `require` shim: the one module whose Rust side reaches back into the
//! executor's resolution logic, since resolving and reading a module needs
//! the VFS and `require` itself must stay synchronous from the script's
//! point of view.

use serde_json::{json, Value};

use super::bridge::HostBridge;
use crate::node::executor::resolve_specifier;
use crate::node::resolver::Resolution;
use crate::node::transform;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "load" => {
            let specifier = arg_str(&args, 0);
            let from_dir = arg_str(&args, 1);
            bridge.block_on(load(bridge, &specifier, &from_dir))
        }
        other => Err(format!("require.{other} is not implemented")),
    }
}

async fn load(bridge: &HostBridge, specifier: &str, from_dir: &str) -> Result<Value, String> {
    let kernel = &bridge.kernel;
    let cwd = &bridge.ctx.cwd;
    let roots = &kernel.config.module_search_roots;
    let resolution = resolve_specifier(kernel, specifier, from_dir, cwd, roots)
        .await
        .map_err(|e| e.to_string())?;

    match resolution {
        Resolution::BuiltIn(name) => Ok(json!({"kind": "builtin", "name": name})),
        Resolution::NativeStub(name) => Ok(json!({"kind": "stub", "name": name})),
        Resolution::File(path) => {
            let source = kernel
                .vfs
                .read_file_string(&path, cwd)
                .await
                .map_err(|e| e.to_string())?;
            let dir = crate::vfs::path::dirname(&path);
            let is_esm = path.ends_with(".mjs") || looks_esm(kernel, &dir, cwd, &source).await;
            let body = if is_esm { transform::transform(&source) } else { source };
            Ok(json!({"kind": "module", "path": path, "dir": dir, "body": body}))
        }
    }
}

async fn looks_esm(kernel: &std::sync::Arc<crate::kernel::Kernel>, dir: &str, cwd: &str, source: &str) -> bool {
    for ancestor in crate::vfs::path::ancestors(dir) {
        let candidate = crate::vfs::path::join(&ancestor, "package.json");
        if let Ok(text) = kernel.vfs.read_file_string(&candidate, cwd).await {
            if let Some(pkg) = crate::node::resolver::PackageJson::parse(&text) {
                return pkg.is_esm();
            }
        }
    }
    transform::looks_like_esm(source)
}
