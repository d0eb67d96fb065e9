//! The synchronous bridge every shim's JS glue calls through.
//!
//! Crossing from the engine thread into the async kernel (VFS, port
//! registry, DNS-over-HTTPS fetch) is done with a single native entry point,
//! `__lifoCallSync(module, method, argsJson)`, rather than registering one
//! native function per shim method. Arguments and return values cross as
//! JSON (binary payloads as base64) -- a small, uniform surface that keeps
//! the boa-facing registration code to one call site (see
//! [`super::install_all`]) instead of dozens of hand-written
//! `NativeFunction`s, at the cost of routing everything through
//! `serde_json::Value`. Node's own APIs are JSON-shaped enough (strings,
//! numbers, plain objects) that this loses nothing but raw buffer speed,
//! which this VFS-backed sandbox was never going to have anyway.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::kernel::Kernel;
use crate::net::{PortRegistry, VirtualResponse};

use super::{buffer, console, dns, fs, http, misc, module, os, path, process, require};

/// Everything a module's Rust-side implementation needs: the kernel
/// singletons, this invocation's environment, and a handle back into the
/// tokio runtime so synchronous JS calls can block on async VFS/network
/// operations (safe here because the engine lives on its own plain OS
/// thread, never a tokio worker thread).
pub struct HostBridge {
    pub kernel: Arc<Kernel>,
    pub ctx: crate::node::ShimContext,
    pub rt: Handle,
    pub engine: crate::node::engine::EngineHandle,
}

impl HostBridge {
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.kernel.ports
    }

    /// Dispatch one `(module, method, args)` call from JS. Errors surface
    /// as a thrown JS error carrying the message.
    pub fn call(&self, module: &str, method: &str, args: Value) -> Result<Value, String> {
        match module {
            "fs" => fs::call(self, method, args),
            "path" => path::call(self, method, args),
            "os" => os::call(self, method, args),
            "process" => process::call(self, method, args),
            "buffer" => buffer::call(self, method, args),
            "http" => http::call(self, method, args),
            "dns" => dns::call(self, method, args),
            "module" => module::call(self, method, args),
            "misc" => misc::call(self, method, args),
            "console" => console::call(self, method, args),
            "require" => require::call(self, method, args),
            other => Err(format!("no such shim module: {other}")),
        }
    }
}

pub fn json_err(e: crate::error::Error) -> String {
    e.to_string()
}

/// Shared shape for translating a `PosixError` into the `{code, errno,
/// syscall, path, message}` object Node's `fs` throws.
pub fn posix_error_json(e: &crate::error::PosixError) -> Value {
    serde_json::json!({
        "code": e.code.as_str(),
        "errno": e.errno(),
        "syscall": e.syscall,
        "path": e.path,
        "message": e.to_string(),
    })
}

pub fn response_to_json(resp: &VirtualResponse) -> Value {
    serde_json::json!({
        "statusCode": resp.status,
        "headers": resp.headers.iter().cloned().collect::<std::collections::HashMap<_, _>>(),
        "body": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &resp.body),
    })
}
