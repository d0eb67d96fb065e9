//! `http` shim: `createServer(...).listen(port)` writes
//! into the kernel's [`crate::net::PortRegistry`]; `request`/`get` dispatch
//! synchronously back into the same registry when the target URL is a
//! same-process virtual port.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::bridge::{response_to_json, HostBridge};
use crate::net::{VirtualHandler, VirtualRequest, VirtualResponse};

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn arg_u16(args: &Value, i: usize) -> u16 {
    args.get(i).and_then(|v| v.as_u64()).unwrap_or(0) as u16
}

/// Bridges an inbound real-or-virtual HTTP request into the script's
/// engine thread by invoking the JS dispatcher it registered at `listen`
/// time, then waiting for the populated response -- the handler still runs
/// inline from the caller's perspective even though this hop crosses a thread.
struct EngineBackedHandler {
    engine: crate::node::engine::EngineHandle,
    handler_key: String,
}

#[async_trait]
impl VirtualHandler for EngineBackedHandler {
    async fn handle(&self, req: VirtualRequest) -> VirtualResponse {
        self.engine.dispatch_http(self.handler_key.clone(), req).await
    }
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "listen" => {
            let port = arg_u16(&args, 0);
            let handler_key = arg_str(&args, 1);
            let handler = std::sync::Arc::new(EngineBackedHandler {
                engine: bridge.engine.clone(),
                handler_key,
            });
            bridge
                .kernel
                .ports
                .listen(port, bridge.ctx.pid, handler)
                .map_err(|e| e.to_string())?;
            Ok(Value::Null)
        }
        "close" => {
            let port = arg_u16(&args, 0);
            bridge.kernel.ports.close(port);
            Ok(Value::Null)
        }
        "isListening" => Ok(json!(bridge.kernel.ports.is_listening(arg_u16(&args, 0)))),
        "listPorts" => Ok(json!(bridge.kernel.ports.list_ports())),
        "request" => {
            // Same-process virtual dispatch: only `localhost`/`127.0.0.1`
            // URLs naming a bound virtual port are reachable.
            let method_name = arg_str(&args, 0);
            let url = arg_str(&args, 1);
            let body = arg_str(&args, 2);
            let (port, path) = parse_virtual_url(&url).ok_or_else(|| {
                format!("http.request: only same-process virtual URLs are reachable, got {url}")
            })?;
            let req = VirtualRequest {
                method: method_name,
                path,
                query: None,
                headers: Vec::new(),
                body: body.into_bytes(),
            };
            let resp = bridge.block_on(bridge.kernel.ports.dispatch(port, req));
            match resp {
                Some(r) => Ok(response_to_json(&r)),
                None => Err(format!("connect ECONNREFUSED 127.0.0.1:{port}")),
            }
        }
        other => Err(format!("http.{other} is not implemented")),
    }
}

fn parse_virtual_url(url: &str) -> Option<(u16, String)> {
    let rest = url.strip_prefix("http://").or_else(|| url.strip_prefix("https://"))?;
    let (host_port, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host_port = host_port.split_once('@').map(|(_, hp)| hp).unwrap_or(host_port);
    if !(host_port.starts_with("localhost") || host_port.starts_with("127.0.0.1")) {
        return None;
    }
    let port: u16 = host_port.split(':').nth(1)?.parse().ok()?;
    Some((port, format!("/{path}")))
}
