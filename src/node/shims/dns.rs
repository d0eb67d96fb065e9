//! `dns` shim. `localhost` and literal dotted-quad addresses short-circuit
//! locally; anything else errors `ENOTFOUND` unless the kernel was booted
//! with network egress enabled, in which case one real DNS-over-HTTPS
//! fetch resolves it -- the sole permitted real network escape hatch in an
//! otherwise fully virtualized kernel.

use serde_json::{json, Value};

use super::bridge::HostBridge;

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn is_dotted_quad(host: &str) -> bool {
    host.split('.').count() == 4 && host.split('.').all(|p| p.parse::<u8>().is_ok())
}

pub fn call(bridge: &HostBridge, method: &str, args: Value) -> Result<Value, String> {
    match method {
        "lookup" | "resolve4" => {
            let hostname = arg_str(&args, 0);
            if hostname == "localhost" {
                return Ok(json!("127.0.0.1"));
            }
            if is_dotted_quad(&hostname) {
                return Ok(json!(hostname));
            }
            if !bridge.kernel.config.network_egress {
                return Err(format!("ENOTFOUND {hostname}"));
            }
            bridge.block_on(resolve_via_doh(bridge, &hostname))
        }
        other => Err(format!("dns.{other} is not implemented")),
    }
}

async fn resolve_via_doh(bridge: &HostBridge, hostname: &str) -> Result<Value, String> {
    let client = reqwest::Client::new();
    let resp = client
        .get(&bridge.kernel.config.doh_endpoint)
        .query(&[("name", hostname), ("type", "A")])
        .header("accept", "application/dns-json")
        .send()
        .await
        .map_err(|e| format!("ENOTFOUND {hostname}: {e}"))?;
    let body: serde_json::Value = resp.json().await.map_err(|e| format!("ENOTFOUND {hostname}: {e}"))?;
    body.get("Answer")
        .and_then(|a| a.as_array())
        .and_then(|arr| arr.iter().find_map(|entry| entry.get("data").and_then(|d| d.as_str())))
        .map(|ip| json!(ip))
        .ok_or_else(|| format!("ENOTFOUND {hostname}"))
}
