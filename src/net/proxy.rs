//! Dev-server proxy: the one real TCP listener in the system, translating
//! `GET /proxy/<port>/<rest>` into a dispatch against the [`super::PortRegistry`].
//!
//! This is how a host browser or `curl` reaches a server a script registered
//! with `http.createServer(...).listen(port)` -- there is no real socket to
//! connect to otherwise.

use super::{PortRegistry, VirtualRequest, VirtualResponse};

/// Parse `/proxy/<port>/<rest>` into `(port, rest)`. `rest` keeps its leading
/// slash; an empty tail normalizes to `/`.
pub fn parse_proxy_path(path: &str) -> Option<(u16, String)> {
    let tail = path.strip_prefix("/proxy/")?;
    let (port_str, rest) = tail.split_once('/').unwrap_or((tail, ""));
    let port: u16 = port_str.parse().ok()?;
    let rest = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{rest}")
    };
    Some((port, rest))
}

/// Route one inbound proxy request. Returns 503 if the path isn't a
/// well-formed `/proxy/<port>/...` request, 502 (with the currently bound
/// ports listed in the body) if nothing is listening on that port.
pub async fn route(
    registry: &PortRegistry,
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
) -> VirtualResponse {
    let Some((port, rest)) = parse_proxy_path(path) else {
        return VirtualResponse::text(503, "malformed proxy path, expected /proxy/<port>/...");
    };

    let req = VirtualRequest {
        method: method.to_string(),
        path: rest,
        query: query.map(ToString::to_string),
        headers,
        body,
    };

    match registry.dispatch(port, req).await {
        Some(resp) => resp,
        None => {
            let ports = registry.list_ports();
            VirtualResponse::text(
                502,
                format!(
                    "no server listening on port {port}; currently bound ports: {:?}",
                    ports
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Ok200;

    #[async_trait]
    impl super::super::VirtualHandler for Ok200 {
        async fn handle(&self, _req: VirtualRequest) -> VirtualResponse {
            VirtualResponse::text(200, "ok")
        }
    }

    #[test]
    fn parses_port_and_rest() {
        assert_eq!(
            parse_proxy_path("/proxy/3000/api/users"),
            Some((3000, "/api/users".to_string()))
        );
        assert_eq!(parse_proxy_path("/proxy/3000"), Some((3000, "/".to_string())));
        assert_eq!(parse_proxy_path("/proxy/3000/"), Some((3000, "/".to_string())));
        assert_eq!(parse_proxy_path("/other"), None);
        assert_eq!(parse_proxy_path("/proxy/notaport/x"), None);
    }

    #[tokio::test]
    async fn routes_to_bound_port() {
        let registry = PortRegistry::new();
        registry.listen(3000, 2, std::sync::Arc::new(Ok200)).unwrap();
        let resp = route(&registry, "GET", "/proxy/3000/x", None, vec![], vec![]).await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn bad_gateway_when_port_unbound() {
        let registry = PortRegistry::new();
        let resp = route(&registry, "GET", "/proxy/4000/x", None, vec![], vec![]).await;
        assert_eq!(resp.status, 502);
    }

    #[tokio::test]
    async fn service_unavailable_on_malformed_path() {
        let registry = PortRegistry::new();
        let resp = route(&registry, "GET", "/not-proxy", None, vec![], vec![]).await;
        assert_eq!(resp.status, 503);
    }
}
