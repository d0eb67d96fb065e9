//! Port registry and virtual HTTP.
//!
//! Scripts never get a real socket. `http.createServer(...).listen(port)`
//! registers a handler in this registry; the dev-server proxy (below) is the
//! only real listener, and it forwards inbound requests to whichever virtual
//! port they're addressed to.

pub mod proxy;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct VirtualRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VirtualResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl VirtualResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.into().into_bytes(),
        }
    }

    pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }
}

/// A listening virtual HTTP server. Implemented by the Node `http` shim,
/// which bridges into the script engine for each request.
#[async_trait]
pub trait VirtualHandler: Send + Sync {
    async fn handle(&self, req: VirtualRequest) -> VirtualResponse;
}

struct Listener {
    pid: u32,
    handler: std::sync::Arc<dyn VirtualHandler>,
}

/// Tracks which ports are bound and by whom, and dispatches requests to the
/// right handler. One instance lives on the [`crate::kernel::Kernel`].
pub struct PortRegistry {
    listeners: Mutex<HashMap<u16, Listener>>,
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn listen(&self, port: u16, pid: u32, handler: std::sync::Arc<dyn VirtualHandler>) -> Result<()> {
        let mut listeners = self.listeners.lock().unwrap();
        if listeners.contains_key(&port) {
            return Err(Error::PortInUse(port));
        }
        listeners.insert(port, Listener { pid, handler });
        Ok(())
    }

    pub fn close(&self, port: u16) {
        self.listeners.lock().unwrap().remove(&port);
    }

    /// Release every port a process owns, e.g. on process exit.
    pub fn close_all_for_pid(&self, pid: u32) {
        self.listeners.lock().unwrap().retain(|_, l| l.pid != pid);
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.listeners.lock().unwrap().contains_key(&port)
    }

    pub fn list_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.listeners.lock().unwrap().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Ports currently held by `pid`, used to decide whether a `node`
    /// invocation has a live server keeping it alive.
    pub fn ports_for_pid(&self, pid: u32) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, l)| l.pid == pid)
            .map(|(port, _)| *port)
            .collect();
        ports.sort_unstable();
        ports
    }

    fn handler_for(&self, port: u16) -> Option<std::sync::Arc<dyn VirtualHandler>> {
        self.listeners.lock().unwrap().get(&port).map(|l| l.handler.clone())
    }

    pub async fn dispatch(&self, port: u16, req: VirtualRequest) -> Option<VirtualResponse> {
        let handler = self.handler_for(port)?;
        Some(handler.handle(req).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl VirtualHandler for Echo {
        async fn handle(&self, req: VirtualRequest) -> VirtualResponse {
            VirtualResponse::text(200, req.path)
        }
    }

    #[tokio::test]
    async fn listen_then_dispatch() {
        let reg = PortRegistry::new();
        reg.listen(3000, 2, std::sync::Arc::new(Echo)).unwrap();
        let resp = reg
            .dispatch(
                3000,
                VirtualRequest {
                    method: "GET".into(),
                    path: "/hi".into(),
                    query: None,
                    headers: vec![],
                    body: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"/hi");
    }

    #[test]
    fn ports_for_pid_filters_by_owner() {
        let reg = PortRegistry::new();
        reg.listen(3000, 2, std::sync::Arc::new(Echo)).unwrap();
        reg.listen(3001, 2, std::sync::Arc::new(Echo)).unwrap();
        reg.listen(4000, 3, std::sync::Arc::new(Echo)).unwrap();
        assert_eq!(reg.ports_for_pid(2), vec![3000, 3001]);
        assert_eq!(reg.ports_for_pid(3), vec![4000]);
        assert!(reg.ports_for_pid(9).is_empty());
    }

    #[test]
    fn double_listen_is_port_in_use() {
        let reg = PortRegistry::new();
        reg.listen(3000, 2, std::sync::Arc::new(Echo)).unwrap();
        let err = reg.listen(3000, 3, std::sync::Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, Error::PortInUse(3000)));
    }

    #[tokio::test]
    async fn dispatch_on_closed_port_is_none() {
        let reg = PortRegistry::new();
        reg.listen(4000, 2, std::sync::Arc::new(Echo)).unwrap();
        reg.close(4000);
        let resp = reg
            .dispatch(
                4000,
                VirtualRequest {
                    method: "GET".into(),
                    path: "/".into(),
                    query: None,
                    headers: vec![],
                    body: vec![],
                },
            )
            .await;
        assert!(resp.is_none());
    }
}
