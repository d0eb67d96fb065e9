//! The kernel handle: one struct owning every process-wide
//! singleton, built once and threaded through as `Arc<Kernel>` -- mirroring
//! the teacher's single `AppState` rather than reaching for `static`s.

use std::collections::HashMap;
use std::sync::Arc;

use crate::net::PortRegistry;
use crate::process::ProcessRegistry;

/// Builder-style configuration, mirroring the teacher's `SandboxConfig`/
/// `VoidBoxConfig` pattern.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub history_path: String,
    pub history_capacity: usize,
    pub env_defaults: HashMap<String, String>,
    pub module_search_roots: Vec<String>,
    pub persist_vfs_snapshot: bool,
    pub network_egress: bool,
    pub doh_endpoint: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let mut env_defaults = HashMap::new();
        env_defaults.insert("HOME".to_string(), "/home/user".to_string());
        env_defaults.insert("USER".to_string(), "user".to_string());
        env_defaults.insert("HOSTNAME".to_string(), "lifo".to_string());
        env_defaults.insert("SHELL".to_string(), "/bin/lifo".to_string());
        env_defaults.insert(
            "PATH".to_string(),
            "/usr/local/bin:/usr/bin:/bin".to_string(),
        );

        Self {
            history_path: "/home/user/.lifo_history".to_string(),
            history_capacity: 1000,
            env_defaults,
            module_search_roots: vec![
                "/usr/lib/node_modules".to_string(),
                "/usr/share/pkg/node_modules".to_string(),
            ],
            persist_vfs_snapshot: false,
            network_egress: false,
            doh_endpoint: "https://cloudflare-dns.com/dns-query".to_string(),
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_path(mut self, path: impl Into<String>) -> Self {
        self.history_path = path.into();
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_defaults.insert(key.into(), value.into());
        self
    }

    pub fn module_search_root(mut self, root: impl Into<String>) -> Self {
        self.module_search_roots.push(root.into());
        self
    }

    pub fn persist_vfs_snapshot(mut self, persist: bool) -> Self {
        self.persist_vfs_snapshot = persist;
        self
    }

    pub fn network_egress(mut self, enabled: bool) -> Self {
        self.network_egress = enabled;
        self
    }

    /// Build from environment variables, matching the teacher's
    /// `ObserveConfig::from_env()` pattern.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(home) = std::env::var("LIFO_HOME") {
            cfg.env_defaults.insert("HOME".to_string(), home);
        }
        if let Ok(hist) = std::env::var("LIFO_HISTORY_PATH") {
            cfg.history_path = hist;
        }
        if let Ok(cap) = std::env::var("LIFO_HISTORY_CAPACITY") {
            if let Ok(n) = cap.parse() {
                cfg.history_capacity = n;
            }
        }
        if let Ok(endpoint) = std::env::var("LIFO_DOH_ENDPOINT") {
            cfg.doh_endpoint = endpoint;
        }
        cfg.network_egress = std::env::var("LIFO_NETWORK_EGRESS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        cfg
    }
}

/// The single process-wide handle passed by `Arc` into every shell, command
/// context, and Node runtime invocation.
pub struct Kernel {
    pub config: KernelConfig,
    pub vfs: crate::vfs::Vfs,
    pub ports: PortRegistry,
    pub processes: ProcessRegistry,
}

impl Kernel {
    pub fn boot(config: KernelConfig) -> Arc<Self> {
        let vfs = crate::vfs::Vfs::new();
        vfs.seed_defaults("Lifo 1.0.0 (lifo-sh) #1 SMP virtual\n");

        let processes = ProcessRegistry::new();
        processes.spawn_init("lifo", config.env_defaults.get("HOME").cloned().unwrap_or_else(|| "/".into()));

        tracing::info!("kernel booted");

        Arc::new(Self {
            config,
            vfs,
            ports: PortRegistry::new(),
            processes,
        })
    }

    /// Convenience for tests: a freshly booted kernel with default config,
    /// mirroring the teacher's `Sandbox::mock()` per-test isolation.
    pub fn mock() -> Arc<Self> {
        Self::boot(KernelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_seeds_default_directories() {
        let kernel = Kernel::mock();
        assert!(kernel.vfs.exists_sync("/tmp"));
        assert!(kernel.vfs.exists_sync("/etc"));
        assert!(kernel.vfs.exists_sync("/proc/version"));
    }

    #[test]
    fn init_process_holds_pid_one() {
        let kernel = Kernel::mock();
        let init = kernel.processes.get(crate::process::INIT_PID).unwrap();
        assert_eq!(init.command, "lifo");
    }

    #[test]
    fn from_env_applies_overrides() {
        std::env::set_var("LIFO_HISTORY_CAPACITY", "42");
        let cfg = KernelConfig::from_env();
        assert_eq!(cfg.history_capacity, 42);
        std::env::remove_var("LIFO_HISTORY_CAPACITY");
    }
}
