//! Mount provider trait: the operation surface a mounted backing store
//! (e.g. a native-fs passthrough used in dev mode) must implement.
//!
//! A provider operates on paths relative to its own mount root; the [`Vfs`]
//! strips the mount prefix before delegating (see `vfs/mod.rs`).

use async_trait::async_trait;

use super::inode::{DirEntry, Stat};
use crate::error::Result;

#[async_trait]
pub trait MountProvider: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
    async fn append_file(&self, path: &str, data: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> bool;
    async fn stat(&self, path: &str) -> Result<Stat>;
    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;
    async fn rmdir(&self, path: &str) -> Result<()>;
    async fn rmdir_recursive(&self, path: &str) -> Result<()>;
    async fn unlink(&self, path: &str) -> Result<()>;
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
    async fn copy_file(&self, from: &str, to: &str) -> Result<()>;
}

/// A registered mount: prefix plus the provider backing it.
pub struct Mount {
    pub prefix: String,
    pub provider: std::sync::Arc<dyn MountProvider>,
}
