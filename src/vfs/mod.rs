//! Virtual filesystem.
//!
//! An in-memory inode tree with mount-table delegation, POSIX-style errors,
//! and an `on_change` hook fired after every mutation (consumed by desktop
//! icons / file-explorer UIs in the wider system this kernel sits inside --
//! out of scope here, but the hook point is part of the contract).

pub mod inode;
pub mod mount;
pub mod path;

use std::sync::{Arc, Mutex};

pub use inode::{DirEntry, NodeType, Stat};
pub use mount::MountProvider;

use inode::Inode;
use mount::Mount;

use crate::error::{Error, PosixCode, PosixError, Result};

type ChangeHook = Box<dyn Fn(&str) + Send + Sync>;

/// The virtual filesystem: one in-memory tree plus an ordered mount table.
pub struct Vfs {
    root: Mutex<Inode>,
    mounts: Mutex<Vec<Mount>>,
    hooks: Mutex<Vec<ChangeHook>>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Inode::new_directory()),
            mounts: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Seed the standard directories a booting kernel expects to find,
    /// through the normal create/remove lifecycle.
    pub fn seed_defaults(&self, version_banner: &str) {
        for dir in [
            "/home/user",
            "/tmp",
            "/etc",
            "/usr/lib/node_modules",
            "/usr/share/pkg/node_modules",
        ] {
            let _ = self.mkdir_sync(dir, true);
        }
        let _ = self.write_file_sync("/proc/version", version_banner.as_bytes());
    }

    /// Register a change observer, invoked with the affected path after
    /// every successful mutation.
    pub fn on_change<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.lock().unwrap().push(Box::new(hook));
    }

    fn notify(&self, path: &str) {
        for hook in self.hooks.lock().unwrap().iter() {
            hook(path);
        }
    }

    /// Mount `provider` at `prefix`. Longest-prefix-match wins on lookup, so
    /// more specific mounts may be registered after broader ones.
    pub fn mount(&self, prefix: impl Into<String>, provider: Arc<dyn MountProvider>) {
        self.mounts.lock().unwrap().push(Mount {
            prefix: prefix.into(),
            provider,
        });
    }

    /// Remove the mount registered at `prefix`, if any.
    pub fn unmount(&self, prefix: &str) {
        self.mounts.lock().unwrap().retain(|m| m.prefix != prefix);
    }

    fn find_mount(&self, abs_path: &str) -> Option<(String, Arc<dyn MountProvider>)> {
        let mounts = self.mounts.lock().unwrap();
        mounts
            .iter()
            .filter(|m| abs_path == m.prefix || abs_path.starts_with(&format!("{}/", m.prefix)))
            .max_by_key(|m| m.prefix.len())
            .map(|m| {
                let rel = abs_path.strip_prefix(&m.prefix).unwrap_or("");
                let rel = if rel.is_empty() { "/" } else { rel };
                (rel.to_string(), m.provider.clone())
            })
    }

    // ---- In-memory tree helpers (sync, no await while the lock is held) ----

    fn get_node<'a>(root: &'a Inode, segments: &[&str]) -> Option<&'a Inode> {
        let mut node = root;
        for seg in segments {
            node = node.children()?.get(*seg)?;
        }
        Some(node)
    }

    fn get_node_mut<'a>(root: &'a mut Inode, segments: &[&str]) -> Option<&'a mut Inode> {
        let mut node = root;
        for seg in segments {
            node = node.children_mut()?.get_mut(*seg)?;
        }
        Some(node)
    }

    fn segments(path: &str) -> Vec<&str> {
        path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn exists_sync(&self, norm: &str) -> bool {
        let root = self.root.lock().unwrap();
        Self::get_node(&root, &Self::segments(norm)).is_some()
    }

    pub fn stat_sync(&self, norm: &str) -> Result<Stat> {
        let root = self.root.lock().unwrap();
        Self::get_node(&root, &Self::segments(norm))
            .map(|n| n.stat())
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "stat", norm).into())
    }

    pub fn read_file_sync(&self, norm: &str) -> Result<Vec<u8>> {
        let root = self.root.lock().unwrap();
        match Self::get_node(&root, &Self::segments(norm)) {
            Some(Inode::File { content, .. }) => Ok(content.clone()),
            Some(Inode::Directory { .. }) => {
                Err(PosixError::new(PosixCode::EISDIR, "read", norm).into())
            }
            None => Err(PosixError::new(PosixCode::ENOENT, "open", norm).into()),
        }
    }

    pub fn write_file_sync(&self, norm: &str, data: &[u8]) -> Result<()> {
        let (parent, name) = path::split(norm);
        let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EISDIR, "open", norm))?;
        let mut root = self.root.lock().unwrap();
        let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "open", norm))?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "open", norm))?;
        match children.get_mut(name) {
            Some(Inode::Directory { .. }) => {
                return Err(PosixError::new(PosixCode::EISDIR, "open", norm).into())
            }
            Some(Inode::File { content, .. }) => {
                *content = data.to_vec();
            }
            None => {
                children.insert(name.to_string(), Inode::new_file(data.to_vec()));
            }
        }
        Ok(())
    }

    pub fn append_file_sync(&self, norm: &str, data: &[u8]) -> Result<()> {
        let (parent, name) = path::split(norm);
        let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EISDIR, "open", norm))?;
        let mut root = self.root.lock().unwrap();
        let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "open", norm))?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "open", norm))?;
        match children.get_mut(name) {
            Some(Inode::Directory { .. }) => {
                return Err(PosixError::new(PosixCode::EISDIR, "open", norm).into())
            }
            Some(Inode::File { content, .. }) => {
                content.extend_from_slice(data);
            }
            None => {
                children.insert(name.to_string(), Inode::new_file(data.to_vec()));
            }
        }
        Ok(())
    }

    pub fn readdir_sync(&self, norm: &str) -> Result<Vec<DirEntry>> {
        let root = self.root.lock().unwrap();
        match Self::get_node(&root, &Self::segments(norm)) {
            Some(Inode::Directory { children, .. }) => Ok(children
                .iter()
                .map(|(name, node)| DirEntry {
                    name: name.clone(),
                    node_type: node.node_type(),
                })
                .collect()),
            Some(Inode::File { .. }) => {
                Err(PosixError::new(PosixCode::ENOTDIR, "readdir", norm).into())
            }
            None => Err(PosixError::new(PosixCode::ENOENT, "readdir", norm).into()),
        }
    }

    pub fn mkdir_sync(&self, norm: &str, recursive: bool) -> Result<()> {
        if norm == "/" {
            return Ok(());
        }
        let mut root = self.root.lock().unwrap();
        if recursive {
            let mut cursor = &mut *root;
            for seg in Self::segments(norm) {
                let children = cursor
                    .children_mut()
                    .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "mkdir", norm))?;
                if !children.contains_key(seg) {
                    children.insert(seg.to_string(), Inode::new_directory());
                }
                cursor = children.get_mut(seg).unwrap();
                if cursor.node_type() != NodeType::Directory {
                    return Err(PosixError::new(PosixCode::ENOTDIR, "mkdir", norm).into());
                }
            }
            Ok(())
        } else {
            let (parent, name) = path::split(norm);
            let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EEXIST, "mkdir", norm))?;
            let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
                .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "mkdir", norm))?;
            let children = parent_node
                .children_mut()
                .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "mkdir", norm))?;
            if children.contains_key(name) {
                return Err(PosixError::new(PosixCode::EEXIST, "mkdir", norm).into());
            }
            children.insert(name.to_string(), Inode::new_directory());
            Ok(())
        }
    }

    pub fn rmdir_sync(&self, norm: &str) -> Result<()> {
        let (parent, name) = path::split(norm);
        let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EACCES, "rmdir", norm))?;
        let mut root = self.root.lock().unwrap();
        let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "rmdir", norm))?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "rmdir", norm))?;
        match children.get(name) {
            Some(Inode::Directory { children: inner, .. }) if inner.is_empty() => {
                children.remove(name);
                Ok(())
            }
            Some(Inode::Directory { .. }) => {
                Err(PosixError::new(PosixCode::ENOTEMPTY, "rmdir", norm).into())
            }
            Some(Inode::File { .. }) => {
                Err(PosixError::new(PosixCode::ENOTDIR, "rmdir", norm).into())
            }
            None => Err(PosixError::new(PosixCode::ENOENT, "rmdir", norm).into()),
        }
    }

    pub fn rmdir_recursive_sync(&self, norm: &str) -> Result<()> {
        let (parent, name) = path::split(norm);
        let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EACCES, "rmdir", norm))?;
        let mut root = self.root.lock().unwrap();
        let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "rmdir", norm))?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "rmdir", norm))?;
        if children.remove(name).is_none() {
            return Err(PosixError::new(PosixCode::ENOENT, "rmdir", norm).into());
        }
        Ok(())
    }

    pub fn unlink_sync(&self, norm: &str) -> Result<()> {
        let (parent, name) = path::split(norm);
        let parent = parent.ok_or_else(|| PosixError::new(PosixCode::EISDIR, "unlink", norm))?;
        let mut root = self.root.lock().unwrap();
        let parent_node = Self::get_node_mut(&mut root, &Self::segments(parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "unlink", norm))?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "unlink", norm))?;
        match children.get(name) {
            Some(Inode::Directory { .. }) => {
                Err(PosixError::new(PosixCode::EISDIR, "unlink", norm).into())
            }
            Some(Inode::File { .. }) => {
                children.remove(name);
                Ok(())
            }
            None => Err(PosixError::new(PosixCode::ENOENT, "unlink", norm).into()),
        }
    }

    pub fn rename_sync(&self, from_norm: &str, to_norm: &str) -> Result<()> {
        let (from_parent, from_name) = path::split(from_norm);
        let from_parent =
            from_parent.ok_or_else(|| PosixError::new(PosixCode::EACCES, "rename", from_norm))?;
        let (to_parent, to_name) = path::split(to_norm);
        let to_parent =
            to_parent.ok_or_else(|| PosixError::new(PosixCode::EACCES, "rename", to_norm))?;

        let mut root = self.root.lock().unwrap();

        let node = {
            let from_parent_node = Self::get_node_mut(&mut root, &Self::segments(from_parent))
                .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "rename", from_norm))?;
            let children = from_parent_node
                .children_mut()
                .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "rename", from_norm))?;
            children
                .remove(from_name)
                .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "rename", from_norm))?
        };

        let to_parent_node = Self::get_node_mut(&mut root, &Self::segments(to_parent))
            .ok_or_else(|| PosixError::new(PosixCode::ENOENT, "rename", to_norm))?;
        let children = to_parent_node
            .children_mut()
            .ok_or_else(|| PosixError::new(PosixCode::ENOTDIR, "rename", to_norm))?;
        children.insert(to_name.to_string(), node);
        Ok(())
    }

    // ---- Public async API (checks mounts first, then the in-memory tree) ----

    pub async fn exists(&self, path: &str, cwd: &str) -> bool {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            return provider.exists(&rel).await;
        }
        self.exists_sync(&norm)
    }

    pub async fn stat(&self, path: &str, cwd: &str) -> Result<Stat> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            return provider.stat(&rel).await;
        }
        self.stat_sync(&norm)
    }

    pub async fn read_file(&self, path: &str, cwd: &str) -> Result<Vec<u8>> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            return provider.read_file(&rel).await;
        }
        self.read_file_sync(&norm)
    }

    pub async fn read_file_string(&self, path: &str, cwd: &str) -> Result<String> {
        let bytes = self.read_file(path, cwd).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn write_file(&self, path: &str, data: &[u8], cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.write_file(&rel, data).await?;
        } else {
            self.write_file_sync(&norm, data)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn append_file(&self, path: &str, data: &[u8], cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.append_file(&rel, data).await?;
        } else {
            self.append_file_sync(&norm, data)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn readdir(&self, path: &str, cwd: &str) -> Result<Vec<DirEntry>> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            return provider.readdir(&rel).await;
        }
        self.readdir_sync(&norm)
    }

    pub async fn mkdir(&self, path: &str, recursive: bool, cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.mkdir(&rel, recursive).await?;
        } else {
            self.mkdir_sync(&norm, recursive)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn rmdir(&self, path: &str, cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.rmdir(&rel).await?;
        } else {
            self.rmdir_sync(&norm)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn rmdir_recursive(&self, path: &str, cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.rmdir_recursive(&rel).await?;
        } else {
            self.rmdir_recursive_sync(&norm)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn unlink(&self, path: &str, cwd: &str) -> Result<()> {
        let norm = path::normalize(path, cwd);
        if let Some((rel, provider)) = self.find_mount(&norm) {
            provider.unlink(&rel).await?;
        } else {
            self.unlink_sync(&norm)?;
        }
        self.notify(&norm);
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str, cwd: &str) -> Result<()> {
        let from_norm = path::normalize(from, cwd);
        let to_norm = path::normalize(to, cwd);

        let from_mount = self.find_mount(&from_norm);
        let to_mount = self.find_mount(&to_norm);

        match (from_mount, to_mount) {
            (None, None) => self.rename_sync(&from_norm, &to_norm)?,
            (Some((from_rel, from_provider)), Some((to_rel, to_provider)))
                if Arc::ptr_eq(&from_provider, &to_provider) =>
            {
                from_provider.rename(&from_rel, &to_rel).await?;
            }
            _ => {
                // Cross-boundary rename: copy then unlink.
                self.copy_file(from, to, cwd).await?;
                self.unlink(from, cwd).await?;
                return Ok(());
            }
        }
        self.notify(&from_norm);
        self.notify(&to_norm);
        Ok(())
    }

    pub async fn copy_file(&self, from: &str, to: &str, cwd: &str) -> Result<()> {
        let from_norm = path::normalize(from, cwd);
        let to_norm = path::normalize(to, cwd);

        let from_mount = self.find_mount(&from_norm);
        let to_mount = self.find_mount(&to_norm);

        if let (Some((from_rel, from_provider)), Some((to_rel, to_provider))) =
            (&from_mount, &to_mount)
        {
            if Arc::ptr_eq(from_provider, to_provider) {
                from_provider.copy_file(from_rel, to_rel).await?;
                self.notify(&to_norm);
                return Ok(());
            }
        }

        let data = if let Some((rel, provider)) = &from_mount {
            provider.read_file(rel).await?
        } else {
            self.read_file_sync(&from_norm)?
        };

        if let Some((rel, provider)) = &to_mount {
            provider.write_file(rel, &data).await?;
        } else {
            self.write_file_sync(&to_norm, &data)?;
        }
        self.notify(&to_norm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let vfs = Vfs::new();
        vfs.mkdir("/tmp", false, "/").await.unwrap();
        vfs.write_file("/tmp/a.txt", b"hello", "/").await.unwrap();
        let data = vfs.read_file("/tmp/a.txt", "/").await.unwrap();
        assert_eq!(data, b"hello");
        let st = vfs.stat("/tmp/a.txt", "/").await.unwrap();
        assert_eq!(st.size, 5);
    }

    #[tokio::test]
    async fn mkdir_recursive_is_idempotent() {
        let vfs = Vfs::new();
        vfs.mkdir("/a/b/c", true, "/").await.unwrap();
        vfs.mkdir("/a/b/c", true, "/").await.unwrap();
        assert!(vfs.exists("/a/b/c", "/").await);
    }

    #[tokio::test]
    async fn mkdir_without_recursive_requires_parent() {
        let vfs = Vfs::new();
        let err = vfs.mkdir("/a/b", false, "/").await.unwrap_err();
        assert!(matches!(err, Error::Posix(PosixError { code: PosixCode::ENOENT, .. })));
    }

    #[tokio::test]
    async fn rename_then_stat_old_path_enoent() {
        let vfs = Vfs::new();
        vfs.write_file("/a.txt", b"x", "/").await.unwrap();
        vfs.rename("/a.txt", "/b.txt", "/").await.unwrap();
        let err = vfs.stat("/a.txt", "/").await.unwrap_err();
        assert!(matches!(err, Error::Posix(PosixError { code: PosixCode::ENOENT, .. })));
        assert!(vfs.exists("/b.txt", "/").await);
    }

    #[tokio::test]
    async fn readdir_on_file_is_enotdir() {
        let vfs = Vfs::new();
        vfs.write_file("/a.txt", b"x", "/").await.unwrap();
        let err = vfs.readdir("/a.txt", "/").await.unwrap_err();
        assert!(matches!(err, Error::Posix(PosixError { code: PosixCode::ENOTDIR, .. })));
    }

    #[tokio::test]
    async fn empty_write_creates_zero_byte_file() {
        let vfs = Vfs::new();
        vfs.write_file("/empty.txt", b"", "/").await.unwrap();
        let st = vfs.stat("/empty.txt", "/").await.unwrap();
        assert_eq!(st.size, 0);
    }

    #[tokio::test]
    async fn change_hook_fires_on_mutation() {
        let vfs = Vfs::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        vfs.on_change(move |p| seen2.lock().unwrap().push(p.to_string()));
        vfs.write_file("/x.txt", b"y", "/").await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["/x.txt"]);
    }
}
