//! Inode data model: the node type stored in the in-memory VFS tree.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Semantic type of an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    File,
    Directory,
}

/// Stat info returned by `Vfs::stat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    pub node_type: NodeType,
    pub size: u64,
    pub mode: u32,
    pub ctime: u64,
    pub mtime: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }
}

/// Directory entry returned by `readdir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub node_type: NodeType,
}

/// A tree node: either a file's byte content or an ordered child table.
#[derive(Debug, Clone)]
pub enum Inode {
    File {
        content: Vec<u8>,
        mode: u32,
        ctime: u64,
        mtime: u64,
    },
    Directory {
        children: BTreeMap<String, Inode>,
        mode: u32,
        ctime: u64,
        mtime: u64,
    },
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Inode {
    pub fn new_file(content: Vec<u8>) -> Self {
        let now = now_millis();
        Inode::File {
            content,
            mode: 0o644,
            ctime: now,
            mtime: now,
        }
    }

    pub fn new_directory() -> Self {
        let now = now_millis();
        Inode::Directory {
            children: BTreeMap::new(),
            mode: 0o755,
            ctime: now,
            mtime: now,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Inode::File { .. } => NodeType::File,
            Inode::Directory { .. } => NodeType::Directory,
        }
    }

    pub fn stat(&self) -> Stat {
        match self {
            Inode::File {
                content,
                mode,
                ctime,
                mtime,
            } => Stat {
                node_type: NodeType::File,
                size: content.len() as u64,
                mode: *mode,
                ctime: *ctime,
                mtime: *mtime,
            },
            Inode::Directory {
                mode, ctime, mtime, ..
            } => Stat {
                node_type: NodeType::Directory,
                size: 0,
                mode: *mode,
                ctime: *ctime,
                mtime: *mtime,
            },
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Inode>> {
        match self {
            Inode::Directory { children, .. } => Some(children),
            Inode::File { .. } => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Inode>> {
        match self {
            Inode::Directory { children, .. } => Some(children),
            Inode::File { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Inode::File { content, .. } => Some(content),
            Inode::Directory { .. } => None,
        }
    }

    pub fn touch_mtime(&mut self) {
        let now = now_millis();
        match self {
            Inode::File { mtime, .. } => *mtime = now,
            Inode::Directory { mtime, .. } => *mtime = now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stat_reports_size() {
        let f = Inode::new_file(b"hello".to_vec());
        let st = f.stat();
        assert_eq!(st.size, 5);
        assert!(st.is_file());
    }

    #[test]
    fn directory_has_no_size() {
        let d = Inode::new_directory();
        assert!(d.stat().is_dir());
        assert_eq!(d.stat().size, 0);
    }
}
