//! Shell history: bounded ring buffer with
//! `!n`/`!!` expansion, persisted to the VFS.

use crate::error::Result;
use crate::kernel::Kernel;

pub struct History {
    entries: Vec<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::new(), capacity }
    }

    pub fn push(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        self.entries.push(line);
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(0..overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    /// Expand a leading `!!` (previous command) or `!n` (1-based index)
    /// reference. Returns the line unchanged if it doesn't start with `!`,
    /// or doesn't match either form.
    pub fn expand(&self, line: &str) -> std::result::Result<String, String> {
        if !line.starts_with('!') {
            return Ok(line.to_string());
        }
        if line == "!!" {
            return self
                .entries
                .last()
                .cloned()
                .ok_or_else(|| "!!: event not found".to_string());
        }
        if let Some(rest) = line.strip_prefix('!') {
            if let Ok(n) = rest.parse::<usize>() {
                return self
                    .entries
                    .get(n.saturating_sub(1))
                    .cloned()
                    .ok_or_else(|| format!("!{n}: event not found"));
            }
        }
        Ok(line.to_string())
    }

    pub async fn load(kernel: &Kernel, path: &str, capacity: usize) -> Result<Self> {
        let mut history = Self::new(capacity);
        if let Ok(content) = kernel.vfs.read_file_string(path, "/").await {
            for line in content.lines() {
                history.push(line.to_string());
            }
        }
        Ok(history)
    }

    pub async fn save(&self, kernel: &Kernel, path: &str) -> Result<()> {
        let content = self.entries.join("\n");
        kernel.vfs.write_file(path, content.as_bytes(), "/").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_capacity_drops_oldest() {
        let mut h = History::new(2);
        h.push("a".into());
        h.push("b".into());
        h.push("c".into());
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Some("b"));
    }

    #[test]
    fn bang_bang_expands_to_previous() {
        let mut h = History::new(10);
        h.push("echo one".into());
        h.push("echo two".into());
        assert_eq!(h.expand("!!").unwrap(), "echo two");
    }

    #[test]
    fn bang_n_expands_to_indexed_entry() {
        let mut h = History::new(10);
        h.push("echo one".into());
        h.push("echo two".into());
        assert_eq!(h.expand("!1").unwrap(), "echo one");
    }

    #[test]
    fn non_history_line_passes_through() {
        let h = History::new(10);
        assert_eq!(h.expand("echo hi").unwrap(), "echo hi");
    }
}
