//! Command execution context.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::kernel::Kernel;

/// An in-memory byte sink a command writes to. Backed by either a real
/// terminal bridge or a pipeline's intermediate queue.
#[derive(Clone)]
pub struct OutputStream {
    buf: Arc<Mutex<Vec<u8>>>,
    sink: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl OutputStream {
    pub fn buffered() -> Self {
        Self { buf: Arc::new(Mutex::new(Vec::new())), sink: None }
    }

    pub fn terminal(sink: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        Self { buf: Arc::new(Mutex::new(Vec::new())), sink: Some(sink) }
    }

    pub async fn write(&self, text: &str) {
        if let Some(sink) = &self.sink {
            sink(text);
        } else {
            self.buf.lock().await.extend_from_slice(text.as_bytes());
        }
    }

    pub async fn write_bytes(&self, data: &[u8]) {
        self.write(&String::from_utf8_lossy(data)).await;
    }

    pub async fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().await)
    }

    pub async fn snapshot(&self) -> Vec<u8> {
        self.buf.lock().await.clone()
    }
}

/// A command's stdin: either the interactive terminal bridge or a
/// pipeline's upstream buffer.
#[derive(Clone)]
pub struct InputStream {
    data: Arc<Mutex<Vec<u8>>>,
    pos: Arc<Mutex<usize>>,
}

impl InputStream {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data: Arc::new(Mutex::new(data)), pos: Arc::new(Mutex::new(0)) }
    }

    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Returns the next buffered chunk, or `None` at EOF. This in-memory
    /// model has no true streaming, so one call drains everything.
    pub async fn read(&self) -> Option<Vec<u8>> {
        let mut pos = self.pos.lock().await;
        let data = self.data.lock().await;
        if *pos >= data.len() {
            return None;
        }
        let chunk = data[*pos..].to_vec();
        *pos = data.len();
        Some(chunk)
    }

    pub async fn read_all(&self) -> String {
        let data = self.data.lock().await;
        String::from_utf8_lossy(&data).into_owned()
    }
}

/// The context handed to every builtin and registered command.
pub struct CommandContext {
    pub kernel: Arc<Kernel>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: String,
    pub stdin: InputStream,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub signal: CancellationToken,
    pub pid: u32,
}

impl CommandContext {
    pub async fn writeln_stdout(&self, line: &str) {
        self.stdout.write(line).await;
        self.stdout.write("\n").await;
    }

    pub async fn writeln_stderr(&self, line: &str) {
        self.stderr.write(line).await;
        self.stderr.write("\n").await;
    }
}
