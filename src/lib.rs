//! lifo-sh: a browser-resident virtual POSIX kernel, Bourne-style shell, and
//! Node-compatible script runtime.
//!
//! This crate has no real process boundary underneath it: every "process" is
//! a tracked entry in [`process::ProcessRegistry`], every file lives in
//! [`vfs::Vfs`]'s in-memory inode tree, and every `node <script>` invocation
//! runs an embedded ECMAScript engine against a shimmed `fs`/`http`/`process`
//! surface backed by the same kernel. One [`kernel::Kernel`] instance owns
//! all of it and is threaded through as `Arc<Kernel>`.
//!
//! # Example
//!
//! ```no_run
//! use lifo_sh::{Kernel, KernelConfig, Shell};
//! use lifo_sh::shell::{CommandRegistry, OutputStream};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let kernel = Kernel::boot(KernelConfig::from_env());
//!     let mut shell = Shell::new(kernel, 1, Arc::new(CommandRegistry::new()));
//!     let stdout = OutputStream::buffered();
//!     let stderr = OutputStream::buffered();
//!     shell.execute_line("echo hello", stdout.clone(), stderr).await;
//!     println!("{}", String::from_utf8_lossy(&stdout.snapshot().await));
//! }
//! ```

pub mod commands;
pub mod error;
pub mod kernel;
pub mod net;
pub mod node;
pub mod process;
pub mod shell;
pub mod vfs;

pub use error::{Error, Result};
pub use kernel::{Kernel, KernelConfig};
pub use shell::Shell;

/// Common imports for embedding the kernel and shell elsewhere in the wider
/// browser-resident system this crate is one piece of.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::kernel::{Kernel, KernelConfig};
    pub use crate::node::ShimContext;
    pub use crate::process::{ProcessRegistry, ProcessStatus, Signal};
    pub use crate::shell::{CommandContext, CommandRegistry, InputStream, OutputStream, Shell};
    pub use crate::vfs::Vfs;
}
