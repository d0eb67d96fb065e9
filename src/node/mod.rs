//! Node-compatible script runtime: the shim set, the ESM->CJS transformer,
//! and the module resolver and executor.
//!
//! The runtime executes entirely on one dedicated OS thread per invocation
//! (see [`engine`]) because the embedded ECMAScript engine's values are not
//! `Send`/`Sync`; the rest of the kernel talks to it over a channel, which
//! also happens to give the runtime Node's single-threaded cooperative
//! scheduling almost for free.

pub mod engine;
pub mod executor;
pub mod mask;
pub mod resolver;
pub mod shims;
pub mod transform;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::kernel::Kernel;
use crate::shell::context::OutputStream;

/// Everything a shim factory needs to behave like Node's eponymous module
/// for this one script invocation.
#[derive(Clone)]
pub struct ShimContext {
    pub kernel: Arc<Kernel>,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub argv: Vec<String>,
    pub filename: String,
    pub dirname: String,
    pub signal: CancellationToken,
    pub pid: u32,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
}
