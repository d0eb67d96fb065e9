//! Error types for the kernel, shell, and Node-compat runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// POSIX-style error code carried by every filesystem-shaped failure.
///
/// Mirrors the codes real Node programs branch on via `err.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosixCode {
    ENOENT,
    ENOTDIR,
    EEXIST,
    EISDIR,
    EACCES,
    EBADF,
    ENOTEMPTY,
    EINVAL,
}

impl PosixCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PosixCode::ENOENT => "ENOENT",
            PosixCode::ENOTDIR => "ENOTDIR",
            PosixCode::EEXIST => "EEXIST",
            PosixCode::EISDIR => "EISDIR",
            PosixCode::EACCES => "EACCES",
            PosixCode::EBADF => "EBADF",
            PosixCode::ENOTEMPTY => "ENOTEMPTY",
            PosixCode::EINVAL => "EINVAL",
        }
    }
}

impl std::fmt::Display for PosixCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filesystem error carrying a POSIX code plus the syscall-like context
/// Node's `fs` module attaches to thrown errors (`err.code`, `err.syscall`,
/// `err.path`).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{syscall} '{path}': {code}")]
pub struct PosixError {
    pub code: PosixCode,
    pub syscall: String,
    pub path: String,
}

impl PosixError {
    pub fn new(code: PosixCode, syscall: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            syscall: syscall.into(),
            path: path.into(),
        }
    }

    pub fn errno(&self) -> i32 {
        match self.code {
            PosixCode::EACCES => -13,
            PosixCode::EEXIST => -17,
            PosixCode::EISDIR => -21,
            PosixCode::ENOTDIR => -20,
            PosixCode::ENOENT => -2,
            PosixCode::EBADF => -9,
            PosixCode::ENOTEMPTY => -39,
            PosixCode::EINVAL => -22,
        }
    }
}

/// Top-level error type shared by every subsystem.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem operation failed with a POSIX code.
    #[error(transparent)]
    Posix(#[from] PosixError),

    /// Module resolution could not find a specifier.
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// The ESM->CJS transformer encountered source it could not safely rewrite.
    #[error("transform error: {0}")]
    Transform(String),

    /// An error raised while executing script code, carrying Node's own
    /// `message`/`stack` shape, passed through unchanged on re-entry.
    #[error("{0}")]
    Script(String),

    /// `process.exit(code)` sentinel, caught at the script execution boundary.
    #[error("process exited with code {0}")]
    ProcessExit(i32),

    /// Shell syntax/parse error.
    #[error("shell: {0}")]
    ShellSyntax(String),

    /// Port already bound.
    #[error("port {0} already in use")]
    PortInUse(u16),

    /// Process-registry invariant violation (e.g. killing a shell process).
    #[error("process error: {0}")]
    Process(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from the host (real stdio, DNS-over-HTTPS fetch, persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Error surfaced by the embedded ECMAScript engine.
    #[error("script engine error: {0}")]
    Engine(String),

    /// The operation was aborted via its `AbortSignal`.
    #[error("aborted")]
    Aborted,
}

impl Error {
    /// Exit code this error maps to when it escapes a command.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ProcessExit(code) => *code,
            Error::ShellSyntax(_) => 2,
            Error::Aborted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_error_display() {
        let e = PosixError::new(PosixCode::ENOENT, "open", "/tmp/missing");
        assert_eq!(e.to_string(), "open '/tmp/missing': ENOENT");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Error::ProcessExit(42).exit_code(), 42);
        assert_eq!(Error::ShellSyntax("bad".into()).exit_code(), 2);
        assert_eq!(Error::Aborted.exit_code(), 130);
        assert_eq!(Error::ModuleNotFound("x".into()).exit_code(), 1);
    }
}
