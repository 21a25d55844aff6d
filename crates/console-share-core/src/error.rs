//! Error types for the `console-share` core library.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `console-share` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Instance name is empty or cannot be used to derive a file name.
    #[error("Invalid instance name: {0:?}")]
    InvalidInstance(String),

    /// No console socket was announced before the discovery window closed.
    #[error(
        "Timed out waiting for console socket in {} after {attempts} attempts",
        path.display()
    )]
    DiscoveryTimeout { path: PathBuf, attempts: u32 },

    /// The TCP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// No free port in the configured range.
    #[error("No free port in range {start}..{end}")]
    NoFreePort { start: u16, end: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The `incus` command failed or returned unexpected output.
    #[error("Incus error: {0}")]
    Incus(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
