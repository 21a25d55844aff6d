//! `console-share` Core Library
//!
//! Shared functionality for the `console-share` binaries:
//! - Marker-file discovery of a console's local SPICE socket
//! - TCP relay bridge to Unix sockets and child processes
//! - Configuration resolution and hierarchy
//! - Incus instance lookup
//! - Common error types

pub mod address;
pub mod config;
pub mod discovery;
pub mod error;
pub mod incus;
pub mod marker;
pub mod relay;
pub mod signal;
pub mod tracing_init;

pub use address::{SocketAddress, extract_address};
pub use config::Config;
pub use discovery::{Discovery, DiscoveryTarget};
pub use error::{Error, Result};
pub use marker::MarkerGuard;
