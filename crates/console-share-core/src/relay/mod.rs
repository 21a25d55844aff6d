//! TCP relay bridge.
//!
//! Accepts TCP clients and pairs each one with a fresh upstream connection
//! (a Unix domain socket, or a child process' stdio), copying raw bytes in
//! both directions. Every client gets its own task; sessions share nothing
//! but the immutable [`Connector`].

mod bridge;
mod connector;
mod session;

pub use bridge::RelayBridge;
#[cfg(unix)]
pub use connector::UnixConnector;
pub use connector::{ChildStream, CommandConnector, Connector};
pub use session::{DEFAULT_LINGER, SessionError, Transfer, pipe};
