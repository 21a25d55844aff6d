//! Local socket address extracted from a `spice+unix://` URI.

use std::fmt;
use std::path::{Path, PathBuf};

/// URI scheme prefix Incus uses when handing a SPICE socket to a viewer.
pub const SPICE_UNIX_SCHEME: &str = "spice+unix://";

/// Filesystem path of a local-only console socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress(PathBuf);

impl SocketAddress {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for SocketAddress {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Strip the `spice+unix://` prefix from a matched marker token.
///
/// Only the exact prefix is removed. Everything after it, including the
/// leading `/` of an absolute path, is kept byte-for-byte, since the result
/// is handed straight to `connect(2)`.
///
/// The token is expected to come from [`crate::discovery::scan_marker`]; a
/// token without the prefix is a caller bug and is returned unchanged.
pub fn extract_address(token: &str) -> SocketAddress {
    debug_assert!(
        token.starts_with(SPICE_UNIX_SCHEME),
        "marker token without scheme prefix: {token}"
    );
    SocketAddress::new(token.strip_prefix(SPICE_UNIX_SCHEME).unwrap_or(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_keeps_absolute_path() {
        let addr = extract_address("spice+unix:///tmp/console-share/myvm.sock");
        assert_eq!(addr.path(), Path::new("/tmp/console-share/myvm.sock"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let first = extract_address("spice+unix:///tmp/x.sock");
        for _ in 0..10 {
            assert_eq!(extract_address("spice+unix:///tmp/x.sock"), first);
        }
        assert_eq!(first.to_string(), "/tmp/x.sock");
    }

    #[test]
    fn extra_slashes_are_preserved() {
        let addr = extract_address("spice+unix:////run/incus/vm.spice");
        assert_eq!(addr.path().as_os_str(), "//run/incus/vm.spice");
    }

    #[test]
    fn relative_path_is_kept_as_is() {
        let addr = extract_address("spice+unix://vm.spice");
        assert_eq!(addr.path(), Path::new("vm.spice"));
    }
}
