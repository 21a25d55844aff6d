//! Marker-file discovery of a console's local SPICE socket.
//!
//! An upstream process (the `remote-viewer` shim started by `incus console
//! --type=vga`) writes a line containing `spice+unix://<path>` into a marker
//! file derived from the instance name. Discovery polls that file until the
//! URI shows up or the attempt budget runs out.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::address::{SocketAddress, extract_address};
use crate::error::{Error, Result};

/// Pre-compiled regex for the socket URI inside a marker line.
#[allow(clippy::expect_used)]
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spice\+unix://\S+").expect("static regex is valid"));

/// Default discovery window in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default delay between two marker checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// File extension of per-instance marker files.
const MARKER_EXTENSION: &str = "viewer";

/// Reject names that cannot safely become a single file name component.
pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(Error::InvalidInstance(name.to_string()));
    }
    Ok(())
}

/// Where to look for an instance's socket announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTarget {
    instance: String,
    marker_path: PathBuf,
}

impl DiscoveryTarget {
    /// Derive the marker path `<marker_dir>/<instance>.viewer`.
    pub fn new(instance: &str, marker_dir: &Path) -> Result<Self> {
        validate_instance_name(instance)?;
        let marker_path = marker_dir.join(format!("{instance}.{MARKER_EXTENSION}"));
        Ok(Self {
            instance: instance.to_string(),
            marker_path,
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }
}

/// Return the first `spice+unix://` token found in the marker contents.
pub fn scan_marker(contents: &str) -> Option<&str> {
    contents
        .lines()
        .find_map(|line| MARKER_RE.find(line))
        .map(|m| m.as_str())
}

/// Bounded polling of a [`DiscoveryTarget`].
#[derive(Debug, Clone)]
pub struct Discovery {
    target: DiscoveryTarget,
    timeout: Duration,
    poll_interval: Duration,
}

impl Discovery {
    pub const fn new(target: DiscoveryTarget) -> Self {
        Self {
            target,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub const fn target(&self) -> &DiscoveryTarget {
        &self.target
    }

    /// Number of marker checks that fit in the timeout (at least one).
    pub fn max_attempts(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let attempts = self.timeout.as_millis().div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }

    /// Poll the marker file until a socket URI appears.
    ///
    /// Returns as soon as a match is found. After `max_attempts` failed
    /// checks (one per poll interval) fails with [`Error::DiscoveryTimeout`].
    pub async fn run(&self) -> Result<SocketAddress> {
        let path = self.target.marker_path();
        let max_attempts = self.max_attempts();
        info!(
            instance = %self.target.instance(),
            marker = %path.display(),
            max_attempts,
            "Waiting for console socket announcement"
        );

        for attempt in 1..=max_attempts {
            if let Some(contents) = read_marker(path).await {
                if let Some(token) = scan_marker(&contents) {
                    let address = extract_address(token);
                    info!(
                        instance = %self.target.instance(),
                        socket = %address,
                        attempt,
                        "Console socket discovered"
                    );
                    return Ok(address);
                }
            }
            debug!(attempt, max_attempts, "No socket announcement yet");
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(Error::DiscoveryTimeout {
            path: path.to_path_buf(),
            attempts: max_attempts,
        })
    }
}

/// Discover the socket of `instance` with the default poll interval.
pub async fn discover(instance: &str, marker_dir: &Path, timeout_secs: u64) -> Result<SocketAddress> {
    let target = DiscoveryTarget::new(instance, marker_dir)?;
    Discovery::new(target)
        .with_timeout(Duration::from_secs(timeout_secs))
        .run()
        .await
}

/// Read the marker, treating a missing or unreadable file as "not yet".
async fn read_marker(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Marker file not readable");
            None
        }
    }
}
