//! The `remote-viewer` stand-in used to capture VGA console addresses.
//!
//! `incus console --type=vga` hands the console's SPICE address to whatever
//! `remote-viewer` it finds on `PATH`. The shim installed here records that
//! address in the marker file named by [`MARKER_ENV`] and then waits for its
//! parent to exit, which keeps the console session and its socket alive.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Program name `incus` looks up on `PATH`.
pub const VIEWER_PROGRAM: &str = "remote-viewer";

/// Environment variable carrying the marker path to the shim.
pub const MARKER_ENV: &str = "CONSOLE_SHARE_MARKER";

/// Generate the shim script.
///
/// The marker is written to a staging file and renamed so a polling reader
/// never sees a partial announcement.
pub fn viewer_script() -> String {
    format!(
        r#"#!/bin/sh
# Installed by console-share. Do not edit.
marker="${{{env}:?{env} not set}}"
printf '%s\n' "$*" > "$marker.tmp" && mv -f "$marker.tmp" "$marker" || exit 1
while kill -0 "$PPID" 2>/dev/null; do
    sleep 1
done
"#,
        env = MARKER_ENV,
    )
}

/// Write the shim into `dir` and make it executable.
pub fn install_viewer(dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(VIEWER_PROGRAM);
    let staging = dir.join(format!(".{VIEWER_PROGRAM}.{}", std::process::id()));
    std::fs::write(&staging, viewer_script())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))?;
    }
    std::fs::rename(&staging, &path)?;
    tracing::debug!(path = %path.display(), "Installed viewer shim");
    Ok(path)
}

/// `PATH` with `dir` in front of `current`.
pub fn prepend_path(dir: &Path, current: Option<OsString>) -> io::Result<OsString> {
    let rest = current
        .as_deref()
        .map(std::env::split_paths)
        .into_iter()
        .flatten()
        .filter(|entry| entry != dir);
    std::env::join_paths(std::iter::once(dir.to_path_buf()).chain(rest))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}
