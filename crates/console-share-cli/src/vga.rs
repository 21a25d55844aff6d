//! Running `incus console --type=vga` against the viewer shim.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::info;

use crate::viewer::{self, MARKER_ENV};

/// A spawned VGA console whose viewer announces into a marker file.
///
/// Dropping it kills the console process.
#[derive(Debug)]
pub struct VgaConsole {
    child: Child,
}

/// Arguments and environment for the console process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgaCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub path: OsString,
    pub marker: PathBuf,
}

impl VgaCommand {
    pub fn new(
        incus_bin: &Path,
        instance: &str,
        viewer_dir: &Path,
        marker: &Path,
        current_path: Option<OsString>,
    ) -> io::Result<Self> {
        Ok(Self {
            program: incus_bin.to_path_buf(),
            args: vec![
                "console".to_string(),
                "--type=vga".to_string(),
                instance.to_string(),
            ],
            path: viewer::prepend_path(viewer_dir, current_path)?,
            marker: marker.to_path_buf(),
        })
    }
}

impl VgaConsole {
    /// Install the shim into `viewer_dir` and start the console.
    pub fn launch(
        incus_bin: &Path,
        instance: &str,
        viewer_dir: &Path,
        marker: &Path,
    ) -> io::Result<Self> {
        viewer::install_viewer(viewer_dir)?;
        let command = VgaCommand::new(
            incus_bin,
            instance,
            viewer_dir,
            marker,
            std::env::var_os("PATH"),
        )?;
        Self::spawn(&command)
    }

    pub fn spawn(command: &VgaCommand) -> io::Result<Self> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .env("PATH", &command.path)
            .env(MARKER_ENV, &command.marker)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(pid = child.id(), program = %command.program.display(), "VGA console started");
        Ok(Self { child })
    }

    /// Resolve when the console process exits.
    pub async fn wait(&mut self) -> io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn command_line_and_environment() {
        let cmd = VgaCommand::new(
            Path::new("/usr/bin/incus"),
            "myvm",
            Path::new("/tmp/console-share/bin"),
            Path::new("/run/user/1000/console-share/myvm.viewer"),
            Some(OsString::from("/usr/bin:/bin")),
        )
        .unwrap();
        assert_eq!(cmd.program, Path::new("/usr/bin/incus"));
        assert_eq!(cmd.args, ["console", "--type=vga", "myvm"]);
        assert_eq!(cmd.path, OsString::from("/tmp/console-share/bin:/usr/bin:/bin"));
        assert_eq!(
            cmd.marker,
            Path::new("/run/user/1000/console-share/myvm.viewer")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shim_on_path_writes_marker() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let viewer_dir = dir.path().join("bin");
        viewer::install_viewer(&viewer_dir).unwrap();

        // Stand-in for `incus console --type=vga`: run the viewer found on PATH.
        let fake_incus = dir.path().join("incus");
        std::fs::write(
            &fake_incus,
            "#!/bin/sh\nremote-viewer spice+unix:///run/incus/$3/qemu.spice\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake_incus, std::fs::Permissions::from_mode(0o755)).unwrap();

        let marker = dir.path().join("myvm.viewer");
        let command = VgaCommand::new(
            &fake_incus,
            "myvm",
            &viewer_dir,
            &marker,
            std::env::var_os("PATH"),
        )
        .unwrap();
        let mut console = VgaConsole::spawn(&command).unwrap();

        let address = console_share_core::Discovery::new(
            console_share_core::DiscoveryTarget::new("myvm", dir.path()).unwrap(),
        )
        .with_timeout(std::time::Duration::from_secs(5))
        .with_poll_interval(std::time::Duration::from_millis(50))
        .run()
        .await
        .unwrap();
        assert_eq!(address.path(), Path::new("/run/incus/myvm/qemu.spice"));

        // The fake console waits on the shim, which waits on the fake console.
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(200), console.wait())
                .await
                .is_err()
        );
    }
}
