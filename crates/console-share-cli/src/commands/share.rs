use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use tracing::info;

use console_share_core::config::{Config, ShellConfig};
use console_share_core::incus::IncusClient;
use console_share_core::relay::{CommandConnector, UnixConnector};
use console_share_core::{Discovery, DiscoveryTarget, MarkerGuard, signal};

use super::{ShareArgs, ShareKind, bind_bridge, check_instance, serve_until_shutdown};
use crate::vga::VgaConsole;

/// Arguments for the `shell` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ShellArgs {
    #[command(flatten)]
    pub share: ShareArgs,

    /// Command to run inside the instance (defaults to the configured shell)
    #[arg(long)]
    pub command: Option<String>,
}

/// `incus exec` with a forced pseudo-terminal.
pub fn shell_connector(incus_bin: &Path, instance: &str, shell: &ShellConfig) -> CommandConnector {
    CommandConnector::new(incus_bin)
        .args(["exec", "--force-interactive", "--env"])
        .arg(format!("TERM={}", shell.term))
        .arg(instance)
        .arg("--")
        .arg(&shell.command)
}

/// `incus console` for the instance's text console.
pub fn console_connector(incus_bin: &Path, instance: &str) -> CommandConnector {
    CommandConnector::new(incus_bin).args(["console", instance])
}

/// Share a VM's graphical console.
pub async fn run_vga(args: &ShareArgs, config: &Config) -> Result<()> {
    let client = IncusClient::new(&config.incus.bin);
    let instance = check_instance(
        client.get_instance(&args.instance).await?,
        &args.instance,
        true,
        config,
    )?;

    let target = DiscoveryTarget::new(&instance.name, &config.console.marker_dir())?;
    // The shim writes this marker, so anything already there is stale.
    let _marker = MarkerGuard::fresh(target.marker_path())
        .with_context(|| format!("Failed to prepare marker {}", target.marker_path().display()))?;

    let viewer_dir = config.console.viewer_dir();
    let mut console = VgaConsole::launch(client.bin(), &instance.name, &viewer_dir, target.marker_path())
        .with_context(|| format!("Failed to start VGA console for {}", instance.name))?;

    let discovery = Discovery::new(target)
        .with_timeout(config.console.discovery_timeout())
        .with_poll_interval(config.console.poll_interval());

    let shutdown = signal::shutdown_signal();
    tokio::pin!(shutdown);

    let socket = tokio::select! {
        result = discovery.run() => result?,
        status = console.wait() => {
            bail!("VGA console for {} exited before announcing its socket ({})", instance.name, status?);
        }
        _ = &mut shutdown => return Ok(()),
    };
    info!(instance = %instance.name, socket = %socket, "VGA console socket discovered");

    let bridge = bind_bridge(args, config, UnixConnector::new(socket)).await?;
    let name = instance.name.clone();
    serve_until_shutdown(bridge, ShareKind::Vga, &instance.name, shutdown, async move {
        let status = console.wait().await?;
        Err(anyhow!("VGA console for {name} exited ({status})"))
    })
    .await
}

/// Share an interactive shell inside the instance.
pub async fn run_shell(args: ShellArgs, config: &Config) -> Result<()> {
    let client = IncusClient::new(&config.incus.bin);
    let instance = check_instance(
        client.get_instance(&args.share.instance).await?,
        &args.share.instance,
        false,
        config,
    )?;

    let mut shell = config.shell.clone();
    if let Some(command) = args.command {
        shell.command = command;
    }
    let connector = shell_connector(client.bin(), &instance.name, &shell);
    let bridge = bind_bridge(&args.share, config, connector).await?;
    serve_until_shutdown(
        bridge,
        ShareKind::Shell,
        &instance.name,
        signal::shutdown_signal(),
        std::future::pending(),
    )
    .await
}

/// Share the instance's text console.
pub async fn run_console(args: &ShareArgs, config: &Config) -> Result<()> {
    let client = IncusClient::new(&config.incus.bin);
    let instance = check_instance(
        client.get_instance(&args.instance).await?,
        &args.instance,
        false,
        config,
    )?;

    let connector = console_connector(client.bin(), &instance.name);
    let bridge = bind_bridge(args, config, connector).await?;
    serve_until_shutdown(
        bridge,
        ShareKind::Console,
        &instance.name,
        signal::shutdown_signal(),
        std::future::pending(),
    )
    .await
}
