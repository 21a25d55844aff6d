//! Subcommand implementations.

mod generate;
mod list;
mod share;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};

use anyhow::{Result, bail};
use clap::Args;
use tracing::warn;

use console_share_core::Config;
use console_share_core::incus::Instance;
use console_share_core::relay::{Connector, RelayBridge};

pub use generate::{GenerateArgs, run_generate};
pub use list::{ListArgs, ListEntry, list_entries, run_list};
pub use share::{ShellArgs, console_connector, run_console, run_shell, run_vga, shell_connector};

/// Arguments shared by the sharing subcommands.
#[derive(Debug, Clone, Args)]
pub struct ShareArgs {
    /// Instance to share
    pub instance: String,

    /// TCP port to listen on (first free port from the configured range if omitted)
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Address to listen on (defaults to the configured bind address)
    #[arg(long)]
    pub bind: Option<IpAddr>,
}

/// What a client should run to reach a shared instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareKind {
    Vga,
    Shell,
    Console,
}

/// Validate a looked-up instance for sharing.
pub fn check_instance(
    found: Option<Instance>,
    name: &str,
    require_vm: bool,
    config: &Config,
) -> Result<Instance> {
    if config.instance(name).is_some_and(|entry| !entry.enabled) {
        bail!("Instance {name:?} is disabled in the configuration");
    }
    let Some(instance) = found else {
        bail!("Instance {name:?} not found");
    };
    if !instance.is_running() {
        bail!("Instance {name:?} is not running (status: {})", instance.status);
    }
    if require_vm && !instance.is_vm() {
        bail!(
            "Instance {name:?} is a {}; VGA consoles need a virtual machine (try `console-share shell {name}`)",
            instance.kind
        );
    }
    Ok(instance)
}

/// Bind the requested port, the instance's configured port, or the first
/// free one in the configured range.
pub async fn bind_bridge<C: Connector>(
    args: &ShareArgs,
    config: &Config,
    connector: C,
) -> Result<RelayBridge<C>> {
    let ip = args.bind.unwrap_or(config.proxy.bind_address);
    let port = args
        .port
        .or_else(|| config.instance(&args.instance).and_then(|entry| entry.port));
    let bridge = match port {
        Some(port) => RelayBridge::bind(SocketAddr::new(ip, port), connector).await?,
        None => {
            RelayBridge::bind_in_range(ip, config.proxy.start_port, config.proxy.port_span, connector)
                .await?
        }
    };
    Ok(bridge.with_linger(config.console.linger()))
}

/// Command a client runs to connect.
pub fn connect_hint(kind: ShareKind, addr: SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        "<host>".to_string()
    } else if addr.is_ipv6() {
        format!("[{}]", addr.ip())
    } else {
        addr.ip().to_string()
    };
    match kind {
        ShareKind::Vga => format!("remote-viewer spice://{host}:{}", addr.port()),
        ShareKind::Shell | ShareKind::Console => format!("nc {host} {}", addr.port()),
    }
}

#[allow(clippy::print_stdout)]
fn announce(kind: ShareKind, instance: &str, addr: SocketAddr) {
    println!("Sharing {instance} on {addr}");
    println!("Connect with: {}", connect_hint(kind, addr));
    if kind != ShareKind::Vga {
        println!("For a raw terminal: socat -,raw,echo=0 tcp:{addr}");
    }
}

/// Announce, notify systemd, and serve until `shutdown` or `stop` resolves.
async fn serve_until_shutdown<C, S, F>(
    bridge: RelayBridge<C>,
    kind: ShareKind,
    instance: &str,
    shutdown: S,
    stop: F,
) -> Result<()>
where
    C: Connector,
    S: Future<Output = &'static str>,
    F: Future<Output = Result<()>>,
{
    announce(kind, instance, bridge.local_addr()?);

    #[cfg(unix)]
    if let Err(e) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %e, "Failed to notify systemd");
    }

    tokio::select! {
        () = bridge.serve() => Ok(()),
        _ = shutdown => Ok(()),
        result = stop => result,
    }
}
