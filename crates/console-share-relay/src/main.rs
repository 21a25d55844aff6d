//! `console-share` Relay
//!
//! Waits for an instance's graphical console to announce its local SPICE
//! socket in a marker file, then exposes that socket on a TCP port until the
//! process is stopped. The marker file is removed on every exit path.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use console_share_core::discovery::{Discovery, DiscoveryTarget};
use console_share_core::relay::{RelayBridge, UnixConnector};
use console_share_core::{MarkerGuard, config, signal, tracing_init};

#[derive(Parser, Debug)]
#[command(name = "console-share-relay")]
#[command(
    version,
    about = "Expose an Incus instance's SPICE console socket over TCP"
)]
struct Args {
    /// Instance whose console socket is announced in the marker file.
    instance: String,

    /// TCP port to listen on.
    port: u16,

    /// Address to listen on (defaults to the configured bind address, 0.0.0.0).
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Seconds to wait for the console socket announcement.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Directory holding per-instance marker files.
    #[arg(long)]
    marker_dir: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "CONSOLE_SHARE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "CONSOLE_SHARE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_init::init_tracing(
        &tracing_init::default_filter("console_share_relay", &args.log_level),
        args.log_json,
    );

    let config = config::load_config()?;
    let marker_dir = args
        .marker_dir
        .unwrap_or_else(|| config.console.marker_dir());
    let bind = args.bind.unwrap_or(config.proxy.bind_address);
    let timeout = args
        .timeout
        .map_or_else(|| config.console.discovery_timeout(), Duration::from_secs);

    let target = DiscoveryTarget::new(&args.instance, &marker_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instance = %args.instance,
        port = args.port,
        marker = %target.marker_path().display(),
        "Starting console-share-relay"
    );

    // Dropped on every return below, including `?` errors.
    let _marker = MarkerGuard::new(target.marker_path()).with_context(|| {
        format!("Failed to prepare marker directory {}", marker_dir.display())
    })?;

    let discovery = Discovery::new(target)
        .with_timeout(timeout)
        .with_poll_interval(config.console.poll_interval());

    // One listener for the whole run, discovery and bind included.
    let shutdown = signal::shutdown_signal();
    tokio::pin!(shutdown);

    let socket = tokio::select! {
        result = discovery.run() => result?,
        _ = &mut shutdown => {
            info!("Stopped before the console socket appeared");
            return Ok(());
        }
    };

    let addr = SocketAddr::new(bind, args.port);
    let bridge = RelayBridge::bind(addr, UnixConnector::new(socket))
        .await?
        .with_linger(config.console.linger());

    // Notify systemd that the relay is ready to accept clients (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    tokio::select! {
        () = bridge.serve() => {}
        _ = &mut shutdown => {}
    }

    info!("Relay stopped");
    Ok(())
}
