//! Process shutdown signals.
//!
//! Every signal that would otherwise terminate the process is routed through
//! [`shutdown_signal`] so destructors (marker cleanup, child processes) run.

use tracing::{info, warn};

/// Resolve when the process is asked to stop.
///
/// Ctrl+C everywhere; SIGTERM, SIGHUP and SIGQUIT on unix. Returns the name
/// of the signal that fired.
///
/// Handlers are installed on first poll. Create the future once, pin it, and
/// reuse it across phases so no signal falls between two listeners.
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    let unix = wait_unix();
    #[cfg(not(unix))]
    let unix = std::future::pending::<&'static str>();

    let name = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            "SIGINT"
        }
        name = unix => name,
    };
    info!(signal = name, "Received shutdown signal");
    name
}

#[cfg(unix)]
async fn wait_unix() -> &'static str {
    use tokio::signal::unix::SignalKind;

    tokio::select! {
        () = wait_for(SignalKind::terminate(), "SIGTERM") => "SIGTERM",
        () = wait_for(SignalKind::hangup(), "SIGHUP") => "SIGHUP",
        () = wait_for(SignalKind::quit(), "SIGQUIT") => "SIGQUIT",
    }
}

#[cfg(unix)]
async fn wait_for(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(error = %e, signal = name, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
