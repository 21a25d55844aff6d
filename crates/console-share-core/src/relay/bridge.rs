//! TCP listener side of the relay.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::connector::Connector;
use super::session::{DEFAULT_LINGER, SessionError, Transfer, pipe};
use crate::error::{Error, Result};

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound TCP listener relaying every client to a [`Connector`].
pub struct RelayBridge<C: Connector> {
    listener: TcpListener,
    connector: Arc<C>,
    linger: Duration,
}

impl<C: Connector> RelayBridge<C> {
    /// Bind `addr`. Failure is reported as [`Error::Bind`].
    pub async fn bind(addr: SocketAddr, connector: C) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        Ok(Self::from_listener(listener, connector))
    }

    /// Bind the first free port in `[start, start + span)` on `ip`.
    pub async fn bind_in_range(ip: IpAddr, start: u16, span: u16, connector: C) -> Result<Self> {
        let end = u32::from(start) + u32::from(span.max(1));
        for port in u32::from(start)..end.min(u32::from(u16::MAX) + 1) {
            let Ok(port) = u16::try_from(port) else {
                break;
            };
            let addr = SocketAddr::new(ip, port);
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(Self::from_listener(listener, connector)),
                Err(e) => debug!(%addr, error = %e, "Port unavailable, trying next"),
            }
        }
        Err(Error::NoFreePort { start, end })
    }

    pub fn from_listener(listener: TcpListener, connector: C) -> Self {
        Self {
            listener,
            connector: Arc::new(connector),
            linger: DEFAULT_LINGER,
        }
    }

    #[must_use]
    pub const fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients forever, one spawned task per session.
    pub async fn serve(self) {
        let upstream = self.connector.describe();
        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, %upstream, "Relay listening"),
            Err(e) => warn!(error = %e, %upstream, "Relay listening on unknown address"),
        }

        let mut next_session: u64 = 0;
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    next_session += 1;
                    let session = next_session;
                    let connector = Arc::clone(&self.connector);
                    let linger = self.linger;
                    tokio::spawn(async move {
                        handle_client(session, stream, peer, connector.as_ref(), linger).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Relay listener accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_client<C: Connector>(
    session: u64,
    stream: TcpStream,
    peer: SocketAddr,
    connector: &C,
    linger: Duration,
) {
    info!(session, %peer, "Client connected");
    match relay_client(stream, connector, linger).await {
        Ok(transfer) => info!(
            session,
            %peer,
            to_upstream = transfer.to_upstream,
            to_client = transfer.to_client,
            "Session closed"
        ),
        Err(e) if e.is_disconnect() => debug!(session, %peer, error = %e, "Session ended by peer"),
        Err(e) => warn!(session, %peer, error = %e, "Session failed"),
    }
}

async fn relay_client<C: Connector>(
    stream: TcpStream,
    connector: &C,
    linger: Duration,
) -> std::result::Result<Transfer, SessionError> {
    let upstream = connector
        .connect()
        .await
        .map_err(|source| SessionError::Connect {
            target: connector.describe(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    pipe(stream, upstream, linger).await
}
