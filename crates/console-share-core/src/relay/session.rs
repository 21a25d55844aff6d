//! One relay session: a client stream paired with an upstream stream.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default grace period for the remaining direction after one side closes.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(500);

const COPY_BUF_SIZE: usize = 16 * 1024;

/// Errors scoped to a single session. Never fatal to the listener.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Relay I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Whether the error is a peer hanging up mid-copy.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::Connect { .. } => false,
        }
    }
}

/// Bytes moved by a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Client to upstream.
    pub to_upstream: u64,
    /// Upstream to client.
    pub to_client: u64,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Upload,
    Download,
}

/// Copy bytes both ways between `client` and `upstream`.
///
/// Both directions run concurrently. When one of them reaches EOF its peer's
/// write side is shut down and the other direction gets `linger` to drain
/// before both streams are dropped. An I/O error in either direction ends
/// the session immediately.
pub async fn pipe<A, B>(client: A, upstream: B, linger: Duration) -> Result<Transfer, SessionError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);
    let sent = AtomicU64::new(0);
    let received = AtomicU64::new(0);

    let upload = copy_counted(&mut client_rd, &mut upstream_wr, &sent);
    let download = copy_counted(&mut upstream_rd, &mut client_wr, &received);
    tokio::pin!(upload);
    tokio::pin!(download);

    let (first, direction) = tokio::select! {
        res = &mut upload => (res, Direction::Upload),
        res = &mut download => (res, Direction::Download),
    };
    first?;
    match direction {
        Direction::Upload => drain(&mut download, linger).await?,
        Direction::Download => drain(&mut upload, linger).await?,
    }

    Ok(Transfer {
        to_upstream: sent.load(Ordering::Relaxed),
        to_client: received.load(Ordering::Relaxed),
    })
}

async fn drain<F>(remaining: F, linger: Duration) -> io::Result<()>
where
    F: Future<Output = io::Result<()>> + Unpin,
{
    tokio::time::timeout(linger, remaining)
        .await
        .unwrap_or(Ok(()))
}

async fn copy_counted<R, W>(reader: &mut R, writer: &mut W, counter: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
    // Propagate EOF; the peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(())
}
