use crate::config::SessionConfig;
use crate::error::{Result, YeelightError};
use crate::subscription::SessionEvent;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// What a socket is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// UDP socket that sends the multicast search
    DiscoverySender,
    /// UDP endpoint on the search socket's port that collects unicast replies
    DiscoveryListener,
    /// Command/notification TCP channel to a bulb
    DevicePrimary,
    /// Send-only TCP channel the bulb opens back to us in music mode
    DeviceMusic,
}

impl Role {
    /// Whether inbound lines on this channel are decoded as protocol messages
    pub fn reads_messages(self) -> bool {
        matches!(self, Self::DevicePrimary)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DiscoverySender => "discovery-sender",
            Self::DiscoveryListener => "discovery-listener",
            Self::DevicePrimary => "primary",
            Self::DeviceMusic => "music",
        };
        f.write_str(name)
    }
}

/// A TCP channel to a bulb with a dedicated writer task
///
/// Outgoing lines are queued and written in order by the writer task. For
/// roles that read messages the read half is handed back to the caller; for
/// the music role the writer task drains the read half itself and exits when
/// the bulb hangs up.
pub(crate) struct Connection {
    role: Role,
    local: SocketAddr,
    remote: SocketAddr,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    cancel: CancellationToken,
    closed: CancellationToken,
}

impl Connection {
    /// Take ownership of a connected stream and start its writer task.
    ///
    /// `parent` cancels this connection along with everything else it governs.
    pub(crate) fn start(
        stream: TcpStream,
        role: Role,
        parent: &CancellationToken,
        events: broadcast::Sender<SessionEvent>,
        config: &SessionConfig,
    ) -> Result<(Self, Option<OwnedReadHalf>)> {
        let local = stream.local_addr()?;
        let remote = stream.peer_addr()?;
        let _ = stream.set_nodelay(true);
        let (read, mut write) = stream.into_split();

        // Create outbound queue and cancellation tokens
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let cancel = parent.child_token();
        let closed = CancellationToken::new();

        let (returned, mut drained) = if role.reads_messages() {
            (Some(read), None)
        } else {
            (None, Some(read))
        };

        // Spawn writer task
        let task_cancel = cancel.clone();
        let task_closed = closed.clone();
        config.spawn(async move {
            let mut scratch = [0u8; 512];
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(line) => {
                            if let Err(e) = write.write_all(&line).await {
                                tracing::error!("Failed to send on {} channel to {}: {}", role, remote, e);
                                let _ = events.send(SessionEvent::SendFailed {
                                    channel: role,
                                    reason: e.to_string(),
                                });
                                break;
                            }
                        }
                        None => break,
                    },
                    read = read_or_pending(&mut drained, &mut scratch) => match read {
                        Ok(0) => {
                            tracing::info!("{} channel closed by {}", role, remote);
                            break;
                        }
                        Ok(n) => tracing::debug!("Ignoring {} bytes on {} channel from {}", n, role, remote),
                        Err(e) => {
                            tracing::warn!("{} channel to {} failed: {}", role, remote, e);
                            break;
                        }
                    },
                }
            }

            let _ = write.shutdown().await;
            task_closed.cancel();
            tracing::debug!("{} channel writer for {} stopped", role, remote);
        });

        Ok((
            Self {
                role,
                local,
                remote,
                tx,
                cancel,
                closed,
            },
            returned,
        ))
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub(crate) fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Queue a line for the writer task
    pub(crate) fn send(&self, line: Vec<u8>) -> Result<()> {
        self.tx.send(line).map_err(|_| YeelightError::SessionClosed)
    }

    /// Stop the writer task and drop the socket
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled once the writer task has exited for any reason
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

async fn read_or_pending(half: &mut Option<OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match half {
        Some(read) => read.read(buf).await,
        None => std::future::pending().await,
    }
}
