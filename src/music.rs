use crate::config::SessionConfig;
use crate::error::MusicChannelError;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// The listening half of a music mode handshake
///
/// The handshake runs in two phases, each signalled through its own oneshot:
/// the listener first reports the address it bound (so it can be advertised
/// with `set_music`), then reports the verified connection the bulb opened
/// back to it. Both waits are bounded.
pub(crate) struct MusicHandshake {
    ready_rx: oneshot::Receiver<io::Result<SocketAddr>>,
    accepted_rx: oneshot::Receiver<Result<TcpStream, MusicChannelError>>,
}

impl MusicHandshake {
    /// Bind a listener on `bind_ip` and wait up to `accept_timeout` for a
    /// connection whose source address is `expected_peer`
    pub(crate) fn spawn(
        bind_ip: IpAddr,
        expected_peer: IpAddr,
        accept_timeout: Duration,
        config: &SessionConfig,
    ) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (accepted_tx, accepted_rx) = oneshot::channel();

        config.spawn(async move {
            let listener = match TcpListener::bind(SocketAddr::new(bind_ip, 0)).await {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let local = match listener.local_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::debug!("Music listener ready on {}", local);
            if ready_tx.send(Ok(local)).is_err() {
                return;
            }

            let result = match timeout(accept_timeout, accept_from(&listener, expected_peer)).await {
                Ok(stream) => Ok(stream),
                Err(_) => {
                    tracing::warn!(
                        "No music connection from {} within {:?}, closing listener on {}",
                        expected_peer,
                        accept_timeout,
                        local
                    );
                    Err(MusicChannelError::NoConnectionEstablished)
                }
            };
            let _ = accepted_tx.send(result);
        });

        Self {
            ready_rx,
            accepted_rx,
        }
    }

    /// Wait for the listener to report the address it is bound to
    pub(crate) async fn listening_addr(&mut self, wait: Duration) -> Result<SocketAddr, MusicChannelError> {
        match timeout(wait, &mut self.ready_rx).await {
            Ok(Ok(Ok(addr))) => Ok(addr),
            Ok(Ok(Err(e))) => Err(MusicChannelError::ListenFailed(e)),
            Ok(Err(_)) | Err(_) => Err(MusicChannelError::ListenerNotReady),
        }
    }

    /// Wait for the bulb's verified connection
    pub(crate) async fn connection(self) -> Result<TcpStream, MusicChannelError> {
        self.accepted_rx
            .await
            .unwrap_or(Err(MusicChannelError::NoConnectionEstablished))
    }
}

/// Accept until a connection arrives from `expected`; others are dropped
async fn accept_from(listener: &TcpListener, expected: IpAddr) -> TcpStream {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) if peer.ip() == expected => {
                tracing::debug!("Accepted music connection from {}", peer);
                return stream;
            }
            Ok((_, peer)) => {
                tracing::warn!("Rejecting music connection from unexpected address {}", peer);
            }
            Err(e) => {
                tracing::warn!("Music listener accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn hands_over_matching_connection() {
        let mut handshake =
            MusicHandshake::spawn(LOCALHOST, LOCALHOST, Duration::from_secs(2), &SessionConfig::default());
        let addr = handshake.listening_addr(Duration::from_secs(1)).await.unwrap();
        assert_eq!(addr.ip(), LOCALHOST);
        assert_ne!(addr.port(), 0);

        let bulb = TcpStream::connect(addr).await.unwrap();
        let accepted = handshake.connection().await.unwrap();
        assert_eq!(accepted.peer_addr().unwrap(), bulb.local_addr().unwrap());
    }

    #[tokio::test]
    async fn times_out_without_connection() {
        let mut handshake =
            MusicHandshake::spawn(LOCALHOST, LOCALHOST, Duration::from_millis(100), &SessionConfig::default());
        handshake.listening_addr(Duration::from_secs(1)).await.unwrap();

        let started = tokio::time::Instant::now();
        let err = handshake.connection().await.unwrap_err();
        assert!(matches!(err, MusicChannelError::NoConnectionEstablished));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn ignores_connections_from_other_hosts() {
        // The "bulb" is somewhere else, so a local connection must be refused
        let bulb_ip: IpAddr = "192.0.2.10".parse().unwrap();
        let mut handshake =
            MusicHandshake::spawn(LOCALHOST, bulb_ip, Duration::from_millis(200), &SessionConfig::default());
        let addr = handshake.listening_addr(Duration::from_secs(1)).await.unwrap();

        let _intruder = TcpStream::connect(addr).await.unwrap();
        let err = handshake.connection().await.unwrap_err();
        assert!(matches!(err, MusicChannelError::NoConnectionEstablished));
    }
}
