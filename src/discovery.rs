use crate::config::DiscoveryConfig;
use crate::connection::Role;
use crate::error::{DiscoveryError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// Search datagram sent to the multicast group
pub const SEARCH_PAYLOAD: &str =
    "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1982\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb";

/// When a discovery cycle stops collecting replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryWaitPolicy {
    /// Stop after this many reply datagrams (duplicates included), or after
    /// the configured `max_wait`, whichever comes first
    Count(usize),
    /// Collect for exactly this long
    Timeout(Duration),
}

/// One raw reply datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReply {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
}

impl AsRef<[u8]> for DiscoveryReply {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Runs multicast discovery cycles
///
/// Each call to [`discover`](Self::discover) sends one search datagram and
/// collects the unicast replies bulbs send back to the search socket's port.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use yeelight_lan::{DiscoveryConfig, DiscoveryEngine, DiscoveryWaitPolicy};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = DiscoveryEngine::new(DiscoveryConfig::default());
///     let replies = engine.discover(DiscoveryWaitPolicy::Timeout(Duration::from_secs(2))).await?;
///     for reply in &replies {
///         println!("{} answered with {} bytes", reply.source, reply.payload.len());
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Send one search and collect replies until `policy` is satisfied
    ///
    /// Returns whatever arrived, possibly nothing. Fails only when the local
    /// socket cannot be set up or the search cannot be sent.
    pub async fn discover(&self, policy: DiscoveryWaitPolicy) -> Result<Vec<DiscoveryReply>> {
        let (target, wait) = match policy {
            DiscoveryWaitPolicy::Count(0) => return Ok(Vec::new()),
            DiscoveryWaitPolicy::Count(n) => (Some(n), self.config.max_wait),
            DiscoveryWaitPolicy::Timeout(t) => (None, t),
        };

        let socket = self.send_search().await?;
        let replies = self.collect(&socket, target, wait).await;

        tracing::info!("Discovery finished with {} replies", replies.len());
        Ok(replies)
    }

    /// Send the search datagram and return the socket it was sent from.
    /// Bulbs answer the search's source port, so replies are read from it too.
    async fn send_search(&self) -> std::result::Result<UdpSocket, DiscoveryError> {
        let socket = UdpSocket::bind(self.config.bind_addr)
            .await
            .map_err(DiscoveryError::ListenFailed)?;
        if let Err(e) = socket.set_multicast_ttl_v4(self.config.multicast_ttl) {
            tracing::warn!("Failed to set multicast TTL: {}", e);
        }

        socket
            .send_to(SEARCH_PAYLOAD.as_bytes(), self.config.multicast_addr)
            .await
            .map_err(DiscoveryError::SendFailed)?;

        let local = match socket.local_addr() {
            Ok(addr) if addr.port() != 0 => addr,
            Ok(_) | Err(_) => return Err(DiscoveryError::LocalPortUnavailable),
        };
        tracing::debug!(
            "{} sent search to {} from {}",
            Role::DiscoverySender,
            self.config.multicast_addr,
            local
        );
        tracing::debug!("{} collecting replies on {}", Role::DiscoveryListener, local);
        Ok(socket)
    }

    async fn collect(&self, socket: &UdpSocket, target: Option<usize>, wait: Duration) -> Vec<DiscoveryReply> {
        let mut replies = Vec::new();
        let mut buf = vec![0u8; self.config.recv_buffer_size.max(1)];
        let deadline = Instant::now() + wait;

        while target.map_or(true, |n| replies.len() < n) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, source))) => {
                    tracing::debug!("Discovery reply of {} bytes from {}", len, source);
                    replies.push(DiscoveryReply {
                        payload: buf[..len].to_vec(),
                        source,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} receive error: {}", Role::DiscoveryListener, e);
                }
                Err(_) => break,
            }
        }

        if let Some(n) = target {
            if replies.len() < n {
                tracing::warn!(
                    "Only {} of {} expected bulbs answered within {:?}",
                    replies.len(),
                    n,
                    wait
                );
            }
        }
        replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_bulbs(replies: usize) -> (SocketAddr, tokio::task::JoinHandle<String>) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            for i in 0..replies {
                let reply = format!("HTTP/1.1 200 OK\r\nid: 0x{:016x}\r\n", i);
                socket.send_to(reply.as_bytes(), from).await.unwrap();
            }
            String::from_utf8_lossy(&buf[..len]).into_owned()
        });
        (addr, handle)
    }

    fn engine(target: SocketAddr) -> DiscoveryEngine {
        DiscoveryEngine::new(
            DiscoveryConfig::default()
                .with_multicast_addr(target)
                .with_bind_addr("127.0.0.1:0".parse().unwrap())
                .with_max_wait(Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn count_policy_stops_early() {
        let (addr, bulbs) = fake_bulbs(3).await;
        let started = Instant::now();

        let replies = engine(addr).discover(DiscoveryWaitPolicy::Count(3)).await.unwrap();
        assert_eq!(replies.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(replies.iter().all(|r| r.source == addr));

        let search = bulbs.await.unwrap();
        assert_eq!(search, SEARCH_PAYLOAD);
    }

    #[tokio::test]
    async fn timeout_policy_waits_full_window() {
        let (addr, _bulbs) = fake_bulbs(0).await;
        let started = Instant::now();

        let replies = engine(addr)
            .discover(DiscoveryWaitPolicy::Timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(replies.is_empty());
        assert!(elapsed >= Duration::from_millis(950), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "returned after {:?}", elapsed);
    }

    #[tokio::test]
    async fn count_policy_is_bounded_by_max_wait() {
        let (addr, _bulbs) = fake_bulbs(1).await;
        let engine = DiscoveryEngine::new(
            engine(addr).config().clone().with_max_wait(Duration::from_millis(300)),
        );

        let replies = engine.discover(DiscoveryWaitPolicy::Count(5)).await.unwrap();
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn replies_arrive_on_the_search_port() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let bulb = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = bulb.local_addr().unwrap();

        let engine = engine(addr);
        let socket = engine.send_search().await.unwrap();
        let local = socket.local_addr().unwrap();

        let mut buf = [0u8; 1024];
        let (len, from) = bulb.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], SEARCH_PAYLOAD.as_bytes());
        assert_eq!(from, local);

        bulb.send_to(b"HTTP/1.1 200 OK\r\n", from).await.unwrap();
        let replies = engine.collect(&socket, Some(1), Duration::from_secs(2)).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].source, addr);
    }

    #[tokio::test]
    async fn unbindable_address_fails_to_listen() {
        let engine = DiscoveryEngine::new(
            DiscoveryConfig::default().with_bind_addr("192.0.2.1:0".parse().unwrap()),
        );
        let err = engine.discover(DiscoveryWaitPolicy::Count(1)).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::YeelightError::Discovery(DiscoveryError::ListenFailed(_))
        ));
    }

    #[tokio::test]
    async fn zero_count_returns_immediately() {
        let replies = DiscoveryEngine::default()
            .discover(DiscoveryWaitPolicy::Count(0))
            .await
            .unwrap();
        assert!(replies.is_empty());
    }
}
