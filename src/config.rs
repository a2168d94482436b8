use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Multicast group and port every Yeelight bulb listens on for searches
pub const MULTICAST_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1982);

/// Configuration for a discovery cycle
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where the search datagram is sent
    pub multicast_addr: SocketAddr,
    /// Local address the search socket binds to; port 0 lets the OS pick
    pub bind_addr: SocketAddr,
    /// Upper bound on a `Count(n)` wait, in case fewer than `n` bulbs answer
    pub max_wait: Duration,
    /// Receive buffer for a single reply datagram
    pub recv_buffer_size: usize,
    /// Hop limit for the search datagram
    pub multicast_ttl: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_addr: SocketAddr::V4(MULTICAST_ADDR),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            max_wait: Duration::from_secs(5),
            recv_buffer_size: 65536,
            multicast_ttl: 4,
        }
    }
}

impl DiscoveryConfig {
    /// Send the search datagram somewhere other than the standard multicast group
    pub fn with_multicast_addr(mut self, addr: SocketAddr) -> Self {
        self.multicast_addr = addr;
        self
    }

    /// Bind the search socket to a specific interface or port
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Cap how long a `Count(n)` cycle waits for stragglers
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Configuration for a device session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for a single TCP connect attempt
    pub connect_timeout: Duration,
    /// Total connect attempts before the session gives up
    pub connect_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub retry_backoff: Duration,
    /// Ceiling for the doubled retry delay
    pub max_backoff: Duration,
    /// How long to wait for the music listener to report its bound address
    pub music_ready_timeout: Duration,
    /// How long to wait for the bulb to connect back to the music listener
    pub music_accept_timeout: Duration,
    /// Inbound lines longer than this are discarded
    pub max_line_length: usize,
    /// Capacity of the session event broadcast channel
    pub event_capacity: usize,
    /// Runtime the session tasks are spawned on; the ambient runtime when `None`
    pub runtime: Option<tokio::runtime::Handle>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            connect_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            music_ready_timeout: Duration::from_secs(1),
            music_accept_timeout: Duration::from_secs(1),
            max_line_length: 65536,
            event_capacity: 100,
            runtime: None,
        }
    }
}

impl SessionConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of connect attempts; at least one is always made
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_music_accept_timeout(mut self, timeout: Duration) -> Self {
        self.music_accept_timeout = timeout;
        self
    }

    /// Spawn session tasks on the given runtime instead of the ambient one
    pub fn with_runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Spawn a task on the configured runtime
    pub(crate) fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.runtime {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }

    /// Backoff to wait before connect attempt number `attempt` (1-based retries)
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}
