use crate::command::Command;
use crate::config::SessionConfig;
use crate::connection::{Connection, Role};
use crate::error::{MusicChannelError, Result, YeelightError};
use crate::music::MusicHandshake;
use crate::protocol::{self, WireCodec, WireEvent, WireReader};
use crate::subscription::{EventReceiver, SessionEvent};
use crate::types::{DeviceIdentity, DeviceSnapshot, DeviceState, PropertyUpdate};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a device session
///
/// `Setup → Preparing → Ready → (Failed | Cancelled)`, with `Waiting` entered
/// between connect attempts. Commands are only accepted while `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Setup,
    Preparing,
    Waiting,
    Ready,
    Failed,
    Cancelled,
}

impl ConnectionStatus {
    /// `Failed` and `Cancelled` are final; a session in either state is never reused
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

/// A live connection to one bulb
///
/// The session owns the primary TCP channel, a background receive loop that
/// mirrors notifications into the local [`DeviceSnapshot`], and the optional
/// music mode channel. Handles are cheap to clone and share the same session.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use yeelight_lan::{discover, Command, DiscoveryWaitPolicy, Effect};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = discover(DiscoveryWaitPolicy::Timeout(Duration::from_secs(2))).await?;
///     for session in devices.values() {
///         session.send(&Command::set_bright(40, Effect::Smooth, Duration::from_millis(500))?)?;
///         println!("{}: {:?}", session.identity().name, session.state());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

struct MusicSlot {
    generation: u64,
    conn: Connection,
}

struct SessionInner {
    mirror: Mutex<DeviceSnapshot>,
    remote: SocketAddr,
    local: SocketAddr,
    ticket: AtomicU64,
    status: watch::Sender<ConnectionStatus>,
    primary: Connection,
    music: Mutex<Option<MusicSlot>>,
    // Serializes start/stop so only one handshake is in flight
    music_lock: tokio::sync::Mutex<()>,
    music_generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    config: SessionConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceSession {
    /// Open the primary channel to a bulb and start mirroring its state
    ///
    /// Connect attempts are retried with backoff up to
    /// `config.connect_attempts` times. The returned session is `Ready`.
    pub async fn connect(
        identity: DeviceIdentity,
        state: DeviceState,
        port: u16,
        config: SessionConfig,
    ) -> Result<Self> {
        let addr = SocketAddr::new(identity.ip, port);
        let (status, _) = watch::channel(ConnectionStatus::Setup);
        status.send_replace(ConnectionStatus::Preparing);

        let stream = match connect_with_retry(addr, &status, &config).await {
            Ok(stream) => stream,
            Err(e) => {
                status.send_replace(ConnectionStatus::Failed);
                tracing::error!("Giving up on {} at {}: {}", identity.id, addr, e);
                return Err(e);
            }
        };

        // Create event channel and start the primary writer
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shutdown = CancellationToken::new();
        let (primary, read) = Connection::start(stream, Role::DevicePrimary, &shutdown, events.clone(), &config)?;
        let read = read.ok_or(YeelightError::SessionClosed)?;

        tracing::info!(
            "Connected to {} at {} from {}",
            identity.id,
            primary.remote_addr(),
            primary.local_addr()
        );

        let inner = Arc::new(SessionInner {
            remote: primary.remote_addr(),
            local: primary.local_addr(),
            mirror: Mutex::new(DeviceSnapshot { identity, state }),
            ticket: AtomicU64::new(0),
            status,
            primary,
            music: Mutex::new(None),
            music_lock: tokio::sync::Mutex::new(()),
            music_generation: AtomicU64::new(0),
            events,
            shutdown,
            config,
        });
        inner.transition(ConnectionStatus::Ready);

        // Spawn receive loop
        let config = &inner.config;
        config.spawn(receive_loop(
            Arc::downgrade(&inner),
            read,
            inner.shutdown.clone(),
            config.max_line_length,
        ));

        // Watch for the bulb hanging up
        let weak = Arc::downgrade(&inner);
        let closed = inner.primary.closed_token();
        let shutdown = inner.shutdown.clone();
        config.spawn(async move {
            closed.cancelled().await;
            if shutdown.is_cancelled() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.fail("primary channel closed");
            }
        });

        Ok(Self { inner })
    }

    /// Send a command and return the request ticket it was tagged with
    ///
    /// Routed over the music channel while music mode is active, except for the
    /// music-off command itself. The call returns once the line is queued;
    /// write failures arrive as [`SessionEvent::SendFailed`].
    pub fn send(&self, command: &Command) -> Result<u64> {
        self.ensure_ready()?;

        let id = self.inner.ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let line = protocol::encode(id, command.method(), command.params())?;

        if !command.is_music_off() {
            let music = lock(&self.inner.music);
            if let Some(slot) = music.as_ref().filter(|slot| !slot.conn.is_closed()) {
                match slot.conn.send(line.clone()) {
                    Ok(()) => {
                        tracing::trace!(
                            "Sent {} #{} to {} over {} channel",
                            command.method(),
                            id,
                            self.inner.remote,
                            slot.conn.role()
                        );
                        return Ok(id);
                    }
                    Err(_) => {
                        tracing::debug!("Music channel to {} is gone, using primary", self.inner.remote);
                    }
                }
            }
        }

        self.inner.primary.send(line)?;
        tracing::debug!("Sent {} #{} to {}", command.method(), id, self.inner.remote);
        Ok(id)
    }

    /// Switch the bulb into music mode
    ///
    /// Opens a listener on the local side of the primary connection, advertises
    /// it with `set_music` and waits for the bulb to connect back. Returns the
    /// advertised address. On failure the session keeps using the primary
    /// channel.
    pub async fn start_music(&self) -> Result<SocketAddr> {
        let _guard = self.inner.music_lock.lock().await;
        self.ensure_ready()?;
        if self.is_music_active() {
            return Err(MusicChannelError::AlreadyActive.into());
        }

        let inner = &self.inner;
        let config = &inner.config;
        let mut handshake =
            MusicHandshake::spawn(inner.local.ip(), inner.remote.ip(), config.music_accept_timeout, config);
        let advertised = handshake.listening_addr(config.music_ready_timeout).await?;

        self.send(&Command::set_music_on(advertised.ip(), advertised.port()))?;

        let stream = handshake.connection().await?;
        let (conn, _) = Connection::start(stream, Role::DeviceMusic, &inner.shutdown, inner.events.clone(), config)?;

        let generation = inner.music_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let closed = conn.closed_token();
        *lock(&inner.music) = Some(MusicSlot { generation, conn });

        let weak = Arc::downgrade(inner);
        config.spawn(async move {
            closed.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                inner.teardown_music(Some(generation));
            }
        });

        tracing::info!("Music mode active for {} via {}", inner.remote, advertised);
        inner.emit(SessionEvent::MusicMode(true));
        Ok(advertised)
    }

    /// Ask the bulb to leave music mode and drop the music channel
    pub async fn stop_music(&self) -> Result<()> {
        let _guard = self.inner.music_lock.lock().await;
        if !self.is_music_active() {
            return Err(MusicChannelError::NotActive.into());
        }

        let sent = self.send(&Command::set_music_off());
        self.inner.teardown_music(None);
        sent.map(|_| ())
    }

    pub fn is_music_active(&self) -> bool {
        lock(&self.inner.music).is_some()
    }

    pub fn identity(&self) -> DeviceIdentity {
        lock(&self.inner.mirror).identity.clone()
    }

    /// Current mirrored state
    pub fn state(&self) -> DeviceState {
        lock(&self.inner.mirror).state.clone()
    }

    /// Identity and state read under one lock
    pub fn snapshot(&self) -> DeviceSnapshot {
        lock(&self.inner.mirror).clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Watch lifecycle transitions
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to results, errors and state changes from this bulb
    ///
    /// The stream ends with [`SessionEvent::Closed`]. Subscribing to a session
    /// that has already ended yields a receiver that is finished.
    pub fn subscribe(&self) -> EventReceiver {
        let rx = self.inner.events.subscribe();
        EventReceiver::new(rx, self.status().is_terminal())
    }

    /// Shut the session down. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.finish(ConnectionStatus::Cancelled) {
            tracing::info!("Closed session with {}", self.inner.remote);
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.status() == ConnectionStatus::Ready {
            Ok(())
        } else {
            Err(YeelightError::SessionClosed)
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("remote", &self.inner.remote)
            .field("status", &self.status())
            .field("music", &self.is_music_active())
            .finish()
    }
}

impl SessionInner {
    /// Move to `next` unless already terminal; returns whether anything changed
    fn transition(&self, next: ConnectionStatus) -> bool {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            tracing::debug!("Session with {}: {:?} -> {:?}", self.remote, current, next);
            *current = next;
            true
        })
    }

    fn fail(&self, reason: &str) {
        if self.finish(ConnectionStatus::Failed) {
            tracing::error!("Session with {} failed: {}", self.remote, reason);
        }
    }

    /// Enter a terminal status, stop every task and tell subscribers.
    /// Returns false if the session had already ended.
    fn finish(&self, status: ConnectionStatus) -> bool {
        let changed = self.transition(status);
        self.shutdown.cancel();
        self.teardown_music(None);
        if changed {
            self.emit(SessionEvent::Closed(status));
        }
        changed
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Drop the music channel. With `Some(generation)` only that channel is
    /// torn down, so a stale watcher cannot close a newer one.
    fn teardown_music(&self, generation: Option<u64>) -> bool {
        let slot = {
            let mut music = lock(&self.music);
            let matches = match (music.as_ref(), generation) {
                (None, _) => false,
                (Some(slot), Some(g)) => slot.generation == g,
                (Some(_), None) => true,
            };
            if !matches {
                return false;
            }
            music.take()
        };

        match slot {
            Some(slot) => {
                slot.conn.close();
                tracing::info!("Music mode ended for {}", self.remote);
                self.emit(SessionEvent::MusicMode(false));
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, event: WireEvent) {
        match event {
            WireEvent::Result { id, values } => {
                tracing::debug!("Result from {} for #{:?}: {:?}", self.remote, id, values);
                self.emit(SessionEvent::Result { id, values });
            }
            WireEvent::Error(err) => {
                tracing::warn!("{} rejected request #{:?}: {}", self.remote, err.id, err);
                self.emit(SessionEvent::Error(err));
            }
            WireEvent::Notification(props) => {
                let updates = PropertyUpdate::parse_all(&props);
                let ignored = lock(&self.mirror).apply(&updates);
                for update in &ignored {
                    if let PropertyUpdate::Unknown { key, value } = update {
                        tracing::debug!("Ignoring property {}={} from {}", key, value, self.remote);
                    }
                }

                let music_off = updates.contains(&PropertyUpdate::MusicMode(false));
                let applied: Vec<_> = updates
                    .into_iter()
                    .filter(|u| !matches!(u, PropertyUpdate::Unknown { .. }))
                    .collect();
                if !applied.is_empty() {
                    self.emit(SessionEvent::StateChanged(applied));
                }

                if music_off && self.teardown_music(None) {
                    tracing::info!("{} left music mode", self.remote);
                }
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn connect_with_retry(
    addr: SocketAddr,
    status: &watch::Sender<ConnectionStatus>,
    config: &SessionConfig,
) -> Result<TcpStream> {
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => YeelightError::Connection(e),
            Err(_) => YeelightError::ConnectTimeout,
        };
        if attempt >= attempts {
            return Err(err);
        }

        let delay = config.backoff_for(attempt);
        tracing::warn!(
            "Connect attempt {}/{} to {} failed: {}, retrying in {:?}",
            attempt,
            attempts,
            addr,
            err,
            delay
        );
        status.send_replace(ConnectionStatus::Waiting);
        tokio::time::sleep(delay).await;
        status.send_replace(ConnectionStatus::Preparing);
    }
}

async fn receive_loop(
    session: Weak<SessionInner>,
    read: OwnedReadHalf,
    shutdown: CancellationToken,
    max_line_length: usize,
) {
    let mut lines = WireReader::new(read, WireCodec::new(max_line_length));

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next() => next,
        };
        let Some(inner) = session.upgrade() else {
            break;
        };

        match next {
            Some(Ok(Ok(event))) => inner.dispatch(event),
            Some(Ok(Err(e))) => {
                tracing::warn!("Dropping undecodable line from {}: {}", inner.remote, e);
            }
            // Buffered bytes survive in the reader, so the next read resumes mid-line
            Some(Err(e)) if e.kind() == io::ErrorKind::Interrupted && !shutdown.is_cancelled() => {
                tracing::warn!("Read from {} interrupted, continuing", inner.remote);
            }
            Some(Err(e)) => {
                if !shutdown.is_cancelled() {
                    inner.fail(&e.to_string());
                }
                break;
            }
            None => {
                if !shutdown.is_cancelled() {
                    inner.fail("connection closed by device");
                }
                break;
            }
        }
    }

    tracing::debug!("Receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorMode, Effect};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            id: "0x000000000015243f".to_string(),
            ip: "127.0.0.1".parse().unwrap(),
            model: "color".to_string(),
            support: "get_prop set_power set_bright set_hsv set_music".to_string(),
            fw_ver: Some("18".to_string()),
            name: "desk".to_string(),
        }
    }

    async fn connected() -> (DeviceSession, TcpStream) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (session, accepted) = tokio::join!(
            DeviceSession::connect(identity(), DeviceState::default(), port, SessionConfig::default()),
            listener.accept()
        );
        (session.unwrap(), accepted.unwrap().0)
    }

    async fn next_event(events: &mut EventReceiver) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn later_notification_keeps_earlier_fields() {
        let (session, mut bulb) = connected().await;
        assert_eq!(session.status(), ConnectionStatus::Ready);
        let mut events = session.subscribe();

        bulb.write_all(b"{\"method\":\"props\",\"params\":{\"power\":\"off\",\"bright\":\"40\"}}\r\n")
            .await
            .unwrap();
        bulb.write_all(b"{\"method\":\"props\",\"params\":{\"power\":\"on\"}}\r\n")
            .await
            .unwrap();

        assert!(matches!(next_event(&mut events).await, SessionEvent::StateChanged(_)));
        match next_event(&mut events).await {
            SessionEvent::StateChanged(updates) => assert_eq!(updates, vec![PropertyUpdate::Power(true)]),
            other => panic!("unexpected event {:?}", other),
        }

        let state = session.state();
        assert!(state.power);
        assert_eq!(state.brightness, 40);
        assert_eq!(state.color_mode, ColorMode::Rgb);
    }

    #[tokio::test]
    async fn surfaces_results_errors_and_survives_garbage() {
        let (session, bulb) = connected().await;
        let mut events = session.subscribe();
        let (read, mut write) = bulb.into_split();
        let mut lines = BufReader::new(read).lines();

        let ticket = session.send(&Command::toggle()).unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(request["id"], ticket);
        assert_eq!(request["method"], "toggle");

        write.write_all(b"this is not json\r\n").await.unwrap();
        write
            .write_all(format!("{{\"id\":{},\"result\":[\"ok\"]}}\r\n", ticket).as_bytes())
            .await
            .unwrap();
        write
            .write_all(b"{\"id\":9,\"error\":{\"code\":-1,\"message\":\"method not supported\"}}\r\n")
            .await
            .unwrap();

        match next_event(&mut events).await {
            SessionEvent::Result { id, values } => {
                assert_eq!(id, Some(ticket));
                assert_eq!(values, vec!["ok".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut events).await {
            SessionEvent::Error(err) => assert_eq!(err.code, -1),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.status(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn tickets_increase() {
        let (session, _bulb) = connected().await;
        let first = session.send(&Command::toggle()).unwrap();
        let second = session.send(&Command::toggle()).unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn music_mode_routes_and_tears_down_on_notification() {
        let (session, bulb) = connected().await;
        let (read, mut write) = bulb.into_split();
        let mut primary = BufReader::new(read).lines();

        let bulb_side = async {
            let line = primary.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["method"], "set_music");
            assert_eq!(request["params"][0], 1);
            let host = request["params"][1].as_str().unwrap().to_string();
            let port = request["params"][2].as_u64().unwrap() as u16;
            TcpStream::connect((host.as_str(), port)).await.unwrap()
        };
        let (started, music) = tokio::join!(session.start_music(), bulb_side);
        started.unwrap();
        assert!(session.is_music_active());
        let mut music = BufReader::new(music).lines();

        let hsv = Command::set_hsv(300, 70, Effect::Smooth, Duration::from_millis(300)).unwrap();
        let ticket = session.send(&hsv).unwrap();
        let line = music.next_line().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(request["method"], "set_hsv");
        assert_eq!(request["id"], ticket);

        write
            .write_all(b"{\"method\":\"props\",\"params\":{\"music_on\":0}}\r\n")
            .await
            .unwrap();
        let eof = tokio::time::timeout(Duration::from_secs(2), music.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());
        assert!(!session.is_music_active());
        assert_eq!(session.state().music_mode, Some(false));

        session
            .send(&Command::set_bright(10, Effect::Sudden, Duration::from_millis(30)).unwrap())
            .unwrap();
        let line = primary.next_line().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(request["method"], "set_bright");
    }

    #[tokio::test]
    async fn music_handshake_times_out_without_bulb() {
        let (session, _bulb) = connected().await;
        let err = session.start_music().await.unwrap_err();
        assert!(matches!(
            err,
            YeelightError::MusicChannel(MusicChannelError::NoConnectionEstablished)
        ));
        assert!(!session.is_music_active());
        assert_eq!(session.status(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn stop_music_requires_active_channel() {
        let (session, _bulb) = connected().await;
        let err = session.stop_music().await.unwrap_err();
        assert!(matches!(err, YeelightError::MusicChannel(MusicChannelError::NotActive)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_sends() {
        let (session, _bulb) = connected().await;
        let mut status = session.watch_status();

        session.close();
        session.close();
        assert_eq!(session.status(), ConnectionStatus::Cancelled);
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Cancelled);
        assert!(matches!(
            session.send(&Command::toggle()),
            Err(YeelightError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn device_hangup_marks_session_failed() {
        let (session, bulb) = connected().await;
        let mut status = session.watch_status();
        drop(bulb);

        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == ConnectionStatus::Failed))
            .await
            .unwrap()
            .unwrap();
        session.close();
        assert_eq!(session.status(), ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn subscribers_see_close() {
        let (session, _bulb) = connected().await;
        let mut events = session.subscribe();

        session.close();
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Closed(ConnectionStatus::Cancelled)
        ));
        let after = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(after, Err(YeelightError::SessionClosed)));

        let mut late = session.subscribe();
        assert!(matches!(late.recv().await, Err(YeelightError::SessionClosed)));
    }

    #[tokio::test]
    async fn subscribers_see_device_hangup() {
        let (session, bulb) = connected().await;
        let mut events = session.subscribe();
        drop(bulb);

        loop {
            match next_event(&mut events).await {
                SessionEvent::Closed(status) => {
                    assert_eq!(status, ConnectionStatus::Failed);
                    break;
                }
                SessionEvent::SendFailed { .. } => continue,
                other => panic!("unexpected event {:?}", other),
            }
        }
        let after = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(after, Err(YeelightError::SessionClosed)));
    }

    #[tokio::test]
    async fn connect_gives_up_after_configured_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SessionConfig {
            retry_backoff: Duration::from_millis(10),
            ..SessionConfig::default()
        }
        .with_connect_attempts(2)
        .with_connect_timeout(Duration::from_millis(500));

        let result = DeviceSession::connect(identity(), DeviceState::default(), port, config).await;
        assert!(matches!(
            result,
            Err(YeelightError::Connection(_)) | Err(YeelightError::ConnectTimeout)
        ));
    }
}
