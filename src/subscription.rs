use crate::connection::Role;
use crate::error::{ProtocolError, Result, YeelightError};
use crate::session::ConnectionStatus;
use crate::types::PropertyUpdate;
use tokio::sync::broadcast;

/// Event observed on a device session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The bulb acknowledged a command or answered a query.
    ///
    /// `id` echoes the request ticket, but nothing matches it to an outstanding
    /// send; correlate on top of this if you need request/response semantics.
    Result { id: Option<u64>, values: Vec<String> },

    /// The bulb replied with an error object. The connection is unaffected.
    Error(ProtocolError),

    /// A notification was applied to the state mirror
    StateChanged(Vec<PropertyUpdate>),

    /// Music mode was switched on or off locally
    MusicMode(bool),

    /// Writing a command failed
    SendFailed { channel: Role, reason: String },

    /// The session reached a terminal status. Always the last event.
    Closed(ConnectionStatus),
}

/// Receiver for session events
///
/// Once [`SessionEvent::Closed`] has been delivered, every further call
/// returns `SessionClosed`.
pub struct EventReceiver {
    rx: broadcast::Receiver<SessionEvent>,
    finished: bool,
}

impl EventReceiver {
    /// `finished` marks a receiver created after the session already ended
    pub(crate) fn new(rx: broadcast::Receiver<SessionEvent>, finished: bool) -> Self {
        Self { rx, finished }
    }

    /// Receive the next event
    ///
    /// Returns `SessionClosed` after the `Closed` event, or once every sender
    /// is gone and the buffered events have been read.
    pub async fn recv(&mut self) -> Result<SessionEvent> {
        if self.finished {
            return Err(YeelightError::SessionClosed);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(self.observe(event)),
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return Err(YeelightError::SessionClosed);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Session event receiver lagged by {} events", n);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>> {
        if self.finished {
            return Err(YeelightError::SessionClosed);
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Ok(Some(self.observe(event))),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.finished = true;
                    return Err(YeelightError::SessionClosed);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Session event receiver lagged by {} events", n);
                }
            }
        }
    }

    fn observe(&mut self, event: SessionEvent) -> SessionEvent {
        if matches!(event, SessionEvent::Closed(_)) {
            self.finished = true;
        }
        event
    }
}
