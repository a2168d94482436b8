use thiserror::Error;

/// Result type for Yeelight operations
pub type Result<T> = std::result::Result<T, YeelightError>;

/// Errors that can occur when discovering or controlling Yeelight bulbs
#[derive(Error, Debug)]
pub enum YeelightError {
    /// A command parameter was outside the range the bulb accepts; nothing was sent
    #[error("Invalid command parameter: {0}")]
    Validation(#[from] ValidationError),

    /// A command could not be serialized
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An inbound payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The bulb answered with an error object
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport-level failure
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Connecting to the bulb did not complete in time
    #[error("Connection attempt timed out")]
    ConnectTimeout,

    /// Local networking setup failed during discovery
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Music mode channel could not be established or torn down
    #[error("Music channel error: {0}")]
    MusicChannel(#[from] MusicChannelError),

    /// A discovery reply lacked a required header
    #[error("Discovery reply is missing required key: {key}")]
    PropertyKey {
        /// Name of the first missing key
        key: &'static str,
    },

    /// The session has been closed or its connection has failed
    #[error("Session closed")]
    SessionClosed,
}

/// A parameter violated the bulb's documented bounds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `value` is below the lowest value `field` accepts
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        field: &'static str,
        min: i64,
        value: i64,
    },

    /// `value` is above the highest value `field` accepts
    #[error("{field} must be at most {max}, got {value}")]
    AboveMaximum {
        field: &'static str,
        max: i64,
        value: i64,
    },

    /// A finite color flow must run at least once through every supplied state
    #[error("repeat count {count} is less than the {states} flow states supplied")]
    InsufficientRepeatCount { count: usize, states: usize },

    /// A color flow needs at least one state
    #[error("color flow has no states")]
    EmptyFlow,
}

/// An inbound line was not a result, error or notification envelope
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The line did not parse as JSON
    #[error("payload is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// A recognised envelope lacked one of its keys, e.g. `params` on a notification
    #[error("payload is missing expected key: {0}")]
    MissingExpectedKeys(&'static str),

    /// Valid JSON that is none of the three envelope kinds
    #[error("payload has an unknown shape")]
    UnknownShape,
}

/// Error object returned by the bulb
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Device error {code}: {message}")]
pub struct ProtocolError {
    /// Request ticket echoed back by the bulb, when present
    pub id: Option<u64>,
    /// Numeric error code, e.g. `-1`
    pub code: i64,
    /// Human readable reason supplied by the bulb
    pub message: String,
}

/// Local networking failures during a discovery cycle
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The search datagram could not be sent
    #[error("failed to send search datagram: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The search socket has no usable local port for replies to reach
    #[error("local port of the search socket is unavailable")]
    LocalPortUnavailable,

    /// The search socket could not be bound
    #[error("failed to open reply listener: {0}")]
    ListenFailed(#[source] std::io::Error),
}

/// Failures while opening or closing the music mode channel
#[derive(Error, Debug)]
pub enum MusicChannelError {
    /// The local TCP listener could not be bound
    #[error("failed to open music listener: {0}")]
    ListenFailed(#[source] std::io::Error),

    #[error("music listener did not report its address in time")]
    ListenerNotReady,

    /// The bulb accepted `set_music` but never opened the channel
    #[error("the bulb did not connect back to the music listener")]
    NoConnectionEstablished,

    #[error("music mode is already active")]
    AlreadyActive,

    #[error("music mode is not active")]
    NotActive,
}
