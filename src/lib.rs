//! Rust library for discovering and controlling Yeelight smart bulbs on the local network
//!
//! This library provides an async API for the Yeelight LAN protocol. It supports:
//!
//! - Multicast discovery with count or timeout based collection
//! - One persistent TCP session per bulb with a live state mirror
//! - Validated commands for power, brightness, color, scenes and color flows
//! - Music mode, where the bulb connects back for unacknowledged high-rate commands
//! - Event subscriptions for results, errors and state changes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use yeelight_lan::{discover, Command, DiscoveryWaitPolicy, Effect, Power};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = discover(DiscoveryWaitPolicy::Timeout(Duration::from_secs(3))).await?;
//!
//!     for (id, session) in &devices {
//!         println!("Found {} ({})", id, session.identity().model);
//!         session.send(&Command::set_power(Power::On, Effect::Smooth, Duration::from_millis(500))?)?;
//!
//!         let mut events = session.subscribe();
//!         if let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     }
//!
//!     for session in devices.values() {
//!         session.close();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If a bulb's address is already known, a session can be opened without discovery:
//!
//! ```no_run
//! use yeelight_lan::{DeviceIdentity, DeviceSession, DeviceState, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let identity = DeviceIdentity {
//!         id: "0x000000000015243f".to_string(),
//!         ip: "192.168.1.239".parse()?,
//!         model: "color".to_string(),
//!         support: "get_prop set_power set_music".to_string(),
//!         fw_ver: None,
//!         name: String::new(),
//!     };
//!     let session = DeviceSession::connect(identity, DeviceState::default(), 55443, SessionConfig::default()).await?;
//!     session.start_music().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: one multicast search per cycle, replies collected on the search port
//! - **Registry**: parses replies and keeps one session per device ID
//! - **Session**: primary channel, receive loop, state mirror and music channel
//! - **Protocol**: line framing and JSON envelopes
//! - **Command**: validated method/parameter construction

mod command;
mod config;
mod connection;
mod discovery;
mod error;
mod music;
mod protocol;
mod registry;
mod session;
mod subscription;
mod types;

use std::collections::BTreeMap;

// Public exports
pub use command::{ColorFlow, Command, FlowAction, FlowCount, FlowStep, Scene};
pub use config::{DiscoveryConfig, SessionConfig, MULTICAST_ADDR};
pub use connection::Role;
pub use discovery::{DiscoveryEngine, DiscoveryReply, DiscoveryWaitPolicy, SEARCH_PAYLOAD};
pub use error::{
    DecodeError, DiscoveryError, MusicChannelError, ProtocolError, Result, ValidationError, YeelightError,
};
pub use protocol::{decode, encode, WireCodec, WireEvent, WireReader};
pub use registry::{parse_reply, DeviceRegistry, REQUIRED_KEYS};
pub use session::{ConnectionStatus, DeviceSession};
pub use subscription::{EventReceiver, SessionEvent};
pub use types::{
    ColorMode, DeviceId, DeviceIdentity, DeviceSnapshot, DeviceState, Effect, Power, PropertyBag,
    PropertyUpdate,
};

/// Discover bulbs with default settings and connect to each one
///
/// Bulbs whose reply is incomplete or that refuse the connection are skipped.
pub async fn discover(policy: DiscoveryWaitPolicy) -> Result<BTreeMap<DeviceId, DeviceSession>> {
    let mut registry = DeviceRegistry::new();
    registry.discover(policy).await?;
    Ok(registry.into_devices())
}
