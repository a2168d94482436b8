use crate::config::{DiscoveryConfig, SessionConfig};
use crate::discovery::{DiscoveryEngine, DiscoveryWaitPolicy};
use crate::error::{DecodeError, Result, YeelightError};
use crate::session::DeviceSession;
use crate::types::{DeviceId, DeviceIdentity, DeviceState, PropertyBag};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

/// Keys a discovery reply must carry for the bulb to be accepted
pub const REQUIRED_KEYS: [&str; 13] = [
    "ip",
    "port",
    "id",
    "power",
    "bright",
    "color_mode",
    "ct",
    "rgb",
    "hue",
    "sat",
    "name",
    "model",
    "support",
];

const LOCATION_SCHEME: &str = "yeelight://";

/// Parse a discovery reply into a property bag
///
/// The reply is an HTTP style header block. The `Location` header is split
/// into `ip` and `port`; every other line is split on its first `": "`, and
/// lines without one are dropped. Fails if any of [`REQUIRED_KEYS`] is absent.
pub fn parse_reply(payload: &[u8]) -> Result<PropertyBag> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;

    let mut props = PropertyBag::new();
    for line in text.split("\r\n").skip(1).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once(": ") else {
            tracing::trace!("Dropping unsplittable reply line {:?}", line);
            continue;
        };

        if key.eq_ignore_ascii_case("location") {
            let Some((ip, port)) = value
                .strip_prefix(LOCATION_SCHEME)
                .and_then(|addr| addr.rsplit_once(':'))
            else {
                tracing::debug!("Unrecognised location {:?}", value);
                continue;
            };
            props.insert("ip".to_string(), ip.to_string());
            props.insert("port".to_string(), port.to_string());
        } else {
            props.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(key) = REQUIRED_KEYS.iter().find(|k| !props.contains_key(**k)) {
        return Err(YeelightError::PropertyKey { key: *key });
    }
    Ok(props)
}

fn identity_from(props: &PropertyBag) -> Option<(DeviceIdentity, u16)> {
    let get = |key: &str| props.get(key).cloned().unwrap_or_default();
    let ip: IpAddr = props.get("ip")?.parse().ok()?;
    let port: u16 = props.get("port")?.parse().ok()?;

    Some((
        DeviceIdentity {
            id: get("id"),
            ip,
            model: get("model"),
            support: get("support"),
            fw_ver: props.get("fw_ver").cloned(),
            name: get("name"),
        },
        port,
    ))
}

/// Set of connected bulbs keyed by device ID
///
/// Discovery results are merged by ID: a bulb that already has a live session
/// is left alone, one whose session has failed or been closed is reconnected.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use yeelight_lan::{DeviceRegistry, DiscoveryWaitPolicy};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut registry = DeviceRegistry::new();
///     registry.discover(DiscoveryWaitPolicy::Count(2)).await?;
///
///     for (id, session) in registry.devices() {
///         println!("{} -> {}", id, session.identity().name);
///     }
///
///     registry.close_all();
///     Ok(())
/// }
/// ```
pub struct DeviceRegistry {
    engine: DiscoveryEngine,
    session_config: SessionConfig,
    devices: BTreeMap<DeviceId, DeviceSession>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default(), SessionConfig::default())
    }

    pub fn with_config(discovery: DiscoveryConfig, session: SessionConfig) -> Self {
        Self {
            engine: DiscoveryEngine::new(discovery),
            session_config: session,
            devices: BTreeMap::new(),
        }
    }

    /// Run one discovery cycle and ingest the replies
    pub async fn discover(&mut self, policy: DiscoveryWaitPolicy) -> Result<Vec<DeviceId>> {
        let replies = self.engine.discover(policy).await?;
        Ok(self.ingest(&replies).await)
    }

    /// Parse raw replies and open sessions to bulbs not yet connected
    ///
    /// Bad replies are logged and skipped. Within one batch the first reply
    /// for an ID wins. Returns the IDs of the sessions that were opened.
    pub async fn ingest<I, B>(&mut self, replies: I) -> Vec<DeviceId>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for reply in replies {
            let props = match parse_reply(reply.as_ref()) {
                Ok(props) => props,
                Err(e) => {
                    tracing::warn!("Skipping discovery reply: {}", e);
                    continue;
                }
            };
            let Some((identity, port)) = identity_from(&props) else {
                tracing::warn!(
                    "Skipping discovery reply with unusable address {:?}:{:?}",
                    props.get("ip"),
                    props.get("port")
                );
                continue;
            };

            if !seen.insert(identity.id.clone()) {
                tracing::debug!("Ignoring duplicate reply from {}", identity.id);
                continue;
            }
            if let Some(existing) = self.devices.get(&identity.id) {
                if !existing.status().is_terminal() {
                    tracing::debug!("{} already connected", identity.id);
                    continue;
                }
                tracing::info!("Reconnecting {} after {:?}", identity.id, existing.status());
            }

            let state = DeviceState::from_properties(&props);
            pending.push((identity, state, port));
        }

        let config = &self.session_config;
        let attempts = pending.into_iter().map(|(identity, state, port)| async move {
            let id = identity.id.clone();
            (id, DeviceSession::connect(identity, state, port, config.clone()).await)
        });

        let mut added = Vec::new();
        for (id, result) in join_all(attempts).await {
            match result {
                Ok(session) => {
                    tracing::info!("Added {}", session.identity());
                    if let Some(old) = self.devices.insert(id.clone(), session) {
                        old.close();
                    }
                    added.push(id);
                }
                Err(e) => tracing::warn!("Failed to connect to {}: {}", id, e),
            }
        }
        added
    }

    pub fn get(&self, id: &str) -> Option<&DeviceSession> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> &BTreeMap<DeviceId, DeviceSession> {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Remove a bulb without closing its session
    pub fn remove(&mut self, id: &str) -> Option<DeviceSession> {
        self.devices.remove(id)
    }

    /// Close every session and forget all bulbs
    pub fn close_all(&mut self) {
        for session in self.devices.values() {
            session.close();
        }
        self.devices.clear();
    }

    pub fn into_devices(self) -> BTreeMap<DeviceId, DeviceSession> {
        self.devices
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionStatus;
    use tokio::net::TcpListener;

    fn reply(id: &str, ip: &str, port: u16, support: Option<&str>) -> Vec<u8> {
        let mut text = format!(
            "HTTP/1.1 200 OK\r\n\
             Cache-Control: max-age=3600\r\n\
             Date: \r\n\
             Ext: \r\n\
             Location: yeelight://{}:{}\r\n\
             Server: POSIX UPnP/1.0 YGLC/1\r\n\
             id: {}\r\n\
             model: color\r\n\
             fw_ver: 18\r\n",
            ip, port, id
        );
        if let Some(support) = support {
            text.push_str(&format!("support: {}\r\n", support));
        }
        text.push_str(
            "power: on\r\nbright: 100\r\ncolor_mode: 2\r\nct: 4000\r\nrgb: 16711680\r\nhue: 100\r\nsat: 35\r\nname: desk\r\n",
        );
        text.into_bytes()
    }

    async fn fake_bulb() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        port
    }

    #[test]
    fn parses_location_and_headers() {
        let props = parse_reply(&reply("0x1", "192.168.1.239", 55443, Some("get_prop set_power"))).unwrap();
        assert_eq!(props["ip"], "192.168.1.239");
        assert_eq!(props["port"], "55443");
        assert_eq!(props["support"], "get_prop set_power");
        assert_eq!(props["fw_ver"], "18");
        assert_eq!(props["Date"], "");
        assert!(!props.contains_key("HTTP/1.1 200 OK"));
    }

    #[test]
    fn drops_lines_without_separator() {
        let mut payload = reply("0x1", "10.0.0.2", 55443, Some("get_prop"));
        payload.extend_from_slice(b"garbage line\r\n");
        let props = parse_reply(&payload).unwrap();
        assert!(!props.keys().any(|k| k.contains("garbage")));
    }

    #[test]
    fn reports_first_missing_key() {
        let err = parse_reply(&reply("0x1", "10.0.0.2", 55443, None)).unwrap_err();
        assert!(matches!(err, YeelightError::PropertyKey { key: "support" }));
        assert!(parse_reply(&[0xff, 0x00]).is_err());
    }

    #[tokio::test]
    async fn dedups_by_id_keeping_first() {
        let port = fake_bulb().await;
        let mut registry = DeviceRegistry::new();

        let added = registry
            .ingest([
                reply("0xabc", "127.0.0.1", port, Some("get_prop")),
                reply("0xabc", "127.0.0.2", port, Some("get_prop")),
            ])
            .await;

        assert_eq!(added, vec!["0xabc".to_string()]);
        assert_eq!(registry.len(), 1);
        let session = registry.get("0xabc").unwrap();
        assert_eq!(session.remote_addr().ip().to_string(), "127.0.0.1");
        assert_eq!(session.state().color_temp, 4000);
        assert_eq!(session.identity().fw_ver.as_deref(), Some("18"));
        registry.close_all();
    }

    #[tokio::test]
    async fn incomplete_reply_adds_nothing() {
        let port = fake_bulb().await;
        let mut registry = DeviceRegistry::new();

        let added = registry
            .ingest([reply("0xabc", "127.0.0.1", port, None), b"\xff\xfe".to_vec()])
            .await;
        assert!(added.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn keeps_live_sessions_and_replaces_closed_ones() {
        let port = fake_bulb().await;
        let mut registry = DeviceRegistry::new();
        let payload = reply("0xabc", "127.0.0.1", port, Some("get_prop"));

        registry.ingest([&payload]).await;
        let first = registry.get("0xabc").unwrap().local_addr();

        assert!(registry.ingest([&payload]).await.is_empty());
        assert_eq!(registry.get("0xabc").unwrap().local_addr(), first);

        registry.get("0xabc").unwrap().close();
        assert_eq!(registry.ingest([&payload]).await, vec!["0xabc".to_string()]);
        let replaced = registry.get("0xabc").unwrap();
        assert_eq!(replaced.status(), ConnectionStatus::Ready);
        assert_ne!(replaced.local_addr(), first);
        registry.close_all();
    }
}
