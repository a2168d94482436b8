use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Bulb identifier (vendor serial, e.g. "0x000000000015243f")
pub type DeviceId = String;

/// Raw `key -> value` strings parsed from one discovery reply or notification.
/// Consumed immediately; never stored.
pub type PropertyBag = BTreeMap<String, String>;

/// Identifying information about a bulb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: DeviceId,
    pub ip: IpAddr,
    pub model: String,
    /// Space separated list of supported methods as advertised by the bulb
    pub support: String,
    /// Firmware version, when the bulb advertises one
    pub fw_ver: Option<String>,
    /// Display name; changes through `set_name` or a `name` notification
    pub name: String,
}

impl DeviceIdentity {
    /// Whether the bulb advertises support for a method
    pub fn supports(&self, method: &str) -> bool {
        self.support.split_whitespace().any(|m| m == method)
    }
}

/// Active color mode of a bulb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Rgb,
    ColorTemp,
    Hsv,
}

impl ColorMode {
    /// Map the wire code (1, 2, 3) to a mode
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Rgb),
            2 => Some(Self::ColorTemp),
            3 => Some(Self::Hsv),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Rgb => 1,
            Self::ColorTemp => 2,
            Self::Hsv => 3,
        }
    }
}

/// Power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Whether a change is applied immediately or as a gradual transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Sudden,
    Smooth,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sudden => "sudden",
            Self::Smooth => "smooth",
        }
    }
}

/// Local mirror of the properties a bulb reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Whether the light is on
    pub power: bool,
    /// Which of the color fields the bulb is currently showing
    pub color_mode: ColorMode,
    /// Percentage, 1-100
    pub brightness: u8,
    /// Kelvin, 1700-6500
    pub color_temp: u16,
    /// 0x000000-0xFFFFFF
    pub rgb: u32,
    /// Degrees, 0-359
    pub hue: u16,
    /// Percentage, 0-100
    pub sat: u8,
    /// Whether a color flow is running; unknown until a notification reports it
    pub flowing: Option<bool>,
    /// Raw integers describing the running flow, as the bulb reports them
    pub flow_params: Option<Vec<u32>>,
    /// Music mode as last reported by the bulb
    pub music_mode: Option<bool>,
    /// Minutes left on the sleep timer, 0 when none is set
    pub delay_off_minutes: Option<u32>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: false,
            color_mode: ColorMode::Rgb,
            brightness: 1,
            color_temp: 1700,
            rgb: 0,
            hue: 0,
            sat: 0,
            flowing: None,
            flow_params: None,
            music_mode: None,
            delay_off_minutes: None,
        }
    }
}

impl DeviceState {
    /// Build the initial state from a discovery reply.
    ///
    /// Numeric fields that fail to parse fall back to their defaults instead of
    /// rejecting the bulb; a factory-reset bulb reports empty values for
    /// properties it has never used.
    pub fn from_properties(props: &PropertyBag) -> Self {
        let defaults = Self::default();
        let field = |key: &str| props.get(key).map(|v| v.trim()).unwrap_or("");

        Self {
            power: field("power") == "on",
            color_mode: field("color_mode")
                .parse()
                .ok()
                .and_then(ColorMode::from_code)
                .unwrap_or(defaults.color_mode),
            brightness: field("bright").parse().unwrap_or(defaults.brightness),
            color_temp: field("ct").parse().unwrap_or(defaults.color_temp),
            rgb: field("rgb").parse().unwrap_or(defaults.rgb),
            hue: field("hue").parse().unwrap_or(defaults.hue),
            sat: field("sat").parse().unwrap_or(defaults.sat),
            ..defaults
        }
    }
}

/// One typed property change carried by a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyUpdate {
    /// `power`: `on` or `off`
    Power(bool),
    /// `bright`, percent
    Brightness(u8),
    /// `color_mode`: 1 RGB, 2 color temperature, 3 HSV
    ColorMode(ColorMode),
    /// `ct`, kelvin
    ColorTemp(u16),
    /// `rgb`, packed as `0xRRGGBB`
    Rgb(u32),
    /// `hue`, degrees
    Hue(u16),
    /// `sat`, percent
    Sat(u8),
    /// `name`; updates the identity rather than the state
    Name(String),
    /// `flowing`: 1 while a color flow runs
    Flowing(bool),
    /// `flow_params`, comma separated
    FlowParams(Vec<u32>),
    /// `music_on`
    MusicMode(bool),
    /// `delayoff`, minutes
    DelayOff(u32),
    /// A key this crate does not mirror, or a known key with an unparsable value
    Unknown { key: String, value: String },
}

impl PropertyUpdate {
    /// Decode one `key: value` pair from a notification
    pub fn parse(key: &str, value: &str) -> Self {
        let value = value.trim();
        let parsed = match key {
            "power" => match value {
                "on" => Some(Self::Power(true)),
                "off" => Some(Self::Power(false)),
                _ => None,
            },
            "bright" => value.parse().ok().map(Self::Brightness),
            "color_mode" => value
                .parse()
                .ok()
                .and_then(ColorMode::from_code)
                .map(Self::ColorMode),
            "ct" => value.parse().ok().map(Self::ColorTemp),
            "rgb" => value.parse().ok().map(Self::Rgb),
            "hue" => value.parse().ok().map(Self::Hue),
            "sat" => value.parse().ok().map(Self::Sat),
            "name" => Some(Self::Name(value.to_string())),
            "flowing" => parse_flag(value).map(Self::Flowing),
            "flow_params" => parse_int_list(value).map(Self::FlowParams),
            "music_on" => parse_flag(value).map(Self::MusicMode),
            "delayoff" => value.parse().ok().map(Self::DelayOff),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Unknown {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Decode every pair of a notification, in key order
    pub fn parse_all(props: &PropertyBag) -> Vec<Self> {
        props.iter().map(|(k, v)| Self::parse(k, v)).collect()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

fn parse_int_list(value: &str) -> Option<Vec<u32>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    value
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect()
}

/// Identity and state of a bulb, updated together so readers never observe a
/// notification half applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub identity: DeviceIdentity,
    pub state: DeviceState,
}

impl DeviceSnapshot {
    /// Apply one notification's updates. Returns the updates that were not
    /// recognised and therefore dropped.
    pub(crate) fn apply(&mut self, updates: &[PropertyUpdate]) -> Vec<PropertyUpdate> {
        let mut ignored = Vec::new();
        for update in updates {
            let state = &mut self.state;
            match update {
                PropertyUpdate::Power(on) => state.power = *on,
                PropertyUpdate::Brightness(v) => state.brightness = *v,
                PropertyUpdate::ColorMode(mode) => state.color_mode = *mode,
                PropertyUpdate::ColorTemp(v) => state.color_temp = *v,
                PropertyUpdate::Rgb(v) => state.rgb = *v,
                PropertyUpdate::Hue(v) => state.hue = *v,
                PropertyUpdate::Sat(v) => state.sat = *v,
                PropertyUpdate::Name(name) => self.identity.name = name.clone(),
                PropertyUpdate::Flowing(v) => state.flowing = Some(*v),
                PropertyUpdate::FlowParams(v) => state.flow_params = Some(v.clone()),
                PropertyUpdate::MusicMode(v) => state.music_mode = Some(*v),
                PropertyUpdate::DelayOff(v) => state.delay_off_minutes = Some(*v),
                PropertyUpdate::Unknown { .. } => ignored.push(update.clone()),
            }
        }
        ignored
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.id, self.model, self.ip)
    }
}
