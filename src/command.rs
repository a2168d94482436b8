use crate::error::ValidationError;
use crate::types::{Effect, Power};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;

const MIN_DURATION_MS: i64 = 30;
const MIN_FLOW_DURATION_MS: i64 = 50;

/// A validated command, ready to be encoded and sent to a bulb
///
/// Every constructor checks its parameters against the bulb's documented
/// ranges, so an out-of-range value fails here and never reaches the wire.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use yeelight_lan::{Command, Effect};
///
/// let cmd = Command::set_bright(80, Effect::Smooth, Duration::from_millis(500)).unwrap();
/// assert_eq!(cmd.method(), "set_bright");
///
/// assert!(Command::set_bright(0, Effect::Sudden, Duration::from_millis(30)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    method: &'static str,
    params: Vec<Value>,
}

/// How many state changes a color flow runs before stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCount {
    Infinite,
    Finite(usize),
}

/// What the bulb does once a color flow stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    /// Return to the state before the flow started
    Recover,
    /// Stay at the flow's last state
    Stay,
    TurnOff,
}

/// One state of a color flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Rgb {
        rgb: u32,
        brightness: u8,
        duration: Duration,
    },
    ColorTemp {
        ct: u16,
        brightness: u8,
        duration: Duration,
    },
    /// Hold the current state
    Wait { duration: Duration },
}

/// An ordered sequence of validated flow states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorFlow {
    tuples: Vec<[i64; 4]>,
}

/// `set_scene` variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scene {
    Color { rgb: u32, brightness: u8 },
    Hsv { hue: u16, sat: u8, brightness: u8 },
    ColorTemp { ct: u16, brightness: u8 },
    ColorFlow {
        count: FlowCount,
        action: FlowAction,
        flow: ColorFlow,
    },
    /// Turn on at the given brightness and switch off after `minutes`
    AutoDelayOff { brightness: u8, minutes: u32 },
}

impl FlowCount {
    fn wire_value(self) -> usize {
        match self {
            Self::Infinite => 0,
            Self::Finite(count) => count,
        }
    }
}

impl FlowAction {
    fn wire_value(self) -> u8 {
        match self {
            Self::Recover => 0,
            Self::Stay => 1,
            Self::TurnOff => 2,
        }
    }
}

impl FlowStep {
    fn to_tuple(self) -> Result<[i64; 4], ValidationError> {
        match self {
            Self::Rgb {
                rgb,
                brightness,
                duration,
            } => Ok([
                flow_duration(duration)?,
                1,
                rgb_value(rgb)?,
                brightness_value(brightness)?,
            ]),
            Self::ColorTemp {
                ct,
                brightness,
                duration,
            } => Ok([
                flow_duration(duration)?,
                2,
                ct_value(ct)?,
                brightness_value(brightness)?,
            ]),
            Self::Wait { duration } => Ok([flow_duration(duration)?, 7, 0, 0]),
        }
    }
}

impl ColorFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state, validating it first
    pub fn push(&mut self, step: FlowStep) -> Result<(), ValidationError> {
        self.tuples.push(step.to_tuple()?);
        Ok(())
    }

    /// Builder form of [`ColorFlow::push`]
    pub fn step(mut self, step: FlowStep) -> Result<Self, ValidationError> {
        self.push(step)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Flattened `duration,mode,value,brightness,...` expression
    pub fn expression(&self) -> String {
        self.tuples
            .iter()
            .flatten()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn check_count(&self, count: FlowCount) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyFlow);
        }
        if let FlowCount::Finite(n) = count {
            if n < self.len() {
                return Err(ValidationError::InsufficientRepeatCount {
                    count: n,
                    states: self.len(),
                });
            }
        }
        Ok(())
    }
}

impl Command {
    fn new(method: &'static str, params: Vec<Value>) -> Self {
        Self { method, params }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// True for `set_music` with action 0, which always travels on the primary channel
    pub fn is_music_off(&self) -> bool {
        self.method == "set_music" && self.params.first() == Some(&json!(0))
    }

    pub fn set_power(power: Power, effect: Effect, duration: Duration) -> Result<Self, ValidationError> {
        Ok(Self::new(
            "set_power",
            vec![json!(power.as_str()), json!(effect.as_str()), json!(duration_value(duration)?)],
        ))
    }

    pub fn toggle() -> Self {
        Self::new("toggle", Vec::new())
    }

    /// Save the current state as the power-on default
    pub fn set_default() -> Self {
        Self::new("set_default", Vec::new())
    }

    pub fn set_bright(brightness: u8, effect: Effect, duration: Duration) -> Result<Self, ValidationError> {
        Ok(Self::new(
            "set_bright",
            vec![
                json!(brightness_value(brightness)?),
                json!(effect.as_str()),
                json!(duration_value(duration)?),
            ],
        ))
    }

    pub fn set_ct_abx(ct: u16, effect: Effect, duration: Duration) -> Result<Self, ValidationError> {
        Ok(Self::new(
            "set_ct_abx",
            vec![json!(ct_value(ct)?), json!(effect.as_str()), json!(duration_value(duration)?)],
        ))
    }

    pub fn set_rgb(rgb: u32, effect: Effect, duration: Duration) -> Result<Self, ValidationError> {
        Ok(Self::new(
            "set_rgb",
            vec![json!(rgb_value(rgb)?), json!(effect.as_str()), json!(duration_value(duration)?)],
        ))
    }

    pub fn set_hsv(hue: u16, sat: u8, effect: Effect, duration: Duration) -> Result<Self, ValidationError> {
        Ok(Self::new(
            "set_hsv",
            vec![
                json!(hue_value(hue)?),
                json!(sat_value(sat)?),
                json!(effect.as_str()),
                json!(duration_value(duration)?),
            ],
        ))
    }

    pub fn set_scene(scene: Scene) -> Result<Self, ValidationError> {
        let params = match scene {
            Scene::Color { rgb, brightness } => {
                vec![json!("color"), json!(rgb_value(rgb)?), json!(brightness_value(brightness)?)]
            }
            Scene::Hsv {
                hue,
                sat,
                brightness,
            } => vec![
                json!("hsv"),
                json!(hue_value(hue)?),
                json!(sat_value(sat)?),
                json!(brightness_value(brightness)?),
            ],
            Scene::ColorTemp { ct, brightness } => {
                vec![json!("ct"), json!(ct_value(ct)?), json!(brightness_value(brightness)?)]
            }
            Scene::ColorFlow {
                count,
                action,
                flow,
            } => {
                flow.check_count(count)?;
                vec![
                    json!("cf"),
                    json!(count.wire_value()),
                    json!(action.wire_value()),
                    json!(flow.expression()),
                ]
            }
            Scene::AutoDelayOff {
                brightness,
                minutes,
            } => vec![
                json!("auto_delay_off"),
                json!(brightness_value(brightness)?),
                json!(minutes_value(minutes)?),
            ],
        };
        Ok(Self::new("set_scene", params))
    }

    pub fn start_cf(count: FlowCount, action: FlowAction, flow: &ColorFlow) -> Result<Self, ValidationError> {
        flow.check_count(count)?;
        Ok(Self::new(
            "start_cf",
            vec![
                json!(count.wire_value()),
                json!(action.wire_value()),
                json!(flow.expression()),
            ],
        ))
    }

    pub fn stop_cf() -> Self {
        Self::new("stop_cf", Vec::new())
    }

    /// Query properties; the values come back as a `Result` event
    pub fn get_prop<I, S>(props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params = props.into_iter().map(|p| Value::String(p.into())).collect();
        Self::new("get_prop", params)
    }

    /// Start a sleep timer that powers the bulb off after `minutes`
    pub fn cron_add(minutes: u32) -> Result<Self, ValidationError> {
        Ok(Self::new("cron_add", vec![json!(0), json!(minutes_value(minutes)?)]))
    }

    pub fn cron_del() -> Self {
        Self::new("cron_del", vec![json!(0)])
    }

    pub fn set_name(name: impl Into<String>) -> Self {
        Self::new("set_name", vec![Value::String(name.into())])
    }

    /// Ask the bulb to connect back to `host:port` for music mode
    pub fn set_music_on(host: IpAddr, port: u16) -> Self {
        Self::new("set_music", vec![json!(1), json!(host.to_string()), json!(port)])
    }

    pub fn set_music_off() -> Self {
        Self::new("set_music", vec![json!(0)])
    }
}

fn in_range(field: &'static str, value: i64, min: i64, max: Option<i64>) -> Result<i64, ValidationError> {
    if value < min {
        return Err(ValidationError::BelowMinimum { field, min, value });
    }
    if let Some(max) = max {
        if value > max {
            return Err(ValidationError::AboveMaximum { field, max, value });
        }
    }
    Ok(value)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn duration_value(duration: Duration) -> Result<i64, ValidationError> {
    in_range("duration", millis(duration), MIN_DURATION_MS, None)
}

fn flow_duration(duration: Duration) -> Result<i64, ValidationError> {
    in_range("flow duration", millis(duration), MIN_FLOW_DURATION_MS, None)
}

fn brightness_value(value: u8) -> Result<i64, ValidationError> {
    in_range("brightness", value.into(), 1, Some(100))
}

fn ct_value(value: u16) -> Result<i64, ValidationError> {
    in_range("color temperature", value.into(), 1700, Some(6500))
}

fn rgb_value(value: u32) -> Result<i64, ValidationError> {
    in_range("rgb", value.into(), 1, Some(0xFF_FFFF))
}

fn hue_value(value: u16) -> Result<i64, ValidationError> {
    in_range("hue", value.into(), 0, Some(359))
}

fn sat_value(value: u8) -> Result<i64, ValidationError> {
    in_range("saturation", value.into(), 0, Some(100))
}

fn minutes_value(value: u32) -> Result<i64, ValidationError> {
    in_range("minutes", value.into(), 1, None)
}
