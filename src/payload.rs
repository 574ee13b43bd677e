//! Decoding of backend payloads into the dashboard's internal types.
//!
//! The backend has used several JSON shapes for the same information over
//! time. Every shape is recognised here, at the transport boundary, so the
//! dashboard only ever sees a [`ServerReply`] or a [`StatusUpdate`]. Nothing
//! in this module fails: a payload that matches no known shape decodes to
//! "nothing to update".

use serde_json::{Map, Value};

use crate::model::DeviceStatus;

/// Fields that may carry the reply text, in lookup order. The first non-null
/// one wins.
const REPLY_KEYS: [&str; 4] = ["response", "message", "messages", "text"];

/// Reply half of a backend payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerReply {
    pub text: Option<String>,
    pub tools_called: Vec<String>,
    pub error: Option<String>,
}

impl ServerReply {
    pub fn from_value(payload: &Value) -> Self {
        match payload {
            Value::Object(obj) => Self {
                text: reply_text(obj),
                tools_called: tools_called(obj),
                error: obj.get("error").and_then(non_blank),
            },
            // A bare JSON string is taken as the reply itself.
            Value::String(_) => Self {
                text: non_blank(payload),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Nothing to show: no reply text and no error. A tool list alone does
    /// not count, it is only shown under a reply.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.error.is_none()
    }
}

fn reply_text(obj: &Map<String, Value>) -> Option<String> {
    let value = REPLY_KEYS
        .iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))?;
    non_blank(value)
}

fn tools_called(obj: &Map<String, Value>) -> Vec<String> {
    match obj.get("tools_called") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a JSON value as display text; blank results count as absent.
fn non_blank(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Status half of a backend payload, normalised by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// `{light_on, temperature, brightness}` as served by `GET /status/`.
    Flat {
        light_on: Option<bool>,
        temperature: Option<f64>,
        brightness: Option<f64>,
    },
    /// Per-device entries: `[{name, state: {...}}, ...]`.
    Devices(Vec<DeviceStatus>),
    /// `{lights: {status, brightness}, thermostat: {temperature}}`.
    Nested {
        lights: Option<LightsBlock>,
        temperature: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightsBlock {
    pub on: Option<bool>,
    pub brightness: f64,
}

impl StatusUpdate {
    /// Recognise the status shape of `payload`, if any.
    pub fn from_value(payload: &Value) -> Option<Self> {
        Self::decode(payload, true)
    }

    fn decode(payload: &Value, allow_wrapper: bool) -> Option<Self> {
        match payload {
            Value::Array(entries) => Some(Self::Devices(device_list(entries))),
            Value::Object(obj) => {
                if let Some(Value::Array(entries)) = obj.get("devices") {
                    return Some(Self::Devices(device_list(entries)));
                }
                if obj.contains_key("lights") || obj.contains_key("thermostat") {
                    return Some(nested(obj));
                }
                if ["light_on", "temperature", "brightness"]
                    .iter()
                    .any(|k| obj.contains_key(*k))
                {
                    return Some(Self::Flat {
                        light_on: obj.get("light_on").and_then(switch),
                        temperature: obj.get("temperature").and_then(reading),
                        brightness: obj.get("brightness").and_then(reading),
                    });
                }
                // `{text, state: {...}}` frames wrap one of the shapes above.
                match obj.get("state") {
                    Some(inner) if allow_wrapper => Self::decode(inner, false),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn nested(obj: &Map<String, Value>) -> StatusUpdate {
    let lights = obj.get("lights").and_then(Value::as_object).map(|l| LightsBlock {
        on: l.get("status").or_else(|| l.get("on")).and_then(switch),
        brightness: brightness_or_zero(l.get("brightness")),
    });
    let temperature = obj
        .get("thermostat")
        .and_then(Value::as_object)
        .and_then(|t| t.get("temperature"))
        .and_then(reading);
    StatusUpdate::Nested {
        lights,
        temperature,
    }
}

fn device_list(entries: &[Value]) -> Vec<DeviceStatus> {
    entries.iter().filter_map(device_entry).collect()
}

fn device_entry(entry: &Value) -> Option<DeviceStatus> {
    let obj = entry.as_object()?;
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let state = obj.get("state").and_then(Value::as_object).unwrap_or(obj);

    let mut device = DeviceStatus::named(name);
    device.temperature = state.get("temperature").and_then(reading);
    if state.contains_key("on") || state.contains_key("brightness") {
        device.on = state.get("on").and_then(switch);
        device.brightness = Some(brightness_or_zero(state.get("brightness")));
    }
    Some(device)
}

/// On/off flag with loose truthiness: `true`, non-zero numbers and non-empty
/// strings other than `"off"`/`"false"` count as on. `null` means unknown.
fn switch(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            Some(!(s.is_empty() || s == "off" || s == "false" || s == "0"))
        }
        Value::Array(_) | Value::Object(_) => Some(true),
    }
}

/// Numeric reading; numeric strings are accepted.
fn reading(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn brightness_or_zero(value: Option<&Value>) -> f64 {
    value.and_then(reading).unwrap_or(0.0)
}

/// One push-channel frame split into its reply and status parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFrame {
    pub reply: ServerReply,
    pub status: Option<StatusUpdate>,
}

impl ChannelFrame {
    /// Parse a text frame. Returns `None` when the frame is not JSON.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Some(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let status = StatusUpdate::from_value(value);
        // A bare device array carries no reply.
        let reply = if value.is_array() {
            ServerReply::default()
        } else {
            ServerReply::from_value(value)
        };
        Self { reply, status }
    }
}
