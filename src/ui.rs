//! UI state: the transcript, the status board and the input draft.
//!
//! This is plain data. Handlers in [`crate::dashboard`] mutate it and the
//! terminal renderer reads it, so everything here can be tested without a
//! terminal.

use std::collections::BTreeMap;

use crate::model::{DeviceStatus, Message, Role};
use crate::payload::StatusUpdate;
use crate::utils::format_reading;

/// Append-only list of messages in arrival order.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Entries appended after the first `start` ones.
    pub fn since(&self, start: usize) -> &[Message] {
        self.messages.get(start..).unwrap_or(&[])
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

/// A display slot on the status board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Light,
    Brightness,
    Temperature,
    LivingRoomLight,
    LivingRoomBrightness,
    LivingRoomTemperature,
    BedroomLight,
    BedroomBrightness,
}

impl Indicator {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Brightness => "Brightness",
            Self::Temperature => "Temperature",
            Self::LivingRoomLight => "Living room light",
            Self::LivingRoomBrightness => "Living room brightness",
            Self::LivingRoomTemperature => "Living room thermostat",
            Self::BedroomLight => "Bedroom light",
            Self::BedroomBrightness => "Bedroom brightness",
        }
    }
}

/// Which board slots a known device feeds.
struct TrackedDevice {
    name: &'static str,
    on: Option<Indicator>,
    brightness: Option<Indicator>,
    temperature: Option<Indicator>,
}

static TRACKED_DEVICES: [TrackedDevice; 3] = [
    TrackedDevice {
        name: "Living Room Light",
        on: Some(Indicator::LivingRoomLight),
        brightness: Some(Indicator::LivingRoomBrightness),
        temperature: None,
    },
    TrackedDevice {
        name: "Bedroom Light",
        on: Some(Indicator::BedroomLight),
        brightness: Some(Indicator::BedroomBrightness),
        temperature: None,
    },
    TrackedDevice {
        name: "Living Room Thermostat",
        on: None,
        brightness: None,
        temperature: Some(Indicator::LivingRoomTemperature),
    },
];

fn tracked(name: &str) -> Option<&'static TrackedDevice> {
    TRACKED_DEVICES
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name.trim()))
}

fn on_off(on: bool) -> String {
    let label = if on { "ON" } else { "OFF" };
    label.to_string()
}

/// Latest displayed value per indicator, plus the last full status seen for
/// each tracked device.
#[derive(Debug, Default, Clone)]
pub struct StatusBoard {
    slots: BTreeMap<Indicator, String>,
    devices: BTreeMap<String, DeviceStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, indicator: Indicator) -> Option<&str> {
        self.slots.get(&indicator).map(String::as_str)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceStatus> {
        tracked(name).and_then(|t| self.devices.get(t.name))
    }

    /// Filled slots in board order.
    pub fn entries(&self) -> impl Iterator<Item = (Indicator, &str)> {
        self.slots.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn set(&mut self, indicator: Indicator, value: String) -> bool {
        match self.slots.get(&indicator) {
            Some(current) if *current == value => false,
            _ => {
                self.slots.insert(indicator, value);
                true
            }
        }
    }

    fn set_opt(&mut self, indicator: Option<Indicator>, value: Option<String>) -> bool {
        match (indicator, value) {
            (Some(indicator), Some(value)) => self.set(indicator, value),
            _ => false,
        }
    }

    /// Apply a decoded status payload. Only slots whose fields are present
    /// change. Returns whether anything visible changed.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        let mut changed = false;
        match update {
            StatusUpdate::Flat {
                light_on,
                temperature,
                brightness,
            } => {
                changed |= self.set_opt(Some(Indicator::Light), light_on.map(on_off));
                changed |= self.set_opt(
                    Some(Indicator::Temperature),
                    temperature.map(format_reading),
                );
                changed |= self.set_opt(Some(Indicator::Brightness), brightness.map(format_reading));
            }
            StatusUpdate::Nested {
                lights,
                temperature,
            } => {
                if let Some(lights) = lights {
                    changed |= self.set_opt(Some(Indicator::Light), lights.on.map(on_off));
                    changed |= self.set(Indicator::Brightness, format_reading(lights.brightness));
                }
                changed |= self.set_opt(
                    Some(Indicator::Temperature),
                    temperature.map(format_reading),
                );
            }
            StatusUpdate::Devices(devices) => {
                for device in devices {
                    changed |= self.apply_device(device);
                }
            }
        }
        changed
    }

    fn apply_device(&mut self, device: &DeviceStatus) -> bool {
        let Some(slots) = tracked(&device.name) else {
            tracing::debug!(device = %device.name, "ignoring untracked device");
            return false;
        };
        let mut changed = false;
        changed |= self.set_opt(slots.on, device.on.map(on_off));
        changed |= self.set_opt(slots.brightness, device.brightness.map(format_reading));
        changed |= self.set_opt(slots.temperature, device.temperature.map(format_reading));
        self.devices.insert(slots.name.to_string(), device.clone());
        changed
    }
}

/// Everything the dashboard shows, owned by one [`crate::dashboard::Dashboard`].
#[derive(Debug, Default)]
pub struct UiState {
    pub transcript: Transcript,
    pub board: StatusBoard,
    /// Text typed but not yet submitted.
    pub input: String,
    board_dirty: bool,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn apply_status(&mut self, update: &StatusUpdate) -> bool {
        let changed = self.board.apply(update);
        self.board_dirty |= changed;
        changed
    }

    /// Returns whether the board changed since the last call, and resets it.
    pub fn take_board_dirty(&mut self) -> bool {
        std::mem::take(&mut self.board_dirty)
    }
}
