//! Core value types shared by the dashboard, the payload decoder and the
//! transports.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a transcript entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
    System,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Ai => "AI",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One transcript entry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub received_at: DateTime<Local>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            received_at: Local::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Role::Ai, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}

/// Latest known state of one named device. Any field may be missing from a
/// given payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub on: Option<bool>,
    pub brightness: Option<f64>,
    pub temperature: Option<f64>,
}

impl DeviceStatus {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A device reporting an on/off switch is treated as a light.
    pub fn is_light(&self) -> bool {
        self.on.is_some()
    }
}

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::ai("hello").role, Role::Ai);
        let sys = Message::system("Connection established");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.text, "Connection established");
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::User.to_string(), "USER");
        assert_eq!(Role::Ai.to_string(), "AI");
        assert_eq!(Role::System.to_string(), "SYSTEM");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Ai).unwrap(), "\"ai\"");
    }

    #[test]
    fn test_device_is_light() {
        let mut lamp = DeviceStatus::named("Bedroom Light");
        assert!(!lamp.is_light());
        lamp.on = Some(false);
        assert!(lamp.is_light());
    }
}
