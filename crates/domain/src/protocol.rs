//! Protocol-level enumerations shared by devices, values, and bus payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The device family a notification originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProtocol {
    Xiaomi,
    Noolite,
    Zwave,
    Transport,
    /// Virtual devices owned by the hub itself.
    Internal,
}

impl SourceProtocol {
    /// Every known protocol, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Xiaomi,
        Self::Noolite,
        Self::Zwave,
        Self::Transport,
        Self::Internal,
    ];

    /// Lowercase name used in topics and device identities.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xiaomi => "xiaomi",
            Self::Noolite => "noolite",
            Self::Zwave => "zwave",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for SourceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceProtocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownProtocol(s.to_string()))
    }
}

/// What kind of endpoint a device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Unknown,
    Controller,
    TempHumiSensor,
    FloodSensor,
    Button,
    DoorSensor,
    BinarySwitch,
    BinarySwitchTwoButtons,
    MotionSensor,
    GpsTracker,
    Dimmer,
}

/// Lifecycle state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Active,
    Inactive,
    #[default]
    Unknown,
    Failed,
}

/// How the string-encoded value of a change should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Byte,
    Double,
    String,
    Bool,
    Json,
    /// Momentary signal (motion, button press): the value is an edge, not a level.
    Trigger,
}

macro_rules! impl_snake_case_text {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // serde already knows the canonical lowercase spelling
                match serde_json::to_value(self) {
                    Ok(serde_json::Value::String(s)) => f.write_str(&s),
                    _ => Err(fmt::Error),
                }
            }
        }

        impl FromStr for $name {
            type Err = serde_json::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_json::from_value(serde_json::Value::String(s.to_string()))
            }
        }
    };
}

impl_snake_case_text!(DeviceType);
impl_snake_case_text!(DeviceState);
impl_snake_case_text!(ValueType);
