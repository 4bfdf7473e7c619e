//! Bus payloads exchanged between protocol adapters, the registry's callers,
//! and the rule engine.
//!
//! The three payload shapes are one closed sum type so every consumer
//! dispatches with a single exhaustive `match`.

use serde::{Deserialize, Serialize};

use crate::device::DeviceKey;
use crate::protocol::{SourceProtocol, ValueType};

/// A device value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChangeEvent {
    pub protocol: SourceProtocol,
    pub channel: String,
    pub value_name: String,
    pub new_value: String,
    pub value_type: ValueType,
}

/// A protocol-level occurrence (device added, battery low, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProtocolEvent {
    pub protocol: SourceProtocol,
    pub channel: String,
    pub label: String,
}

/// A request for a device to do something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommandEvent {
    pub protocol: SourceProtocol,
    pub channel: String,
    pub label: String,
    pub data: serde_json::Value,
}

/// Labels carried by [`DeviceProtocolEvent`]s.
pub mod labels {
    pub const DEVICE_ADDED: &str = "DeviceAdded";
    pub const DEVICE_UPDATED: &str = "DeviceUpdated";
    pub const BATTERY_LOW: &str = "BatteryLow";
}

/// Labels carried by [`DeviceCommandEvent`]s.
pub mod commands {
    pub const TURN_ON: &str = "TurnOn";
    pub const TURN_OFF: &str = "TurnOff";
}

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    Change(DeviceChangeEvent),
    Protocol(DeviceProtocolEvent),
    Command(DeviceCommandEvent),
}

impl BusMessage {
    #[must_use]
    pub fn change(
        key: &DeviceKey,
        value_name: impl Into<String>,
        new_value: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self::Change(DeviceChangeEvent {
            protocol: key.protocol,
            channel: key.channel.clone(),
            value_name: value_name.into(),
            new_value: new_value.into(),
            value_type,
        })
    }

    #[must_use]
    pub fn protocol(key: &DeviceKey, label: impl Into<String>) -> Self {
        Self::Protocol(DeviceProtocolEvent {
            protocol: key.protocol,
            channel: key.channel.clone(),
            label: label.into(),
        })
    }

    #[must_use]
    pub fn command(key: &DeviceKey, label: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Command(DeviceCommandEvent {
            protocol: key.protocol,
            channel: key.channel.clone(),
            label: label.into(),
            data,
        })
    }

    /// The device this message is about.
    #[must_use]
    pub fn device_key(&self) -> DeviceKey {
        match self {
            Self::Change(e) => DeviceKey::new(e.protocol, e.channel.clone()),
            Self::Protocol(e) => DeviceKey::new(e.protocol, e.channel.clone()),
            Self::Command(e) => DeviceKey::new(e.protocol, e.channel.clone()),
        }
    }
}
