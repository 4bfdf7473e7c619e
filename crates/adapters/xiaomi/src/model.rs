//! Gateway wire format and device model classification.

use serde::{Deserialize, Serialize};

use homebus_domain::protocol::DeviceType;

use crate::error::XiaomiError;

/// One JSON datagram sent by a gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Datagram {
    pub cmd: String,
    #[serde(default)]
    pub model: String,
    pub sid: String,
    /// JSON object encoded as a string.
    #[serde(default)]
    pub data: Option<String>,
}

impl Datagram {
    /// Parse a raw datagram.
    ///
    /// # Errors
    ///
    /// Returns [`XiaomiError::Datagram`] when the bytes are not a gateway message.
    pub fn parse(bytes: &[u8]) -> Result<Self, XiaomiError> {
        serde_json::from_slice(bytes).map_err(XiaomiError::Datagram)
    }

    /// Only state reports and heartbeats carry device state.
    #[must_use]
    pub fn is_state(&self) -> bool {
        matches!(self.cmd.as_str(), "report" | "heartbeat")
    }

    /// Decode the `data` payload; an absent payload is an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`XiaomiError::Data`] when `data` is not a JSON object.
    pub fn payload(&self) -> Result<Payload, XiaomiError> {
        let Some(raw) = self.data.as_deref() else {
            return Ok(Payload::default());
        };
        serde_json::from_str(raw)
            .map(Payload)
            .map_err(|source| XiaomiError::Data {
                sid: self.sid.clone(),
                source,
            })
    }
}

/// Decoded report payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(serde_json::Map<String, serde_json::Value>);

impl Payload {
    /// Read a field as a string.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(serde_json::Value::as_str)
    }

    /// Read an integer field. Gateways send numbers either bare or quoted.
    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A `write` datagram setting one field of a device behind the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    cmd: &'static str,
    pub sid: String,
    /// JSON object encoded as a string, like incoming reports.
    pub data: String,
}

impl WriteRequest {
    /// Switch one relay channel (`channel_0`, `channel_1`) `on` or `off`.
    #[must_use]
    pub fn switch(sid: impl Into<String>, channel: &str, on: bool) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(
            channel.to_string(),
            serde_json::Value::from(if on { "on" } else { "off" }),
        );
        Self {
            cmd: "write",
            sid: sid.into(),
            data: serde_json::Value::Object(data).to_string(),
        }
    }

    /// Encode the datagram.
    ///
    /// # Errors
    ///
    /// Returns [`XiaomiError::Datagram`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XiaomiError> {
        serde_json::to_vec(self).map_err(XiaomiError::Datagram)
    }
}

/// Device families the gateway reports, by model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Gateway,
    TempHumiSensor,
    FloodSensor,
    Button,
    DoorSensor,
    Switch1Button,
    Switch2Buttons,
    WirelessSwitch1Button,
    WirelessSwitch2Buttons,
    MotionSensor,
    AqaraMotionSensor,
    Unknown,
}

impl Model {
    #[must_use]
    pub fn from_name(model: &str) -> Self {
        match model {
            "gateway" | "gateway.v3" | "acpartner.v3" => Self::Gateway,
            "sensor_ht" | "weather.v1" => Self::TempHumiSensor,
            "sensor_wleak.aq1" => Self::FloodSensor,
            "switch" | "sensor_switch.aq2" => Self::Button,
            "magnet" | "sensor_magnet.aq2" => Self::DoorSensor,
            "ctrl_ln1" | "ctrl_ln1.aq1" => Self::Switch1Button,
            "ctrl_ln2" | "ctrl_ln2.aq1" => Self::Switch2Buttons,
            "ctrl_neutral1" => Self::WirelessSwitch1Button,
            "ctrl_neutral2" => Self::WirelessSwitch2Buttons,
            "motion" => Self::MotionSensor,
            "sensor_motion.aq2" => Self::AqaraMotionSensor,
            _ => Self::Unknown,
        }
    }

    /// Device type and product name, or `None` for unknown models.
    #[must_use]
    pub fn classify(self) -> Option<(DeviceType, &'static str)> {
        let classified = match self {
            Self::Gateway => (DeviceType::Controller, "Mi Gateway"),
            Self::TempHumiSensor => (DeviceType::TempHumiSensor, "Aqara Temperature & Humidity Sensor"),
            Self::FloodSensor => (DeviceType::FloodSensor, "Aqara Flood Sensor"),
            Self::Button => (DeviceType::Button, "Aqara Wireless Switch (button)"),
            Self::DoorSensor => (DeviceType::DoorSensor, "Aqara Door Sensor"),
            Self::Switch1Button => (DeviceType::BinarySwitch, "Aqara Switch 1 Button"),
            Self::Switch2Buttons => (DeviceType::BinarySwitchTwoButtons, "Aqara Switch 2 Buttons"),
            Self::WirelessSwitch1Button => (DeviceType::BinarySwitch, "Aqara Wireless Switch 1 Button"),
            Self::WirelessSwitch2Buttons => {
                (DeviceType::BinarySwitchTwoButtons, "Aqara Wireless Switch 2 Buttons")
            }
            Self::MotionSensor => (DeviceType::MotionSensor, "Generic Motion Sensor"),
            Self::AqaraMotionSensor => (DeviceType::MotionSensor, "Aqara Motion Sensor"),
            Self::Unknown => return None,
        };
        Some(classified)
    }
}
