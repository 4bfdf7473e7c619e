//! Device: the canonical record of one physical or logical endpoint.
//!
//! A device is identified by its [`DeviceKey`] (source protocol + channel).
//! Devices are created on first sight and never deleted; their values carry
//! the observed history.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::{DeviceId, ZoneId};
use crate::protocol::{DeviceState, DeviceType, SourceProtocol};
use crate::time::Timestamp;
use crate::value::DeviceValue;

/// Identity of a device: unique per (protocol, channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    pub protocol: SourceProtocol,
    pub channel: String,
}

impl DeviceKey {
    #[must_use]
    pub fn new(protocol: SourceProtocol, channel: impl Into<String>) -> Self {
        Self {
            protocol,
            channel: channel.into(),
        }
    }
}

/// Formats as `<protocol>/channel/<channel>`, e.g. `xiaomi/channel/55`.
impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/channel/{}", self.protocol, self.channel)
    }
}

impl FromStr for DeviceKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidDeviceIdentity(s.to_string());
        let (protocol, channel) = s.split_once("/channel/").ok_or_else(invalid)?;
        if channel.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(protocol.parse()?, channel))
    }
}

/// A registered device and its value slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub created_at: Timestamp,
    pub channel: String,
    pub protocol: SourceProtocol,
    /// Human readable name.
    pub name: String,
    pub manufacturer: Option<String>,
    pub product_name: Option<String>,
    pub device_type: DeviceType,
    pub zone_id: Option<ZoneId>,
    pub state: DeviceState,
    pub values: BTreeMap<String, DeviceValue>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    #[must_use]
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.protocol, self.channel.clone())
    }

    /// Look up a value slot by name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&DeviceValue> {
        self.values.get(name)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `channel` is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.channel.is_empty() {
            return Err(ValidationError::EmptyChannel.into());
        }
        Ok(())
    }

    /// Merge the mutable fields supplied in `update` into `self`.
    ///
    /// Last write wins per field. A field counts as supplied when it is
    /// non-empty, `Some`, or not `Unknown`. Identity, creation time, and
    /// values are never touched: values only change through appended
    /// history records.
    pub fn merge_from(&mut self, update: &Device) {
        if !update.name.is_empty() {
            self.name.clone_from(&update.name);
        }
        if update.manufacturer.is_some() {
            self.manufacturer.clone_from(&update.manufacturer);
        }
        if update.product_name.is_some() {
            self.product_name.clone_from(&update.product_name);
        }
        if update.device_type != DeviceType::Unknown {
            self.device_type = update.device_type;
        }
        if update.zone_id.is_some() {
            self.zone_id = update.zone_id;
        }
        if update.state != DeviceState::Unknown {
            self.state = update.state;
        }
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    created_at: Option<Timestamp>,
    channel: Option<String>,
    protocol: Option<SourceProtocol>,
    name: Option<String>,
    manufacturer: Option<String>,
    product_name: Option<String>,
    device_type: DeviceType,
    zone_id: Option<ZoneId>,
    state: DeviceState,
    values: BTreeMap<String, DeviceValue>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    #[must_use]
    pub fn key(mut self, key: DeviceKey) -> Self {
        self.protocol = Some(key.protocol);
        self.channel = Some(key.channel);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: SourceProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn product_name(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = Some(product_name.into());
        self
    }

    #[must_use]
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    #[must_use]
    pub fn zone_id(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    #[must_use]
    pub fn state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn value(mut self, value: DeviceValue) -> Self {
        self.values.insert(value.name.clone(), value);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// The protocol defaults to [`SourceProtocol::Internal`] and the name to
    /// the device identity.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if the channel is missing or empty.
    pub fn build(self) -> Result<Device, HubError> {
        let protocol = self.protocol.unwrap_or(SourceProtocol::Internal);
        let channel = self.channel.unwrap_or_default();
        let name = self
            .name
            .unwrap_or_else(|| DeviceKey::new(protocol, channel.clone()).to_string());
        let device = Device {
            id: self.id.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(crate::time::now),
            channel,
            protocol,
            name,
            manufacturer: self.manufacturer,
            product_name: self.product_name,
            device_type: self.device_type,
            zone_id: self.zone_id,
            state: self.state,
            values: self.values,
        };
        device.validate()?;
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> Device {
        Device::builder()
            .protocol(SourceProtocol::Xiaomi)
            .channel("55")
            .manufacturer("Xiaomi")
            .state(DeviceState::Active)
            .build()
            .unwrap()
    }

    #[test]
    fn should_format_identity_as_protocol_channel_path() {
        let key = DeviceKey::new(SourceProtocol::Xiaomi, "55");
        assert_eq!(key.to_string(), "xiaomi/channel/55");
    }

    #[test]
    fn should_parse_identity_string() {
        let key: DeviceKey = "noolite/channel/5".parse().unwrap();
        assert_eq!(key, DeviceKey::new(SourceProtocol::Noolite, "5"));
    }

    #[test]
    fn should_reject_identity_without_channel_marker() {
        let result = "xiaomi:55".parse::<DeviceKey>();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidDeviceIdentity(_))
        ));
    }

    #[test]
    fn should_reject_identity_with_unknown_protocol() {
        let result = "zigbee/channel/1".parse::<DeviceKey>();
        assert!(matches!(result, Err(ValidationError::UnknownProtocol(_))));
    }

    #[test]
    fn should_default_name_to_identity() {
        let device = sensor();
        assert_eq!(device.name, "xiaomi/channel/55");
        assert_eq!(device.device_type, DeviceType::Unknown);
    }

    #[test]
    fn should_return_validation_error_when_channel_is_empty() {
        let result = Device::builder().protocol(SourceProtocol::Zwave).build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyChannel))
        ));
    }

    #[test]
    fn should_merge_only_supplied_fields() {
        let mut stored = sensor();
        stored.product_name = Some("Aqara Motion Sensor".to_string());
        let original_id = stored.id;

        let update = Device::builder()
            .protocol(SourceProtocol::Xiaomi)
            .channel("55")
            .name("Hallway motion")
            .device_type(DeviceType::MotionSensor)
            .build()
            .unwrap();
        stored.merge_from(&update);

        assert_eq!(stored.id, original_id);
        assert_eq!(stored.name, "Hallway motion");
        assert_eq!(stored.device_type, DeviceType::MotionSensor);
        assert_eq!(stored.manufacturer.as_deref(), Some("Xiaomi"));
        assert_eq!(stored.product_name.as_deref(), Some("Aqara Motion Sensor"));
        assert_eq!(stored.state, DeviceState::Active);
    }

    #[test]
    fn should_not_merge_values() {
        let mut stored = sensor();
        let update = Device::builder()
            .key(stored.key())
            .value(crate::value::DeviceValue::new(
                "motion",
                crate::protocol::ValueType::Trigger,
            ))
            .build()
            .unwrap();
        stored.merge_from(&update);
        assert!(stored.values.is_empty());
    }
}
