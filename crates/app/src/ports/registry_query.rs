//! Read-only view of the device registry handed to scripts.

use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::protocol::SourceProtocol;

/// Snapshot queries over registered devices. Never blocks on writers.
pub trait RegistryQuery: Send + Sync {
    /// The device registered under `key`.
    fn device(&self, key: &DeviceKey) -> Option<Device>;

    /// Every registered device of `protocol`, ordered by channel.
    fn devices_by_protocol(&self, protocol: SourceProtocol) -> Vec<Device>;

    /// The most recent raw value recorded for `value_name`.
    fn current_value(&self, key: &DeviceKey, value_name: &str) -> Option<String>;
}

impl<T: RegistryQuery + ?Sized> RegistryQuery for std::sync::Arc<T> {
    fn device(&self, key: &DeviceKey) -> Option<Device> {
        (**self).device(key)
    }

    fn devices_by_protocol(&self, protocol: SourceProtocol) -> Vec<Device> {
        (**self).devices_by_protocol(protocol)
    }

    fn current_value(&self, key: &DeviceKey, value_name: &str) -> Option<String> {
        (**self).current_value(key, value_name)
    }
}
