//! Storage port: persistence for devices, their value histories, and zones.

use std::future::Future;

use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::error::HubError;
use homebus_domain::id::{DeviceId, ZoneId};
use homebus_domain::protocol::SourceProtocol;
use homebus_domain::time::Timestamp;
use homebus_domain::value::{DeviceValue, DeviceValueChange};
use homebus_domain::zone::Zone;

/// Durable store behind the device registry.
///
/// Devices are returned with their value slots and full change histories,
/// oldest change first.
pub trait DeviceStore {
    /// Find the device registered under `key`.
    fn find_by_key(
        &self,
        key: &DeviceKey,
    ) -> impl Future<Output = Result<Option<Device>, HubError>> + Send;

    /// Every device of one protocol, used to warm the registry at startup.
    fn find_by_protocol(
        &self,
        protocol: SourceProtocol,
    ) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send;

    /// Upsert the descriptive fields of `device`, keyed by (protocol, channel).
    ///
    /// Returns the canonical stored record, whose id may differ from the
    /// requested one when another writer created the key first. Stores
    /// without atomic upserts may instead fail with [`HubError::Conflict`].
    fn save(&self, device: &Device) -> impl Future<Output = Result<Device, HubError>> + Send;

    /// Append one change to a value, creating the value definition on first use.
    fn append_change(
        &self,
        device_id: DeviceId,
        value: &DeviceValue,
        change: &DeviceValueChange,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Delete changes of one value recorded strictly before `before`.
    ///
    /// The most recent change of the value is always kept. Returns the
    /// number of deleted changes.
    fn delete_changes_older_than(
        &self,
        device_id: DeviceId,
        value_name: &str,
        before: Timestamp,
    ) -> impl Future<Output = Result<usize, HubError>> + Send;
}

/// Repository for persisting and querying [`Zone`]s.
pub trait ZoneRepository {
    /// Create a new zone in storage.
    fn create(&self, zone: Zone) -> impl Future<Output = Result<Zone, HubError>> + Send;

    /// Get a zone by its unique identifier.
    fn get_by_id(&self, id: ZoneId)
    -> impl Future<Output = Result<Option<Zone>, HubError>> + Send;

    /// Get all zones.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Zone>, HubError>> + Send;
}

impl<T: DeviceStore + Send + Sync> DeviceStore for std::sync::Arc<T> {
    fn find_by_key(
        &self,
        key: &DeviceKey,
    ) -> impl Future<Output = Result<Option<Device>, HubError>> + Send {
        (**self).find_by_key(key)
    }

    fn find_by_protocol(
        &self,
        protocol: SourceProtocol,
    ) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        (**self).find_by_protocol(protocol)
    }

    fn save(&self, device: &Device) -> impl Future<Output = Result<Device, HubError>> + Send {
        (**self).save(device)
    }

    fn append_change(
        &self,
        device_id: DeviceId,
        value: &DeviceValue,
        change: &DeviceValueChange,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).append_change(device_id, value, change)
    }

    fn delete_changes_older_than(
        &self,
        device_id: DeviceId,
        value_name: &str,
        before: Timestamp,
    ) -> impl Future<Output = Result<usize, HubError>> + Send {
        (**self).delete_changes_older_than(device_id, value_name, before)
    }
}
