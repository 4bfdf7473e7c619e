//! Device registry: the canonical, concurrency-safe view of every device.
//!
//! Reads are served from an in-memory snapshot warmed from the store at
//! startup. Writes are serialized per device key, persisted first, and only
//! then published to the snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::error::{HubError, NotFoundError, ValidationError};
use homebus_domain::id::DeviceId;
use homebus_domain::protocol::{SourceProtocol, ValueType};
use homebus_domain::time::{Timestamp, now};
use homebus_domain::value::{DeviceValue, DeviceValueChange};

use crate::ports::{DeviceStore, RegistryQuery};

/// Application service owning device identity and value histories.
///
/// At most one device exists per [`DeviceKey`], even under concurrent
/// upserts. The registry never publishes to the bus; callers publish after
/// a successful write.
pub struct DeviceRegistry<S> {
    store: S,
    devices: DashMap<DeviceKey, Arc<Device>>,
    locks: DashMap<DeviceKey, Arc<Mutex<()>>>,
}

impl<S: DeviceStore> DeviceRegistry<S> {
    /// Create an empty registry backed by `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            devices: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Warm the snapshot with every stored device. Returns how many were loaded.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<usize, HubError> {
        let mut loaded = 0;
        for protocol in SourceProtocol::ALL {
            for device in self.store.find_by_protocol(protocol).await? {
                self.devices.insert(device.key(), Arc::new(device));
                loaded += 1;
            }
        }
        tracing::info!(loaded, "device registry loaded");
        Ok(loaded)
    }

    /// Look up a device in the snapshot.
    #[must_use]
    pub fn get_device(&self, protocol: SourceProtocol, channel: &str) -> Option<Device> {
        self.snapshot(&DeviceKey::new(protocol, channel))
    }

    /// Every device currently known, ordered by key.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|d| (**d).clone()).collect();
        devices.sort_by(|a, b| a.key().cmp(&b.key()));
        devices
    }

    /// Create the device on first sight, or merge the supplied fields into
    /// the stored record.
    ///
    /// Fields count as supplied when non-empty, `Some`, or not `Unknown`.
    /// Values of `device` are ignored; use [`add_change`](Self::add_change).
    /// Returns the canonical record, whose id is the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if the channel is empty, or a storage
    /// error propagated from the store.
    #[tracing::instrument(skip(self, device), fields(device = %device.key()))]
    pub async fn add_or_update_device(&self, device: Device) -> Result<Device, HubError> {
        device.validate()?;
        let key = device.key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let existing = match self.snapshot(&key) {
            Some(current) => Some(current),
            None => self.store.find_by_key(&key).await?,
        };
        let candidate = match existing {
            Some(mut current) => {
                current.merge_from(&device);
                current
            }
            None => {
                tracing::info!("registering new device");
                Device {
                    id: DeviceId::new(),
                    created_at: now(),
                    values: BTreeMap::new(),
                    ..device.clone()
                }
            }
        };

        let saved = match self.store.save(&candidate).await {
            Ok(saved) => saved,
            Err(HubError::Conflict(conflict)) => {
                tracing::debug!(%conflict, "lost upsert race, merging into stored record");
                let mut current = self.store.find_by_key(&key).await?.ok_or_else(|| {
                    HubError::from(NotFoundError {
                        entity: "Device",
                        id: key.to_string(),
                    })
                })?;
                current.merge_from(&device);
                self.store.save(&current).await?
            }
            Err(err) => return Err(err),
        };
        if saved.id != candidate.id {
            tracing::debug!(requested = %candidate.id, stored = %saved.id, "adopting stored device id");
        }

        self.devices.insert(key, Arc::new(saved.clone()));
        Ok(saved)
    }

    /// Append a new observation to a device value.
    ///
    /// The value definition is created on first use. The change is stamped
    /// now, but never earlier than the previous change of the same value.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] for an empty value name,
    /// [`HubError::NotFound`] when the device is not registered, or a storage
    /// error propagated from the store.
    pub async fn add_change(
        &self,
        key: &DeviceKey,
        value_name: &str,
        raw_value: impl Into<String>,
        value_type: ValueType,
    ) -> Result<DeviceValue, HubError> {
        self.add_change_with_metadata(key, value_name, raw_value, value_type, None)
            .await
    }

    /// Same as [`add_change`](Self::add_change), attaching protocol-specific
    /// metadata to the change record.
    ///
    /// # Errors
    ///
    /// See [`add_change`](Self::add_change).
    #[tracing::instrument(skip(self, raw_value, metadata), fields(device = %key))]
    pub async fn add_change_with_metadata(
        &self,
        key: &DeviceKey,
        value_name: &str,
        raw_value: impl Into<String>,
        value_type: ValueType,
        metadata: Option<serde_json::Value>,
    ) -> Result<DeviceValue, HubError> {
        if value_name.is_empty() {
            return Err(ValidationError::EmptyValueName.into());
        }
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut device = self.require(key).await?;
        let value = device
            .values
            .entry(value_name.to_string())
            .or_insert_with(|| DeviceValue::new(value_name, value_type));
        value.value_type = value_type;

        let mut change = DeviceValueChange::new(now(), raw_value);
        change.metadata = metadata;
        let change = value.record(change).clone();
        self.store.append_change(device.id, value, &change).await?;

        let value = value.clone();
        tracing::debug!(value = %change.value, "value recorded");
        self.devices.insert(key.clone(), Arc::new(device));
        Ok(value)
    }

    /// Prune the history of one value.
    ///
    /// Removes changes recorded strictly before `before`; the most recent
    /// change is always kept. Returns the number of removed changes.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when the device is not registered, or a
    /// storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn delete_history(
        &self,
        protocol: SourceProtocol,
        channel: &str,
        value_name: &str,
        before: Timestamp,
    ) -> Result<usize, HubError> {
        let key = DeviceKey::new(protocol, channel);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut device = self.require(&key).await?;
        let Some(value) = device.values.get_mut(value_name) else {
            return Ok(0);
        };
        let Some(cutoff) = value.prune_cutoff(before) else {
            return Ok(0);
        };

        let deleted = self
            .store
            .delete_changes_older_than(device.id, value_name, cutoff)
            .await?;
        value.prune_before(cutoff);
        self.devices.insert(key, Arc::new(device));
        Ok(deleted)
    }

    fn lock_for(&self, key: &DeviceKey) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(key.clone()).or_default())
    }

    fn snapshot(&self, key: &DeviceKey) -> Option<Device> {
        self.devices.get(key).map(|d| (**d).clone())
    }

    async fn require(&self, key: &DeviceKey) -> Result<Device, HubError> {
        if let Some(device) = self.snapshot(key) {
            return Ok(device);
        }
        self.store.find_by_key(key).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: key.to_string(),
            }
            .into()
        })
    }
}

impl<S: DeviceStore + Send + Sync> RegistryQuery for DeviceRegistry<S> {
    fn device(&self, key: &DeviceKey) -> Option<Device> {
        self.snapshot(key)
    }

    fn devices_by_protocol(&self, protocol: SourceProtocol) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.protocol == protocol)
            .map(|d| (**d).clone())
            .collect();
        devices.sort_by(|a, b| a.channel.cmp(&b.channel));
        devices
    }

    fn current_value(&self, key: &DeviceKey, value_name: &str) -> Option<String> {
        let device = self.devices.get(key)?;
        device
            .value()
            .value(value_name)?
            .current_value()
            .map(str::to_string)
    }
}
