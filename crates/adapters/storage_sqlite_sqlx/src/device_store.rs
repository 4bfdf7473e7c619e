//! `SQLite` implementation of [`DeviceStore`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use homebus_app::ports::DeviceStore;
use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::error::{ConflictError, HubError};
use homebus_domain::id::DeviceId;
use homebus_domain::protocol::SourceProtocol;
use homebus_domain::time::Timestamp;
use homebus_domain::value::{DeviceValue, DeviceValueChange};

use crate::codec::{decode, decode_timestamp, encode_timestamp};
use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`Device`]s, without values.
struct Wrapper(Device);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let protocol: String = row.try_get("protocol")?;
        let device_type: String = row.try_get("device_type")?;
        let zone_id: Option<String> = row.try_get("zone_id")?;
        let state: String = row.try_get("state")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self(Device {
            id: decode(&id)?,
            created_at: decode_timestamp(&created_at)?,
            channel: row.try_get("channel")?,
            protocol: decode(&protocol)?,
            name: row.try_get("name")?,
            manufacturer: row.try_get("manufacturer")?,
            product_name: row.try_get("product_name")?,
            device_type: decode(&device_type)?,
            zone_id: zone_id.as_deref().map(decode).transpose()?,
            state: decode(&state)?,
            values: Default::default(),
        }))
    }
}

/// A value definition row.
struct ValueRow(DeviceValue);

impl<'r> FromRow<'r, SqliteRow> for ValueRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let value_type: String = row.try_get("value_type")?;
        Ok(Self(DeviceValue {
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            read_only: row.try_get("read_only")?,
            value_type: decode(&value_type)?,
            changes: Vec::new(),
        }))
    }
}

/// A change row, tagged with the value it belongs to.
struct ChangeRow {
    value_name: String,
    change: DeviceValueChange,
}

impl<'r> FromRow<'r, SqliteRow> for ChangeRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let recorded_at: String = row.try_get("recorded_at")?;
        let metadata: Option<String> = row.try_get("metadata")?;
        let metadata = metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self {
            value_name: row.try_get("value_name")?,
            change: DeviceValueChange {
                recorded_at: decode_timestamp(&recorded_at)?,
                value: row.try_get("value")?,
                metadata,
            },
        })
    }
}

const SELECT_BY_KEY: &str = "SELECT * FROM devices WHERE protocol = ? AND channel = ?";
const SELECT_BY_PROTOCOL: &str = "SELECT * FROM devices WHERE protocol = ? ORDER BY channel";
const SELECT_VALUES: &str = "SELECT * FROM device_values WHERE device_id = ? ORDER BY name";
const SELECT_CHANGES: &str = "SELECT * FROM device_value_changes WHERE device_id = ? ORDER BY id";

const UPSERT: &str = r"
    INSERT INTO devices
        (id, protocol, channel, name, manufacturer, product_name, device_type, zone_id, state, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (protocol, channel) DO UPDATE SET
        name = excluded.name,
        manufacturer = excluded.manufacturer,
        product_name = excluded.product_name,
        device_type = excluded.device_type,
        zone_id = excluded.zone_id,
        state = excluded.state
";

const UPSERT_VALUE: &str = r"
    INSERT INTO device_values (device_id, name, unit, read_only, value_type)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT (device_id, name) DO UPDATE SET
        unit = excluded.unit,
        read_only = excluded.read_only,
        value_type = excluded.value_type
";

const INSERT_CHANGE: &str = r"
    INSERT INTO device_value_changes (device_id, value_name, recorded_at, value, metadata)
    VALUES (?, ?, ?, ?, ?)
";

// the newest row of a value is never deleted, whatever its timestamp
const DELETE_OLDER_THAN: &str = r"
    DELETE FROM device_value_changes
    WHERE device_id = ?1 AND value_name = ?2 AND recorded_at < ?3
      AND id < (
        SELECT MAX(id) FROM device_value_changes WHERE device_id = ?1 AND value_name = ?2
      )
";

/// `SQLite`-backed device store.
#[derive(Clone)]
pub struct SqliteDeviceStore {
    pool: SqlitePool,
}

impl SqliteDeviceStore {
    /// Create a new store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Attach value definitions and change histories to a device row.
async fn with_values(pool: &SqlitePool, Wrapper(mut device): Wrapper) -> Result<Device, StorageError> {
    let id = device.id.to_string();
    let values: Vec<ValueRow> = sqlx::query_as(SELECT_VALUES)
        .bind(&id)
        .fetch_all(pool)
        .await?;
    let changes: Vec<ChangeRow> = sqlx::query_as(SELECT_CHANGES)
        .bind(&id)
        .fetch_all(pool)
        .await?;

    device.values = values
        .into_iter()
        .map(|ValueRow(value)| (value.name.clone(), value))
        .collect();
    for ChangeRow { value_name, change } in changes {
        if let Some(value) = device.values.get_mut(&value_name) {
            value.changes.push(change);
        }
    }
    Ok(device)
}

async fn find_by_key(pool: &SqlitePool, key: &DeviceKey) -> Result<Option<Device>, StorageError> {
    let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
        .bind(key.protocol.as_str())
        .bind(&key.channel)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some(with_values(pool, row).await?)),
        None => Ok(None),
    }
}

impl DeviceStore for SqliteDeviceStore {
    fn find_by_key(
        &self,
        key: &DeviceKey,
    ) -> impl Future<Output = Result<Option<Device>, HubError>> + Send {
        let pool = self.pool.clone();
        let key = key.clone();
        async move { Ok(find_by_key(&pool, &key).await?) }
    }

    fn find_by_protocol(
        &self,
        protocol: SourceProtocol,
    ) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PROTOCOL)
                .bind(protocol.as_str())
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let mut devices = Vec::with_capacity(rows.len());
            for row in rows {
                devices.push(with_values(&pool, row).await?);
            }
            Ok(devices)
        }
    }

    fn save(&self, device: &Device) -> impl Future<Output = Result<Device, HubError>> + Send {
        let pool = self.pool.clone();
        let device = device.clone();
        async move {
            let key = device.key();
            sqlx::query(UPSERT)
                .bind(device.id.to_string())
                .bind(device.protocol.as_str())
                .bind(&device.channel)
                .bind(&device.name)
                .bind(&device.manufacturer)
                .bind(&device.product_name)
                .bind(device.device_type.to_string())
                .bind(device.zone_id.map(|id| id.to_string()))
                .bind(device.state.to_string())
                .bind(encode_timestamp(device.created_at))
                .execute(&pool)
                .await
                .map_err(|err| match err {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        HubError::from(ConflictError {
                            entity: "Device",
                            key: key.to_string(),
                        })
                    }
                    other => StorageError::from(other).into(),
                })?;

            find_by_key(&pool, &key).await?.ok_or_else(|| {
                StorageError::Database(sqlx::Error::RowNotFound).into()
            })
        }
    }

    fn append_change(
        &self,
        device_id: DeviceId,
        value: &DeviceValue,
        change: &DeviceValueChange,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        let device_id = device_id.to_string();
        let name = value.name.clone();
        let unit = value.unit.clone();
        let read_only = value.read_only;
        let value_type = value.value_type.to_string();
        let recorded_at = encode_timestamp(change.recorded_at);
        let raw = change.value.clone();
        let metadata = change
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose();

        async move {
            let metadata = metadata.map_err(StorageError::from)?;
            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            sqlx::query(UPSERT_VALUE)
                .bind(&device_id)
                .bind(&name)
                .bind(&unit)
                .bind(read_only)
                .bind(&value_type)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            sqlx::query(INSERT_CHANGE)
                .bind(&device_id)
                .bind(&name)
                .bind(&recorded_at)
                .bind(&raw)
                .bind(&metadata)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            tx.commit().await.map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_changes_older_than(
        &self,
        device_id: DeviceId,
        value_name: &str,
        before: Timestamp,
    ) -> impl Future<Output = Result<usize, HubError>> + Send {
        let pool = self.pool.clone();
        let value_name = value_name.to_string();
        async move {
            let result = sqlx::query(DELETE_OLDER_THAN)
                .bind(device_id.to_string())
                .bind(&value_name)
                .bind(encode_timestamp(before))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
        }
    }
}
