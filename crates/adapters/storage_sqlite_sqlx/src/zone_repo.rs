//! `SQLite` implementation of [`ZoneRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use homebus_app::ports::ZoneRepository;
use homebus_domain::error::HubError;
use homebus_domain::id::ZoneId;
use homebus_domain::zone::Zone;

use crate::codec::{decode, decode_timestamp, encode_timestamp};
use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`Zone`].
struct Wrapper(Zone);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Zone> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self(Zone {
            id: decode(&id)?,
            created_at: decode_timestamp(&created_at)?,
            name: row.try_get("name")?,
        }))
    }
}

const INSERT: &str = "INSERT INTO zones (id, name, created_at) VALUES (?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM zones WHERE id = ?";
const SELECT_ALL: &str = "SELECT * FROM zones ORDER BY created_at, name";

/// `SQLite`-backed zone repository.
pub struct SqliteZoneRepository {
    pool: SqlitePool,
}

impl SqliteZoneRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ZoneRepository for SqliteZoneRepository {
    fn create(&self, zone: Zone) -> impl Future<Output = Result<Zone, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            zone.validate()?;
            sqlx::query(INSERT)
                .bind(zone.id.to_string())
                .bind(&zone.name)
                .bind(encode_timestamp(zone.created_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(zone)
        }
    }

    fn get_by_id(
        &self,
        id: ZoneId,
    ) -> impl Future<Output = Result<Option<Zone>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id.to_string())
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Zone>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_store::SqliteDeviceStore;
    use crate::pool::Config;
    use homebus_app::ports::DeviceStore;
    use homebus_domain::device::{Device, DeviceKey};
    use homebus_domain::protocol::SourceProtocol;
    use sqlx::SqlitePool;

    async fn setup() -> SqlitePool {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        db.pool().clone()
    }

    #[tokio::test]
    async fn should_create_and_retrieve_zone() {
        let repo = SqliteZoneRepository::new(setup().await);
        let zone = Zone::builder().name("Kitchen").build().unwrap();
        let id = zone.id;

        repo.create(zone.clone()).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched, zone);
    }

    #[tokio::test]
    async fn should_return_none_when_zone_not_found() {
        let repo = SqliteZoneRepository::new(setup().await);
        assert!(repo.get_by_id(ZoneId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_list_all_zones() {
        let repo = SqliteZoneRepository::new(setup().await);
        repo.create(Zone::builder().name("Kitchen").build().unwrap())
            .await
            .unwrap();
        repo.create(Zone::builder().name("Garden").build().unwrap())
            .await
            .unwrap();

        assert_eq!(repo.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn should_attach_device_to_zone() {
        let pool = setup().await;
        let zones = SqliteZoneRepository::new(pool.clone());
        let devices = SqliteDeviceStore::new(pool);
        let zone = zones
            .create(Zone::builder().name("Hallway").build().unwrap())
            .await
            .unwrap();

        let device = Device::builder()
            .key(DeviceKey::new(SourceProtocol::Xiaomi, "158d0001"))
            .zone_id(zone.id)
            .build()
            .unwrap();
        let saved = devices.save(&device).await.unwrap();

        assert_eq!(saved.zone_id, Some(zone.id));
    }
}
