//! # homebusd
//!
//! Composition root that wires all adapters together and runs the hub.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Warm the device registry from storage
//! - Load rules, register their schedules, and subscribe the rule engine to the bus
//! - Start the timer scheduler, the history pruner and the protocol listeners
//! - Fire startup rules once everything is wired
//! - Drain the bus and stop the background tasks on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod rules;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use homebus_adapter_script_toml::TomlScriptEngine;
use homebus_adapter_storage_sqlite_sqlx::device_store::SqliteDeviceStore;
use homebus_adapter_storage_sqlite_sqlx::pool::Config as StorageConfig;
use homebus_adapter_storage_sqlite_sqlx::zone_repo::SqliteZoneRepository;
use homebus_adapter_xiaomi::{CommandWriter, ReportHandler, listener};
use homebus_app::event_bus::InProcessEventBus;
use homebus_app::history_pruner::HistoryPruner;
use homebus_app::ports::ZoneRepository;
use homebus_app::rule_engine::RuleEngine;
use homebus_app::scheduler::TimerScheduler;
use homebus_app::services::device_registry::DeviceRegistry;
use homebus_app::trigger_registry::TriggerRegistry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading homebus.toml")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("opening database")?;
    let pool = db.pool().clone();

    // Registry
    let registry = Arc::new(DeviceRegistry::new(SqliteDeviceStore::new(pool.clone())));
    registry.load().await?;
    let zones = SqliteZoneRepository::new(pool).get_all().await?;
    tracing::info!(zones = zones.len(), "zones loaded");

    // Event bus
    let bus = Arc::new(InProcessEventBus::new());

    // Rules
    let definitions = rules::load(&config.rules.path)?;
    let mut scheduler = TimerScheduler::new();
    let triggers = TriggerRegistry::load(definitions, &mut scheduler);
    let engine = Arc::new(RuleEngine::new(
        triggers,
        TomlScriptEngine::new(&config.rules.scripts_dir),
        Arc::clone(&registry),
        Arc::clone(&bus),
    ));
    engine.subscribe(&bus)?;

    let timer_engine = Arc::clone(&engine);
    scheduler.start(move |event| {
        timer_engine.dispatch(&event);
    });

    // Background tasks
    let pruner = HistoryPruner::new(
        Arc::clone(&registry),
        config.history.retention(),
        config.history.prune_interval(),
    )
    .spawn();

    let xiaomi = if config.xiaomi.enabled {
        let socket = Arc::new(
            listener::bind(&config.xiaomi)
                .await
                .context("binding xiaomi gateway socket")?,
        );
        Arc::new(CommandWriter::new(Arc::clone(&socket), config.xiaomi.gateway)).subscribe(&bus)?;
        let handler = Arc::new(ReportHandler::new(Arc::clone(&registry), Arc::clone(&bus)));
        Some(listener::spawn(socket, handler))
    } else {
        tracing::info!("xiaomi listener disabled");
        None
    };

    engine.run_startup_rules();
    tracing::info!("homebusd running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    if let Some(xiaomi) = xiaomi {
        xiaomi.abort();
    }
    pruner.abort();
    scheduler.shutdown().await;
    bus.shutdown().await;

    Ok(())
}
