//! # homebus-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement (driven/outbound ports):
//!   - `DeviceStore`: durable devices and value histories
//!   - `ZoneRepository`: CRUD for zones
//!   - `ScriptEngine`: compile and run automation scripts
//!   - `EventPublisher` / `EventHandler`: bus publishing and subscription
//! - Provide the core services:
//!   - `DeviceRegistry`: canonical device records, value histories
//!   - `TriggerRegistry`: loaded rules, event matching
//!   - `RuleExecutor` / `RuleEngine`: run matched rules' scripts
//!   - `TimerScheduler`: schedule ticks as timer events
//!   - `HistoryPruner`: periodic history retention
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `homebus-domain` only (plus tokio for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod history_pruner;
pub mod ports;
pub mod rule_engine;
pub mod rule_executor;
pub mod scheduler;
pub mod services;
pub mod trigger_registry;
