//! # homebus-adapter-xiaomi
//!
//! Xiaomi gateway adapter: listens for gateway UDP reports and turns them
//! into device registry updates and bus events, and writes device commands
//! back to the gateway.
//!
//! ## Published topics
//!
//! | Topic | Payload | When |
//! |-------|---------|------|
//! | `event.device.added` | `DeviceAdded` | first report of a `sid` |
//! | `event.device.updated` | `DeviceUpdated` | device type classified from the model |
//! | `event.device.temperature` / `.humidity` | change | reading changed |
//! | `event.device.doorsensor.<status>` | change of `opened` | door status changed |
//! | `event.device.motion` | change of `motion` | every detection |
//! | `event.device.leak` / `.button` | change | value changed |
//! | `event.device.<on\|off>` | change of `level` | switch channel changed |
//! | `event.device.battery` | `BatteryLow` | battery at or below 20 % |
//! | `event.device.voltage` | change of `voltage` | voltage changed |
//!
//! ## Subscribed topics
//!
//! | Topic | Payload | Effect |
//! |-------|---------|--------|
//! | `command.device`, `command.device.*` | `DeviceCommandEvent` for `xiaomi` | `TurnOn` / `TurnOff` written to `channel_0` or `channel_<subchannel-1>` |
//!
//! ## Dependency rule
//!
//! Depends on `homebus-app` (port traits, registry) and `homebus-domain` only.

pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod model;

pub use command::CommandWriter;
pub use config::XiaomiConfig;
pub use error::XiaomiError;
pub use handler::ReportHandler;
