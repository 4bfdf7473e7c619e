//! # homebus-adapter-script-toml
//!
//! Reference [`ScriptEngine`](homebus_app::ports::ScriptEngine): each rule
//! script is a TOML file of declarative actions.
//!
//! ## Actions
//!
//! | `type` | Fields | Effect |
//! |--------|--------|--------|
//! | `publish_command` | `topic`, `protocol`, `channel`, `label`, `data` | Publishes a `DeviceCommandEvent` |
//! | `log` | `message` | Logs the message with `{device}`, `{trigger}` and `{rule}` expanded |
//!
//! Either action may carry `when = { device, value, equals }`; it then only
//! runs while the registry holds that current value.
//!
//! ## Dependency rule
//!
//! Depends on `homebus-app` (port traits) and `homebus-domain` only.

mod engine;
pub mod error;
mod script;

pub use engine::TomlScriptEngine;
pub use error::ScriptFileError;
pub use script::{Action, CompiledScript, Condition};
