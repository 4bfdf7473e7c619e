//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod event_bus;
pub mod registry_query;
pub mod schedule;
pub mod script;
pub mod storage;

pub use event_bus::{Delivery, EventHandler, EventPublisher};
pub use registry_query::RegistryQuery;
pub use schedule::ScheduleRegistrar;
pub use script::{ScriptContext, ScriptEngine};
pub use storage::{DeviceStore, ZoneRepository};
