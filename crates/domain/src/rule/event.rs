//! Runtime event handed to rule execution.

use crate::device::Device;
use crate::rule::TriggerType;
use crate::schedule::Schedule;

/// One firing: why rules are being evaluated, and about which device.
///
/// Created per dispatch and discarded once the matching rules have run.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub trigger_type: TriggerType,
    pub device: Option<Device>,
    /// Name of the value that changed, for value-level change notifications.
    pub value_name: Option<String>,
    /// The schedule that ticked, for timer firings.
    pub schedule: Option<Schedule>,
}

impl Event {
    /// A device (or one of its values) changed.
    #[must_use]
    pub fn change(device: impl Into<Option<Device>>, value_name: Option<String>) -> Self {
        Self {
            trigger_type: TriggerType::Change,
            device: device.into(),
            value_name,
            schedule: None,
        }
    }

    /// A command was issued to a device.
    #[must_use]
    pub fn command(device: impl Into<Option<Device>>) -> Self {
        Self {
            trigger_type: TriggerType::Command,
            device: device.into(),
            value_name: None,
            schedule: None,
        }
    }

    /// The engine finished initializing.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            trigger_type: TriggerType::Startup,
            device: None,
            value_name: None,
            schedule: None,
        }
    }

    /// A schedule ticked.
    #[must_use]
    pub fn timer(schedule: Schedule) -> Self {
        Self {
            trigger_type: TriggerType::Timer,
            device: None,
            value_name: None,
            schedule: Some(schedule),
        }
    }
}
