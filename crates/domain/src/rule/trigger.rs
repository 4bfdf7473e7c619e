//! Trigger: the event pattern that activates a rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceKey;
use crate::rule::Event;
use crate::schedule::Schedule;

/// Why an [`Event`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Change,
    Command,
    Startup,
    Timer,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Change => "CHANGE",
            Self::Command => "COMMAND",
            Self::Startup => "STARTUP",
            Self::Timer => "TIMER",
        })
    }
}

/// Describes which events activate a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTrigger {
    /// Fires when the bound device changes, optionally only for one value.
    Change {
        device: DeviceKey,
        value: Option<String>,
    },
    /// Fires when a command is addressed to the bound device.
    Command { device: DeviceKey },
    /// Fires once after the engine initialized.
    Startup,
    /// Fires whenever `schedule` ticks.
    Time { schedule: Schedule },
}

impl EventTrigger {
    /// Check whether this trigger accepts `event`.
    ///
    /// Device-bound triggers compare the event device's identity; an event
    /// without a device never matches them.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> bool {
        let device_is = |bound: &DeviceKey| {
            event
                .device
                .as_ref()
                .is_some_and(|device| device.protocol == bound.protocol && device.channel == bound.channel)
        };

        match self {
            Self::Change { device, value } => {
                if event.trigger_type != TriggerType::Change || !device_is(device) {
                    return false;
                }
                match value {
                    Some(expected) => event.value_name.as_deref() == Some(expected.as_str()),
                    None => true,
                }
            }
            Self::Command { device } => {
                event.trigger_type == TriggerType::Command && device_is(device)
            }
            Self::Startup => event.trigger_type == TriggerType::Startup,
            Self::Time { schedule } => {
                event.trigger_type == TriggerType::Timer && event.schedule.as_ref() == Some(schedule)
            }
        }
    }

    /// The schedule of a [`EventTrigger::Time`] trigger.
    #[must_use]
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Self::Time { schedule } => Some(schedule),
            _ => None,
        }
    }
}

impl fmt::Display for EventTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change {
                device,
                value: Some(value),
            } => write!(f, "change({device}#{value})"),
            Self::Change { device, value: None } => write!(f, "change({device})"),
            Self::Command { device } => write!(f, "command({device})"),
            Self::Startup => f.write_str("startup"),
            Self::Time { schedule } => write!(f, "time({schedule})"),
        }
    }
}
