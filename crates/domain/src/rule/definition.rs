//! Raw rule definitions as read from configuration.
//!
//! Identities and schedules are plain strings here; [`RuleDefinition::into_rule`]
//! parses them and enforces the rule invariants.
//!
//! ```toml
//! [[rule]]
//! name = "hall_light"
//! script = "hall_light_on"
//!
//! [[rule.trigger]]
//! type = "change"
//! device = "xiaomi/channel/55"
//! value = "motion"
//! ```

use serde::{Deserialize, Serialize};

use crate::device::DeviceKey;
use crate::error::{ConfigurationError, ValidationError};
use crate::id::RuleId;
use crate::rule::{EventTrigger, Rule, ScriptRef};
use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    /// Script reference; the rule name is used when absent.
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerDefinition {
    Change {
        device: String,
        #[serde(default)]
        value: Option<String>,
    },
    Command {
        device: String,
    },
    Startup,
    Time {
        schedule: String,
    },
}

impl TriggerDefinition {
    fn parse(&self, rule: &str) -> Result<EventTrigger, ConfigurationError> {
        let device_key = |raw: &str| {
            raw.parse::<DeviceKey>()
                .map_err(|source| ConfigurationError::InvalidRule {
                    rule: rule.to_string(),
                    source,
                })
        };

        Ok(match self {
            Self::Change { device, value } => EventTrigger::Change {
                device: device_key(device)?,
                value: value.clone().filter(|v| !v.is_empty()),
            },
            Self::Command { device } => EventTrigger::Command {
                device: device_key(device)?,
            },
            Self::Startup => EventTrigger::Startup,
            Self::Time { schedule } => EventTrigger::Time {
                schedule: Schedule::parse(schedule)?,
            },
        })
    }
}

impl RuleDefinition {
    /// Parse identities and schedules and validate the resulting [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchedule`] for a malformed
    /// schedule and [`ConfigurationError::InvalidRule`] for a malformed
    /// identity, an empty name, or a rule without triggers.
    pub fn into_rule(self) -> Result<Rule, ConfigurationError> {
        let triggers = self
            .triggers
            .iter()
            .map(|t| t.parse(&self.name))
            .collect::<Result<Vec<_>, _>>()?;
        let script = self
            .script
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name.clone());

        let rule = Rule {
            id: RuleId::new(),
            name: self.name,
            triggers,
            script: ScriptRef::new(script),
        };
        rule.validate()
            .map_err(|source: ValidationError| ConfigurationError::InvalidRule {
                rule: rule.name.clone(),
                source,
            })?;
        Ok(rule)
    }
}
