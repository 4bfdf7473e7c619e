//! Script documents and their compiled form.
//!
//! ```toml
//! [[action]]
//! type = "log"
//! message = "motion on {device} ({trigger})"
//!
//! [[action]]
//! type = "publish_command"
//! topic = "command.device.noolite"
//! protocol = "noolite"
//! channel = "5"
//! label = "TurnOn"
//! data = { level = 100 }
//! when = { device = "xiaomi/channel/158d0001", value = "opened", equals = "true" }
//! ```

use serde::Deserialize;

use homebus_domain::device::DeviceKey;
use homebus_domain::error::ValidationError;
use homebus_domain::topic::Topic;

/// Raw document as written on disk.
#[derive(Debug, Deserialize)]
pub(crate) struct ScriptFile {
    #[serde(default, rename = "action")]
    pub(crate) actions: Vec<ActionDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ActionDefinition {
    PublishCommand {
        topic: String,
        protocol: String,
        channel: String,
        label: String,
        #[serde(default)]
        data: Option<serde_json::Value>,
        #[serde(default)]
        when: Option<ConditionDefinition>,
    },
    Log {
        message: String,
        #[serde(default)]
        when: Option<ConditionDefinition>,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConditionDefinition {
    device: String,
    value: String,
    equals: String,
}

/// A value the registry must currently hold for an action to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub device: DeviceKey,
    pub value: String,
    pub equals: String,
}

/// One step of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PublishCommand {
        topic: Topic,
        device: DeviceKey,
        label: String,
        data: serde_json::Value,
    },
    /// Message with `{device}`, `{trigger}` and `{rule}` placeholders.
    Log { message: String },
}

/// A parsed, validated script.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    pub reference: String,
    pub actions: Vec<(Action, Option<Condition>)>,
}

impl ConditionDefinition {
    fn compile(self) -> Result<Condition, ValidationError> {
        if self.value.is_empty() {
            return Err(ValidationError::EmptyValueName);
        }
        Ok(Condition {
            device: self.device.parse()?,
            value: self.value,
            equals: self.equals,
        })
    }
}

impl ActionDefinition {
    pub(crate) fn compile(self) -> Result<(Action, Option<Condition>), ValidationError> {
        match self {
            Self::PublishCommand {
                topic,
                protocol,
                channel,
                label,
                data,
                when,
            } => {
                let topic = Topic::new(topic)?;
                if !topic.as_str().starts_with("command.") {
                    return Err(ValidationError::InvalidTopic(topic.to_string()));
                }
                if channel.is_empty() {
                    return Err(ValidationError::EmptyChannel);
                }
                let action = Action::PublishCommand {
                    topic,
                    device: DeviceKey::new(protocol.parse()?, channel),
                    label,
                    data: data.unwrap_or_else(|| serde_json::json!({})),
                };
                Ok((action, when.map(ConditionDefinition::compile).transpose()?))
            }
            Self::Log { message, when } => Ok((
                Action::Log { message },
                when.map(ConditionDefinition::compile).transpose()?,
            )),
        }
    }
}

/// Substitute the `{device}`, `{trigger}` and `{rule}` placeholders.
pub(crate) fn expand(template: &str, device: &str, trigger: &str, rule: &str) -> String {
    template
        .replace("{device}", device)
        .replace("{trigger}", trigger)
        .replace("{rule}", rule)
}
