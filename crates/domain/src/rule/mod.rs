//! Rule: a named binding of event triggers to an automation script.
//!
//! Rules are built once at startup from external [`RuleDefinition`]s and are
//! read-only afterwards. Each rule has one or more [`EventTrigger`]s; when
//! any of them accepts an [`Event`], the rule's script runs.

mod definition;
mod event;
mod trigger;

pub use definition::{RuleDefinition, TriggerDefinition};
pub use event::Event;
pub use trigger::{EventTrigger, TriggerType};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::RuleId;
use crate::schedule::Schedule;

/// Opaque reference to an automation script, resolved by the script engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptRef(String);

impl ScriptRef {
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded automation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub triggers: Vec<EventTrigger>,
    pub script: ScriptRef,
}

impl Rule {
    /// Create a builder for constructing a [`Rule`].
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] or [`ValidationError::NoTriggers`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.triggers.is_empty() {
            return Err(ValidationError::NoTriggers);
        }
        Ok(())
    }

    /// Whether any of this rule's triggers accepts `event`.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.triggers.iter().any(|t| t.evaluate(event))
    }

    /// Schedules of this rule's time triggers.
    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.triggers.iter().filter_map(EventTrigger::schedule)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Step-by-step builder for [`Rule`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    triggers: Vec<EventTrigger>,
    script: Option<ScriptRef>,
}

impl RuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: EventTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(ScriptRef::new(script));
        self
    }

    /// Consume the builder, validate, and return a [`Rule`].
    ///
    /// The script reference defaults to the rule name.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if the name is empty or no trigger
    /// was added.
    pub fn build(self) -> Result<Rule, HubError> {
        let name = self.name.unwrap_or_default();
        let rule = Rule {
            id: self.id.unwrap_or_default(),
            script: self.script.unwrap_or_else(|| ScriptRef::new(name.clone())),
            name,
            triggers: self.triggers,
        };
        rule.validate()?;
        Ok(rule)
    }
}
