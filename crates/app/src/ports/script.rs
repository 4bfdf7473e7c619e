//! Script engine port: runs the automation script bound to a rule.

use homebus_domain::device::Device;
use homebus_domain::error::ScriptError;
use homebus_domain::rule::{Event, Rule, ScriptRef};

use crate::ports::{EventPublisher, RegistryQuery};

/// Everything a script can see while it runs.
///
/// Scripts only read the registry; their sole side effect is publishing
/// events (typically commands) through `publisher`.
pub struct ScriptContext<'a> {
    pub rule: &'a Rule,
    pub event: &'a Event,
    pub device: Option<&'a Device>,
    pub registry: &'a dyn RegistryQuery,
    pub publisher: &'a dyn EventPublisher,
}

/// Compiles and runs automation scripts.
///
/// Compiled scripts are cached by the caller per [`ScriptRef`], so
/// `compile` runs once per reference unless it fails.
pub trait ScriptEngine: Send + Sync {
    type Script: Send + Sync;

    /// Resolve and compile the script behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::NotFound`] or [`ScriptError::Compile`].
    fn compile(&self, reference: &ScriptRef) -> Result<Self::Script, ScriptError>;

    /// Run a compiled script.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Runtime`] when the script fails.
    fn run(&self, script: &Self::Script, ctx: &ScriptContext<'_>) -> Result<(), ScriptError>;
}
