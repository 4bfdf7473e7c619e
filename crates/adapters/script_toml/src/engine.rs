//! [`ScriptEngine`] over a directory of TOML scripts.

use std::path::{Path, PathBuf};

use homebus_app::ports::{ScriptContext, ScriptEngine};
use homebus_domain::bus::BusMessage;
use homebus_domain::device::Device;
use homebus_domain::error::ScriptError;
use homebus_domain::rule::ScriptRef;

use crate::error::ScriptFileError;
use crate::script::{Action, CompiledScript, Condition, ScriptFile, expand};

const EXTENSION: &str = "toml";

/// Resolves a script reference `name` to `<dir>/name.toml`.
#[derive(Debug, Clone)]
pub struct TomlScriptEngine {
    dir: PathBuf,
}

impl TomlScriptEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self, reference: &str) -> Result<CompiledScript, ScriptFileError> {
        let is_stem = !reference.is_empty()
            && !reference.starts_with('.')
            && !reference.contains(['/', '\\']);
        if !is_stem {
            return Err(ScriptFileError::InvalidReference(reference.to_string()));
        }

        let path = self.dir.join(format!("{reference}.{EXTENSION}"));
        let raw = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ScriptFileError::Missing {
                    reference: reference.to_string(),
                    path: path.clone(),
                }
            } else {
                ScriptFileError::Read {
                    reference: reference.to_string(),
                    source,
                }
            }
        })?;

        let file: ScriptFile = toml::from_str(&raw).map_err(|source| ScriptFileError::Parse {
            reference: reference.to_string(),
            source,
        })?;
        let actions = file
            .actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                action
                    .compile()
                    .map_err(|source| ScriptFileError::InvalidAction {
                        reference: reference.to_string(),
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(script = reference, path = %path.display(), actions = actions.len(), "script loaded");
        Ok(CompiledScript {
            reference: reference.to_string(),
            actions,
        })
    }
}

fn holds(condition: &Condition, ctx: &ScriptContext<'_>) -> bool {
    ctx.registry
        .current_value(&condition.device, &condition.value)
        .is_some_and(|current| current == condition.equals)
}

impl ScriptEngine for TomlScriptEngine {
    type Script = CompiledScript;

    fn compile(&self, reference: &ScriptRef) -> Result<CompiledScript, ScriptError> {
        Ok(self.load(reference.as_str())?)
    }

    fn run(&self, script: &CompiledScript, ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
        let device = ctx
            .device
            .map_or_else(|| "-".to_string(), |d: &Device| d.key().to_string());
        let trigger = ctx.event.trigger_type.to_string();

        for (action, condition) in &script.actions {
            if let Some(condition) = condition
                && !holds(condition, ctx)
            {
                tracing::debug!(script = %script.reference, device = %condition.device, value = %condition.value, "condition not met, action skipped");
                continue;
            }
            match action {
                Action::Log { message } => {
                    let message = expand(message, &device, &trigger, &ctx.rule.name);
                    tracing::info!(rule = %ctx.rule.name, script = %script.reference, "{message}");
                }
                Action::PublishCommand {
                    topic,
                    device: target,
                    label,
                    data,
                } => {
                    ctx.publisher
                        .publish(topic.clone(), BusMessage::command(target, label.clone(), data.clone()))
                        .map_err(|err| ScriptError::Runtime {
                            reference: script.reference.clone(),
                            message: err.to_string(),
                        })?;
                    tracing::debug!(script = %script.reference, %topic, device = %target, label, "command published");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use homebus_app::ports::{EventPublisher, RegistryQuery};
    use homebus_domain::device::DeviceKey;
    use homebus_domain::error::HubError;
    use homebus_domain::id::RuleId;
    use homebus_domain::protocol::SourceProtocol;
    use homebus_domain::rule::{Event, EventTrigger, Rule};
    use homebus_domain::topic::Topic;

    struct ScriptDir(PathBuf);

    impl ScriptDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("homebus-scripts-{}", RuleId::new()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.0.join(format!("{name}.toml")), content).unwrap();
        }
    }

    impl Drop for ScriptDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[derive(Default)]
    struct Spy(Mutex<Vec<(Topic, BusMessage)>>);

    impl EventPublisher for Spy {
        fn publish(&self, topic: Topic, message: BusMessage) -> Result<(), HubError> {
            self.0.lock().unwrap().push((topic, message));
            Ok(())
        }
    }

    struct Closed;

    impl EventPublisher for Closed {
        fn publish(&self, _topic: Topic, _message: BusMessage) -> Result<(), HubError> {
            Err(HubError::BusClosed)
        }
    }

    /// Registry holding a single `opened` value for one door sensor.
    struct Door(Option<&'static str>);

    impl RegistryQuery for Door {
        fn device(&self, _key: &DeviceKey) -> Option<Device> {
            None
        }

        fn devices_by_protocol(&self, _protocol: SourceProtocol) -> Vec<Device> {
            Vec::new()
        }

        fn current_value(&self, key: &DeviceKey, value_name: &str) -> Option<String> {
            (key.channel == "158d0001" && value_name == "opened")
                .then(|| self.0.map(str::to_string))
                .flatten()
        }
    }

    const DOOR_SCRIPT: &str = r#"
        [[action]]
        type = "log"
        message = "{trigger} from {device}"

        [[action]]
        type = "publish_command"
        topic = "command.device.noolite"
        protocol = "noolite"
        channel = "5"
        label = "TurnOn"
        when = { device = "xiaomi/channel/158d0001", value = "opened", equals = "true" }
    "#;

    fn rule() -> Rule {
        Rule::builder()
            .name("hall_light")
            .trigger(EventTrigger::Startup)
            .build()
            .unwrap()
    }

    fn run(
        engine: &TomlScriptEngine,
        script: &CompiledScript,
        registry: &dyn RegistryQuery,
        publisher: &dyn EventPublisher,
    ) -> Result<(), ScriptError> {
        let rule = rule();
        let event = Event::startup();
        let ctx = ScriptContext {
            rule: &rule,
            event: &event,
            device: None,
            registry,
            publisher,
        };
        engine.run(script, &ctx)
    }

    #[test]
    fn should_compile_script_from_directory() {
        let dir = ScriptDir::new();
        dir.write("hall_light", DOOR_SCRIPT);
        let engine = TomlScriptEngine::new(&dir.0);

        let script = engine.compile(&ScriptRef::new("hall_light")).unwrap();

        assert_eq!(script.reference, "hall_light");
        assert_eq!(script.actions.len(), 2);
    }

    #[test]
    fn should_report_missing_script_as_not_found() {
        let dir = ScriptDir::new();
        let engine = TomlScriptEngine::new(&dir.0);

        let result = engine.compile(&ScriptRef::new("absent"));
        assert!(matches!(result, Err(ScriptError::NotFound(_))));
    }

    #[test]
    fn should_refuse_references_leaving_the_directory() {
        let engine = TomlScriptEngine::new(std::env::temp_dir());
        for reference in ["../etc/passwd", "a/b", ".hidden", ""] {
            let result = engine.compile(&ScriptRef::new(reference));
            assert!(matches!(result, Err(ScriptError::NotFound(_))), "{reference}");
        }
    }

    #[test]
    fn should_report_malformed_script_as_compile_error() {
        let dir = ScriptDir::new();
        dir.write("broken", "[[action]]\ntype = \"explode\"\n");
        let engine = TomlScriptEngine::new(&dir.0);

        let result = engine.compile(&ScriptRef::new("broken"));
        assert!(matches!(result, Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn should_publish_command_when_condition_holds() {
        let dir = ScriptDir::new();
        dir.write("hall_light", DOOR_SCRIPT);
        let engine = TomlScriptEngine::new(&dir.0);
        let script = engine.compile(&ScriptRef::new("hall_light")).unwrap();
        let spy = Spy::default();

        run(&engine, &script, &Door(Some("true")), &spy).unwrap();

        let published = spy.0.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.as_str(), "command.device.noolite");
        assert_eq!(
            published[0].1,
            BusMessage::command(
                &DeviceKey::new(SourceProtocol::Noolite, "5"),
                "TurnOn",
                serde_json::json!({})
            )
        );
    }

    #[test]
    fn should_skip_action_when_condition_fails() {
        let dir = ScriptDir::new();
        dir.write("hall_light", DOOR_SCRIPT);
        let engine = TomlScriptEngine::new(&dir.0);
        let script = engine.compile(&ScriptRef::new("hall_light")).unwrap();
        let spy = Spy::default();

        run(&engine, &script, &Door(Some("false")), &spy).unwrap();
        run(&engine, &script, &Door(None), &spy).unwrap();

        assert!(spy.0.lock().unwrap().is_empty());
    }

    #[test]
    fn should_fail_when_command_cannot_be_published() {
        let dir = ScriptDir::new();
        dir.write("hall_light", DOOR_SCRIPT);
        let engine = TomlScriptEngine::new(&dir.0);
        let script = engine.compile(&ScriptRef::new("hall_light")).unwrap();

        let result = run(&engine, &script, &Door(Some("true")), &Closed);
        assert!(matches!(result, Err(ScriptError::Runtime { .. })));
    }
}
