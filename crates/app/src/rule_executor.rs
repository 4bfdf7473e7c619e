//! Rule executor: runs the scripts of matched rules.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use homebus_domain::error::ScriptError;
use homebus_domain::id::RuleId;
use homebus_domain::rule::{Event, Rule, ScriptRef};

use crate::ports::{EventPublisher, RegistryQuery, ScriptContext, ScriptEngine};

/// Outcome of one batch of rule executions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: Vec<RuleId>,
    pub failed: Vec<RuleId>,
}

impl ExecutionReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.failed.is_empty()
    }
}

/// Runs rule scripts through a [`ScriptEngine`], with a compiled-script cache.
///
/// Every script sees the same context shape: the event, its device, a
/// read-only registry view, and the publisher it may emit commands through.
pub struct RuleExecutor<E: ScriptEngine, Q, P> {
    engine: E,
    registry: Q,
    publisher: P,
    cache: Mutex<HashMap<ScriptRef, Arc<E::Script>>>,
}

impl<E, Q, P> RuleExecutor<E, Q, P>
where
    E: ScriptEngine,
    Q: RegistryQuery,
    P: EventPublisher,
{
    pub fn new(engine: E, registry: Q, publisher: P) -> Self {
        Self {
            engine,
            registry,
            publisher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run `rules` in order for `event`.
    ///
    /// A failing or panicking script is logged and recorded in the report;
    /// the remaining rules still run.
    #[tracing::instrument(skip_all, fields(trigger = %event.trigger_type, rules = rules.len()))]
    pub fn execute_rules(&self, rules: &[Arc<Rule>], event: &Event) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for rule in rules {
            match self.execute(rule, event) {
                Ok(()) => {
                    tracing::debug!(rule = %rule.name, "rule executed");
                    report.executed.push(rule.id);
                }
                Err(err) => {
                    tracing::error!(rule = %rule.name, error = %err, "rule failed");
                    report.failed.push(rule.id);
                }
            }
        }
        report
    }

    fn execute(&self, rule: &Rule, event: &Event) -> Result<(), ScriptError> {
        let script = self.script(&rule.script)?;
        let ctx = ScriptContext {
            rule,
            event,
            device: event.device.as_ref(),
            registry: &self.registry,
            publisher: &self.publisher,
        };
        catch_unwind(AssertUnwindSafe(|| self.engine.run(&script, &ctx)))
            .unwrap_or_else(|_| Err(ScriptError::Panicked(rule.script.to_string())))
    }

    fn script(&self, reference: &ScriptRef) -> Result<Arc<E::Script>, ScriptError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned();
        if let Some(script) = cached {
            return Ok(script);
        }

        let compiled = catch_unwind(AssertUnwindSafe(|| self.engine.compile(reference)))
            .unwrap_or_else(|_| Err(ScriptError::Panicked(reference.to_string())))?;
        tracing::debug!(script = %reference, "script compiled");
        let compiled = Arc::new(compiled);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.clone(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use homebus_domain::bus::BusMessage;
    use homebus_domain::device::{Device, DeviceKey};
    use homebus_domain::error::HubError;
    use homebus_domain::protocol::SourceProtocol;
    use homebus_domain::rule::EventTrigger;
    use homebus_domain::topic::Topic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripts whose behaviour is chosen by their reference.
    #[derive(Default)]
    pub(crate) struct FakeEngine {
        pub(crate) compiles: AtomicUsize,
        pub(crate) runs: Mutex<Vec<String>>,
    }

    impl ScriptEngine for FakeEngine {
        type Script = String;

        fn compile(&self, reference: &ScriptRef) -> Result<String, ScriptError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            match reference.as_str() {
                "missing" => Err(ScriptError::NotFound(reference.to_string())),
                other => Ok(other.to_string()),
            }
        }

        fn run(&self, script: &String, ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
            self.runs.lock().unwrap().push(script.clone());
            match script.as_str() {
                "fail" => Err(ScriptError::Runtime {
                    reference: script.clone(),
                    message: "boom".into(),
                }),
                "panic" => panic!("script exploded"),
                "command" => {
                    let device = ctx.device.map(Device::key).ok_or_else(|| ScriptError::Runtime {
                        reference: script.clone(),
                        message: "no device".into(),
                    })?;
                    ctx.publisher
                        .publish(
                            Topic::new("command.device.noolite").unwrap(),
                            BusMessage::command(&device, "TurnOn", serde_json::json!({})),
                        )
                        .map_err(|err| ScriptError::Runtime {
                            reference: script.clone(),
                            message: err.to_string(),
                        })
                }
                _ => Ok(()),
            }
        }
    }

    pub(crate) struct EmptyRegistry;

    impl RegistryQuery for EmptyRegistry {
        fn device(&self, _key: &DeviceKey) -> Option<Device> {
            None
        }

        fn devices_by_protocol(&self, _protocol: SourceProtocol) -> Vec<Device> {
            Vec::new()
        }

        fn current_value(&self, _key: &DeviceKey, _value_name: &str) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    pub(crate) struct SpyPublisher {
        pub(crate) published: Mutex<Vec<(Topic, BusMessage)>>,
    }

    impl EventPublisher for SpyPublisher {
        fn publish(&self, topic: Topic, message: BusMessage) -> Result<(), HubError> {
            self.published.lock().unwrap().push((topic, message));
            Ok(())
        }
    }

    fn rule(script: &str) -> Arc<Rule> {
        Arc::new(
            Rule::builder()
                .name(format!("rule_{script}"))
                .script(script)
                .trigger(EventTrigger::Startup)
                .build()
                .unwrap(),
        )
    }

    fn make_executor() -> RuleExecutor<FakeEngine, EmptyRegistry, SpyPublisher> {
        RuleExecutor::new(FakeEngine::default(), EmptyRegistry, SpyPublisher::default())
    }

    #[test]
    fn should_run_rules_in_order() {
        let executor = make_executor();
        let rules = vec![rule("a"), rule("b"), rule("c")];

        let report = executor.execute_rules(&rules, &Event::startup());

        assert_eq!(report.executed.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(*executor.engine.runs.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn should_continue_batch_after_failing_rule() {
        let executor = make_executor();
        let failing = rule("fail");
        let next = rule("ok");

        let report = executor.execute_rules(&[Arc::clone(&failing), Arc::clone(&next)], &Event::startup());

        assert_eq!(report.failed, vec![failing.id]);
        assert_eq!(report.executed, vec![next.id]);
    }

    #[test]
    fn should_contain_script_panic() {
        let executor = make_executor();
        let exploding = rule("panic");
        let next = rule("ok");

        let report =
            executor.execute_rules(&[Arc::clone(&exploding), Arc::clone(&next)], &Event::startup());

        assert_eq!(report.failed, vec![exploding.id]);
        assert_eq!(report.executed, vec![next.id]);
    }

    #[test]
    fn should_compile_each_script_once() {
        let executor = make_executor();
        let rules = vec![rule("a"), rule("a")];

        executor.execute_rules(&rules, &Event::startup());
        executor.execute_rules(&rules, &Event::startup());

        assert_eq!(executor.engine.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(executor.engine.runs.lock().unwrap().len(), 4);
    }

    #[test]
    fn should_retry_compilation_after_failure() {
        let executor = make_executor();
        let rules = vec![rule("missing")];

        let first = executor.execute_rules(&rules, &Event::startup());
        let second = executor.execute_rules(&rules, &Event::startup());

        assert_eq!(first.failed.len(), 1);
        assert_eq!(second.failed.len(), 1);
        assert_eq!(executor.engine.compiles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_let_scripts_publish_commands() {
        let executor = make_executor();
        let device = Device::builder()
            .key(DeviceKey::new(SourceProtocol::Noolite, "5"))
            .build()
            .unwrap();

        let report = executor.execute_rules(&[rule("command")], &Event::change(device, None));

        assert_eq!(report.executed.len(), 1);
        let published = executor.publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.as_str(), "command.device.noolite");
    }

    #[test]
    fn should_return_empty_report_for_no_rules() {
        let executor = make_executor();
        assert!(executor.execute_rules(&[], &Event::startup()).is_empty());
    }
}
