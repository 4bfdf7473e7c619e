//! Trigger registry: the immutable set of loaded rules and event matching.

use std::sync::Arc;

use homebus_domain::error::ConfigurationError;
use homebus_domain::rule::{Event, Rule, RuleDefinition};

use crate::ports::ScheduleRegistrar;

/// Rules loaded at startup, matched against runtime events.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    rules: Vec<Arc<Rule>>,
    rejected: Vec<ConfigurationError>,
}

impl TriggerRegistry {
    /// Build the registry from raw definitions.
    ///
    /// A malformed definition rejects only itself; the error is logged and
    /// kept in [`rejected`](Self::rejected). Every distinct schedule of the
    /// accepted rules is handed to `registrar`.
    pub fn load(
        definitions: impl IntoIterator<Item = RuleDefinition>,
        registrar: &mut impl ScheduleRegistrar,
    ) -> Self {
        let mut registry = Self::default();
        let mut schedules = Vec::new();

        for definition in definitions {
            let name = definition.name.clone();
            match definition.into_rule() {
                Ok(rule) => {
                    for schedule in rule.schedules() {
                        if !schedules.contains(schedule) {
                            schedules.push(schedule.clone());
                        }
                    }
                    tracing::debug!(rule = %rule, triggers = rule.triggers.len(), "rule loaded");
                    registry.rules.push(Arc::new(rule));
                }
                Err(err) => {
                    tracing::error!(rule = %name, error = %err, "rule rejected");
                    registry.rejected.push(err);
                }
            }
        }

        for schedule in schedules {
            registrar.register(schedule);
        }
        tracing::info!(
            loaded = registry.rules.len(),
            rejected = registry.rejected.len(),
            "rules loaded"
        );
        registry
    }

    /// Every rule with at least one trigger accepting `event`, in load order.
    #[must_use]
    pub fn get_rules(&self, event: &Event) -> Vec<Arc<Rule>> {
        self.rules
            .iter()
            .filter(|rule| rule.accepts(event))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Errors of the definitions that failed to load.
    #[must_use]
    pub fn rejected(&self) -> &[ConfigurationError] {
        &self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homebus_domain::device::{Device, DeviceKey};
    use homebus_domain::protocol::SourceProtocol;
    use homebus_domain::rule::TriggerDefinition;
    use homebus_domain::schedule::Schedule;

    #[derive(Default)]
    struct RecordingRegistrar {
        schedules: Vec<Schedule>,
    }

    impl ScheduleRegistrar for RecordingRegistrar {
        fn register(&mut self, schedule: Schedule) {
            self.schedules.push(schedule);
        }
    }

    fn change_rule(name: &str, device: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.into(),
            script: None,
            triggers: vec![TriggerDefinition::Change {
                device: device.into(),
                value: None,
            }],
        }
    }

    fn time_rule(name: &str, schedule: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.into(),
            script: None,
            triggers: vec![TriggerDefinition::Time {
                schedule: schedule.into(),
            }],
        }
    }

    fn device(protocol: SourceProtocol, channel: &str) -> Device {
        Device::builder()
            .key(DeviceKey::new(protocol, channel))
            .build()
            .unwrap()
    }

    #[test]
    fn should_return_matching_rules_in_load_order() {
        let mut registrar = RecordingRegistrar::default();
        let registry = TriggerRegistry::load(
            [
                change_rule("first", "xiaomi/channel/55"),
                change_rule("other", "xiaomi/channel/56"),
                change_rule("second", "xiaomi/channel/55"),
            ],
            &mut registrar,
        );

        let event = Event::change(device(SourceProtocol::Xiaomi, "55"), None);
        let names: Vec<_> = registry
            .get_rules(&event)
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn should_return_empty_when_nothing_matches() {
        let mut registrar = RecordingRegistrar::default();
        let registry = TriggerRegistry::load(
            [change_rule("door", "xiaomi/channel/55")],
            &mut registrar,
        );

        let event = Event::change(device(SourceProtocol::Noolite, "55"), None);
        assert!(registry.get_rules(&event).is_empty());
        assert!(registry.get_rules(&Event::startup()).is_empty());
    }

    #[test]
    fn should_reject_only_malformed_rules() {
        let mut registrar = RecordingRegistrar::default();
        let registry = TriggerRegistry::load(
            [
                change_rule("good", "xiaomi/channel/55"),
                time_rule("bad_schedule", "whenever"),
                change_rule("bad_identity", "xiaomi-55"),
                RuleDefinition {
                    name: "no_triggers".into(),
                    script: None,
                    triggers: vec![],
                },
            ],
            &mut registrar,
        );

        assert_eq!(registry.rules().len(), 1);
        assert_eq!(registry.rules()[0].name, "good");
        assert_eq!(registry.rejected().len(), 3);
    }

    #[test]
    fn should_register_each_distinct_schedule_once() {
        let mut registrar = RecordingRegistrar::default();
        let registry = TriggerRegistry::load(
            [
                time_rule("a", "daily 06:00"),
                time_rule("b", "daily  06:00"),
                time_rule("c", "every 5m"),
                time_rule("rejected", "every 0m"),
            ],
            &mut registrar,
        );

        assert_eq!(registry.rules().len(), 3);
        let expressions: Vec<_> = registrar
            .schedules
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(expressions, vec!["daily 06:00", "every 5m"]);
    }

    #[test]
    fn should_match_timer_event_only_to_its_schedule() {
        let mut registrar = RecordingRegistrar::default();
        let registry = TriggerRegistry::load(
            [time_rule("morning", "daily 06:00"), time_rule("evening", "daily 20:00")],
            &mut registrar,
        );

        let event = Event::timer(Schedule::parse("daily 20:00").unwrap());
        let matched = registry.get_rules(&event);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "evening");
    }
}
