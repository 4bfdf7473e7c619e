//! Rule engine: the single ingestion point turning bus traffic, startup,
//! and timer ticks into rule executions.
//!
//! The engine subscribes to the event bus at `event.*` and `command.*`,
//! resolves the device each payload is about, asks the trigger registry for
//! matching rules, and hands them to the executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use homebus_domain::bus::BusMessage;
use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::error::HubError;
use homebus_domain::protocol::SourceProtocol;
use homebus_domain::rule::Event;
use homebus_domain::topic::names;

use crate::event_bus::InProcessEventBus;
use crate::ports::{Delivery, EventPublisher, RegistryQuery, ScriptEngine};
use crate::rule_executor::{ExecutionReport, RuleExecutor};
use crate::trigger_registry::TriggerRegistry;

/// Reactive rule engine.
pub struct RuleEngine<E: ScriptEngine, Q, P> {
    triggers: TriggerRegistry,
    registry: Q,
    executor: RuleExecutor<E, Q, P>,
    started: AtomicBool,
}

impl<E, Q, P> RuleEngine<E, Q, P>
where
    E: ScriptEngine,
    Q: RegistryQuery + Clone,
    P: EventPublisher,
{
    /// Create a new engine over the loaded rules.
    pub fn new(triggers: TriggerRegistry, engine: E, registry: Q, publisher: P) -> Self {
        Self {
            triggers,
            executor: RuleExecutor::new(engine, registry.clone(), publisher),
            registry,
            started: AtomicBool::new(false),
        }
    }

    /// Run every rule matching `event`.
    pub fn dispatch(&self, event: &Event) -> ExecutionReport {
        let rules = self.triggers.get_rules(event);
        if rules.is_empty() {
            tracing::trace!(trigger = %event.trigger_type, "no rule matched");
            return ExecutionReport::default();
        }
        self.executor.execute_rules(&rules, event)
    }

    /// Translate a bus payload into an [`Event`] and dispatch it.
    ///
    /// Protocol notifications and value changes raise `CHANGE` events,
    /// commands raise `COMMAND` events. An unregistered device yields an
    /// event without device, which no device-bound trigger accepts.
    pub fn handle_message(&self, message: &BusMessage) -> ExecutionReport {
        let event = match message {
            BusMessage::Change(change) => Event::change(
                self.resolve(change.protocol, &change.channel),
                Some(change.value_name.clone()),
            ),
            BusMessage::Protocol(notification) => Event::change(
                self.resolve(notification.protocol, &notification.channel),
                None,
            ),
            BusMessage::Command(command) => {
                Event::command(self.resolve(command.protocol, &command.channel))
            }
        };
        self.dispatch(&event)
    }

    /// Fire `STARTUP` rules. Only the first call has an effect.
    pub fn run_startup_rules(&self) -> ExecutionReport {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("startup rules already ran");
            return ExecutionReport::default();
        }
        let report = self.dispatch(&Event::startup());
        tracing::info!(
            executed = report.executed.len(),
            failed = report.failed.len(),
            "startup rules ran"
        );
        report
    }

    fn resolve(&self, protocol: SourceProtocol, channel: &str) -> Option<Device> {
        let device = self.registry.device(&DeviceKey::new(protocol, channel));
        if device.is_none() {
            tracing::debug!(%protocol, channel, "event for unregistered device");
        }
        device
    }
}

impl<E, Q, P> RuleEngine<E, Q, P>
where
    E: ScriptEngine + 'static,
    E::Script: 'static,
    Q: RegistryQuery + Clone + 'static,
    P: EventPublisher + 'static,
{
    /// Subscribe the engine to every event and command topic of `bus`.
    ///
    /// Each batch runs on the blocking pool, so scripts never stall the
    /// async workers.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BusClosed`] when the bus is shutting down.
    pub fn subscribe(self: &Arc<Self>, bus: &InProcessEventBus) -> Result<(), HubError> {
        for pattern in [names::ALL_EVENTS, names::ALL_COMMANDS] {
            let engine = Arc::clone(self);
            bus.subscribe(pattern, move |delivery: Delivery| {
                let engine = Arc::clone(&engine);
                async move {
                    // scripts may load files on first use
                    let batch =
                        tokio::task::spawn_blocking(move || engine.handle_message(&delivery.message));
                    if let Err(err) = batch.await {
                        tracing::error!(error = %err, "rule batch aborted");
                    }
                    Ok::<(), HubError>(())
                }
            })?;
        }
        Ok(())
    }
}
