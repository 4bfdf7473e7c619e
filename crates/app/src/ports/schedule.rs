//! Schedule registration port.

use homebus_domain::schedule::Schedule;

/// Receives the schedules of loaded time-triggered rules.
///
/// Called once per distinct schedule while rules are loaded; the
/// implementation arranges for a timer event to be dispatched on every tick.
pub trait ScheduleRegistrar {
    fn register(&mut self, schedule: Schedule);
}
