//! Device values: named, typed, append-only measurement histories.

use serde::{Deserialize, Serialize};

use crate::protocol::ValueType;
use crate::time::{Timestamp, not_before};

/// One observed value of a [`DeviceValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceValueChange {
    pub recorded_at: Timestamp,
    /// String-encoded value, interpreted through the owning value's [`ValueType`].
    pub value: String,
    /// Protocol-specific extras (raw frame, signal strength, …).
    pub metadata: Option<serde_json::Value>,
}

impl DeviceValueChange {
    #[must_use]
    pub fn new(recorded_at: Timestamp, value: impl Into<String>) -> Self {
        Self {
            recorded_at,
            value: value.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A named measurement or state slot of a device.
///
/// The current value is the last element of `changes`. Records are only
/// ever appended through [`record`](Self::record) and removed from the
/// front through [`prune_before`](Self::prune_before).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceValue {
    pub name: String,
    pub unit: Option<String>,
    pub read_only: bool,
    pub value_type: ValueType,
    pub changes: Vec<DeviceValueChange>,
}

impl DeviceValue {
    /// Define an empty value slot.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            unit: None,
            read_only: true,
            value_type,
            changes: Vec::new(),
        }
    }

    /// Most recent change, if any.
    #[must_use]
    pub fn current(&self) -> Option<&DeviceValueChange> {
        self.changes.last()
    }

    /// String-encoded current value, if any.
    #[must_use]
    pub fn current_value(&self) -> Option<&str> {
        self.current().map(|c| c.value.as_str())
    }

    /// Append a change, never stamping it earlier than the current one.
    ///
    /// Returns a reference to the stored record.
    pub fn record(&mut self, mut change: DeviceValueChange) -> &DeviceValueChange {
        let floor = self.current().map(|c| c.recorded_at);
        change.recorded_at = not_before(change.recorded_at, floor);
        self.changes.push(change);
        &self.changes[self.changes.len() - 1]
    }

    /// The effective pruning cutoff for `before`: never later than the
    /// current change, so pruning strictly-older records keeps it.
    #[must_use]
    pub fn prune_cutoff(&self, before: Timestamp) -> Option<Timestamp> {
        self.current().map(|c| before.min(c.recorded_at))
    }

    /// Drop changes strictly older than `before`, keeping the current one.
    ///
    /// Returns how many records were removed.
    pub fn prune_before(&mut self, before: Timestamp) -> usize {
        let Some(cutoff) = self.prune_cutoff(before) else {
            return 0;
        };
        let original = self.changes.len();
        self.changes.retain(|c| c.recorded_at >= cutoff);
        original - self.changes.len()
    }
}
