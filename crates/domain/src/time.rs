//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for creation dates, value changes, and schedule ticks.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Return `ts`, or `floor` when `ts` is earlier.
///
/// Used to stamp appended history records so a wall-clock step backwards
/// never places a record before its predecessor.
#[must_use]
pub fn not_before(ts: Timestamp, floor: Option<Timestamp>) -> Timestamp {
    match floor {
        Some(floor) if ts < floor => floor,
        _ => ts,
    }
}
