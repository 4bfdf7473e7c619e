//! Dot-segmented topics and subscription patterns.
//!
//! Topic names are part of the wire contract with protocol adapters and must
//! stay bit-exact: notifications live under `event.`, commands under
//! `command.`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Well-known topics.
pub mod names {
    pub const DEVICE_ADDED: &str = "event.device.added";
    pub const DEVICE_UPDATED: &str = "event.device.updated";
    pub const DEVICE_BATTERY: &str = "event.device.battery";
    pub const DEVICE_VOLTAGE: &str = "event.device.voltage";
    pub const DEVICE_TEMPERATURE: &str = "event.device.temperature";
    pub const DEVICE_HUMIDITY: &str = "event.device.humidity";
    pub const DEVICE_MOTION: &str = "event.device.motion";
    pub const DEVICE_LEAK: &str = "event.device.leak";
    pub const DEVICE_BUTTON: &str = "event.device.button";
    pub const COMMAND_DEVICE: &str = "command.device";
    /// Device commands addressed to one protocol, e.g. `command.device.xiaomi`.
    pub const ALL_DEVICE_COMMANDS: &str = "command.device.*";

    /// Everything published as a notification.
    pub const ALL_EVENTS: &str = "event.*";
    /// Everything published as a command.
    pub const ALL_COMMANDS: &str = "command.*";
}

const WILDCARD: &str = "*";

/// A concrete publish address such as `event.device.motion`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate and wrap a topic name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopic`] when the name has empty
    /// segments or contains a wildcard.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.split('.').any(|seg| seg.is_empty() || seg == WILDCARD) {
            return Err(ValidationError::InvalidTopic(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one segment, e.g. `event.device.doorsensor` + `open`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopic`] when the result is invalid.
    pub fn child(&self, segment: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{}.{segment}", self.0))
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// A subscription pattern: either an exact topic or a prefix ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    raw: String,
    prefix: Vec<String>,
    wildcard: bool,
}

impl TopicPattern {
    /// Parse a pattern such as `event.*` or `command.device.noolite.rx`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopicPattern`] for empty segments or
    /// a `*` that is not the last segment.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let mut prefix: Vec<String> = raw.split('.').map(str::to_string).collect();
        let wildcard = prefix.last().is_some_and(|seg| seg == WILDCARD);
        if wildcard {
            prefix.pop();
        }
        let malformed = prefix.is_empty()
            || prefix.iter().any(|seg| seg.is_empty() || seg == WILDCARD);
        if malformed {
            return Err(ValidationError::InvalidTopicPattern(raw));
        }
        Ok(Self {
            raw,
            prefix,
            wildcard,
        })
    }

    /// Whether `topic` is delivered to subscribers of this pattern.
    ///
    /// A wildcard pattern needs at least one segment after its prefix, so
    /// `event.*` matches `event.device.added` but not `event`.
    #[must_use]
    pub fn matches(&self, topic: &Topic) -> bool {
        let mut segments = topic.segments();
        for expected in &self.prefix {
            match segments.next() {
                Some(seg) if seg == expected => {}
                _ => return false,
            }
        }
        let rest = segments.count();
        if self.wildcard { rest > 0 } else { rest == 0 }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TopicPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
