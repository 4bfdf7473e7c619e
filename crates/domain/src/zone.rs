//! Zone: a logical grouping of devices (room, floor, outdoor area).

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::ZoneId;
use crate::time::Timestamp;

/// A named group of devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub created_at: Timestamp,
    pub name: String,
}

impl Zone {
    /// Create a builder for constructing a [`Zone`].
    #[must_use]
    pub fn builder() -> ZoneBuilder {
        ZoneBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Zone`].
#[derive(Debug, Default)]
pub struct ZoneBuilder {
    id: Option<ZoneId>,
    created_at: Option<Timestamp>,
    name: Option<String>,
}

impl ZoneBuilder {
    #[must_use]
    pub fn id(mut self, id: ZoneId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`Zone`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if `name` is missing or empty.
    pub fn build(self) -> Result<Zone, HubError> {
        let zone = Zone {
            id: self.id.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(crate::time::now),
            name: self.name.unwrap_or_default(),
        };
        zone.validate()?;
        Ok(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_valid_zone_when_name_provided() {
        let zone = Zone::builder().name("Living Room").build().unwrap();
        assert_eq!(zone.name, "Living Room");
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Zone::builder().build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_keep_explicit_creation_date() {
        let ts = crate::time::now() - chrono::Duration::days(3);
        let zone = Zone::builder()
            .name("Garage")
            .created_at(ts)
            .build()
            .unwrap();
        assert_eq!(zone.created_at, ts);
    }
}
