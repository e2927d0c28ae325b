//! The [`Horse`] participant.
//!
//! A horse is immutable once built. Equality is by identity; use
//! [`Horse::deep_eq`] to compare every field.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::HorseId;
use crate::values::{Condition, HorseColor, HorseName};

/// An immutable race participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horse {
    id: HorseId,
    name: HorseName,
    color: HorseColor,
    condition: Condition,
}

impl Horse {
    /// Validate raw inputs and build a horse with a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] raised by the name, color, or
    /// condition.
    pub fn create(name: &str, color: &str, condition: u32) -> Result<Self, ValidationError> {
        Ok(Self {
            id: HorseId::new(),
            name: HorseName::new(name)?,
            color: HorseColor::new(color)?,
            condition: Condition::new(condition)?,
        })
    }

    /// Rebuild a horse from already validated parts (restore path).
    pub const fn reconstitute(
        id: HorseId,
        name: HorseName,
        color: HorseColor,
        condition: Condition,
    ) -> Self {
        Self {
            id,
            name,
            color,
            condition,
        }
    }

    /// Return a copy of this horse with a different condition. Identity is
    /// preserved.
    #[must_use]
    pub fn with_condition(&self, condition: Condition) -> Self {
        Self {
            condition,
            ..self.clone()
        }
    }

    /// Compare every field, not just identity.
    pub fn deep_eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.color == other.color
            && self.condition == other.condition
    }

    /// Horse identity.
    pub const fn id(&self) -> HorseId {
        self.id
    }

    /// Display name.
    pub const fn name(&self) -> &HorseName {
        &self.name
    }

    /// Display color.
    pub const fn color(&self) -> &HorseColor {
        &self.color
    }

    /// Fitness score.
    pub const fn condition(&self) -> Condition {
        self.condition
    }
}

impl PartialEq for Horse {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Horse {}

impl core::hash::Hash for Horse {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
