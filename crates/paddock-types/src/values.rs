//! Validated, immutable value objects.
//!
//! Each type can only be built through a checked constructor, so holding a
//! value is proof that it satisfied its invariant. Serde round-trips go
//! through the same checks.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lowest permitted condition.
pub const MIN_CONDITION: u32 = 1;

/// Highest permitted condition.
pub const MAX_CONDITION: u32 = 100;

/// Maximum horse name length in characters.
pub const MAX_NAME_LENGTH: usize = 50;

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Fitness score in `1..=100`. It is the upper bound of a horse's movement
/// per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Condition(u8);

impl Condition {
    /// Validate and wrap a raw condition value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ConditionOutOfRange`] unless
    /// `1 <= value <= 100`.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if !(MIN_CONDITION..=MAX_CONDITION).contains(&value) {
            return Err(ValidationError::ConditionOutOfRange { value });
        }
        u8::try_from(value)
            .map(Self)
            .map_err(|_overflow| ValidationError::ConditionOutOfRange { value })
    }

    /// Return the condition as an integer.
    pub fn value(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for Condition {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Condition> for u32 {
    fn from(condition: Condition) -> Self {
        condition.value()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Race length in metres, restricted to a fixed set of course distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Distance(u32);

impl Distance {
    /// Every supported course distance, shortest first.
    pub const ALL: [Self; 6] = [
        Self(1200),
        Self(1400),
        Self(1600),
        Self(1800),
        Self(2000),
        Self(2200),
    ];

    /// Validate a length in metres against the supported set.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDistance`] if `meters` is not one of
    /// [`Distance::ALL`].
    pub fn new(meters: u32) -> Result<Self, ValidationError> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.0 == meters)
            .ok_or(ValidationError::InvalidDistance { meters })
    }

    /// Return the length in metres.
    pub const fn meters(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Distance {
    type Error = ValidationError;

    fn try_from(meters: u32) -> Result<Self, Self::Error> {
        Self::new(meters)
    }
}

impl From<Distance> for u32 {
    fn from(distance: Distance) -> Self {
        distance.0
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

// ---------------------------------------------------------------------------
// HorseName
// ---------------------------------------------------------------------------

/// Display name: trimmed, non-empty, at most [`MAX_NAME_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HorseName(String);

impl HorseName {
    /// Validate a display name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] or
    /// [`ValidationError::NameTooLong`].
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let length = trimmed.chars().count();
        if length > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong {
                length,
                max: MAX_NAME_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HorseName {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<HorseName> for String {
    fn from(name: HorseName) -> Self {
        name.0
    }
}

impl fmt::Display for HorseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// HorseColor
// ---------------------------------------------------------------------------

/// Display color as an upper-case `#RRGGBB` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HorseColor(String);

impl HorseColor {
    /// Validate a `#RRGGBB` hex color. Lower-case digits are accepted and
    /// normalised to upper case.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidColor`] for anything else.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let valid = trimmed
            .strip_prefix('#')
            .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(ValidationError::InvalidColor {
                value: raw.to_owned(),
            });
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Borrow the color string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HorseColor {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<HorseColor> for String {
    fn from(color: HorseColor) -> Self {
        color.0
    }
}

impl fmt::Display for HorseColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn condition_bounds() {
        assert!(Condition::new(0).is_err());
        assert_eq!(Condition::new(1).unwrap().value(), 1);
        assert_eq!(Condition::new(100).unwrap().value(), 100);
        assert_eq!(
            Condition::new(101),
            Err(ValidationError::ConditionOutOfRange { value: 101 })
        );
    }

    #[test]
    fn distance_accepts_only_course_lengths() {
        for d in Distance::ALL {
            assert_eq!(Distance::new(d.meters()).unwrap(), d);
        }
        assert_eq!(
            Distance::new(1300),
            Err(ValidationError::InvalidDistance { meters: 1300 })
        );
        assert!(Distance::new(0).is_err());
    }

    #[test]
    fn distance_deserialize_is_validated() {
        let ok: Result<Distance, _> = serde_json::from_str("1600");
        assert_eq!(ok.unwrap().meters(), 1600);
        let bad: Result<Distance, _> = serde_json::from_str("1500");
        assert!(bad.is_err());
    }

    #[test]
    fn name_is_trimmed_and_bounded() {
        assert_eq!(HorseName::new("  Seabiscuit ").unwrap().as_str(), "Seabiscuit");
        assert_eq!(HorseName::new("   "), Err(ValidationError::EmptyName));
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            HorseName::new(&long),
            Err(ValidationError::NameTooLong { .. })
        ));
    }

    #[test]
    fn color_is_normalised() {
        assert_eq!(HorseColor::new("#ff00aa").unwrap().as_str(), "#FF00AA");
        assert!(HorseColor::new("ff00aa").is_err());
        assert!(HorseColor::new("#ff00a").is_err());
        assert!(HorseColor::new("#gg0000").is_err());
    }
}
