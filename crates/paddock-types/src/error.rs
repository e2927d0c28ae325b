//! Error types for the `paddock-types` crate.
//!
//! Every value-object constructor returns [`ValidationError`] when its raw
//! input is rejected. These are expected, recoverable outcomes: the caller
//! decides whether to retry with corrected input.

/// Construction-time validation failures for value objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Condition must lie in `1..=100`.
    #[error("condition {value} is out of range (expected 1..=100)")]
    ConditionOutOfRange {
        /// The rejected value.
        value: u32,
    },

    /// Distance is not one of the supported race lengths.
    #[error("distance {meters}m is not a valid race distance")]
    InvalidDistance {
        /// The rejected length in metres.
        meters: u32,
    },

    /// Horse name is empty after trimming.
    #[error("horse name must not be empty")]
    EmptyName,

    /// Horse name exceeds the maximum length.
    #[error("horse name is {length} characters long (max {max})")]
    NameTooLong {
        /// Length of the rejected name in characters.
        length: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// Color is not a `#RRGGBB` hex string.
    #[error("color {value:?} is not a #RRGGBB hex color")]
    InvalidColor {
        /// The rejected input.
        value: String,
    },
}
