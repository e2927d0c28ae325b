//! Type-safe identifier wrappers around [`Uuid`].
//!
//! A horse, the entry of that horse in a particular race, the race itself,
//! and every emitted event each get their own identifier type so they can
//! never be mixed up. All IDs use UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Declares a UUID v7 identifier newtype. Ids are minted by the domain
/// and only ever compared, hashed, printed or serialized.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id! {
    /// Identity of a horse, stable across every race it runs.
    HorseId
}

define_id! {
    /// Identity of one horse's entry in one race.
    RunningHorseId
}

define_id! {
    /// Identity of a race (the aggregate root).
    RaceId
}

define_id! {
    /// Identity of a single domain event.
    EventId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = HorseId::new();
        let b = HorseId::new();
        assert_ne!(a, b);
        assert_ne!(a.0, Uuid::nil());
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = RaceId::new();
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<RaceId, _> = serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = RunningHorseId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
