//! Immutable, timestamped race lifecycle events.
//!
//! Events are created once by the race aggregate and never mutated. Every
//! event carries its own [`EventId`], the id and type of the aggregate that
//! raised it, the wall-clock time it was raised, and a typed payload.

use core::fmt;

use chrono::{DateTime, Utc};
use paddock_types::{EventId, HorseId, RaceId, RunningHorseId};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Aggregate type recorded on every race event.
pub const AGGREGATE_TYPE: &str = "Race";

/// Stable discriminator for the four race event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    /// The race left the starting gate.
    RaceStarted,
    /// One turn of movement was applied.
    TurnCompleted,
    /// A single horse crossed the line.
    HorseFinished,
    /// Every horse has finished.
    RaceFinished,
}

impl EventType {
    /// Every event type, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::RaceStarted,
        Self::TurnCompleted,
        Self::HorseFinished,
        Self::RaceFinished,
    ];

    /// Stable string name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RaceStarted => "RaceStarted",
            Self::TurnCompleted => "TurnCompleted",
            Self::HorseFinished => "HorseFinished",
            Self::RaceFinished => "RaceFinished",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of [`EventType::RaceStarted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RaceStarted {
    /// Size of the lineup.
    pub horse_count: u32,
    /// Race length in metres.
    pub distance_meters: u32,
}

/// Position of one horse at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HorsePosition {
    /// Race entry id.
    pub running_id: RunningHorseId,
    /// Horse identity.
    pub horse_id: HorseId,
    /// Display name.
    pub name: String,
    /// Metres from the start.
    pub position: u32,
    /// Whether the horse has crossed the line.
    pub is_finished: bool,
}

/// Payload of [`EventType::TurnCompleted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TurnCompleted {
    /// 1-based turn number.
    pub turn: u32,
    /// Snapshot of every horse in lineup order, finished or not.
    pub positions: Vec<HorsePosition>,
}

/// Payload of [`EventType::HorseFinished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HorseFinished {
    /// Race entry id.
    pub running_id: RunningHorseId,
    /// Horse identity.
    pub horse_id: HorseId,
    /// Display name.
    pub name: String,
    /// Position at the finish (always the race length).
    pub finish_position: u32,
    /// 1-based place.
    pub place: u32,
}

/// One row of the final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Placing {
    /// 1-based place.
    pub place: u32,
    /// Race entry id.
    pub running_id: RunningHorseId,
    /// Horse identity.
    pub horse_id: HorseId,
    /// Display name.
    pub name: String,
    /// Position at the finish.
    pub finish_position: u32,
}

/// Payload of [`EventType::RaceFinished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RaceFinished {
    /// Every horse in finish order.
    pub results: Vec<Placing>,
}

/// Typed payload of a [`RaceEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type")]
#[ts(export, export_to = "bindings/")]
pub enum RaceEventKind {
    /// See [`RaceStarted`].
    RaceStarted(RaceStarted),
    /// See [`TurnCompleted`].
    TurnCompleted(TurnCompleted),
    /// See [`HorseFinished`].
    HorseFinished(HorseFinished),
    /// See [`RaceFinished`].
    RaceFinished(RaceFinished),
}

impl RaceEventKind {
    /// Discriminator of this payload.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::RaceStarted(_) => EventType::RaceStarted,
            Self::TurnCompleted(_) => EventType::TurnCompleted,
            Self::HorseFinished(_) => EventType::HorseFinished,
            Self::RaceFinished(_) => EventType::RaceFinished,
        }
    }
}

// ---------------------------------------------------------------------------
// RaceEvent
// ---------------------------------------------------------------------------

/// A frozen race lifecycle event.
///
/// Fields are private; once built an event can only be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RaceEvent {
    id: EventId,
    aggregate_id: RaceId,
    aggregate_type: String,
    occurred_at: DateTime<Utc>,
    kind: RaceEventKind,
}

impl RaceEvent {
    /// Raise a new event for the given race, stamped with the current time.
    pub fn new(aggregate_id: RaceId, kind: RaceEventKind) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id,
            aggregate_type: AGGREGATE_TYPE.to_owned(),
            occurred_at: Utc::now(),
            kind,
        }
    }

    /// Event identity.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Id of the race that raised the event.
    pub const fn aggregate_id(&self) -> RaceId {
        self.aggregate_id
    }

    /// Type of the aggregate that raised the event.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    /// When the event was raised.
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Discriminator.
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Typed payload.
    pub const fn kind(&self) -> &RaceEventKind {
        &self.kind
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_type_follows_payload() {
        let race = RaceId::new();
        let event = RaceEvent::new(
            race,
            RaceEventKind::RaceStarted(RaceStarted {
                horse_count: 3,
                distance_meters: 1400,
            }),
        );
        assert_eq!(event.event_type(), EventType::RaceStarted);
        assert_eq!(event.aggregate_id(), race);
        assert_eq!(event.aggregate_type(), AGGREGATE_TYPE);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = RaceEvent::new(
            RaceId::new(),
            RaceEventKind::TurnCompleted(TurnCompleted {
                turn: 4,
                positions: Vec::new(),
            }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "TurnCompleted");
        assert_eq!(json["kind"]["turn"], 4);

        let back: RaceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_type_names_are_stable() {
        let names: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(
            names,
            ["RaceStarted", "TurnCompleted", "HorseFinished", "RaceFinished"]
        );
    }
}
