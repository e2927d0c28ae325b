//! Event handler that narrates the program through tracing.
//!
//! [`RaceReporter`] subscribes to every event on the bus. Lifecycle events
//! are logged at `info`, turn snapshots at `debug`, and each finished race
//! is kept as a [`RaceResult`] for the closing summary.

use std::sync::{Mutex, PoisonError};

use futures::FutureExt as _;
use futures::future::BoxFuture;
use paddock_events::{EventHandler, RaceEvent, RaceEventKind};
use paddock_types::RaceId;
use tracing::{debug, info};

/// Final order of one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceResult {
    /// The race.
    pub race_id: RaceId,
    /// Horse names, winner first.
    pub finish_order: Vec<String>,
}

/// Logs race events and collects results.
#[derive(Debug, Default)]
pub struct RaceReporter {
    results: Mutex<Vec<RaceResult>>,
}

impl RaceReporter {
    /// A reporter with no results yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results of every race finished so far, in running order.
    pub fn results(&self) -> Vec<RaceResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Log one line per finished race.
    pub fn log_summary(&self) {
        let results = self.results();
        for (number, result) in (1_usize..).zip(&results) {
            info!(
                race = number,
                race_id = %result.race_id,
                winner = result.finish_order.first().map_or("-", String::as_str),
                order = %result.finish_order.join(", "),
                "Result"
            );
        }
        info!(races = results.len(), "Program summary");
    }

    fn report(&self, event: &RaceEvent) {
        let race_id = event.aggregate_id();
        match event.kind() {
            RaceEventKind::RaceStarted(started) => {
                info!(
                    %race_id,
                    horses = started.horse_count,
                    distance_meters = started.distance_meters,
                    "And they're off"
                );
            }
            RaceEventKind::TurnCompleted(turn) => {
                let leader = turn.positions.iter().max_by_key(|p| p.position);
                debug!(
                    %race_id,
                    turn = turn.turn,
                    leader = leader.map_or("-", |p| p.name.as_str()),
                    leader_position = leader.map_or(0, |p| p.position),
                    "Turn"
                );
            }
            RaceEventKind::HorseFinished(finished) => {
                info!(
                    %race_id,
                    place = finished.place,
                    horse = %finished.name,
                    "Horse finished"
                );
            }
            RaceEventKind::RaceFinished(finished) => {
                let finish_order: Vec<String> =
                    finished.results.iter().map(|p| p.name.clone()).collect();
                info!(
                    %race_id,
                    winner = finish_order.first().map_or("-", String::as_str),
                    "Race result official"
                );
                self.results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(RaceResult {
                        race_id,
                        finish_order,
                    });
            }
        }
    }
}

impl EventHandler for RaceReporter {
    fn handle<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()> {
        self.report(event);
        futures::future::ready(()).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use paddock_core::race::Race;
    use paddock_core::random::FixedRandom;
    use paddock_events::{EventBus, SharedHandler};
    use paddock_types::{Distance, Horse};

    use super::*;

    #[tokio::test]
    async fn collects_finish_order_from_the_bus() {
        let bus = EventBus::new();
        let reporter = Arc::new(RaceReporter::new());
        let handler: SharedHandler = Arc::clone(&reporter) as SharedHandler;
        let _subscription = bus.subscribe_all(handler);

        let lineup = vec![
            Horse::create("Slowpoke", "#111111", 20).unwrap(),
            Horse::create("Rocket", "#222222", 100).unwrap(),
        ];
        let mut race = Race::create(lineup, Distance::new(1200).unwrap()).unwrap();
        race.start().unwrap();
        let mut random = FixedRandom::new(0.99);
        while !race.is_finished() {
            race.turn(&mut random).unwrap();
        }
        bus.publish_all(&race.clear_domain_events()).await;

        let results = reporter.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results.first().unwrap().race_id, race.id());
        assert_eq!(results.first().unwrap().finish_order, ["Rocket", "Slowpoke"]);
        reporter.log_summary();
    }
}
