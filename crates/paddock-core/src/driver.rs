//! The race-loop driver.
//!
//! [`RaceLoop`] runs a card of races one after another. It starts the
//! current race, asks its [`Timer`] for a repeating tick, runs one turn per
//! tick, forwards every domain event to its [`EventSink`], and moves on to
//! the next race when the current one finishes.
//!
//! # Single consumer
//!
//! Timer callbacks never touch race state. They post the schedule's epoch
//! into a channel owned by the loop, and the loop handles ticks and
//! commands one at a time. Two turns are therefore never in flight, and
//! all events of one turn are published before the next tick is looked
//! at. Cancelling a schedule bumps the epoch, so ticks that were already
//! queued for it are dropped. Ticks that pile up behind a slow sink are
//! merged: however many are queued, the loop runs one turn for them.
//!
//! Each turn re-reads the current race from the store, so the card can be
//! swapped under a live schedule. A missing race stops the loop and a race
//! that refuses to turn is treated as complete.
//!
//! # Two ways to drive it
//!
//! - [`RaceLoop::spawn`] moves the loop onto a tokio task and returns a
//!   cloneable [`RaceLoopHandle`].
//! - Calling [`RaceLoop::execute`] and [`RaceLoop::process_pending`]
//!   directly, typically with a [`ManualTimer`](crate::timer::ManualTimer),
//!   gives fully deterministic runs.

use std::time::Duration;

use paddock_events::{EventSink, RaceEvent};
use paddock_types::RaceId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::RaceError;
use crate::race::{LeaderboardEntry, Race};
use crate::random::RandomSource;
use crate::store::RaceStore;
use crate::timer::{Timer, TimerHandle};

/// Tick period used unless [`RaceLoop::with_tick_interval`] says otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Errors surfaced by the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// `execute()` found no race at the current index.
    #[error("no race at index {index}")]
    RaceNotFound {
        /// The index the store pointed at.
        index: usize,
    },

    /// The spawned loop has shut down.
    #[error("race loop is no longer running")]
    LoopClosed,
}

/// Read-only view of the program for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSnapshot {
    /// Index of the current race.
    pub race_index: usize,
    /// Number of races on the card.
    pub race_count: usize,
    /// Current race, if the index points at one.
    pub race_id: Option<RaceId>,
    /// Turns completed in the current race.
    pub tick: u64,
    /// Whether a tick schedule is live.
    pub is_running: bool,
    /// Whether the last race on the card has finished.
    pub is_complete: bool,
    /// Standings of the current race.
    pub leaderboard: Vec<LeaderboardEntry>,
}

enum Command {
    Execute {
        reply: oneshot::Sender<Result<(), DriverError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    IsRunning {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<ProgramSnapshot>,
    },
    ReplaceRaces {
        races: Vec<Race>,
        reply: oneshot::Sender<()>,
    },
    SetIndex {
        index: usize,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Drives a card of races through a [`RaceStore`].
pub struct RaceLoop<S, T, E> {
    store: S,
    timer: T,
    sink: E,
    random: Box<dyn RandomSource>,
    tick_interval: Duration,
    timer_handle: Option<TimerHandle>,
    epoch: u64,
    ticks_tx: mpsc::UnboundedSender<u64>,
    ticks_rx: mpsc::UnboundedReceiver<u64>,
    complete: watch::Sender<bool>,
}

impl<S, T, E> RaceLoop<S, T, E>
where
    S: RaceStore,
    T: Timer,
    E: EventSink,
{
    /// Build an idle loop over `store`.
    pub fn new(store: S, timer: T, sink: E, random: Box<dyn RandomSource>) -> Self {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (complete, _) = watch::channel(false);
        Self {
            store,
            timer,
            sink,
            random,
            tick_interval: DEFAULT_TICK_INTERVAL,
            timer_handle: None,
            epoch: 0,
            ticks_tx,
            ticks_rx,
            complete,
        }
    }

    /// Override the tick period.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// The configured tick period.
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the backing store. Changes take effect on the
    /// next tick.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Swap the card. The index, tick counter and schedule are left alone.
    pub fn replace_races(&mut self, races: Vec<Race>) {
        debug!(races = races.len(), "Replacing race card");
        self.store.set_races(races);
    }

    /// Point the store at another race and zero the tick counter.
    pub fn set_current_index(&mut self, index: usize) {
        debug!(index, "Moving to race");
        self.store.set_current_index(index);
        self.store.reset_tick();
    }

    /// Start (or resume) the current race.
    ///
    /// A no-op while a tick schedule is live. If the current race has
    /// already finished, the loop moves straight on to the next one.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::RaceNotFound`] when the store has no race at
    /// its current index.
    pub async fn execute(&mut self) -> Result<(), DriverError> {
        if self.is_running() {
            return Ok(());
        }
        self.start_current(true).await
    }

    /// Cancel the tick schedule. Race state is left as it is, so a later
    /// [`RaceLoop::execute`] resumes the same race. Safe to call when idle.
    pub fn stop(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            self.timer.cancel_repeating(handle);
            debug!(timer = handle.as_u64(), "Tick schedule cancelled");
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.store.set_running(false);
    }

    /// Whether a tick schedule is live.
    pub const fn is_running(&self) -> bool {
        self.timer_handle.is_some()
    }

    /// Capture the program's current state.
    pub fn snapshot(&self) -> ProgramSnapshot {
        let current = self.store.current_race();
        ProgramSnapshot {
            race_index: self.store.current_index(),
            race_count: self.store.races().len(),
            race_id: current.map(Race::id),
            tick: self.store.tick(),
            is_running: self.is_running(),
            is_complete: *self.complete.borrow(),
            leaderboard: current.map(Race::leaderboard).unwrap_or_default(),
        }
    }

    /// Handle every tick the timer has queued so far, running at most one
    /// turn for all of them. Returns how many ticks were taken off the
    /// queue, stale ones included.
    pub async fn process_pending(&mut self) -> usize {
        let first = self.ticks_rx.try_recv().ok();
        self.on_ticks(first).await
    }

    /// Start or restart races until one is running or the card is done.
    async fn start_current(&mut self, first: bool) -> Result<(), DriverError> {
        loop {
            let index = self.store.current_index();
            let Some(race) = self.store.current_race_mut() else {
                if first {
                    return Err(DriverError::RaceNotFound { index });
                }
                warn!(index, "No race to start");
                return Ok(());
            };

            match race.start() {
                Ok(()) => {
                    let race_id = race.id();
                    let horses = race.horse_count();
                    let distance = race.distance().meters();
                    let events = race.clear_domain_events();

                    self.sink.publish_all(&events).await;
                    self.store.set_running(true);
                    self.schedule();
                    self.complete.send_replace(false);
                    info!(%race_id, index, horses, distance, "Race started");
                    return Ok(());
                }
                Err(RaceError::AlreadyFinished { race_id }) => {
                    debug!(%race_id, index, "Race already finished, skipping");
                }
                Err(err) => {
                    warn!(index, error = %err, "Race could not start, skipping");
                }
            }

            if !self.complete_race() {
                return Ok(());
            }
        }
    }

    fn schedule(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let ticks = self.ticks_tx.clone();
        let handle = self.timer.schedule_repeating(
            Box::new(move || {
                // The loop owns the receiver; a failed send means it is gone.
                let _ = ticks.send(epoch);
            }),
            self.tick_interval,
        );
        self.timer_handle = Some(handle);
    }

    /// Take `first` and everything queued behind it. One turn runs if any
    /// of them belongs to the live schedule.
    async fn on_ticks(&mut self, first: Option<u64>) -> usize {
        let mut next = first;
        let mut taken = 0_usize;
        let mut live = false;
        while let Some(epoch) = next {
            taken = taken.saturating_add(1);
            live |= self.timer_handle.is_some() && epoch == self.epoch;
            next = self.ticks_rx.try_recv().ok();
        }

        if live {
            if taken > 1 {
                debug!(taken, "Coalesced queued ticks");
            }
            self.run_turn().await;
        } else if taken > 0 {
            debug!(taken, current = self.epoch, "Dropping stale ticks");
        }
        taken
    }

    async fn run_turn(&mut self) {
        let Some(race) = self.store.current_race_mut() else {
            warn!(index = self.store.current_index(), "Current race vanished, stopping");
            self.stop();
            return;
        };

        match race.turn(self.random.as_mut()) {
            Ok(()) => {
                let race_id = race.id();
                let turn = race.turn_count();
                let finished = race.is_finished();
                let events: Vec<RaceEvent> = race.clear_domain_events();

                self.store.increment_tick();
                debug!(%race_id, turn, events = events.len(), "Turn completed");
                self.sink.publish_all(&events).await;

                if finished {
                    self.finish_and_continue().await;
                }
            }
            Err(err) => {
                warn!(error = %err, "Turn failed, completing race");
                self.finish_and_continue().await;
            }
        }
    }

    async fn finish_and_continue(&mut self) {
        if self.complete_race() {
            // Only the first execute() may fail; later ones never do.
            if let Err(err) = self.start_current(false).await {
                warn!(error = %err, "Next race could not start");
            }
        }
    }

    /// Stop ticking and move the store to the next race. Returns `false`
    /// once the card is finished.
    fn complete_race(&mut self) -> bool {
        if let Some(race) = self.store.current_race() {
            let winner = race
                .results()
                .next()
                .map(|h| h.horse().name().to_string());
            info!(
                race_id = %race.id(),
                turns = race.turn_count(),
                winner = winner.as_deref().unwrap_or("-"),
                "Race finished"
            );
        }

        self.stop();
        if self.store.advance_to_next_race() {
            self.store.reset_tick();
            true
        } else {
            self.complete.send_replace(true);
            info!(races = self.store.races().len(), "Program complete");
            false
        }
    }
}

impl<S, T, E> RaceLoop<S, T, E>
where
    S: RaceStore + 'static,
    T: Timer + 'static,
    E: EventSink + 'static,
{
    /// Move the loop onto a tokio task. It runs until
    /// [`RaceLoopHandle::shutdown`] or until every handle is dropped.
    pub fn spawn(self) -> RaceLoopHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let handle = RaceLoopHandle {
            commands,
            complete: self.complete.subscribe(),
        };
        tokio::spawn(self.run(inbox));
        handle
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = inbox.recv() => match command {
                    Some(Command::Execute { reply }) => {
                        let _ = reply.send(self.execute().await);
                    }
                    Some(Command::Stop { reply }) => {
                        self.stop();
                        let _ = reply.send(());
                    }
                    Some(Command::IsRunning { reply }) => {
                        let _ = reply.send(self.is_running());
                    }
                    Some(Command::Snapshot { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::ReplaceRaces { races, reply }) => {
                        self.replace_races(races);
                        let _ = reply.send(());
                    }
                    Some(Command::SetIndex { index, reply }) => {
                        self.set_current_index(index);
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.stop();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.stop();
                        break;
                    }
                },
                Some(epoch) = self.ticks_rx.recv() => {
                    self.on_ticks(Some(epoch)).await;
                }
            }
        }
        debug!("Race loop shut down");
    }
}

impl<S, T, E> core::fmt::Debug for RaceLoop<S, T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RaceLoop")
            .field("tick_interval", &self.tick_interval)
            .field("timer_handle", &self.timer_handle)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle to a spawned [`RaceLoop`].
#[derive(Clone)]
pub struct RaceLoopHandle {
    commands: mpsc::UnboundedSender<Command>,
    complete: watch::Receiver<bool>,
}

impl RaceLoopHandle {
    /// Start or resume the program. See [`RaceLoop::execute`].
    pub async fn start(&self) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Execute { reply })?;
        rx.await.unwrap_or(Err(DriverError::LoopClosed))
    }

    /// Pause the program. See [`RaceLoop::stop`].
    pub async fn stop(&self) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    /// Whether a race is ticking.
    pub async fn is_running(&self) -> Result<bool, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::IsRunning { reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    /// Current program state.
    pub async fn snapshot(&self) -> Result<ProgramSnapshot, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    /// Swap the card. See [`RaceLoop::replace_races`].
    pub async fn replace_races(&self, races: Vec<Race>) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReplaceRaces { races, reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    /// Point at another race. See [`RaceLoop::set_current_index`].
    pub async fn set_current_index(&self, index: usize) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetIndex { index, reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    /// Resolve once the last race on the card has finished.
    pub async fn wait_until_complete(&self) -> Result<(), DriverError> {
        let mut complete = self.complete.clone();
        complete
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .ok()
            .ok_or(DriverError::LoopClosed)
    }

    /// Cancel any schedule and end the loop task.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.ok().ok_or(DriverError::LoopClosed)
    }

    fn send(&self, command: Command) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .ok()
            .ok_or(DriverError::LoopClosed)
    }
}

impl core::fmt::Debug for RaceLoopHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RaceLoopHandle")
            .field("complete", &*self.complete.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::FutureExt as _;
    use futures::future::BoxFuture;
    use paddock_events::EventType;
    use paddock_types::{Distance, Horse};

    use super::*;
    use crate::random::FixedRandom;
    use crate::store::ProgramState;
    use crate::timer::ManualTimer;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventType>>);

    impl EventSink for Recorder {
        fn publish<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()> {
            self.0.lock().unwrap().push(event.event_type());
            futures::future::ready(()).boxed()
        }
    }

    type TestLoop = RaceLoop<ProgramState, Arc<ManualTimer>, Arc<Recorder>>;

    fn race(condition: u32) -> Race {
        let horse = Horse::create("Driver", "#FF0000", condition).unwrap();
        Race::create(vec![horse], Distance::new(1200).unwrap()).unwrap()
    }

    fn fixture(races: Vec<Race>) -> (TestLoop, Arc<ManualTimer>, Arc<Recorder>) {
        let timer = Arc::new(ManualTimer::new());
        let sink = Arc::new(Recorder::default());
        let race_loop = RaceLoop::new(
            ProgramState::new(races),
            Arc::clone(&timer),
            Arc::clone(&sink),
            Box::new(FixedRandom::new(0.99)),
        );
        (race_loop, timer, sink)
    }

    #[tokio::test]
    async fn empty_program_reports_race_not_found() {
        let (mut race_loop, timer, _) = fixture(Vec::new());
        assert_eq!(
            race_loop.execute().await.unwrap_err(),
            DriverError::RaceNotFound { index: 0 }
        );
        assert!(!race_loop.is_running());
        assert_eq!(timer.active_count(), 0);
    }

    #[tokio::test]
    async fn execute_schedules_once() {
        let (mut race_loop, timer, sink) = fixture(vec![race(100)]);
        race_loop.execute().await.unwrap();
        race_loop.execute().await.unwrap();

        assert!(race_loop.is_running());
        assert!(race_loop.store().is_running());
        assert_eq!(timer.active_count(), 1);
        assert_eq!(*sink.0.lock().unwrap(), [EventType::RaceStarted]);
    }

    #[tokio::test]
    async fn default_interval_is_used() {
        let (mut race_loop, timer, _) = fixture(vec![race(100)]);
        assert_eq!(race_loop.tick_interval(), DEFAULT_TICK_INTERVAL);
        race_loop.execute().await.unwrap();
        assert_eq!(timer.fire_all(), 1);
        let handle = race_loop.timer_handle.unwrap();
        assert_eq!(timer.interval(handle), Some(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn stale_ticks_are_dropped_after_stop() {
        let (mut race_loop, timer, _) = fixture(vec![race(100)]);
        race_loop.execute().await.unwrap();
        timer.fire_all();
        timer.fire_all();
        race_loop.stop();

        assert_eq!(race_loop.process_pending().await, 2);
        assert_eq!(race_loop.store().tick(), 0);
        assert_eq!(race_loop.store().current_race().unwrap().turn_count(), 0);
    }

    #[tokio::test]
    async fn stop_then_execute_resumes_the_same_race() {
        let (mut race_loop, timer, sink) = fixture(vec![race(100)]);
        race_loop.execute().await.unwrap();
        for _ in 0..3 {
            timer.fire_all();
            race_loop.process_pending().await;
        }
        race_loop.stop();
        race_loop.stop();
        assert!(!race_loop.is_running());
        assert!(!race_loop.store().is_running());
        assert_eq!(timer.active_count(), 0);

        race_loop.execute().await.unwrap();
        timer.fire_all();
        race_loop.process_pending().await;

        let race = race_loop.store().current_race().unwrap();
        assert_eq!(race.turn_count(), 4);
        assert_eq!(race.horses()[0].position(), 400);
        let starts = sink
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == EventType::RaceStarted)
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn finished_current_race_is_skipped() {
        let mut done = race(100);
        done.start().unwrap();
        let mut random = FixedRandom::new(0.99);
        while !done.is_finished() {
            done.turn(&mut random).unwrap();
        }
        let (mut race_loop, _timer, _) = fixture(vec![done, race(100)]);

        race_loop.execute().await.unwrap();
        assert_eq!(race_loop.store().current_index(), 1);
        assert!(race_loop.is_running());
    }

    #[tokio::test]
    async fn snapshot_reflects_progress() {
        let (mut race_loop, timer, _) = fixture(vec![race(100), race(100)]);
        race_loop.execute().await.unwrap();
        timer.fire_all();
        race_loop.process_pending().await;

        let snapshot = race_loop.snapshot();
        assert_eq!(snapshot.race_index, 0);
        assert_eq!(snapshot.race_count, 2);
        assert_eq!(snapshot.tick, 1);
        assert!(snapshot.is_running);
        assert!(!snapshot.is_complete);
        assert_eq!(snapshot.leaderboard.len(), 1);
        assert_eq!(snapshot.leaderboard[0].position, 100);
    }

    #[tokio::test]
    async fn queued_ticks_coalesce_into_one_turn() {
        let (mut race_loop, timer, sink) = fixture(vec![race(100)]);
        race_loop.execute().await.unwrap();
        for _ in 0..3 {
            timer.fire_all();
        }

        assert_eq!(race_loop.process_pending().await, 3);
        assert_eq!(race_loop.store().tick(), 1);
        assert_eq!(race_loop.store().current_race().unwrap().turn_count(), 1);
        let turns = sink
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == EventType::TurnCompleted)
            .count();
        assert_eq!(turns, 1);
        assert!(race_loop.is_running());
    }

    #[tokio::test]
    async fn handle_can_swap_the_card() {
        let (race_loop, timer, _) = fixture(vec![race(100)]);
        let handle = race_loop.spawn();
        handle.start().await.unwrap();

        handle.set_current_index(7).await.unwrap();
        timer.fire_all();
        let mut running = true;
        for _ in 0..100 {
            running = handle.is_running().await.unwrap();
            if !running {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!running);
        assert_eq!(timer.active_count(), 0);
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.race_index, 7);
        assert_eq!(snapshot.race_id, None);
        assert!(!snapshot.is_complete);

        let fresh = race(100);
        let fresh_id = fresh.id();
        handle.replace_races(vec![fresh]).await.unwrap();
        handle.set_current_index(0).await.unwrap();
        handle.start().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.is_running);
        assert_eq!(snapshot.race_id, Some(fresh_id));
        assert_eq!(snapshot.tick, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_runs_to_completion() {
        let sink = Arc::new(Recorder::default());
        let timer = crate::timer::TokioTimer::current().unwrap();
        let handle = RaceLoop::new(
            ProgramState::new(vec![race(100), race(100)]),
            timer,
            Arc::clone(&sink),
            Box::new(FixedRandom::new(0.99)),
        )
        .with_tick_interval(Duration::from_millis(10))
        .spawn();

        handle.start().await.unwrap();
        handle.wait_until_complete().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.is_complete);
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.race_index, 1);
        assert!(!handle.is_running().await.unwrap());

        let finished = sink
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == EventType::RaceFinished)
            .count();
        assert_eq!(finished, 2);

        handle.shutdown().await.unwrap();
        assert_eq!(handle.start().await.unwrap_err(), DriverError::LoopClosed);
    }
}
