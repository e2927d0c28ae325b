//! Timer seam used by the race-loop driver.
//!
//! The driver never sleeps on its own; it asks a [`Timer`] to call it back.
//! [`TokioTimer`] runs callbacks on tokio tasks for production use, and
//! [`ManualTimer`] only fires when told to, which makes whole-program runs
//! deterministic in tests.
//!
//! Callbacks must not call back into the timer that fired them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Opaque handle for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Raw handle number, for logging.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Callback fired on every period of a repeating schedule.
pub type RepeatingCallback = Box<dyn FnMut() + Send + 'static>;

/// Callback fired once after a delay.
pub type OnceCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while building a timer.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// No tokio runtime is running on this thread.
    #[error("no tokio runtime available: {source}")]
    NoRuntime {
        /// The underlying runtime lookup error.
        #[from]
        source: TryCurrentError,
    },
}

/// Schedules callbacks. Cancelling an unknown or already cancelled handle
/// is a no-op.
pub trait Timer: Send + Sync {
    /// Call `callback` every `interval` until cancelled. The first call
    /// happens one interval from now.
    fn schedule_repeating(&self, callback: RepeatingCallback, interval: Duration) -> TimerHandle;

    /// Stop a repeating schedule.
    fn cancel_repeating(&self, handle: TimerHandle);

    /// Call `callback` once after `delay`.
    fn schedule_once(&self, callback: OnceCallback, delay: Duration) -> TimerHandle;

    /// Stop a pending one-shot callback.
    fn cancel_once(&self, handle: TimerHandle);
}

impl<T: Timer + ?Sized> Timer for Arc<T> {
    fn schedule_repeating(&self, callback: RepeatingCallback, interval: Duration) -> TimerHandle {
        (**self).schedule_repeating(callback, interval)
    }

    fn cancel_repeating(&self, handle: TimerHandle) {
        (**self).cancel_repeating(handle);
    }

    fn schedule_once(&self, callback: OnceCallback, delay: Duration) -> TimerHandle {
        (**self).schedule_once(callback, delay)
    }

    fn cancel_once(&self, handle: TimerHandle) {
        (**self).cancel_once(handle);
    }
}

// ---------------------------------------------------------------------------
// Tokio timer
// ---------------------------------------------------------------------------

type TaskMap = Arc<Mutex<HashMap<TimerHandle, JoinHandle<()>>>>;

/// Timer backed by tokio tasks. Every schedule is one spawned task that is
/// aborted on cancel or when the timer is dropped.
#[derive(Debug)]
pub struct TokioTimer {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: TaskMap,
}

impl TokioTimer {
    /// Spawn timer tasks onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn timer tasks onto the runtime this is called from.
    pub fn current() -> Result<Self, TimerError> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Number of schedules that are still live.
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_handle(&self) -> TimerHandle {
        TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn cancel(&self, handle: TimerHandle) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Timer for TokioTimer {
    fn schedule_repeating(
        &self,
        mut callback: RepeatingCallback,
        interval: Duration,
    ) -> TimerHandle {
        let handle = self.next_handle();
        // tokio rejects a zero period.
        let period = interval.max(Duration::from_millis(1));
        let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);

        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, task);
        handle
    }

    fn cancel_repeating(&self, handle: TimerHandle) {
        self.cancel(handle);
    }

    fn schedule_once(&self, callback: OnceCallback, delay: Duration) -> TimerHandle {
        let handle = self.next_handle();
        let tasks = Arc::clone(&self.tasks);

        // Hold the lock across spawn+insert so the task's own removal can
        // never run before the insert.
        let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle);
        });
        guard.insert(handle, task);
        handle
    }

    fn cancel_once(&self, handle: TimerHandle) {
        self.cancel(handle);
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Manual timer
// ---------------------------------------------------------------------------

enum Scheduled {
    Repeating {
        callback: RepeatingCallback,
        interval: Duration,
    },
    Once {
        callback: OnceCallback,
        delay: Duration,
    },
}

/// Timer that fires only when a test calls [`ManualTimer::fire`] or
/// [`ManualTimer::fire_all`]. Share it with the driver through an [`Arc`].
#[derive(Default)]
pub struct ManualTimer {
    next_id: AtomicU64,
    scheduled: Mutex<BTreeMap<TimerHandle, Scheduled>>,
}

impl ManualTimer {
    /// An empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one schedule. A one-shot schedule is consumed. Returns `false`
    /// if the handle is not active.
    pub fn fire(&self, handle: TimerHandle) -> bool {
        let mut scheduled = self.lock();
        match scheduled.remove(&handle) {
            Some(Scheduled::Repeating {
                mut callback,
                interval,
            }) => {
                callback();
                scheduled.insert(handle, Scheduled::Repeating { callback, interval });
                true
            }
            Some(Scheduled::Once { callback, .. }) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Fire every active schedule once, oldest first. Returns how many fired.
    pub fn fire_all(&self) -> usize {
        let handles: Vec<TimerHandle> = self.lock().keys().copied().collect();
        handles.into_iter().filter(|&h| self.fire(h)).count()
    }

    /// Whether `handle` is still scheduled.
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Number of live schedules.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Period or delay the schedule was registered with.
    pub fn interval(&self, handle: TimerHandle) -> Option<Duration> {
        self.lock().get(&handle).map(|s| match s {
            Scheduled::Repeating { interval, .. } => *interval,
            Scheduled::Once { delay, .. } => *delay,
        })
    }

    fn next_handle(&self) -> TimerHandle {
        TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<TimerHandle, Scheduled>> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimer")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl Timer for ManualTimer {
    fn schedule_repeating(&self, callback: RepeatingCallback, interval: Duration) -> TimerHandle {
        let handle = self.next_handle();
        self.lock()
            .insert(handle, Scheduled::Repeating { callback, interval });
        handle
    }

    fn cancel_repeating(&self, handle: TimerHandle) {
        self.lock().remove(&handle);
    }

    fn schedule_once(&self, callback: OnceCallback, delay: Duration) -> TimerHandle {
        let handle = self.next_handle();
        self.lock().insert(handle, Scheduled::Once { callback, delay });
        handle
    }

    fn cancel_once(&self, handle: TimerHandle) {
        self.lock().remove(&handle);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = Arc::clone(&count);
        (count, move || read.load(Ordering::SeqCst))
    }

    #[test]
    fn manual_timer_fires_on_demand() {
        let timer = ManualTimer::new();
        let (count, read) = counter();
        let handle = timer.schedule_repeating(
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(200),
        );

        assert_eq!(read(), 0);
        assert_eq!(timer.interval(handle), Some(Duration::from_millis(200)));
        assert!(timer.fire(handle));
        assert!(timer.fire(handle));
        assert_eq!(read(), 2);

        timer.cancel_repeating(handle);
        assert!(!timer.is_active(handle));
        assert!(!timer.fire(handle));
        assert_eq!(read(), 2);

        // Cancelling twice is harmless.
        timer.cancel_repeating(handle);
        timer.cancel_once(handle);
    }

    #[test]
    fn manual_once_is_consumed() {
        let timer = ManualTimer::new();
        let (count, read) = counter();
        let once = timer.schedule_once(
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::ZERO,
        );
        let (other, read_other) = counter();
        let repeating = timer.schedule_repeating(
            Box::new(move || {
                other.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(5),
        );

        assert_eq!(timer.fire_all(), 2);
        assert_eq!(timer.fire_all(), 1);
        assert_eq!(read(), 1);
        assert_eq!(read_other(), 2);
        assert!(!timer.is_active(once));
        assert!(timer.is_active(repeating));
        assert_eq!(timer.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_repeating_fires_each_period() {
        let timer = TokioTimer::current().unwrap();
        let (count, read) = counter();
        let handle = timer.schedule_repeating(
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(100),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(read(), 3);

        timer.cancel_repeating(handle);
        assert_eq!(timer.active_count(), 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(read(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_once_fires_and_cancels() {
        let timer = TokioTimer::current().unwrap();
        let (fired, read_fired) = counter();
        let (cancelled, read_cancelled) = counter();

        timer.schedule_once(
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(50),
        );
        let doomed = timer.schedule_once(
            Box::new(move || {
                cancelled.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(50),
        );
        timer.cancel_once(doomed);
        assert_eq!(timer.active_count(), 1);

        // Unknown handles are ignored and leave live tasks alone.
        timer.cancel_repeating(TimerHandle(999));
        timer.cancel_once(TimerHandle(999));
        timer.cancel_once(doomed);
        assert_eq!(timer.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(read_fired(), 1);
        assert_eq!(read_cancelled(), 0);
        assert_eq!(timer.active_count(), 0);
    }

    #[test]
    fn tokio_timer_needs_a_runtime() {
        assert!(matches!(
            TokioTimer::current(),
            Err(TimerError::NoRuntime { .. })
        ));
    }
}
