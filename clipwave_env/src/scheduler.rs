//! Simulation kernel interface used by per-node monitors.

use crate::error::EnvError;
use crate::types::{SimTime, TimerHandle};

/// The discrete-event kernel as seen by ClipWave components.
///
/// The kernel owns the virtual clock and an ordered queue of pending events.
/// Components never sleep; they arm a future event and get called back when
/// the host pops it.
///
/// # Ordering
///
/// Events fire in non-decreasing time order. Events scheduled for the same
/// instant fire in the order they were scheduled.
///
/// # Implementations
///
/// - **Simulation**: `clipwave_sim::EventQueue` (binary heap + virtual clock)
pub trait Scheduler<E> {
    /// Returns the current simulated time.
    fn now(&self) -> SimTime;

    /// Schedules `event` to fire at absolute time `at`.
    ///
    /// # Returns
    /// * `Ok(handle)` - The event is queued; `handle` can cancel it
    /// * `Err(EnvError::ScheduleInPast)` - `at` is earlier than `now()`
    fn schedule_at(&mut self, at: SimTime, event: E) -> Result<TimerHandle, EnvError>;

    /// Cancels a pending event.
    ///
    /// Returns `true` if the event was still pending. Cancelling an event that
    /// already fired or was already cancelled is a no-op returning `false`.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Schedules `event` to fire `delay` after now.
    ///
    /// Fails with `EnvError::TimeOverflow` if `now() + delay` is not representable.
    fn schedule_in(&mut self, delay: SimTime, event: E) -> Result<TimerHandle, EnvError> {
        let now = self.now();
        let at = now
            .checked_add(delay)
            .ok_or_else(|| EnvError::time_overflow(now, delay))?;
        self.schedule_at(at, event)
    }
}
