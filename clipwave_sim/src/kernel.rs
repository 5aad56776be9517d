//! Deterministic discrete-event kernel implementing `Scheduler`.

use clipwave_env::{EnvError, Scheduler, SimTime, TimerHandle};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Virtual clock plus a time-ordered event queue.
///
/// - Events pop in `(time, sequence)` order, so same-time events keep their
///   scheduling order
/// - Cancellation removes the payload immediately; the heap slot is skipped
///   lazily when it reaches the top
/// - The clock only moves forward, to the time of the event being popped
pub struct EventQueue<E> {
    /// Current virtual time
    now: SimTime,

    /// Next sequence number (doubles as the handle id)
    next_seq: u64,

    /// Min-heap of (due time, sequence)
    heap: BinaryHeap<Reverse<(SimTime, u64)>>,

    /// Live payloads by sequence; absent = cancelled or fired
    events: HashMap<u64, E>,

    /// Events delivered so far
    fired: u64,

    /// Events cancelled before firing
    cancelled: u64,
}

impl<E> EventQueue<E> {
    /// Creates an empty queue with the clock at zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            heap: BinaryHeap::new(),
            events: HashMap::new(),
            fired: 0,
            cancelled: 0,
        }
    }

    /// Pops the next live event and advances the clock to its due time.
    pub fn pop(&mut self) -> Option<(TimerHandle, E)> {
        while let Some(Reverse((at, seq))) = self.heap.pop() {
            if let Some(event) = self.events.remove(&seq) {
                self.now = at;
                self.fired += 1;
                return Some((TimerHandle(seq), event));
            }
        }
        None
    }

    /// Due time of the next live event, without consuming it.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(Reverse((at, seq))) = self.heap.peek().copied() {
            if self.events.contains_key(&seq) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    /// Moves the clock forward without firing anything (e.g. to the stop time).
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Whether `handle` is still waiting to fire.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.events.contains_key(&handle.0)
    }

    /// Number of live (not cancelled, not fired) events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> for EventQueue<E> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, at: SimTime, event: E) -> Result<TimerHandle, EnvError> {
        if at < self.now {
            return Err(EnvError::in_past(at, self.now));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((at, seq)));
        self.events.insert(seq, event);

        Ok(TimerHandle(seq))
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.events.remove(&handle.0).is_some();
        if removed {
            self.cancelled += 1;
        }
        removed
    }
}
