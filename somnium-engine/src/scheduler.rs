//! Orchestration-side time and task queues.
//!
//! Generative timing is a queue of future events instead of self-rescheduling
//! callbacks: each generator owns a [`TaskQueue`] of its cues, and the engine
//! owns one for timer ticks and fade completions. The host pumps the engine,
//! which pops whatever is due. Stopping a generator drops its queue, which is
//! the whole cancellation story.
//!
//! Time is a `Duration` since the clock's epoch, read from a [`Clock`]:
//! `SystemClock` for real playback, `ManualClock` for tests that step time.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send {
    fn now(&self) -> Duration;
}

/// Wall clock, epoch at construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, AtomicOrdering::SeqCst);
    }

    pub fn set(&self, t: Duration) {
        self.nanos.store(t.as_nanos() as u64, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(AtomicOrdering::SeqCst))
    }
}

/// Seconds as a `Duration` rounded to the microsecond, so decimal delays land
/// on exact grid points. Negative and NaN values map to zero.
#[inline]
pub fn secs(s: f32) -> Duration {
    if s.is_nan() || s <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_micros((s as f64 * 1.0e6).round() as u64)
}

struct Task<T> {
    due: Duration,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Task<T> {}

impl<T> PartialOrd for Task<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Task<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Min-heap of future items. Items due at the same time pop in insertion order.
pub struct TaskQueue<T> {
    heap: BinaryHeap<Reverse<Task<T>>>,
    seq: u64,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new(), seq: 0 }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.heap.len()).field("next_due", &self.next_due()).finish()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Duration, item: T) {
        self.seq += 1;
        self.heap.push(Reverse(Task { due, seq: self.seq, item }));
    }

    /// Pop the earliest item if it is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        if self.heap.peek()?.0.due > now {
            return None;
        }
        self.heap.pop().map(|Reverse(t)| (t.due, t.item))
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(t)| t.due)
    }

    /// Keep only the items matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.heap.retain(|Reverse(t)| keep(&t.item));
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn pops_in_deadline_order_fifo_on_ties() {
        let mut q = TaskQueue::new();
        q.schedule(ms(30), "c");
        q.schedule(ms(10), "a");
        q.schedule(ms(20), "b1");
        q.schedule(ms(20), "b2");
        assert_eq!(q.pop_due(ms(5)), None);
        let mut got = vec![];
        while let Some((_, x)) = q.pop_due(ms(25)) {
            got.push(x);
        }
        assert_eq!(got, ["a", "b1", "b2"]);
        assert_eq!(q.next_due(), Some(ms(30)));
    }

    #[test]
    fn retain_and_clear() {
        let mut q = TaskQueue::new();
        for i in 0..10u32 {
            q.schedule(ms(i as u64), i);
        }
        q.retain(|i| i % 2 == 0);
        assert_eq!(q.len(), 5);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pop_due(ms(100)), None);
    }

    #[test]
    fn manual_clock_is_shared() {
        let c = ManualClock::new();
        let c2 = c.clone();
        c.advance(ms(1500));
        assert_eq!(c2.now(), ms(1500));
        c2.set(ms(10));
        assert_eq!(c.now(), ms(10));
    }

    #[test]
    fn secs_saturates_at_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f32::NAN), Duration::ZERO);
        assert_eq!(secs(0.25), ms(250));
        assert_eq!(secs(1.2), ms(1200));
    }
}
