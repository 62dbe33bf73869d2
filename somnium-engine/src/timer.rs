//! Sleep timer bookkeeping.
//!
//! A session only knows its absolute end and its two observers; the engine
//! drives it from its task queue. Remaining time is always derived from the
//! clock, never counted down, so late pumps cannot make it drift.

use std::time::Duration;

/// Longest accepted timer, in minutes (12 h).
pub const MAX_TIMER_MINUTES: u32 = 720;
/// Duration the engine starts with.
pub const DEFAULT_TIMER_MINUTES: u32 = 60;

/// Receives the remaining seconds on every tick, `None` once no timer is active.
pub type UpdateFn = Box<dyn FnMut(Option<u32>)>;
/// Called once when a timer ran out and playback stopped.
pub type CompleteFn = Box<dyn FnOnce()>;

#[inline]
pub fn clamp_minutes(minutes: u32) -> u32 {
    minutes.min(MAX_TIMER_MINUTES)
}

/// `current + add`, saturating at [`MAX_TIMER_MINUTES`].
#[inline]
pub fn quick_add(current: u32, add: u32) -> u32 {
    clamp_minutes(current.saturating_add(add))
}

pub struct TimerSession {
    end: Duration,
    on_update: UpdateFn,
    on_complete: Option<CompleteFn>,
    expiring: bool,
}

impl core::fmt::Debug for TimerSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerSession")
            .field("end", &self.end)
            .field("expiring", &self.expiring)
            .finish()
    }
}

impl TimerSession {
    pub fn new(now: Duration, minutes: u32, on_update: UpdateFn, on_complete: CompleteFn) -> Self {
        Self {
            end: now + Duration::from_secs(u64::from(clamp_minutes(minutes)) * 60),
            on_update,
            on_complete: Some(on_complete),
            expiring: false,
        }
    }

    /// Same observers, new end.
    pub fn rearm(self, now: Duration, minutes: u32) -> Self {
        Self {
            end: now + Duration::from_secs(u64::from(clamp_minutes(minutes)) * 60),
            expiring: false,
            ..self
        }
    }

    #[inline] pub fn end(&self) -> Duration { self.end }
    #[inline] pub fn is_expiring(&self) -> bool { self.expiring }
    #[inline] pub fn set_expiring(&mut self) { self.expiring = true; }

    /// Whole seconds left, rounded up. Zero once the end is reached.
    pub fn remaining(&self, now: Duration) -> u32 {
        let left = self.end.saturating_sub(now);
        let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
        secs.min(u64::from(u32::MAX)) as u32
    }

    /// The instant `remaining` drops below `remaining_now`.
    pub fn next_tick(&self, remaining_now: u32) -> Duration {
        self.end.saturating_sub(Duration::from_secs(u64::from(remaining_now.saturating_sub(1))))
    }

    pub fn notify(&mut self, remaining: Option<u32>) {
        (self.on_update)(remaining);
    }

    /// Ran out: completion first, then "no timer".
    pub fn complete(mut self) {
        if let Some(done) = self.on_complete.take() {
            done();
        }
        (self.on_update)(None);
    }

    /// Cancelled: observers only hear "no timer".
    pub fn cancel(mut self) {
        (self.on_update)(None);
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn s(v: u64) -> Duration {
        Duration::from_secs(v)
    }

    fn session(now: Duration, minutes: u32) -> (TimerSession, Rc<RefCell<Vec<Option<u32>>>>, Rc<RefCell<u32>>) {
        let updates = Rc::new(RefCell::new(vec![]));
        let done = Rc::new(RefCell::new(0));
        let (u, d) = (updates.clone(), done.clone());
        let t = TimerSession::new(
            now,
            minutes,
            Box::new(move |r| u.borrow_mut().push(r)),
            Box::new(move || *d.borrow_mut() += 1),
        );
        (t, updates, done)
    }

    #[test]
    fn quick_add_never_passes_the_cap() {
        assert_eq!(quick_add(60, 15), 75);
        assert_eq!(quick_add(700, 60), MAX_TIMER_MINUTES);
        assert_eq!(quick_add(u32::MAX, u32::MAX), MAX_TIMER_MINUTES);
        let mut m = 0;
        for _ in 0..100 {
            m = quick_add(m, 30);
        }
        assert_eq!(m, MAX_TIMER_MINUTES);
    }

    #[test]
    fn remaining_rounds_up() {
        let (t, _, _) = session(s(10), 1);
        assert_eq!(t.end(), s(70));
        assert_eq!(t.remaining(s(10)), 60);
        assert_eq!(t.remaining(Duration::from_millis(10_001)), 60);
        assert_eq!(t.remaining(s(11)), 59);
        assert_eq!(t.remaining(Duration::from_millis(69_999)), 1);
        assert_eq!(t.remaining(s(70)), 0);
        assert_eq!(t.remaining(s(99)), 0);
    }

    #[test]
    fn ticks_land_where_the_count_drops() {
        let (t, _, _) = session(s(0), 1);
        assert_eq!(t.next_tick(60), s(1));
        assert_eq!(t.next_tick(1), s(60));
        assert_eq!(t.remaining(t.next_tick(42)), 41);
    }

    #[test]
    fn minutes_are_capped() {
        let (t, _, _) = session(s(0), 10_000);
        assert_eq!(t.end(), s(u64::from(MAX_TIMER_MINUTES) * 60));
    }

    #[test]
    fn complete_then_none() {
        let (t, updates, done) = session(s(0), 1);
        t.complete();
        assert_eq!(*done.borrow(), 1);
        assert_eq!(*updates.borrow(), [None]);
    }

    #[test]
    fn rearm_keeps_observers() {
        let (mut t, updates, done) = session(s(0), 1);
        t.set_expiring();
        let mut t = t.rearm(s(30), 2);
        assert!(!t.is_expiring());
        assert_eq!(t.end(), s(150));
        t.notify(Some(3));
        t.cancel();
        assert_eq!(*updates.borrow(), [Some(3), None]);
        assert_eq!(*done.borrow(), 0);
    }
}
