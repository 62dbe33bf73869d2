//! Parameter automation lanes.
//!
//! A [`Param`] is a sample-accurate control value that follows a short queue of
//! ramps, the way an audio-parameter timeline does in a browser audio graph:
//!
//! - `Set`          : jump to a value
//! - `Linear`       : straight line to a value over a duration
//! - `Exponential`  : geometric ramp (`v0 * (v1/v0)^t`), both ends must share a sign
//!   and be non-zero, otherwise it degrades to a linear ramp
//! - `Target`       : open-ended approach `v += (to - v)(1 - e^(-1/(τ·sr)))`
//!
//! Ramps run back to back. `Target` retires once it sits within 1e-6 of its goal,
//! so it can be followed by further ramps.
//!
//! [`Curve`] is the builder used to describe an envelope against absolute offsets
//! from the moment it is applied (`linear_at(0.3, 0.01)` = "reach 0.3 at +10 ms").
//!
//! Everything here is `Copy`, fixed-capacity and allocation free so lanes can
//! live inside realtime voices.

use crate::dsp::{exp, ln, time_constant_coeff};
use core::fmt::Debug;

/// Maximum number of queued ramps per lane / per curve.
pub const MAX_RAMPS: usize = 6;

/// One automation instruction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Ramp {
    Set(f32),
    Linear { to: f32, secs: f32 },
    Exponential { to: f32, secs: f32 },
    Target { to: f32, tau: f32 },
}

/// A fixed-capacity sequence of ramps with a running time cursor.
#[derive(Copy, Clone, Debug)]
pub struct Curve {
    ramps: [Ramp; MAX_RAMPS],
    len: usize,
    cursor: f32,
}

impl Default for Curve {
    fn default() -> Self {
        Self::new()
    }
}

impl Curve {
    pub const fn new() -> Self {
        Self { ramps: [Ramp::Set(0.0); MAX_RAMPS], len: 0, cursor: 0.0 }
    }

    fn push(mut self, r: Ramp) -> Self {
        debug_assert!(self.len < MAX_RAMPS, "curve capacity exceeded");
        if self.len < MAX_RAMPS {
            self.ramps[self.len] = r;
            self.len += 1;
        }
        self
    }

    /// Jump to `v` at the current cursor.
    pub fn set(self, v: f32) -> Self {
        self.push(Ramp::Set(v))
    }

    /// Linear ramp lasting `secs`.
    pub fn linear(mut self, to: f32, secs: f32) -> Self {
        let secs = secs.max(0.0);
        self.cursor += secs;
        self.push(Ramp::Linear { to, secs })
    }

    /// Exponential ramp lasting `secs`.
    pub fn exponential(mut self, to: f32, secs: f32) -> Self {
        let secs = secs.max(0.0);
        self.cursor += secs;
        self.push(Ramp::Exponential { to, secs })
    }

    /// Linear ramp ending at absolute offset `at`.
    pub fn linear_at(self, to: f32, at: f32) -> Self {
        let secs = at - self.cursor;
        self.linear(to, secs)
    }

    /// Exponential ramp ending at absolute offset `at`.
    pub fn exponential_at(self, to: f32, at: f32) -> Self {
        let secs = at - self.cursor;
        self.exponential(to, secs)
    }

    /// Open-ended approach; does not move the cursor.
    pub fn target(self, to: f32, tau: f32) -> Self {
        self.push(Ramp::Target { to, tau })
    }

    pub fn ramps(&self) -> &[Ramp] {
        &self.ramps[..self.len]
    }

    /// Offset (seconds) at which the last timed ramp ends.
    pub fn duration(&self) -> f32 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Copy, Clone, Debug)]
enum Segment {
    Idle,
    Linear { from: f32, to: f32, n: u32, i: u32 },
    Exponential { to: f32, factor: f32, n: u32, i: u32 },
    Target { to: f32, coeff: f32 },
}

/// Automated control value. Call [`Param::next`] once per sample.
#[derive(Copy, Clone, Debug)]
pub struct Param {
    value: f32,
    sr: f32,
    queue: [Ramp; MAX_RAMPS],
    head: usize,
    len: usize,
    seg: Segment,
}

impl Param {
    pub fn new(value: f32, sr: f32) -> Self {
        Self {
            value,
            sr: sr.max(1.0),
            queue: [Ramp::Set(0.0); MAX_RAMPS],
            head: 0,
            len: 0,
            seg: Segment::Idle,
        }
    }

    /// Lane already loaded with `curve`, starting from `value`.
    pub fn with_curve(value: f32, sr: f32, curve: &Curve) -> Self {
        let mut p = Self::new(value, sr);
        p.apply(curve);
        p
    }

    #[inline] pub fn value(&self) -> f32 { self.value }

    /// True when no ramp is running or queued.
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.seg, Segment::Idle) && self.len == 0
    }

    /// Queue one ramp after whatever is already scheduled. Returns `false`
    /// when the lane is full.
    pub fn schedule(&mut self, ramp: Ramp) -> bool {
        if self.len == MAX_RAMPS {
            return false;
        }
        let slot = (self.head + self.len) % MAX_RAMPS;
        self.queue[slot] = ramp;
        self.len += 1;
        true
    }

    /// Queue every ramp of `curve`.
    pub fn apply(&mut self, curve: &Curve) {
        for r in curve.ramps() {
            self.schedule(*r);
        }
    }

    /// Drop pending and running ramps, holding the current value.
    pub fn cancel(&mut self) {
        self.head = 0;
        self.len = 0;
        self.seg = Segment::Idle;
    }

    /// Cancel everything and jump.
    pub fn set_immediate(&mut self, v: f32) {
        self.cancel();
        self.value = v;
    }

    /// Cancel everything and approach `to` with time constant `tau` seconds.
    pub fn set_target(&mut self, to: f32, tau: f32) {
        self.cancel();
        self.schedule(Ramp::Target { to, tau });
    }

    fn pop(&mut self) -> Option<Ramp> {
        if self.len == 0 {
            return None;
        }
        let r = self.queue[self.head];
        self.head = (self.head + 1) % MAX_RAMPS;
        self.len -= 1;
        Some(r)
    }

    fn samples(&self, secs: f32) -> u32 {
        (secs.max(0.0) * self.sr + 0.5) as u32
    }

    fn start_next(&mut self) {
        while let Some(r) = self.pop() {
            match r {
                Ramp::Set(v) => self.value = v,
                Ramp::Linear { to, secs } => {
                    let n = self.samples(secs);
                    if n == 0 {
                        self.value = to;
                        continue;
                    }
                    self.seg = Segment::Linear { from: self.value, to, n, i: 0 };
                    return;
                }
                Ramp::Exponential { to, secs } => {
                    let n = self.samples(secs);
                    if n == 0 {
                        self.value = to;
                        continue;
                    }
                    let v0 = self.value;
                    let same_sign = (v0 > 0.0 && to > 0.0) || (v0 < 0.0 && to < 0.0);
                    self.seg = if same_sign {
                        let factor = exp(ln(to / v0) / n as f32);
                        Segment::Exponential { to, factor, n, i: 0 }
                    } else {
                        Segment::Linear { from: v0, to, n, i: 0 }
                    };
                    return;
                }
                Ramp::Target { to, tau } => {
                    let coeff = time_constant_coeff(tau, self.sr);
                    if coeff <= 0.0 {
                        self.value = to;
                        continue;
                    }
                    self.seg = Segment::Target { to, coeff };
                    return;
                }
            }
        }
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if matches!(self.seg, Segment::Idle) {
            if self.len == 0 {
                return self.value;
            }
            self.start_next();
        }
        match &mut self.seg {
            Segment::Idle => {}
            Segment::Linear { from, to, n, i } => {
                *i += 1;
                if *i >= *n {
                    self.value = *to;
                    self.seg = Segment::Idle;
                } else {
                    self.value = *from + (*to - *from) * (*i as f32 / *n as f32);
                }
            }
            Segment::Exponential { to, factor, n, i } => {
                *i += 1;
                if *i >= *n {
                    self.value = *to;
                    self.seg = Segment::Idle;
                } else {
                    self.value *= *factor;
                }
            }
            Segment::Target { to, coeff } => {
                let goal = *to;
                self.value += (1.0 - *coeff) * (goal - self.value);
                if (goal - self.value).abs() <= 1e-6 * goal.abs().max(1.0) {
                    self.value = goal;
                    self.seg = Segment::Idle;
                }
            }
        }
        self.value
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn run(p: &mut Param, secs: f32) -> f32 {
        let mut v = p.value();
        for _ in 0..((secs * SR) as usize) {
            v = p.next();
        }
        v
    }

    #[test]
    fn linear_ramp_reaches_target_on_time() {
        let mut p = Param::new(0.0, SR);
        p.schedule(Ramp::Linear { to: 1.0, secs: 0.5 });
        let half = run(&mut p, 0.25);
        assert!((half - 0.5).abs() < 1e-3, "half={}", half);
        let end = run(&mut p, 0.25);
        assert_eq!(end, 1.0);
        assert!(p.is_idle());
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut p = Param::new(0.01, SR);
        p.schedule(Ramp::Exponential { to: 1.0, secs: 1.0 });
        let mid = run(&mut p, 0.5);
        // geometric midpoint of 0.01 and 1.0
        assert!((mid - 0.1).abs() < 2e-3, "mid={}", mid);
        assert!((run(&mut p, 0.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn exponential_from_zero_falls_back_to_linear() {
        let mut p = Param::new(0.0, SR);
        p.schedule(Ramp::Exponential { to: 1.0, secs: 1.0 });
        let mid = run(&mut p, 0.5);
        assert!((mid - 0.5).abs() < 1e-3, "mid={}", mid);
    }

    #[test]
    fn target_settles_after_five_time_constants() {
        let mut p = Param::new(0.6, SR);
        p.set_target(0.2, 0.1);
        let v = run(&mut p, 0.5);
        assert!((v - 0.2).abs() < 0.4 * 0.01, "v={}", v);
    }

    #[test]
    fn curve_offsets_are_absolute() {
        let c = Curve::new().set(0.0).linear_at(0.3, 0.01).exponential_at(0.001, 3.0);
        assert_eq!(c.ramps().len(), 3);
        assert!((c.duration() - 3.0).abs() < 1e-6);
        match c.ramps()[2] {
            Ramp::Exponential { secs, .. } => assert!((secs - 2.99).abs() < 1e-5),
            r => panic!("unexpected ramp {:?}", r),
        }

        let mut p = Param::with_curve(0.7, SR, &c);
        let peak = run(&mut p, 0.01);
        assert!((peak - 0.3).abs() < 1e-3, "peak={}", peak);
        let tail = run(&mut p, 2.99);
        assert!((tail - 0.001).abs() < 1e-5, "tail={}", tail);
    }

    #[test]
    fn cancel_holds_current_value() {
        let mut p = Param::new(0.0, SR);
        p.schedule(Ramp::Linear { to: 1.0, secs: 1.0 });
        let v = run(&mut p, 0.5);
        p.cancel();
        let after = run(&mut p, 0.5);
        assert_eq!(v, after);
        assert!(p.is_idle());
    }

    #[test]
    fn full_lane_rejects_extra_ramps() {
        let mut p = Param::new(0.0, SR);
        for _ in 0..MAX_RAMPS {
            assert!(p.schedule(Ramp::Set(1.0)));
        }
        assert!(!p.schedule(Ramp::Set(2.0)));
    }
}
