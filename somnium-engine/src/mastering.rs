//! Mastering chain: the fixed topology every generator feeds.
//!
//! ```text
//! bus → tone LP ─┬────────────── dry ─┐
//!                └→ convolution × mix ┴→ fade → volume → pan ─→ analysis tap
//!                                                            └→ [safety chain] → route gain → out
//! safety chain: HP 45 Hz → LP 16 kHz → tanh shaper (4×) → limiter → hard clip ±0.99 → safe gain
//! ```
//!
//! Every user parameter is an automation lane; the setters only schedule
//! `target(v, 0.1 s)` approaches so nothing jumps. The exceptions are the ones
//! that are deliberately instantaneous: leaving autopan resets pan to the manual
//! value, and fades replace the gate's schedule.
//!
//! Switching safe mode never rewires mid-signal: the output is ramped to silence
//! over 5 ms, the route is swapped (safety state cleared on engage), then the
//! output ramps back up.

use std::sync::Arc;

use somnium_core::automation::{Curve, Param};
use somnium_core::dsp::{clamp, db_to_lin, lin_to_db, soft_clip, time_constant_coeff, tone_to_hz};
use somnium_core::filters::SvfTpt;

use crate::analysis::AnalysisTap;
use crate::config::{InitialParams, ReverbConfig};
use crate::nodes::{Lfo, PanLaw};
use crate::reverb::StereoConvolver;

/// Smoothing time constant of every user parameter.
pub const PARAM_TAU: f32 = 0.1;
/// Length of each half of the safe-mode switch (down, then up).
pub const ROUTE_RAMP_SECS: f32 = 0.005;
/// Shaper table size.
pub const CURVE_POINTS: usize = 65_536;
pub const HARD_CLIP: f32 = 0.99;

const TAP_CHUNK: usize = 128;

/// Cached control values of the chain.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MasterSettings {
    pub volume: f32,
    pub tone: f32,
    pub pan: f32,
    pub autopan: bool,
    pub autopan_speed: f32,
    pub safe_mode: bool,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self::from(&InitialParams::default())
    }
}

impl From<&InitialParams> for MasterSettings {
    fn from(p: &InitialParams) -> Self {
        Self {
            volume: clamp(p.volume, 0.0, 1.0),
            tone: clamp(p.tone, 0.0, 100.0),
            pan: clamp(p.pan, -1.0, 1.0),
            autopan: p.autopan,
            autopan_speed: clamp(p.autopan_speed, 0.01, 20.0),
            safe_mode: p.safe_mode,
        }
    }
}

// --------------------------------- Wave shaper ------------------------------------

/// Curve lookup with linear interpolation; input is clamped to [-1, 1].
/// With `oversample > 1` the input is linearly upsampled, shaped at the higher
/// rate and averaged back down.
#[derive(Clone, Debug)]
pub struct WaveShaper {
    curve: Arc<[f32]>,
    oversample: usize,
    prev: f32,
}

impl WaveShaper {
    pub fn new(curve: Arc<[f32]>, oversample: usize) -> Self {
        Self { curve, oversample: oversample.max(1), prev: 0.0 }
    }

    /// `tanh` over [-1, 1].
    pub fn soft_clip_curve() -> Arc<[f32]> {
        (0..CURVE_POINTS)
            .map(|i| soft_clip((i * 2) as f32 / CURVE_POINTS as f32 - 1.0))
            .collect()
    }

    /// Identity clamped to ±`HARD_CLIP`.
    pub fn hard_clip_curve() -> Arc<[f32]> {
        (0..CURVE_POINTS)
            .map(|i| clamp((i * 2) as f32 / CURVE_POINTS as f32 - 1.0, -HARD_CLIP, HARD_CLIP))
            .collect()
    }

    #[inline]
    fn lookup(&self, x: f32) -> f32 {
        let n = self.curve.len();
        if n == 0 {
            return x;
        }
        let v = (n - 1) as f32 * 0.5 * (clamp(x, -1.0, 1.0) + 1.0);
        let k = v as usize;
        if k + 1 >= n {
            return self.curve[n - 1];
        }
        let f = v - k as f32;
        self.curve[k] + f * (self.curve[k + 1] - self.curve[k])
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        if self.oversample == 1 {
            return self.lookup(x);
        }
        let os = self.oversample as f32;
        let mut acc = 0.0;
        for i in 1..=self.oversample {
            let t = i as f32 / os;
            acc += self.lookup(self.prev + (x - self.prev) * t);
        }
        self.prev = x;
        acc / os
    }

    pub fn reset(&mut self) { self.prev = 0.0; }
}

// ----------------------------------- Limiter --------------------------------------

/// Stereo-linked feed-forward peak limiter with a hard knee.
#[derive(Copy, Clone, Debug)]
pub struct Limiter {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    env: f32,
}

impl Limiter {
    pub fn new(threshold_db: f32, ratio: f32, attack_s: f32, release_s: f32, sr: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack: time_constant_coeff(attack_s, sr),
            release: time_constant_coeff(release_s, sr),
            env: 0.0,
        }
    }

    /// Gain reduction (≤ 0 dB) for a detector level in dB.
    #[inline]
    fn gain_db(&self, level_db: f32) -> f32 {
        if level_db <= self.threshold_db {
            0.0
        } else {
            (self.threshold_db - level_db) * (1.0 - 1.0 / self.ratio)
        }
    }

    #[inline]
    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        let peak = l.abs().max(r.abs());
        let a = if peak > self.env { self.attack } else { self.release };
        self.env = a * self.env + (1.0 - a) * peak;
        let g = db_to_lin(self.gain_db(lin_to_db(self.env)));
        (l * g, r * g)
    }

    pub fn reduction_db(&self) -> f32 { -self.gain_db(lin_to_db(self.env)) }
    pub fn reset(&mut self) { self.env = 0.0; }
}

// -------------------------------- Safety chain ------------------------------------

/// Hearing-protection sub-chain.
#[derive(Clone, Debug)]
pub struct SafetyChain {
    low_cut: [SvfTpt; 2],
    high_cut: [SvfTpt; 2],
    soft: [WaveShaper; 2],
    limiter: Limiter,
    hard: WaveShaper,
    gain: f32,
}

impl SafetyChain {
    pub fn new(sr: f32) -> Self {
        let soft = WaveShaper::new(WaveShaper::soft_clip_curve(), 4);
        Self {
            low_cut: [SvfTpt::new(45.0, 0.707, sr); 2],
            high_cut: [SvfTpt::new(16_000.0, 0.707, sr); 2],
            soft: [soft.clone(), soft],
            limiter: Limiter::new(-2.0, 20.0, 0.003, 0.25, sr),
            hard: WaveShaper::new(WaveShaper::hard_clip_curve(), 1),
            gain: 1.0,
        }
    }

    #[inline]
    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        let l = self.soft[0].process(self.high_cut[0].process_lp(self.low_cut[0].process_hp(l)));
        let r = self.soft[1].process(self.high_cut[1].process_lp(self.low_cut[1].process_hp(r)));
        let (l, r) = self.limiter.process(l, r);
        (self.hard.process(l) * self.gain, self.hard.process(r) * self.gain)
    }

    pub fn reset(&mut self) {
        for f in self.low_cut.iter_mut().chain(self.high_cut.iter_mut()) {
            f.reset();
        }
        for s in self.soft.iter_mut() {
            s.reset();
        }
        self.limiter.reset();
    }
}

// -------------------------------- Master chain ------------------------------------

pub struct MasterChain {
    sr: f32,
    tone_hz: Param,
    tone_lp: [SvfTpt; 2],
    reverb: StereoConvolver,
    reverb_mix: f32,
    fade: Param,
    volume: Param,
    pan: Param,
    manual_pan: f32,
    autopan: Option<Lfo>,
    tap: AnalysisTap,
    tap_buf: [[f32; TAP_CHUNK]; 2],
    tap_len: usize,
    safety: SafetyChain,
    safe_active: bool,
    safe_pending: Option<bool>,
    route: Param,
}

impl core::fmt::Debug for MasterChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MasterChain")
            .field("tone_hz", &self.tone_hz.value())
            .field("volume", &self.volume.value())
            .field("pan", &self.pan.value())
            .field("fade", &self.fade.value())
            .field("safe_mode", &self.safe_mode())
            .finish()
    }
}

impl MasterChain {
    /// Build the chain with the cached settings applied immediately (no ramps)
    /// and the fade gate closed.
    pub fn new(s: &MasterSettings, ir: &[Vec<f32>; 2], reverb: &ReverbConfig, tap: AnalysisTap, sr: f32) -> Self {
        let hz = tone_to_hz(s.tone);
        let mut chain = Self {
            sr,
            tone_hz: Param::new(hz, sr),
            // Q 0.707: Butterworth, flat up to the corner.
            tone_lp: [SvfTpt::new(hz, 0.707, sr); 2],
            reverb: StereoConvolver::new(ir, reverb.partition),
            reverb_mix: reverb.mix,
            fade: Param::new(0.0, sr),
            volume: Param::new(clamp(s.volume, 0.0, 1.0), sr),
            pan: Param::new(clamp(s.pan, -1.0, 1.0), sr),
            manual_pan: clamp(s.pan, -1.0, 1.0),
            autopan: None,
            tap,
            tap_buf: [[0.0; TAP_CHUNK]; 2],
            tap_len: 0,
            safety: SafetyChain::new(sr),
            safe_active: s.safe_mode,
            safe_pending: None,
            route: Param::new(1.0, sr),
        };
        if s.autopan {
            chain.set_autopan(true, s.autopan_speed, s.pan);
        }
        chain
    }

    // ---- control (applied by the renderer between quanta) ----

    pub fn set_volume(&mut self, v: f32) {
        self.volume.set_target(clamp(v, 0.0, 1.0), PARAM_TAU);
    }

    pub fn set_tone(&mut self, v: f32) {
        self.tone_hz.set_target(tone_to_hz(v), PARAM_TAU);
    }

    /// Remembered always; applied only while autopan is off.
    pub fn set_pan(&mut self, v: f32) {
        self.manual_pan = clamp(v, -1.0, 1.0);
        if self.autopan.is_none() {
            self.pan.set_target(self.manual_pan, PARAM_TAU);
        }
    }

    pub fn set_autopan(&mut self, enabled: bool, speed_hz: f32, manual_pan: f32) {
        self.manual_pan = clamp(manual_pan, -1.0, 1.0);
        if enabled {
            let speed = clamp(speed_hz, 0.01, 20.0);
            match &mut self.autopan {
                Some(lfo) => lfo.set_rate(speed),
                None => self.autopan = Some(Lfo::sine(speed)),
            }
        } else if self.autopan.take().is_some() {
            self.pan.set_immediate(self.manual_pan);
        }
    }

    pub fn set_safe_mode(&mut self, enabled: bool) {
        if self.safe_mode() == enabled {
            return;
        }
        self.safe_pending = Some(enabled);
        self.route.cancel();
        self.route.apply(&Curve::new().linear(0.0, ROUTE_RAMP_SECS));
    }

    /// Replace the fade gate's schedule; the lane holds its current value first.
    pub fn fade(&mut self, curve: &Curve) {
        self.fade.cancel();
        self.fade.apply(curve);
    }

    /// Open the gate over `duration` s: linear to 0.01 within 0.1 s, then
    /// exponential to 1 (fades of 0.1 s or less are a single linear ramp).
    /// With `from_current` the ramp starts wherever the gate is, so switching
    /// sounds never dips.
    pub fn fade_in(&mut self, duration: f32, from_current: bool) {
        let duration = duration.max(0.0);
        let start = if from_current { self.fade.value() } else { 0.0 };
        let mut c = Curve::new().set(start);
        if duration <= 0.1 {
            c = c.linear(1.0, duration);
        } else {
            if start < 0.01 {
                c = c.linear_at(0.01, 0.1);
            }
            c = c.exponential_at(1.0, duration);
        }
        self.fade(&c);
    }

    // ---- read-back ----

    #[inline] pub fn volume(&self) -> f32 { self.volume.value() }
    #[inline] pub fn tone_hz(&self) -> f32 { self.tone_hz.value() }
    #[inline] pub fn pan(&self) -> f32 { self.pan.value() }
    #[inline] pub fn fade_level(&self) -> f32 { self.fade.value() }
    #[inline] pub fn autopan(&self) -> bool { self.autopan.is_some() }
    #[inline] pub fn tone_filter(&self) -> &SvfTpt { &self.tone_lp[0] }

    /// Requested routing (a pending switch counts as done).
    #[inline] pub fn safe_mode(&self) -> bool { self.safe_pending.unwrap_or(self.safe_active) }

    /// Routing currently carrying signal.
    #[inline] pub fn safe_routed(&self) -> bool { self.safe_active }

    // ---- audio ----

    #[inline]
    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        let hz = self.tone_hz.next();
        let tl = {
            self.tone_lp[0].set_cutoff_hz(hz);
            self.tone_lp[0].process_lp(l)
        };
        let tr = {
            self.tone_lp[1].set_cutoff_hz(hz);
            self.tone_lp[1].process_lp(r)
        };

        let (wl, wr) = self.reverb.process(tl, tr);
        let g = self.fade.next() * self.volume.next();
        let ml = (tl + wl * self.reverb_mix) * g;
        let mr = (tr + wr * self.reverb_mix) * g;

        let manual = self.pan.next();
        let pan = match &mut self.autopan {
            Some(lfo) => lfo.next_norm(self.sr),
            None => manual,
        };
        let (pl, pr) = PanLaw::stereo(pan, ml, mr);
        self.feed_tap(pl, pr);

        let (ol, or) = if self.safe_active { self.safety.process(pl, pr) } else { (pl, pr) };

        let route = self.route.next();
        if let Some(target) = self.safe_pending {
            if route <= 0.0 && self.route.is_idle() {
                if target && !self.safe_active {
                    self.safety.reset();
                }
                self.safe_active = target;
                self.safe_pending = None;
                self.route.apply(&Curve::new().linear(1.0, ROUTE_RAMP_SECS));
            }
        }
        (ol * route, or * route)
    }

    #[inline]
    fn feed_tap(&mut self, l: f32, r: f32) {
        self.tap_buf[0][self.tap_len] = l;
        self.tap_buf[1][self.tap_len] = r;
        self.tap_len += 1;
        if self.tap_len == TAP_CHUNK {
            self.tap_len = 0;
            self.tap.left.push(&self.tap_buf[0]);
            self.tap.right.push(&self.tap_buf[1]);
        }
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;

    const SR: f32 = 48_000.0;

    fn chain(s: MasterSettings) -> MasterChain {
        // unit impulse: the wet path is a delayed copy of the dry one
        let mut ir = [vec![0.0; 64], vec![0.0; 64]];
        ir[0][0] = 1.0;
        ir[1][0] = 1.0;
        let reverb = ReverbConfig { partition: 64, mix: 0.0, ..ReverbConfig::default() };
        MasterChain::new(&s, &ir, &reverb, AnalysisTap::new(&AnalysisConfig::default()), SR)
    }

    fn run(m: &mut MasterChain, secs: f32, x: f32) -> (f32, f32) {
        let mut y = (0.0, 0.0);
        for _ in 0..(secs * SR) as usize {
            y = m.process(x, x);
        }
        y
    }

    #[test]
    fn shaper_interpolates_and_clamps() {
        let mut hard = WaveShaper::new(WaveShaper::hard_clip_curve(), 1);
        assert!((hard.process(0.5) - 0.5).abs() < 1e-3);
        assert!((hard.process(3.0) - HARD_CLIP).abs() < 1e-6);
        assert!((hard.process(-3.0) + HARD_CLIP).abs() < 1e-6);
        assert!(hard.process(f32::NAN).abs() <= 1.0);

        let mut soft = WaveShaper::new(WaveShaper::soft_clip_curve(), 4);
        let mut y = 0.0;
        for _ in 0..8 {
            y = soft.process(0.5);
        }
        assert!((y - 0.5f32.tanh()).abs() < 1e-3, "y={}", y);
    }

    #[test]
    fn limiter_pulls_loud_signal_down() {
        let mut lim = Limiter::new(-2.0, 20.0, 0.003, 0.25, SR);
        let mut y = (0.0, 0.0);
        for _ in 0..4800 {
            y = lim.process(2.0, -2.0);
        }
        // 8 dB over threshold at 20:1 ends up ~1.6 dB over it
        assert!(y.0 < 0.95 && y.0 > 0.8, "y={:?}", y);
        assert!((y.0 + y.1).abs() < 1e-6);
        assert!(lim.reduction_db() > 7.0);

        let mut quiet = Limiter::new(-2.0, 20.0, 0.003, 0.25, SR);
        assert_eq!(quiet.process(0.1, 0.1), (0.1, 0.1));
    }

    #[test]
    fn safety_chain_never_exceeds_hard_clip() {
        let mut s = SafetyChain::new(SR);
        let mut peak = 0.0f32;
        for i in 0..48_000 {
            let x = if (i / 100) % 2 == 0 { 8.0 } else { -8.0 };
            let (l, r) = s.process(x, -x);
            peak = peak.max(l.abs()).max(r.abs());
        }
        assert!(peak <= HARD_CLIP + 1e-6, "peak={}", peak);
    }

    #[test]
    fn volume_converges_to_target() {
        let mut m = chain(MasterSettings::default());
        assert!((m.volume() - 0.6).abs() < 1e-6);
        m.set_volume(0.25);
        run(&mut m, 0.5, 0.0);
        assert!((m.volume() - 0.25).abs() < 0.35 * 0.01, "v={}", m.volume());
        m.set_volume(7.0);
        run(&mut m, 0.6, 0.0);
        assert!((m.volume() - 1.0).abs() < 0.01);
    }

    #[test]
    fn tone_converges_to_mapped_corner() {
        let mut m = chain(MasterSettings::default());
        m.set_tone(20.0);
        run(&mut m, 1.0, 0.0);
        let want = tone_to_hz(20.0);
        assert!((m.tone_hz() - want).abs() < 1.0, "hz={} want={}", m.tone_hz(), want);
        assert_eq!(m.tone_filter().cutoff_hz(), m.tone_hz());
    }

    #[test]
    fn closed_gate_is_silent_and_fade_in_opens_it() {
        let mut m = chain(MasterSettings { safe_mode: false, ..MasterSettings::default() });
        assert_eq!(run(&mut m, 0.01, 0.5), (0.0, 0.0));
        m.fade_in(1.0, false);
        run(&mut m, 0.1, 0.5);
        assert!((m.fade_level() - 0.01).abs() < 1e-4, "fade={}", m.fade_level());
        run(&mut m, 0.9, 0.5);
        assert!((m.fade_level() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn fade_in_from_current_never_dips() {
        let mut m = chain(MasterSettings::default());
        m.fade_in(0.5, false);
        run(&mut m, 0.5, 0.0);
        m.fade(&Curve::new().linear(0.0, 1.0));
        run(&mut m, 0.5, 0.0);
        let before = m.fade_level();
        assert!(before > 0.4 && before < 0.6);
        m.fade_in(1.0, true);
        let mut last = before;
        for _ in 0..48_000 {
            m.process(0.0, 0.0);
            assert!(m.fade_level() >= last - 1e-6);
            last = m.fade_level();
        }
        assert!((last - 1.0).abs() < 1e-4);
    }

    #[test]
    fn autopan_off_restores_manual_pan() {
        let mut m = chain(MasterSettings::default());
        m.set_pan(0.4);
        run(&mut m, 0.6, 0.0);
        m.set_autopan(true, 2.0, 0.4);
        assert!(m.autopan());
        m.set_pan(-0.3);
        run(&mut m, 0.1, 0.0);
        m.set_autopan(false, 2.0, -0.3);
        assert!(!m.autopan());
        assert_eq!(m.pan(), -0.3);
    }

    #[test]
    fn safe_mode_switch_is_ramped() {
        let mut m = chain(MasterSettings { safe_mode: true, ..MasterSettings::default() });
        m.fade_in(0.0, false);
        run(&mut m, 0.05, 0.5);
        m.set_safe_mode(false);
        assert!(!m.safe_mode());
        assert!(m.safe_routed());
        let mut prev = m.process(0.5, 0.5).0;
        let mut max_step = 0.0f32;
        for _ in 0..960 {
            let y = m.process(0.5, 0.5).0;
            max_step = max_step.max((y - prev).abs());
            prev = y;
        }
        assert!(!m.safe_routed());
        assert!(max_step < 0.01, "step={}", max_step);

        m.set_safe_mode(true);
        m.set_safe_mode(true);
        run(&mut m, 0.02, 0.5);
        assert!(m.safe_mode() && m.safe_routed());
    }
}
