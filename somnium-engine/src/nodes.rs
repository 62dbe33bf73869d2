//! Building blocks (nodes) for Somnium generators.
//!
//! Everything here is a per-sample component stepped by the renderer. Voices are
//! built on the orchestration side (that is where buffers and delay lines are
//! allocated) and shipped to the renderer whole; once there, stepping them
//! never allocates.
//!
//! Contents:
//! - `Wave`, `Osc`     : basic oscillators (Sine/Tri/Saw/Square), through-zero safe phase
//! - `Lfo`             : low-frequency oscillator (same core as `Osc`), for modulation
//! - `Modulated`       : bias + LFO·depth control source
//! - `BufferLoop`      : looping player over a shared noise buffer
//! - `PanLaw`          : equal-power mono panning and stereo balance
//! - `NoiseLayer`      : looped noise → filters → gain/swell → pan
//! - `ToneLayer`       : sustained (detuned) oscillators → filter → breathing amp → pan
//! - `OneShot`         : enveloped, optionally FM, self-terminating voice with effect sends
//! - `EchoBus`         : feedback-delay send effect
//! - `Node`            : the closed set of voice kinds the renderer owns
//!
//! Notes:
//! - Frequency is **Hz**; methods expect the current **sample rate** when stepping.
//! - A `pan` of `None` means the mono voice feeds both channels at unity, which is
//!   how an unpanned mono source reaches a stereo bus.

use std::sync::Arc;

use somnium_core::automation::{Curve, Param};
use somnium_core::dsp::{fast_cos, fast_sin, kill_denormals, wrap_phase01, TAU};
use somnium_core::filters::{SvfMode, SvfTpt};

use crate::command::NodeId;

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Tri, Saw, Square }

/// Naive (non band-limited) shapes; fine for soft ambient material.
#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine   => fast_sin(TAU * phase01),
        Wave::Tri    => 1.0 - 4.0 * (phase01 - 0.5).abs(),
        Wave::Saw    => 2.0 * phase01 - 1.0,
        Wave::Square => if phase01 < 0.5 { 1.0 } else { -1.0 },
    }
}

/// Free-running oscillator. Negative frequencies (deep FM) run the phase backwards.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32, // [0,1)
    freq:  f32, // Hz
    wave:  Wave,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz, wave } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz; }
    #[inline] pub fn freq(&self) -> f32 { self.freq }

    /// Advance one sample and return the oscillator sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = osc_sample(self.phase, self.wave);
        self.phase = wrap_phase01(self.phase + self.freq / sr);
        s
    }
}

/// Low-frequency oscillator; identical to `Osc` but with convenience constructors.
#[derive(Copy, Clone, Debug)]
pub struct Lfo(Osc);

impl Lfo {
    #[inline] pub fn sine(rate_hz: f32) -> Self { Self(Osc::new(rate_hz, Wave::Sine)) }

    /// Next LFO value in **[-1,1]**.
    #[inline] pub fn next_norm(&mut self, sr: f32) -> f32 { self.0.next(sr) }

    #[inline] pub fn set_rate(&mut self, hz: f32) { self.0.set_freq(hz); }
    #[inline] pub fn rate(&self) -> f32 { self.0.freq() }
}

/// A control value: `base + depth * lfo`.
#[derive(Copy, Clone, Debug)]
pub struct Modulated {
    base: f32,
    depth: f32,
    lfo: Option<Lfo>,
}

impl Modulated {
    #[inline] pub fn fixed(v: f32) -> Self { Self { base: v, depth: 0.0, lfo: None } }
    #[inline]
    pub fn lfo(base: f32, rate_hz: f32, depth: f32) -> Self {
        Self { base, depth, lfo: Some(Lfo::sine(rate_hz)) }
    }
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        match &mut self.lfo {
            Some(l) => self.base + self.depth * l.next_norm(sr),
            None => self.base,
        }
    }
    #[inline] pub fn base(&self) -> f32 { self.base }
}

/// Loops a shared mono buffer.
#[derive(Clone, Debug)]
pub struct BufferLoop {
    buf: Arc<[f32]>,
    pos: usize,
}

impl BufferLoop {
    pub fn new(buf: Arc<[f32]>) -> Self { Self { buf, pos: 0 } }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.buf.is_empty() {
            return 0.0;
        }
        let s = self.buf[self.pos];
        self.pos += 1;
        if self.pos >= self.buf.len() {
            self.pos = 0;
        }
        s
    }
}

/// Panning laws.
#[derive(Copy, Clone, Debug)]
pub struct PanLaw;

impl PanLaw {
    /// Return (left, right) gains given `pan` in [-1..1], where -1 = hard left, +1 = hard right.
    #[inline]
    pub fn gains(pan: f32) -> (f32, f32) {
        let p = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * core::f32::consts::PI; // map to [0, π/2]
        (fast_cos(p), fast_sin(p))
    }

    /// Stereo balance used when a stereo signal goes through a panner: the far
    /// channel is folded into the near one with an equal-power taper, so pan 0
    /// is an exact pass-through.
    #[inline]
    pub fn stereo(pan: f32, l: f32, r: f32) -> (f32, f32) {
        let pan = pan.clamp(-1.0, 1.0);
        let half_pi = 0.5 * core::f32::consts::PI;
        if pan <= 0.0 {
            let x = (pan + 1.0) * half_pi;
            (l + r * fast_cos(x), r * fast_sin(x))
        } else {
            let x = pan * half_pi;
            (l * fast_cos(x), r + l * fast_sin(x))
        }
    }

    /// Place a mono sample: panned with equal power, or duplicated at unity.
    #[inline]
    pub fn place(pan: Option<f32>, x: f32) -> (f32, f32) {
        match pan {
            Some(p) => {
                let (gl, gr) = Self::gains(p);
                (x * gl, x * gr)
            }
            None => (x, x),
        }
    }
}

/// SVF with a modulated cutoff.
#[derive(Copy, Clone, Debug)]
pub struct FilterStage {
    svf: SvfTpt,
    mode: SvfMode,
    cutoff: Modulated,
}

impl FilterStage {
    pub fn new(mode: SvfMode, cutoff: Modulated, q: f32, sr: f32) -> Self {
        Self { svf: SvfTpt::new(cutoff.base().max(10.0), q, sr), mode, cutoff }
    }

    #[inline]
    pub fn process(&mut self, x: f32, sr: f32) -> f32 {
        let c = self.cutoff.next(sr);
        self.svf.set_cutoff_hz(c.max(10.0));
        self.svf.process(x, self.mode)
    }
}

// ---------------------------------- Noise layer -----------------------------------

/// Looped noise bed: source → up to two filters → gain (× swell lane) → pan.
#[derive(Clone, Debug)]
pub struct NoiseLayer {
    src: BufferLoop,
    filters: [Option<FilterStage>; 2],
    gain: Modulated,
    swell: Param,
    pan: Option<Modulated>,
    sr: f32,
}

impl NoiseLayer {
    pub fn new(buf: Arc<[f32]>, sr: f32) -> Self {
        Self {
            src: BufferLoop::new(buf),
            filters: [None, None],
            gain: Modulated::fixed(1.0),
            swell: Param::new(1.0, sr),
            pan: None,
            sr,
        }
    }

    /// Append a filter stage (at most two; extra stages are ignored).
    pub fn filter(mut self, mode: SvfMode, cutoff: Modulated, q: f32) -> Self {
        let stage = FilterStage::new(mode, cutoff, q, self.sr);
        if let Some(slot) = self.filters.iter_mut().find(|f| f.is_none()) {
            *slot = Some(stage);
        }
        self
    }

    pub fn gain(mut self, g: Modulated) -> Self { self.gain = g; self }
    pub fn pan(mut self, p: Modulated) -> Self { self.pan = Some(p); self }

    /// Initial value of the swell lane (automated later through `Command::Automate`).
    pub fn swell(mut self, v: f32) -> Self { self.swell = Param::new(v, self.sr); self }

    /// Start the swell lane at `v` and run `curve` from the first sample.
    pub fn swell_from(mut self, v: f32, curve: &Curve) -> Self {
        self.swell = Param::with_curve(v, self.sr, curve);
        self
    }

    pub fn swell_mut(&mut self) -> &mut Param { &mut self.swell }

    #[inline]
    pub fn next(&mut self, sr: f32) -> (f32, f32) {
        let mut x = self.src.next();
        for f in self.filters.iter_mut().flatten() {
            x = f.process(x, sr);
        }
        x *= self.gain.next(sr) * self.swell.next();
        let pan = self.pan.as_mut().map(|p| p.next(sr));
        PanLaw::place(pan, x)
    }
}

// ---------------------------------- Tone layer ------------------------------------

/// Sustained oscillators (summed) → optional filter → breathing amplitude → pan.
#[derive(Clone, Debug)]
pub struct ToneLayer {
    oscs: Vec<(Osc, f32)>,
    vibrato: Option<(Lfo, f32)>,
    filter: Option<FilterStage>,
    amp: Modulated,
    pan: Option<f32>,
    sr: f32,
}

impl ToneLayer {
    pub fn new(wave: Wave, freq_hz: f32, sr: f32) -> Self {
        Self {
            oscs: vec![(Osc::new(freq_hz, wave), freq_hz)],
            vibrato: None,
            filter: None,
            amp: Modulated::fixed(1.0),
            pan: None,
            sr,
        }
    }

    /// Add another oscillator to the same layer.
    pub fn with_osc(mut self, wave: Wave, freq_hz: f32) -> Self {
        self.oscs.push((Osc::new(freq_hz, wave), freq_hz));
        self
    }

    /// Frequency drift shared by the layer's oscillators (± `depth_hz`).
    pub fn vibrato(mut self, rate_hz: f32, depth_hz: f32) -> Self {
        self.vibrato = Some((Lfo::sine(rate_hz), depth_hz));
        self
    }

    pub fn filter(mut self, mode: SvfMode, cutoff: Modulated, q: f32) -> Self {
        self.filter = Some(FilterStage::new(mode, cutoff, q, self.sr));
        self
    }

    pub fn amp(mut self, a: Modulated) -> Self { self.amp = a; self }
    pub fn pan(mut self, p: f32) -> Self { self.pan = Some(p); self }

    #[inline]
    pub fn next(&mut self, sr: f32) -> (f32, f32) {
        let drift = match &mut self.vibrato {
            Some((lfo, depth)) => *depth * lfo.next_norm(sr),
            None => 0.0,
        };
        let mut x = 0.0;
        for (osc, base) in self.oscs.iter_mut() {
            osc.set_freq(*base + drift);
            x += osc.next(sr);
        }
        if let Some(f) = &mut self.filter {
            x = f.process(x, sr);
        }
        x *= self.amp.next(sr);
        PanLaw::place(self.pan, x)
    }
}

// ----------------------------------- One-shots ------------------------------------

/// What a one-shot voice plays.
#[derive(Clone, Debug)]
pub enum Source {
    Osc(Osc),
    Noise(BufferLoop),
}

/// FM modulator: fixed-frequency sine whose output, scaled by the `index` lane,
/// is added to the carrier frequency in Hz.
#[derive(Copy, Clone, Debug)]
pub struct Fm {
    osc: Osc,
    index: Param,
}

/// Extra partial mixed into a one-shot (bell sparkle, percussive thump).
#[derive(Copy, Clone, Debug)]
pub struct Partial {
    osc: Osc,
    freq: Param,
    amp: Param,
    length: u32,
    through_amp: bool,
}

/// Effect send from a one-shot to a bus node. `slot` is the renderer's cached
/// arena index, refreshed whenever the arena changes shape.
#[derive(Copy, Clone, Debug)]
pub struct Send {
    pub bus: NodeId,
    pub gain: f32,
    pub(crate) slot: Option<usize>,
}

/// Enveloped voice with a hard length. Once `age >= length` it is finished and
/// the renderer drops it on its own.
#[derive(Clone, Debug)]
pub struct OneShot {
    source: Source,
    freq: Param,
    fm: Option<Fm>,
    filter: Option<(SvfTpt, SvfMode, Param)>,
    amp: Param,
    partial: Option<Partial>,
    pan: Option<f32>,
    dry: f32,
    sends: [Option<Send>; 2],
    age: u32,
    length: u32,
    sr: f32,
}

impl OneShot {
    /// Oscillator voice lasting `length_s` seconds (oscillator stop time).
    pub fn tone(wave: Wave, freq_hz: f32, amp: &Curve, length_s: f32, sr: f32) -> Self {
        Self::with_source(Source::Osc(Osc::new(freq_hz, wave)), freq_hz, amp, length_s, sr)
    }

    /// Noise-burst voice.
    pub fn noise(buf: Arc<[f32]>, amp: &Curve, length_s: f32, sr: f32) -> Self {
        Self::with_source(Source::Noise(BufferLoop::new(buf)), 0.0, amp, length_s, sr)
    }

    fn with_source(source: Source, freq_hz: f32, amp: &Curve, length_s: f32, sr: f32) -> Self {
        Self {
            source,
            freq: Param::new(freq_hz, sr),
            fm: None,
            filter: None,
            amp: Param::with_curve(0.0, sr, amp),
            partial: None,
            pan: None,
            dry: 1.0,
            sends: [None, None],
            age: 0,
            length: (length_s.max(0.0) * sr) as u32,
            sr,
        }
    }

    /// Automate the carrier frequency (pitch sweeps).
    pub fn freq_curve(mut self, curve: &Curve) -> Self {
        self.freq.apply(curve);
        self
    }

    /// Frequency-modulate the carrier with a sine at `mod_hz`; `index` is in Hz.
    pub fn fm(mut self, mod_hz: f32, index_start: f32, index: &Curve) -> Self {
        self.fm = Some(Fm {
            osc: Osc::new(mod_hz, Wave::Sine),
            index: Param::with_curve(index_start, self.sr, index),
        });
        self
    }

    /// Filter with a (possibly automated) cutoff.
    pub fn filter(mut self, mode: SvfMode, cutoff_hz: f32, q: f32, cutoff: &Curve) -> Self {
        let svf = SvfTpt::new(cutoff_hz.max(10.0), q, self.sr);
        self.filter = Some((svf, mode, Param::with_curve(cutoff_hz, self.sr, cutoff)));
        self
    }

    /// Add a sine partial. With `through_amp` it is shaped by the main envelope too.
    pub fn partial(mut self, freq: &Curve, freq_start: f32, amp: &Curve, length_s: f32, through_amp: bool) -> Self {
        self.partial = Some(Partial {
            osc: Osc::new(freq_start, Wave::Sine),
            freq: Param::with_curve(freq_start, self.sr, freq),
            amp: Param::with_curve(0.0, self.sr, amp),
            length: (length_s.max(0.0) * self.sr) as u32,
            through_amp,
        });
        self
    }

    pub fn pan(mut self, p: f32) -> Self { self.pan = Some(p); self }
    pub fn dry(mut self, g: f32) -> Self { self.dry = g; self }

    /// Route a copy of the panned output to `bus` (at most two sends).
    pub fn send(mut self, bus: NodeId, gain: f32) -> Self {
        if let Some(slot) = self.sends.iter_mut().find(|s| s.is_none()) {
            *slot = Some(Send { bus, gain, slot: None });
        }
        self
    }

    #[inline] pub fn length_secs(&self) -> f32 { self.length as f32 / self.sr }
    #[inline] pub fn finished(&self) -> bool { self.age >= self.length }
    #[inline] pub fn dry_gain(&self) -> f32 { self.dry }
    #[inline] pub(crate) fn sends(&self) -> &[Option<Send>; 2] { &self.sends }
    #[inline] pub(crate) fn sends_mut(&mut self) -> &mut [Option<Send>; 2] { &mut self.sends }

    #[inline]
    pub fn next(&mut self, sr: f32) -> (f32, f32) {
        if self.finished() {
            return (0.0, 0.0);
        }
        self.age += 1;

        let mut x = match &mut self.source {
            Source::Osc(osc) => {
                let mut f = self.freq.next();
                if let Some(fm) = &mut self.fm {
                    f += fm.osc.next(sr) * fm.index.next();
                }
                osc.set_freq(f);
                osc.next(sr)
            }
            Source::Noise(buf) => buf.next(),
        };
        if let Some((svf, mode, cutoff)) = &mut self.filter {
            svf.set_cutoff_hz(cutoff.next().max(10.0));
            x = svf.process(x, *mode);
        }

        let mut pre = 0.0;
        let mut post = 0.0;
        if let Some(p) = &mut self.partial {
            if self.age <= p.length {
                p.osc.set_freq(p.freq.next());
                let s = p.osc.next(sr) * p.amp.next();
                if p.through_amp { pre = s } else { post = s }
            }
        }

        let y = kill_denormals((x + pre) * self.amp.next() + post);
        PanLaw::place(self.pan, y)
    }
}

// ------------------------------------ Echo bus ------------------------------------

/// One feedback delay line.
#[derive(Clone, Debug)]
pub struct Echo {
    line: Vec<f32>,
    pos: usize,
    feedback: f32,
    loop_filter: Option<(SvfTpt, SvfMode)>,
    pan: Option<f32>,
}

impl Echo {
    pub fn new(delay_s: f32, feedback: f32, sr: f32) -> Self {
        let len = ((delay_s * sr) as usize).max(1);
        Self { line: vec![0.0; len], pos: 0, feedback: feedback.clamp(0.0, 0.98), loop_filter: None, pan: None }
    }

    /// Filter inside the feedback loop (repeats get progressively darker/thinner).
    pub fn loop_filter(mut self, mode: SvfMode, cutoff_hz: f32, sr: f32) -> Self {
        self.loop_filter = Some((SvfTpt::new(cutoff_hz, 0.707, sr), mode));
        self
    }

    pub fn pan(mut self, p: f32) -> Self { self.pan = Some(p); self }

    #[inline] fn read(&self) -> f32 { self.line[self.pos] }

    #[inline]
    fn write_advance(&mut self, x: f32) {
        self.line[self.pos] = kill_denormals(x);
        self.pos += 1;
        if self.pos >= self.line.len() {
            self.pos = 0;
        }
    }

    #[inline]
    fn feedback_of(&mut self, y: f32) -> f32 {
        let y = match &mut self.loop_filter {
            Some((svf, mode)) => svf.process(y, *mode),
            None => y,
        };
        self.feedback * y
    }
}

/// Send effect made of feedback delays. Its input is the stereo sum of every
/// voice sending to it, folded to mono.
#[derive(Clone, Debug)]
pub struct EchoBus {
    echoes: Vec<Echo>,
    cross: bool,
    post: Option<SvfTpt>,
    level: f32,
}

impl EchoBus {
    /// Independent delay lines, each feeding back into itself.
    pub fn parallel(echoes: Vec<Echo>) -> Self {
        Self { echoes, cross: false, post: None, level: 1.0 }
    }

    /// Two lines feeding each other (ping-pong).
    pub fn cross(a: Echo, b: Echo) -> Self {
        Self { echoes: vec![a, b], cross: true, post: None, level: 1.0 }
    }

    /// Low-pass the summed echo output; the result is centred.
    pub fn post_lowpass(mut self, cutoff_hz: f32, sr: f32) -> Self {
        self.post = Some(SvfTpt::new(cutoff_hz, 0.707, sr));
        self
    }

    pub fn level(mut self, g: f32) -> Self { self.level = g; self }

    #[inline]
    pub fn process(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let x = 0.5 * (in_l + in_r);
        let mut l = 0.0;
        let mut r = 0.0;

        if self.cross && self.echoes.len() == 2 {
            let ya = self.echoes[0].read();
            let yb = self.echoes[1].read();
            let fa = self.echoes[1].feedback_of(yb);
            let fb = self.echoes[0].feedback_of(ya);
            self.echoes[0].write_advance(x + fa);
            self.echoes[1].write_advance(x + fb);
            match &mut self.post {
                Some(lp) => {
                    let y = lp.process_lp(ya + yb);
                    l = y;
                    r = y;
                }
                None => {
                    let (al, ar) = PanLaw::place(self.echoes[0].pan, ya);
                    let (bl, br) = PanLaw::place(self.echoes[1].pan, yb);
                    l = al + bl;
                    r = ar + br;
                }
            }
        } else {
            let mut sum = 0.0;
            for e in self.echoes.iter_mut() {
                let y = e.read();
                let fb = e.feedback_of(y);
                e.write_advance(x + fb);
                if self.post.is_some() {
                    sum += y;
                } else {
                    let (el, er) = PanLaw::place(e.pan, y);
                    l += el;
                    r += er;
                }
            }
            if let Some(lp) = &mut self.post {
                let y = lp.process_lp(sum);
                l = y;
                r = y;
            }
        }
        (l * self.level, r * self.level)
    }
}

// -------------------------------------- Node --------------------------------------

/// Every voice kind the renderer can own.
#[derive(Clone, Debug)]
pub enum Node {
    Noise(NoiseLayer),
    Tone(ToneLayer),
    OneShot(OneShot),
    Echo(EchoBus),
}

impl Node {
    #[inline] pub fn is_bus(&self) -> bool { matches!(self, Node::Echo(_)) }

    #[inline]
    pub fn finished(&self) -> bool {
        match self {
            Node::OneShot(v) => v.finished(),
            _ => false,
        }
    }
}

impl From<NoiseLayer> for Node { fn from(v: NoiseLayer) -> Self { Node::Noise(v) } }
impl From<ToneLayer> for Node { fn from(v: ToneLayer) -> Self { Node::Tone(v) } }
impl From<OneShot> for Node { fn from(v: OneShot) -> Self { Node::OneShot(v) } }
impl From<EchoBus> for Node { fn from(v: EchoBus) -> Self { Node::Echo(v) } }

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn osc_phase_survives_negative_frequency() {
        let mut o = Osc::new(-440.0, Wave::Saw);
        for _ in 0..SR as usize {
            let s = o.next(SR);
            assert!((-1.0..=1.0).contains(&s), "s={}", s);
        }
    }

    #[test]
    fn pan_law_is_equal_power() {
        for p in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = PanLaw::gains(p);
            assert!((l * l + r * r - 1.0).abs() < 1e-3, "pan={} l={} r={}", p, l, r);
        }
        let (l, r) = PanLaw::gains(-1.0);
        assert!(l > 0.999 && r < 1e-3);
    }

    #[test]
    fn stereo_pan_centre_is_pass_through() {
        let (l, r) = PanLaw::stereo(0.0, 0.3, -0.7);
        assert!((l - 0.3).abs() < 1e-4 && (r + 0.7).abs() < 1e-4, "l={} r={}", l, r);
        let (l, r) = PanLaw::stereo(1.0, 0.5, 0.0);
        assert!(l.abs() < 1e-3 && (r - 0.5).abs() < 1e-3, "l={} r={}", l, r);
    }

    #[test]
    fn one_shot_finishes_and_goes_silent() {
        let amp = Curve::new().set(0.0).linear_at(0.3, 0.01).exponential_at(0.001, 0.5);
        let mut v = OneShot::tone(Wave::Sine, 440.0, &amp, 0.6, SR)
            .fm(1100.0, 500.0, &Curve::new().exponential_at(0.01, 0.2))
            .pan(0.2);
        let mut peak = 0.0f32;
        let n = (0.6 * SR) as usize;
        for _ in 0..n {
            let (l, r) = v.next(SR);
            peak = peak.max(l.abs()).max(r.abs());
        }
        assert!(v.finished());
        assert!(peak > 0.05 && peak < 0.35, "peak={}", peak);
        assert_eq!(v.next(SR), (0.0, 0.0));
    }

    #[test]
    fn noise_layer_swell_gates_output() {
        let buf: Arc<[f32]> = (0..4800).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let mut layer = NoiseLayer::new(buf, SR).swell(0.0);
        let (l, r) = layer.next(SR);
        assert_eq!((l, r), (0.0, 0.0));
        layer.swell_mut().apply(&Curve::new().linear(1.0, 0.01));
        let mut last = (0.0, 0.0);
        for _ in 0..960 {
            last = layer.next(SR);
        }
        assert!((last.0.abs() - 0.5).abs() < 1e-4, "{:?}", last);
    }

    #[test]
    fn echo_repeats_and_decays() {
        let mut bus = EchoBus::parallel(vec![Echo::new(0.01, 0.5, SR)]);
        let delay = (0.01 * SR) as usize;
        let mut out = Vec::new();
        out.push(bus.process(1.0, 1.0).0);
        for _ in 1..(3 * delay + 1) {
            out.push(bus.process(0.0, 0.0).0);
        }
        assert!((out[delay] - 1.0).abs() < 1e-6, "first repeat {}", out[delay]);
        assert!((out[2 * delay] - 0.5).abs() < 1e-6, "second repeat {}", out[2 * delay]);
        assert!((out[3 * delay] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn ping_pong_alternates_lines() {
        let sr = 1000.0;
        let mut bus = EchoBus::cross(Echo::new(0.004, 0.5, sr).pan(-1.0), Echo::new(0.006, 0.5, sr).pan(1.0));
        let mut left = vec![];
        let mut right = vec![];
        let (l, r) = bus.process(1.0, 1.0);
        left.push(l);
        right.push(r);
        for _ in 0..20 {
            let (l, r) = bus.process(0.0, 0.0);
            left.push(l);
            right.push(r);
        }
        assert!(left[4] > 0.99 && right[6] > 0.99);
        // line A feeds line B: 4 + 6 samples later B repeats A at half level
        assert!((right[10] - 0.5).abs() < 1e-3, "{:?}", right);
    }
}
