//! The restored series: zen, polyrhythm, astral, elysium, quantum, forest,
//! celestial, lunar, somatic.
//!
//! Noise beds here use 2 s buffers; white beds carry an extra ×0.1.

use somnium_core::automation::Curve;
use somnium_core::dsp::cents_to_ratio;
use somnium_core::filters::SvfMode;
use somnium_core::noise::NoiseColor;

use super::{Cue, Patch, Scope, PLAIN_Q};
use crate::command::NodeId;
use crate::nodes::{Echo, EchoBus, Modulated, NoiseLayer, OneShot, ToneLayer, Wave};

// ------------------------------------- Zen ----------------------------------------

const ZEN_MASTER: f32 = 0.6;
const ZEN_NOTES: [f32; 6] = [523.25, 587.33, 659.25, 783.99, 880.0, 1046.5];

/// Pink breeze under FM wind chimes.
pub(super) fn zen(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 2.0);
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Lowpass, Modulated::lfo(400.0, 0.1, 200.0), PLAIN_Q)
            .gain(Modulated::fixed(0.15 * ZEN_MASTER)),
    );
    chime(s);
    Patch::Zen
}

pub(super) fn chime(s: &mut Scope<'_, '_>) {
    let sr = s.sr();
    let hz = s.pick(&ZEN_NOTES);
    let pan = s.uniform(-0.8, 0.8);
    let amp = Curve::new().linear_at(0.3 * ZEN_MASTER, 0.01).exponential_at(0.001 * ZEN_MASTER, 3.0);
    let index = Curve::new().exponential_at(0.01, 0.2);
    s.voice(OneShot::tone(Wave::Sine, hz, &amp, 3.1, sr).fm(hz * 2.5, 500.0, &index).pan(pan));
    let next = 1.0 + s.rand() * 4.0;
    s.after(next, Cue::Chain(0));
}

// --------------------------------- Polyrhythm -------------------------------------

const POLY_MASTER: f32 = 0.5;
/// (note, period s, pan) of the 4:3:5 loops.
const POLY_LOOPS: [(f32, f32, f32); 3] = [(261.63, 4.0, -0.5), (329.63, 3.0, 0.5), (392.0, 5.0, 0.0)];

pub(super) fn polyrhythm(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    s.spawn(ToneLayer::new(Wave::Sine, 130.81, sr).amp(Modulated::fixed(0.05 * POLY_MASTER)));
    for n in 0..POLY_LOOPS.len() as u8 {
        pulse(s, n);
    }
    Patch::Polyrhythm
}

pub(super) fn pulse(s: &mut Scope<'_, '_>, n: u8) {
    let Some(&(hz, period, pan)) = POLY_LOOPS.get(n as usize) else {
        return;
    };
    let sr = s.sr();
    let amp = Curve::new().linear_at(0.1 * POLY_MASTER, 0.05).exponential_at(0.001 * POLY_MASTER, 0.4);
    s.voice(
        OneShot::tone(Wave::Tri, hz, &amp, 0.5, sr)
            .filter(SvfMode::Lowpass, 800.0, PLAIN_Q, &Curve::new())
            .pan(pan),
    );
    s.after(period, Cue::Chain(n));
}

// ------------------------------------ Astral --------------------------------------

const ASTRAL_MASTER: f32 = 0.6;

/// 100/106 Hz binaural pair hard-panned, with slow saw shimmer swells.
pub(super) fn astral(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    for (hz, pan) in [(100.0, -1.0), (106.0, 1.0)] {
        s.spawn(ToneLayer::new(Wave::Sine, hz, sr).amp(Modulated::fixed(0.1 * ASTRAL_MASTER)).pan(pan));
    }
    shimmer(s);
    Patch::Astral
}

pub(super) fn shimmer(s: &mut Scope<'_, '_>) {
    let sr = s.sr();
    let hz = 200.0 + s.rand() * 400.0;
    let pan = s.uniform(-1.0, 1.0);
    let amp = Curve::new().linear_at(0.03 * ASTRAL_MASTER, 2.0).linear_at(0.0, 4.0);
    let sweep = Curve::new().linear_at(1000.0, 2.0).linear_at(200.0, 4.0);
    s.voice(
        OneShot::tone(Wave::Saw, hz, &amp, 4.1, sr)
            .filter(SvfMode::Lowpass, 200.0, PLAIN_Q, &sweep)
            .pan(pan),
    );
    let next = 1.5 + s.rand() * 0.3;
    s.after(next, Cue::Chain(0));
}

// ------------------------------------ Elysium -------------------------------------

/// Cmaj7 of detuned saw triplets, each through its own drifting low-pass.
pub(super) fn elysium(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.4;
    let sr = s.sr();
    for hz in [130.81, 164.81, 196.0, 246.94] {
        for cents in [-5.0, 0.0, 5.0] {
            let rate = 0.1 + s.rand() * 0.1;
            s.spawn(
                ToneLayer::new(Wave::Saw, hz * cents_to_ratio(cents), sr)
                    .filter(SvfMode::Lowpass, Modulated::lfo(400.0, rate, 150.0), PLAIN_Q)
                    .amp(Modulated::fixed(0.03 * MASTER)),
            );
        }
    }
    Patch::Elysium
}

// ------------------------------------ Quantum -------------------------------------

const QUANTUM_MASTER: f32 = 0.7;

/// Brown rumble with short square-wave blips scattered across the field.
pub(super) fn quantum(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let brown = s.noise(NoiseColor::Brown, 2.0);
    s.spawn(
        NoiseLayer::new(brown, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(80.0), PLAIN_Q)
            .gain(Modulated::fixed(QUANTUM_MASTER)),
    );
    blip(s);
    Patch::Quantum
}

pub(super) fn blip(s: &mut Scope<'_, '_>) {
    let sr = s.sr();
    let hz = 2000.0 + s.rand() * 3000.0;
    let pan = s.uniform(-1.0, 1.0);
    let amp = Curve::new().set(0.02 * QUANTUM_MASTER).exponential_at(0.001 * QUANTUM_MASTER, 0.05);
    s.voice(OneShot::tone(Wave::Square, hz, &amp, 0.1, sr).pan(pan));
    let next = 0.2 + s.rand() * 0.8;
    s.after(next, Cue::Chain(0));
}

// ------------------------------------ Forest --------------------------------------

const FOREST_MASTER: f32 = 0.5;

/// High-passed night air and fluttering FM chirps.
pub(super) fn forest(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 2.0);
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Highpass, Modulated::fixed(2000.0), PLAIN_Q)
            .gain(Modulated::fixed(0.1 * FOREST_MASTER)),
    );
    chirp(s);
    Patch::Forest
}

pub(super) fn chirp(s: &mut Scope<'_, '_>) {
    let sr = s.sr();
    let hz = 3000.0 + s.rand() * 1000.0;
    let tail = 0.2 + s.rand() * 0.3;
    let pan = s.uniform(-1.0, 1.0);
    let amp = Curve::new().linear_at(0.05 * FOREST_MASTER, 0.1).linear_at(0.0, tail);
    s.voice(OneShot::tone(Wave::Sine, hz, &amp, 0.6, sr).fm(40.0, 500.0, &Curve::new()).pan(pan));
    let next = 0.5 + s.rand() * 1.5;
    s.after(next, Cue::Chain(0));
}

// ----------------------------------- Celestial ------------------------------------

const CELESTIAL_MASTER: f32 = 0.5;
/// Db Lydian over two octaves.
const CELESTIAL_BELLS: [f32; 14] = [
    277.18, 311.13, 349.23, 392.0, 415.3, 466.16, 523.25, 554.37, 622.25, 698.46, 783.99, 830.61, 932.33, 1046.5,
];

/// Breathing pad and FM glass bells with a sparkle partial, bells also feeding
/// a damped 0.4/0.6 s ping-pong delay.
pub(super) fn celestial(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let delay = s.spawn(
        EchoBus::cross(Echo::new(0.4, 0.3, sr), Echo::new(0.6, 0.3, sr)).post_lowpass(2000.0, sr),
    );

    for (i, hz) in [138.59, 174.61, 207.65, 261.63, 311.13].into_iter().enumerate() {
        let wave = if i % 2 == 0 { Wave::Sine } else { Wave::Tri };
        let hz = hz * s.detune(5.0);
        let rate = 0.05 + s.rand() * 0.05;
        let pan = s.uniform(-0.75, 0.75);
        s.spawn(
            ToneLayer::new(wave, hz, sr)
                .amp(Modulated::lfo(0.03 * CELESTIAL_MASTER, rate, 0.03 * CELESTIAL_MASTER))
                .pan(pan),
        );
    }

    bell(s, delay);
    Patch::Celestial { delay }
}

pub(super) fn bell(s: &mut Scope<'_, '_>, delay: NodeId) {
    const M: f32 = CELESTIAL_MASTER;
    let sr = s.sr();
    let hz = s.pick(&CELESTIAL_BELLS);
    let pan = s.uniform(-0.8, 0.8);
    let index = Curve::new().linear_at(hz * 2.0, 0.01).exponential_at(0.1, 0.4);
    let amp = Curve::new().linear_at(0.15 * M, 0.02).exponential_at(0.001 * M, 4.0);
    let sparkle = Curve::new().linear_at(0.02 * M, 0.01).exponential_at(0.001 * M, 0.5);
    s.voice(
        OneShot::tone(Wave::Sine, hz, &amp, 4.1, sr)
            .fm(hz * 3.5, 0.0, &index)
            .partial(&Curve::new(), hz * 8.0, &sparkle, 1.0, false)
            .pan(pan)
            .send(delay, 1.0),
    );
    let next = 0.5 + s.rand() * 3.5;
    s.after(next, Cue::Chain(0));
}

// ---------------------------------- Lunar/Somatic ---------------------------------

/// Band-passed pink drifting around 150 Hz over a 40 Hz sub.
pub(super) fn lunar(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.6;
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 2.0);
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Bandpass, Modulated::lfo(150.0, 0.05, 100.0), 2.0)
            .gain(Modulated::fixed(0.3 * MASTER)),
    );
    s.spawn(ToneLayer::new(Wave::Sine, 40.0, sr).amp(Modulated::fixed(0.1 * MASTER)));
    Patch::Lunar
}

/// 174 Hz tone on a 100 Hz brown floor.
pub(super) fn somatic(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.6;
    let sr = s.sr();
    s.spawn(ToneLayer::new(Wave::Sine, 174.0, sr).amp(Modulated::fixed(0.15 * MASTER)));
    let brown = s.noise(NoiseColor::Brown, 2.0);
    s.spawn(
        NoiseLayer::new(brown, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(100.0), PLAIN_Q)
            .gain(Modulated::fixed(0.3 * MASTER)),
    );
    Patch::Somatic
}
