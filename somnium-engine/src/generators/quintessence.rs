//! The quintessence series: deep_somnus, cognitive, void, ethereal, biophilic.

use somnium_core::automation::Curve;
use somnium_core::filters::SvfMode;
use somnium_core::noise::NoiseColor;

use super::{Cue, Patch, Scope, PLAIN_Q};
use crate::nodes::{Echo, EchoBus, Modulated, NoiseLayer, OneShot, ToneLayer, Wave};

/// Muffled brown noise rocking gently across the field, a 40/43 Hz binaural
/// pair and a breathing C1 sub.
pub(super) fn deep_somnus(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.7;
    let sr = s.sr();
    let brown = s.noise(NoiseColor::Brown, 2.0);
    s.spawn(
        NoiseLayer::new(brown, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(110.0), 0.5)
            .gain(Modulated::fixed(MASTER))
            .pan(Modulated::lfo(0.0, 0.1, 0.2)),
    );
    for (hz, pan) in [(40.0, -1.0), (43.0, 1.0)] {
        s.spawn(ToneLayer::new(Wave::Sine, hz, sr).amp(Modulated::fixed(0.15 * MASTER)).pan(pan));
    }
    s.spawn(ToneLayer::new(Wave::Sine, 32.7, sr).amp(Modulated::lfo(0.1 * MASTER, 0.05, 0.05 * MASTER)));
    Patch::DeepSomnus
}

// ----------------------------------- Cognitive ------------------------------------

const COGNITIVE_MASTER: f32 = 0.6;
/// C major pentatonic, C4..A4.
const COGNITIVE_SCALE: [f32; 5] = [261.63, 293.66, 329.63, 392.0, 440.0];

/// Band-passed pink focus bed with sparse pentatonic blips on two chains.
pub(super) fn cognitive(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 2.0);
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Bandpass, Modulated::lfo(300.0, 0.08, 100.0), 0.5)
            .gain(Modulated::fixed(COGNITIVE_MASTER)),
    );
    focus_blip(s);
    s.after(1.5, Cue::Chain(0));
    Patch::Cognitive
}

pub(super) fn focus_blip(s: &mut Scope<'_, '_>) {
    const M: f32 = COGNITIVE_MASTER;
    let sr = s.sr();
    let hz = s.pick(&COGNITIVE_SCALE);
    let pan = s.uniform(-0.75, 0.75);
    let amp = Curve::new().linear_at(0.05 * M, 0.05).exponential_at(0.001 * M, 0.5);
    s.voice(OneShot::tone(Wave::Sine, hz, &amp, 0.6, sr).pan(pan));
    let next = 2.0 + s.rand() * 4.0;
    s.after(next, Cue::Chain(0));
}

// -------------------------------------- Void --------------------------------------

const VOID_MASTER: f32 = 0.8;
const IMPACT_SECS: f32 = 10.0;

/// Whisper of 8 kHz air; every 12..20 s a falling sub impact with its own dark
/// feedback delay.
pub(super) fn void(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let white = s.noise(NoiseColor::White, 2.0);
    s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Highpass, Modulated::fixed(8000.0), PLAIN_Q)
            .gain(Modulated::fixed(0.1 * 0.015 * VOID_MASTER)),
    );
    impact(s);
    Patch::Void
}

pub(super) fn impact(s: &mut Scope<'_, '_>) {
    const M: f32 = VOID_MASTER;
    let sr = s.sr();
    let echo = s.spawn(EchoBus::parallel(vec![
        Echo::new(0.5, 0.7, sr).loop_filter(SvfMode::Lowpass, 400.0, sr),
    ]));
    s.after(IMPACT_SECS, Cue::Release(echo));

    let fall = Curve::new().exponential_at(30.0, 3.0);
    let amp = Curve::new().linear_at(0.3 * M, 1.5).exponential_at(0.001 * M, 8.0);
    s.voice(
        OneShot::tone(Wave::Sine, 60.0, &amp, IMPACT_SECS, sr)
            .freq_curve(&fall)
            .send(echo, 1.0),
    );
    let next = 12.0 + s.rand() * 8.0;
    s.after(next, Cue::Chain(0));
}

// ----------------------------------- Ethereal -------------------------------------

/// G major 9 pad: each note a triangle and a sine, independently detuned,
/// breathing between silence and 0.16.
pub(super) fn ethereal(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.45;
    let sr = s.sr();
    for hz in [196.0, 246.94, 293.66, 349.23, 440.0] {
        let tri = hz * s.detune(5.0);
        let sine = hz * s.detune(5.0);
        let rate = 0.05 + s.rand() * 0.05;
        let pan = s.uniform(-0.9, 0.9);
        s.spawn(
            ToneLayer::new(Wave::Tri, tri, sr)
                .with_osc(Wave::Sine, sine)
                .amp(Modulated::lfo(0.08 * MASTER, rate, 0.08 * MASTER))
                .pan(pan),
        );
    }
    Patch::Ethereal
}

// ----------------------------------- Biophilic ------------------------------------

const BIOPHILIC_MASTER: f32 = 0.6;

/// Pink wind through a swaying low-pass, with FM crickets on two chains.
pub(super) fn biophilic(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 2.0);
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Lowpass, Modulated::lfo(400.0, 0.15, 300.0), PLAIN_Q)
            .gain(Modulated::fixed(0.2 * BIOPHILIC_MASTER)),
    );
    cricket(s);
    s.after(1.0, Cue::Chain(0));
    Patch::Biophilic
}

pub(super) fn cricket(s: &mut Scope<'_, '_>) {
    const M: f32 = BIOPHILIC_MASTER;
    let sr = s.sr();
    let hz = 4000.0 + s.rand() * 500.0;
    let flutter = 40.0 + s.rand() * 10.0;
    let tail = 0.5 + s.rand();
    let pan = s.uniform(-1.0, 1.0);
    let amp = Curve::new().linear_at(0.015 * M, 0.1).linear_at(0.0, tail);
    s.voice(OneShot::tone(Wave::Sine, hz, &amp, 2.0, sr).fm(flutter, 500.0, &Curve::new()).pan(pan));
    let next = 0.5 + s.rand() * 2.0;
    s.after(next, Cue::Chain(0));
}
