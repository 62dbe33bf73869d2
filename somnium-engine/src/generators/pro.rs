//! The pro series (silk, alchemist, horizon, stratus, stratus_evo) and the
//! artist piece status_ii.
//!
//! The note-based pieces run several event chains with co-prime periods, so
//! their patterns drift against each other and rarely repeat.

use somnium_core::automation::Curve;
use somnium_core::dsp::cents_to_ratio;
use somnium_core::filters::SvfMode;
use somnium_core::noise::NoiseColor;

use super::{Cue, Patch, Scope, PLAIN_Q};
use crate::command::NodeId;
use crate::nodes::{Echo, EchoBus, Modulated, NoiseLayer, OneShot, ToneLayer, Wave};

// ------------------------------------- Silk ---------------------------------------

/// Three rolling noise layers: brown rumble, swept pink swell, faint white silk.
pub(super) fn silk(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.6;
    let sr = s.sr();
    let brown = s.noise(NoiseColor::Brown, 2.0);
    let pink = s.noise(NoiseColor::Pink, 2.0);
    let white = s.noise(NoiseColor::White, 2.0);

    s.spawn(
        NoiseLayer::new(brown, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(180.0), PLAIN_Q)
            .gain(Modulated::lfo(0.8 * MASTER, 0.05, 0.1 * MASTER)),
    );
    s.spawn(
        NoiseLayer::new(pink, sr)
            .filter(SvfMode::Bandpass, Modulated::lfo(500.0, 0.12, 300.0), 0.5)
            .gain(Modulated::fixed(0.5 * MASTER)),
    );
    s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(2500.0), PLAIN_Q)
            .filter(SvfMode::Highpass, Modulated::fixed(1000.0), PLAIN_Q)
            .gain(Modulated::lfo(0.0, 0.03, 0.1 * 0.05 * MASTER)),
    );
    Patch::Silk
}

// ----------------------------------- Alchemist ------------------------------------

const ALCHEMIST_MASTER: f32 = 0.7;
const ALCHEMIST_SCALE: [f32; 8] = [220.0, 246.94, 261.63, 329.63, 349.23, 440.0, 493.88, 523.25];

/// Muted FM garden into a 0.35 s feedback delay, two overlapping chains.
pub(super) fn alchemist(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let delay = s.spawn(EchoBus::parallel(vec![Echo::new(0.35, 0.4, sr)]));
    garden_note(s, delay);
    s.after(1.0, Cue::Chain(0));
    Patch::Alchemist { delay }
}

pub(super) fn garden_note(s: &mut Scope<'_, '_>, delay: NodeId) {
    const M: f32 = ALCHEMIST_MASTER;
    let sr = s.sr();
    let hz = s.pick(&ALCHEMIST_SCALE);
    let pan = s.uniform(-0.75, 0.75);
    let index = Curve::new().linear_at(hz * 1.5, 0.01).exponential_at(0.01, 0.3);
    let amp = Curve::new().linear_at(0.1 * M, 0.02).exponential_at(0.001 * M, 2.5);
    s.voice(
        OneShot::tone(Wave::Sine, hz, &amp, 3.0, sr)
            .fm(hz * 2.5, 0.0, &index)
            .pan(pan)
            .send(delay, 1.0),
    );
    let next = 0.2 + s.rand() * 2.5;
    s.after(next, Cue::Chain(0));
}

// ------------------------------------ Horizon -------------------------------------

/// Panoramic drone: five roots × three detuned triangles, plus a low noise floor.
pub(super) fn horizon(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.4;
    let sr = s.sr();
    for root in [65.41, 77.78, 98.0, 116.54, 146.83] {
        for spread in [-6.0, 0.0, 6.0] {
            let jitter = s.uniform(-2.0, 2.0);
            let rate = 0.05 + s.rand() * 0.1;
            let pan = s.uniform(-0.75, 0.75);
            s.spawn(
                ToneLayer::new(Wave::Tri, root * cents_to_ratio(spread + jitter), sr)
                    .amp(Modulated::lfo(0.1 * MASTER, rate, 0.02 * MASTER))
                    .pan(pan),
            );
        }
    }
    let white = s.noise(NoiseColor::White, 2.0);
    s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(200.0), PLAIN_Q)
            .gain(Modulated::fixed(0.1 * 0.05 * MASTER)),
    );
    Patch::Horizon
}

// ------------------------------------ Stratus -------------------------------------

const STRATUS_MASTER: f32 = 0.55;
const STRATUS_POOL: [f32; 10] = [155.56, 196.0, 233.08, 293.66, 349.23, 311.13, 392.0, 466.16, 587.33, 698.46];
/// (period s, length scale, probability) of the three tide chains.
const STRATUS_CHAINS: [(f32, f32, f32); 3] = [(3.0, 1.0, 1.0), (5.0, 1.2, 0.7), (7.0, 1.5, 1.0)];

/// Saw tide pool: three chains on 3/5/7 s, each dropping a long filtered note.
pub(super) fn stratus(s: &mut Scope<'_, '_>) -> Patch {
    tide(s, 0);
    s.after(1.0, Cue::Chain(1));
    s.after(2.0, Cue::Chain(2));
    Patch::Stratus
}

pub(super) fn tide(s: &mut Scope<'_, '_>, n: u8) {
    const M: f32 = STRATUS_MASTER;
    let Some(&(period, scale, chance)) = STRATUS_CHAINS.get(n as usize) else {
        return;
    };
    if s.rand() < chance {
        let sr = s.sr();
        let hz = s.pick(&STRATUS_POOL);
        let cutoff = 400.0 + s.rand() * 200.0;
        let pan = s.uniform(-0.6, 0.6);
        let amp = Curve::new().linear_at(0.08 * M, 0.05).exponential_at(0.001 * M, 5.0 * scale);
        s.voice(
            OneShot::tone(Wave::Saw, hz, &amp, 6.0 * scale, sr)
                .filter(SvfMode::Lowpass, cutoff, PLAIN_Q, &Curve::new())
                .pan(pan),
        );
    }
    s.after(period, Cue::Chain(n));
}

// -------------------------------- Stratus: evolution ------------------------------

const EVO_MASTER: f32 = 0.55;
/// Eb Lydian, octave 3.
const EVO_SCALE: [f32; 7] = [155.56, 174.61, 196.0, 220.0, 233.08, 261.63, 293.66];
/// Eb major triad roots for the ground voice.
const EVO_ROOTS: [f32; 3] = [155.56, 196.0, 233.08];

/// FM piano on prime-period voices: ground every 3 s, arpeggio every 5 s,
/// melodic phrase every 7 s.
pub(super) fn stratus_evo(s: &mut Scope<'_, '_>) -> Patch {
    evo_voice(s, 0);
    s.after(1.2, Cue::Chain(1));
    s.after(2.5, Cue::Chain(2));
    Patch::StratusEvo
}

pub(super) fn evo_voice(s: &mut Scope<'_, '_>, n: u8) {
    match n {
        0 => {
            let hz = s.pick(&EVO_ROOTS);
            piano(s, hz, 0.6, 4.0);
            s.after(3.0, Cue::Chain(0));
        }
        1 => {
            for i in 0..3 {
                let freq = s.pick(&EVO_SCALE);
                s.after(0.25 * i as f32, Cue::Note { freq, vel: 0.4, dur: 2.0 });
            }
            s.after(5.0, Cue::Chain(1));
        }
        _ => {
            let notes = 2 + (s.rand() * 3.0) as usize;
            let mut at = 0.0;
            for _ in 0..notes {
                let freq = 2.0 * s.pick(&EVO_SCALE);
                let vel = 0.3 + s.rand() * 0.2;
                s.after(at, Cue::Note { freq, vel, dur: 3.0 });
                at += if s.rand() > 0.5 { 0.5 } else { 0.25 };
            }
            s.after(7.0, Cue::Chain(2));
        }
    }
}

/// 2:1 FM piano note. The modulation index decays over half the note.
pub(super) fn piano(s: &mut Scope<'_, '_>, hz: f32, vel: f32, dur: f32) {
    const M: f32 = EVO_MASTER;
    let sr = s.sr();
    let pan = s.uniform(-0.75, 0.75);
    let index = Curve::new().linear_at(hz * 0.5 * vel, 0.01).exponential_at(0.01, dur * 0.5);
    let amp = Curve::new().linear_at(0.15 * vel * M, 0.02).exponential_at(0.001 * M, dur);
    s.voice(
        OneShot::tone(Wave::Sine, hz, &amp, dur + 0.1, sr)
            .fm(hz * 2.0, 0.0, &index)
            .pan(pan),
    );
}

// ----------------------------------- Status II ------------------------------------

const STATUS_MASTER: f32 = 0.65;
const STATUS_SCALE: [f32; 7] = [130.81, 155.56, 196.0, 233.08, 293.66, 261.63, 311.13];

/// Soft triangle notes with a pitched thump, through a wide dual echo and an
/// occasional high-passed shimmer delay.
pub(super) fn status_ii(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let echo = s.spawn(EchoBus::parallel(vec![
        Echo::new(0.3, 0.4, sr).pan(-0.5),
        Echo::new(0.45, 0.4, sr).pan(0.5),
    ]));
    let shimmer = s.spawn(EchoBus::parallel(vec![
        Echo::new(0.5, 0.75, sr).loop_filter(SvfMode::Highpass, 1200.0, sr),
    ]));
    status_loop(s, 0, echo, shimmer);
    s.after(0.5, Cue::Chain(1));
    s.after(1.2, Cue::Chain(2));
    Patch::StatusII { echo, shimmer }
}

pub(super) fn status_loop(s: &mut Scope<'_, '_>, n: u8, echo: NodeId, shimmer: NodeId) {
    match n {
        0 => {
            trigger(s, 0.8, echo, shimmer);
            s.after(2.9, Cue::Chain(0));
        }
        1 => {
            trigger(s, 0.6, echo, shimmer);
            if s.rand() > 0.7 {
                let freq = s.pick(&STATUS_SCALE);
                s.after(0.15, Cue::Note { freq, vel: 0.5, dur: 1.0 });
            }
            s.after(4.1, Cue::Chain(1));
        }
        _ => {
            if s.rand() > 0.4 {
                trigger(s, 0.4, echo, shimmer);
            }
            s.after(5.3, Cue::Chain(2));
        }
    }
}

fn trigger(s: &mut Scope<'_, '_>, vel: f32, echo: NodeId, shimmer: NodeId) {
    let hz = s.pick(&STATUS_SCALE);
    status_note(s, hz, vel, echo, shimmer);
}

pub(super) fn status_note(s: &mut Scope<'_, '_>, hz: f32, vel: f32, echo: NodeId, shimmer: NodeId) {
    const M: f32 = STATUS_MASTER;
    let sr = s.sr();
    let pan = s.uniform(-0.4, 0.4);
    let cutoff = Curve::new().linear_at(600.0 * vel, 0.01).exponential_at(200.0, 0.3);
    let amp = Curve::new().linear_at(0.4 * vel * M, 0.015).exponential_at(0.001 * M, 0.6);
    let thump_freq = Curve::new().exponential_at(0.01, 0.05);
    let thump_amp = Curve::new().set(0.3 * vel).exponential_at(0.001, 0.05);

    let mut note = OneShot::tone(Wave::Tri, hz, &amp, 1.0, sr)
        .filter(SvfMode::Lowpass, 200.0, PLAIN_Q, &cutoff)
        .partial(&thump_freq, 150.0, &thump_amp, 0.1, true)
        .pan(pan)
        .send(echo, 1.0);
    if s.rand() > 0.6 {
        note = note.send(shimmer, 1.0);
    }
    s.voice(note);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::tests::Harness;
    use super::super::{Generator, SoundKind};
    use crate::command::Command;

    fn spawns(cmds: &[Command]) -> usize {
        cmds.iter().filter(|c| matches!(c, Command::Spawn { .. })).count()
    }

    #[test]
    fn horizon_is_sixteen_layers() {
        let mut h = Harness::new(21);
        let mut g = Generator::new(SoundKind::Horizon);
        g.start(&mut h.cx());
        assert_eq!(g.node_ids().len(), 16);
        assert_eq!(g.pending_cues(), 0);
    }

    #[test]
    fn stratus_evo_arpeggio_lands_on_sixteenth_grid() {
        let mut h = Harness::new(21);
        let mut g = Generator::new(SoundKind::StratusEvo);
        g.start(&mut h.cx());
        h.drain();
        // chain 1 fires at 1.2 s and queues three notes 250 ms apart
        h.run(&mut g, Duration::from_millis(1200), Duration::from_millis(10));
        assert_eq!(spawns(&h.drain()), 1);
        h.run(&mut g, Duration::from_millis(250), Duration::from_millis(10));
        assert_eq!(spawns(&h.drain()), 1);
        h.run(&mut g, Duration::from_millis(250), Duration::from_millis(10));
        assert_eq!(spawns(&h.drain()), 1);
    }

    #[test]
    fn status_ii_builds_two_buses_then_notes() {
        let mut h = Harness::new(21);
        let mut g = Generator::new(SoundKind::StatusII);
        g.start(&mut h.cx());
        let cmds = h.drain();
        let buses = cmds
            .iter()
            .filter(|c| matches!(c, Command::Spawn { node, .. } if node.is_bus()))
            .count();
        assert_eq!(buses, 2);
        assert_eq!(spawns(&cmds), 3);
        // loops at 2.9/4.1/5.3 s: at least the first two fire within 6 s
        h.run(&mut g, Duration::from_secs(6), Duration::from_millis(10));
        assert!(spawns(&h.drain()) >= 3);
    }

    #[test]
    fn alchemist_runs_two_chains() {
        let mut h = Harness::new(21);
        let mut g = Generator::new(SoundKind::Alchemist);
        g.start(&mut h.cx());
        h.drain();
        // each chain re-arms every 0.2..2.7 s
        h.run(&mut g, Duration::from_secs(30), Duration::from_millis(10));
        assert!(spawns(&h.drain()) >= 2 * 30 / 3);
    }
}
