//! Nature composites: wind, rain, storm, ocean.
//!
//! Wind is the layered one: a pink sub rumble, two band-passed gusts swept in
//! opposite ears, and an icy high layer whose swell is re-automated at random
//! intervals. Its sub and gust layers fade in over 2 s through their swell lanes.

use somnium_core::automation::Curve;
use somnium_core::filters::SvfMode;
use somnium_core::noise::NoiseColor;

use super::{Cue, Patch, Scope, PLAIN_Q};
use crate::command::{Lane, NodeId};
use crate::nodes::{Modulated, NoiseLayer, OneShot};

const WIND_MASTER: f32 = 0.8;
const WIND_FADE_SECS: f32 = 2.0;

pub(super) fn wind(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 4.0);
    let white = s.noise(NoiseColor::White, 4.0);
    let fade = Curve::new().linear(1.0, WIND_FADE_SECS);

    // sub rumble
    s.spawn(
        NoiseLayer::new(pink.clone(), sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(140.0), 0.5)
            .gain(Modulated::fixed(0.6 * WIND_MASTER))
            .swell_from(0.0, &fade),
    );

    // howling gusts
    for (pan, centre) in [(-0.7, 500.0), (0.7, 650.0)] {
        let sweep = 0.06 + s.rand() * 0.04;
        let breath = 0.08 + s.rand() * 0.05;
        s.spawn(
            NoiseLayer::new(pink.clone(), sr)
                .filter(SvfMode::Bandpass, Modulated::lfo(centre, sweep, 400.0), 1.2)
                .gain(Modulated::lfo(0.25 * WIND_MASTER, breath, 0.2 * WIND_MASTER))
                .pan(Modulated::fixed(pan))
                .swell_from(0.0, &fade),
        );
    }

    // icy friction: silent until a gust swells it
    let ice = s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Highpass, Modulated::fixed(2000.0), PLAIN_Q)
            .filter(SvfMode::Lowpass, Modulated::fixed(5000.0), PLAIN_Q)
            .gain(Modulated::fixed(0.5 * WIND_MASTER))
            .pan(Modulated::lfo(0.0, 0.04, 0.9))
            .swell(0.0),
    );
    ice_gust(s, ice);
    Patch::Wind { ice }
}

/// Swell the ice layer up to 0.08 over 40 % of a 2..6 s gust, then back to silence.
pub(super) fn ice_gust(s: &mut Scope<'_, '_>, ice: NodeId) {
    let d = 2.0 + s.rand() * 4.0;
    s.automate(ice, Lane::Swell, Curve::new().linear(0.08, 0.4 * d).linear_at(0.0, d));
    let next = 3.0 + s.rand() * 5.0;
    s.after(next, Cue::Chain(0));
}

fn rain_bed(s: &mut Scope<'_, '_>, cutoff: f32) {
    let sr = s.sr();
    let white = s.noise(NoiseColor::White, 2.0);
    s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(cutoff), PLAIN_Q)
            .gain(Modulated::fixed(0.1)),
    );
}

pub(super) fn rain(s: &mut Scope<'_, '_>) -> Patch {
    rain_bed(s, 800.0);
    Patch::Rain
}

pub(super) fn storm(s: &mut Scope<'_, '_>) -> Patch {
    rain_bed(s, 600.0);
    thunder(s);
    Patch::Storm
}

/// Low-passed white burst: up to 0.8 in 0.2 s, exponential tail to 1.5 s.
pub(super) fn thunder(s: &mut Scope<'_, '_>) {
    let sr = s.sr();
    let burst = s.noise(NoiseColor::White, 2.0);
    let env = Curve::new().linear_at(0.8, 0.2).exponential_at(0.001, 1.5);
    s.voice(OneShot::noise(burst, &env, 2.0, sr).filter(SvfMode::Lowpass, 100.0, PLAIN_Q, &Curve::new()));
    let next = 5.0 + s.rand() * 10.0;
    s.after(next, Cue::Chain(0));
}

/// Pink swell under a low-pass breathing between 0 and 600 Hz every 10 s.
pub(super) fn ocean(s: &mut Scope<'_, '_>) -> Patch {
    let sr = s.sr();
    let pink = s.noise(NoiseColor::Pink, 4.0);
    s.spawn(NoiseLayer::new(pink, sr).filter(SvfMode::Lowpass, Modulated::lfo(300.0, 0.1, 300.0), PLAIN_Q));
    Patch::Ocean
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::tests::Harness;
    use super::super::{Generator, SoundKind};

    #[test]
    fn wind_builds_four_layers() {
        let mut h = Harness::new(11);
        let mut g = Generator::new(SoundKind::Wind);
        g.start(&mut h.cx());
        assert_eq!(g.node_ids().len(), 4);
        assert_eq!(g.pending_cues(), 1);
    }

    #[test]
    fn storm_thunder_recurs_within_bounds() {
        let mut h = Harness::new(4);
        let mut g = Generator::new(SoundKind::Storm);
        g.start(&mut h.cx());
        // rain bed + first thunder
        assert_eq!(g.node_ids().len(), 2);
        let next = g.next_due().expect("thunder cue");
        // earliest cue is the burst's release at 2.1 s
        assert!((next.as_secs_f32() - 2.1).abs() < 1e-3, "next={:?}", next);

        h.drain();
        h.run(&mut g, Duration::from_secs(60), Duration::from_millis(100));
        // 5..15 s apart: between 4 and 12 more strikes in a minute
        let strikes = h
            .drain()
            .iter()
            .filter(|c| matches!(c, crate::command::Command::Spawn { .. }))
            .count();
        assert!((4..=12).contains(&strikes), "strikes={}", strikes);
    }

    #[test]
    fn rain_and_ocean_are_static() {
        for kind in [SoundKind::Rain, SoundKind::Ocean] {
            let mut h = Harness::new(4);
            let mut g = Generator::new(kind);
            g.start(&mut h.cx());
            assert_eq!(g.node_ids().len(), 1);
            assert_eq!(g.pending_cues(), 0);
        }
    }
}
