//! Cosmic pads: aurora and cosmos.

use somnium_core::filters::SvfMode;
use somnium_core::noise::NoiseColor;

use super::{Patch, Scope, PLAIN_Q};
use crate::nodes::{Modulated, NoiseLayer, ToneLayer, Wave};

/// Fmaj7(add9) pad breathing between silence and 0.3, plus a swept band-passed crackle.
pub(super) fn aurora(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.35;
    let sr = s.sr();
    for (i, hz) in [174.61, 220.0, 261.63, 329.63].into_iter().enumerate() {
        let wave = if i % 2 == 0 { Wave::Sine } else { Wave::Tri };
        let hz = hz * s.detune(5.0);
        let rate = 0.1 + s.rand() * 0.2;
        let pan = s.uniform(-0.75, 0.75);
        s.spawn(
            ToneLayer::new(wave, hz, sr)
                .amp(Modulated::lfo(0.15 * MASTER, rate, 0.15 * MASTER))
                .pan(pan),
        );
    }

    let white = s.noise(NoiseColor::White, 2.0);
    s.spawn(
        NoiseLayer::new(white, sr)
            .filter(SvfMode::Bandpass, Modulated::lfo(2000.0, 0.05, 1000.0), 5.0)
            .gain(Modulated::fixed(0.5 * 0.05 * MASTER)),
    );
    Patch::Aurora
}

/// Dark Csus2 cluster of low-passed triangles over a 32.7 Hz saw sub.
pub(super) fn cosmos(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.5;
    let sr = s.sr();
    for hz in [65.41, 98.0, 146.83] {
        let hz = hz * s.detune(2.0);
        let cutoff = 150.0 + s.rand() * 100.0;
        let rate = 0.04 + s.rand() * 0.02;
        let pan = s.uniform(-0.6, 0.6);
        s.spawn(
            ToneLayer::new(Wave::Tri, hz, sr)
                .filter(SvfMode::Lowpass, Modulated::fixed(cutoff), PLAIN_Q)
                .amp(Modulated::lfo(0.15 * MASTER, rate, 0.15 * MASTER))
                .pan(pan),
        );
    }
    s.spawn(
        ToneLayer::new(Wave::Saw, 32.70, sr)
            .filter(SvfMode::Lowpass, Modulated::fixed(80.0), PLAIN_Q)
            .amp(Modulated::fixed(0.25 * MASTER)),
    );
    Patch::Cosmos
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use super::super::{Generator, SoundKind};

    #[test]
    fn pads_are_static_layers() {
        for (kind, layers) in [(SoundKind::Aurora, 5), (SoundKind::Cosmos, 4)] {
            let mut h = Harness::new(8);
            let mut g = Generator::new(kind);
            g.start(&mut h.cx());
            assert_eq!(g.node_ids().len(), layers, "{}", kind);
            assert_eq!(g.pending_cues(), 0);
        }
    }
}
