//! Noise colors and the harmonic drone.

use somnium_core::noise::NoiseColor;

use super::{Patch, Scope};
use crate::nodes::{Modulated, NoiseLayer, ToneLayer, Wave};

/// A single looped 2 s buffer of `color`, unpanned, at unity.
pub(super) fn noise(s: &mut Scope<'_, '_>, color: NoiseColor) -> Patch {
    let buf = s.noise(color, 2.0);
    let sr = s.sr();
    s.spawn(NoiseLayer::new(buf, sr));
    Patch::Noise
}

/// A1 harmonic series, alternating sine/triangle, each partial drifting ±2 Hz.
pub(super) fn drone(s: &mut Scope<'_, '_>) -> Patch {
    const MASTER: f32 = 0.25;
    let sr = s.sr();
    for (i, hz) in [55.0, 110.0, 165.0, 220.0].into_iter().enumerate() {
        let wave = if i % 2 == 0 { Wave::Sine } else { Wave::Tri };
        let rate = 0.05 + s.rand() * 0.1;
        s.spawn(
            ToneLayer::new(wave, hz, sr)
                .vibrato(rate, 2.0)
                .amp(Modulated::fixed(0.25 * MASTER)),
        );
    }
    Patch::Drone
}
