//! Colored noise.
//!
//! Each color is a tiny stateful shaper over a white source in [-1, 1]. The
//! engine renders them once into short looping buffers (2–4 s), so the random
//! number generator is injected as a closure and this module stays `no_std`.
//!
//! - white  : the source itself
//! - pink   : Paul Kellett's refined 7-state filter (−3 dB/oct), scaled by 0.11
//! - brown  : leaky integrator `(last + 0.02 w) / 1.02`, amplified ×3.5
//! - violet : first difference of white (+6 dB/oct), scaled by 0.5

use core::fmt::Debug;

/// Noise spectrum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
    Violet,
}

/// Per-color filter state.
#[derive(Copy, Clone, Debug)]
pub struct NoiseShaper {
    color: NoiseColor,
    b: [f32; 7],
    last: f32,
}

impl NoiseShaper {
    pub fn new(color: NoiseColor) -> Self {
        Self { color, b: [0.0; 7], last: 0.0 }
    }

    #[inline] pub fn color(&self) -> NoiseColor { self.color }

    /// Shape one white sample `w` (uniform in [-1, 1]).
    #[inline]
    pub fn process(&mut self, w: f32) -> f32 {
        match self.color {
            NoiseColor::White => w,
            NoiseColor::Pink => {
                let b = &mut self.b;
                b[0] = 0.99886 * b[0] + w * 0.055_517_9;
                b[1] = 0.99332 * b[1] + w * 0.075_075_9;
                b[2] = 0.969 * b[2] + w * 0.153_852;
                b[3] = 0.8665 * b[3] + w * 0.310_485_6;
                b[4] = 0.55 * b[4] + w * 0.532_952_2;
                b[5] = -0.7616 * b[5] - w * 0.016_898;
                let out = (b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + w * 0.5362) * 0.11;
                b[6] = w * 0.115_926;
                out
            }
            NoiseColor::Brown => {
                self.last = (self.last + 0.02 * w) / 1.02;
                self.last * 3.5
            }
            NoiseColor::Violet => {
                let out = (w - self.last) * 0.5;
                self.last = w;
                out
            }
        }
    }
}

/// Fill `out` with `color` noise drawn from `white` (uniform in [-1, 1]).
pub fn fill(color: NoiseColor, out: &mut [f32], mut white: impl FnMut() -> f32) {
    let mut shaper = NoiseShaper::new(color);
    for s in out.iter_mut() {
        *s = shaper.process(white());
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Small LCG so the tests stay dependency free.
    fn lcg(seed: u32) -> impl FnMut() -> f32 {
        let mut s = seed;
        move || {
            s = s.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (s >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
        }
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    /// Mean absolute first difference relative to RMS: a cheap brightness probe.
    fn brightness(x: &[f32]) -> f32 {
        let d: f32 = x.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>() / (x.len() - 1) as f32;
        d / rms(x)
    }

    #[test]
    fn colors_are_bounded_and_nonzero() {
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown, NoiseColor::Violet] {
            let mut buf = vec![0.0f32; 96_000];
            fill(color, &mut buf, lcg(7));
            let peak = buf.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            assert!(peak <= 1.5, "{:?} peak={}", color, peak);
            assert!(rms(&buf) > 0.01, "{:?} silent", color);
        }
    }

    #[test]
    fn spectral_tilt_orders_colors() {
        let mut probe = |color| {
            let mut buf = vec![0.0f32; 48_000];
            fill(color, &mut buf, lcg(11));
            brightness(&buf)
        };
        let brown = probe(NoiseColor::Brown);
        let pink = probe(NoiseColor::Pink);
        let white = probe(NoiseColor::White);
        let violet = probe(NoiseColor::Violet);
        assert!(brown < pink, "brown={} pink={}", brown, pink);
        assert!(pink < white, "pink={} white={}", pink, white);
        assert!(white < violet, "white={} violet={}", white, violet);
    }
}
