//! State-variable filter used for every low/high/band-pass stage in Somnium.
//!
//! The filter is the trapezoidal (TPT) SVF: coefficients come from
//! `g = tan(π fc / sr)` and `k = 1/Q`, and the two integrators are solved
//! implicitly, so cutoff automation can move every sample without blowing up.
//! The corner is held below 0.49·sr by [`tpt_g`].

use crate::dsp::{kill_denormals, tpt_g};

/// Which SVF output a stage listens to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SvfMode {
    Lowpass,
    Highpass,
    Bandpass,
}

/// Trapezoidal state-variable filter.
///
/// `q` of 0.707 gives a Butterworth response; the bandpass tap has unity gain
/// at the centre frequency whatever the `q`.
#[derive(Copy, Clone, Debug)]
pub struct SvfTpt {
    sr: f32,
    cut: f32,
    k: f32,
    // a1 = 1 / (1 + g (g + k)), a2 = g a1, a3 = g a2
    a1: f32,
    a2: f32,
    a3: f32,
    s1: f32,
    s2: f32,
}

impl SvfTpt {
    pub fn new(cut_hz: f32, q: f32, sr: f32) -> Self {
        let mut f = Self {
            sr: sr.max(1.0),
            cut: cut_hz.max(0.0),
            k: 1.0 / q.max(1e-4),
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            s1: 0.0,
            s2: 0.0,
        };
        f.update();
        f
    }

    /// Move the corner. Unchanged values skip the `tan`.
    #[inline]
    pub fn set_cutoff_hz(&mut self, cut_hz: f32) {
        let c = cut_hz.max(0.0);
        if c != self.cut {
            self.cut = c;
            self.update();
        }
    }

    #[inline]
    pub fn cutoff_hz(&self) -> f32 {
        self.cut
    }

    #[inline]
    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }

    fn update(&mut self) {
        let g = tpt_g(self.cut, self.sr);
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    /// Run one sample and return the requested tap.
    #[inline]
    pub fn process(&mut self, x: f32, mode: SvfMode) -> f32 {
        let v3 = x - self.s2;
        let band = self.a1 * self.s1 + self.a2 * v3;
        let low = self.s2 + self.a2 * self.s1 + self.a3 * v3;
        self.s1 = kill_denormals(2.0 * band - self.s1);
        self.s2 = kill_denormals(2.0 * low - self.s2);

        match mode {
            SvfMode::Lowpass => low,
            SvfMode::Bandpass => band * self.k,
            SvfMode::Highpass => x - self.k * band - low,
        }
    }

    #[inline]
    pub fn process_lp(&mut self, x: f32) -> f32 {
        self.process(x, SvfMode::Lowpass)
    }

    #[inline]
    pub fn process_hp(&mut self, x: f32) -> f32 {
        self.process(x, SvfMode::Highpass)
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_peak(svf: &mut SvfTpt, mode: SvfMode, hz: f32, sr: f32) -> f32 {
        let n = sr as usize;
        (0..n)
            .map(|i| svf.process((crate::dsp::TAU * hz * i as f32 / sr).sin(), mode))
            .skip(n / 2)
            .fold(0.0f32, |p, y| p.max(y.abs()))
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut svf = SvfTpt::new(1000.0, 0.707, 48_000.0);
        let mut y = 0.0;
        for _ in 0..48_000 {
            y = svf.process_lp(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3, "y={}", y);
    }

    #[test]
    fn lowpass_rejects_far_above_corner() {
        let sr = 48_000.0;
        let mut svf = SvfTpt::new(500.0, 0.707, sr);
        let high = settled_peak(&mut svf, SvfMode::Lowpass, 8000.0, sr);
        svf.reset();
        let low = settled_peak(&mut svf, SvfMode::Lowpass, 50.0, sr);
        assert!(high < 0.02, "high={}", high);
        assert!(low > 0.9, "low={}", low);
    }

    #[test]
    fn highpass_rejects_rumble() {
        let sr = 48_000.0;
        let mut svf = SvfTpt::new(2000.0, 0.707, sr);
        let low = settled_peak(&mut svf, SvfMode::Highpass, 100.0, sr);
        assert!(low < 0.01, "low={}", low);
    }

    #[test]
    fn bandpass_is_unity_at_centre() {
        let sr = 48_000.0;
        let mut svf = SvfTpt::new(1000.0, 5.0, sr);
        let centre = settled_peak(&mut svf, SvfMode::Bandpass, 1000.0, sr);
        assert!((centre - 1.0).abs() < 0.05, "centre={}", centre);
    }

    #[test]
    fn corner_above_nyquist_stays_finite() {
        let sr = 44_100.0;
        let mut svf = SvfTpt::new(22_000.0, 0.707, sr);
        let mut peak = 0.0f32;
        for i in 0..(sr as usize) {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            peak = peak.max(svf.process_lp(x).abs());
        }
        assert!(peak.is_finite() && peak < 4.0, "peak={}", peak);
    }
}
