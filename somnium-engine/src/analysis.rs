//! Analysis tap: per-channel spectrum analysers for visualisers.
//!
//! The renderer pushes post-panner samples once per processing quantum with
//! `try_lock`, so a reader holding the lock costs the tap a quantum of samples
//! and never stalls audio. Readers copy the window out and do the FFT work on
//! their own thread.
//!
//! Readout follows the usual analyser conventions: Blackman window, magnitude
//! `|X[k]| / N`, temporal smoothing `τ·prev + (1 - τ)·mag` kept between reads,
//! decibels, and a byte mapping of `[min_db, max_db]` onto `0..=255`.

use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use somnium_core::dsp::{lin_to_db, TAU};

use crate::config::AnalysisConfig;

struct Window {
    ring: Vec<f32>,
    write: usize,
}

struct Spectrum {
    fft: Arc<dyn Fft<f32>>,
    frame: Vec<f32>,
    buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

struct Shared {
    fft_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    window: Mutex<Window>,
    spectrum: Mutex<Spectrum>,
}

/// One channel's analyser. Clones share the same state.
#[derive(Clone)]
pub struct Analyser {
    shared: Arc<Shared>,
}

impl core::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Analyser").field("fft_size", &self.shared.fft_size).finish()
    }
}

/// The stereo pair handed to visualisers.
#[derive(Clone, Debug)]
pub struct AnalysisTap {
    pub left: Analyser,
    pub right: Analyser,
}

impl AnalysisTap {
    pub fn new(cfg: &AnalysisConfig) -> Self {
        Self { left: Analyser::new(cfg), right: Analyser::new(cfg) }
    }
}

fn blackman(i: usize, n: usize) -> f32 {
    let x = i as f32 / n as f32;
    0.42 - 0.5 * (TAU * x).cos() + 0.08 * (2.0 * TAU * x).cos()
}

impl Analyser {
    pub fn new(cfg: &AnalysisConfig) -> Self {
        let n = cfg.fft_size.max(2);
        let fft = FftPlanner::new().plan_fft_forward(n);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            shared: Arc::new(Shared {
                fft_size: n,
                smoothing: cfg.smoothing.clamp(0.0, 1.0),
                min_db: cfg.min_db,
                max_db: cfg.max_db,
                window: Mutex::new(Window { ring: vec![0.0; n], write: 0 }),
                spectrum: Mutex::new(Spectrum {
                    fft,
                    frame: vec![0.0; n],
                    buf: vec![Complex::new(0.0, 0.0); n],
                    scratch,
                    smoothed: vec![0.0; n / 2],
                }),
            }),
        }
    }

    #[inline] pub fn fft_size(&self) -> usize { self.shared.fft_size }
    #[inline] pub fn frequency_bin_count(&self) -> usize { self.shared.fft_size / 2 }
    #[inline] pub fn smoothing(&self) -> f32 { self.shared.smoothing }

    /// Rendering side: append samples. Returns `false` (dropping them) when a
    /// reader holds the window.
    pub fn push(&self, samples: &[f32]) -> bool {
        let Ok(mut w) = self.shared.window.try_lock() else {
            return false;
        };
        let n = w.ring.len();
        for &s in samples {
            let i = w.write;
            w.ring[i] = s;
            w.write = (i + 1) % n;
        }
        true
    }

    fn snapshot(&self, out: &mut [f32]) {
        let w = match self.shared.window.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = w.ring.len();
        for (i, o) in out.iter_mut().enumerate().take(n) {
            *o = w.ring[(w.write + i) % n];
        }
    }

    /// Most recent `fft_size` samples, oldest first.
    pub fn float_time_domain_data(&self, out: &mut [f32]) {
        let n = self.fft_size();
        let mut frame = vec![0.0; n];
        self.snapshot(&mut frame);
        for (o, s) in out.iter_mut().zip(frame) {
            *o = s;
        }
    }

    /// Smoothed magnitude spectrum in dB, `frequency_bin_count` values.
    pub fn float_frequency_data(&self, out: &mut [f32]) {
        let mut sp = match self.shared.spectrum.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sp = &mut *sp;
        let n = self.shared.fft_size;
        self.snapshot(&mut sp.frame);

        for (i, (c, &s)) in sp.buf.iter_mut().zip(sp.frame.iter()).enumerate() {
            *c = Complex::new(s * blackman(i, n), 0.0);
        }
        sp.fft.process_with_scratch(&mut sp.buf, &mut sp.scratch);

        let tau = self.shared.smoothing;
        let scale = 1.0 / n as f32;
        for (k, m) in sp.smoothed.iter_mut().enumerate() {
            let mag = sp.buf[k].norm() * scale;
            let v = tau * *m + (1.0 - tau) * mag;
            *m = if v.is_finite() { v } else { 0.0 };
        }
        for (o, &m) in out.iter_mut().zip(sp.smoothed.iter()) {
            *o = lin_to_db(m);
        }
    }

    /// Same spectrum mapped from `[min_db, max_db]` onto `0..=255`.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let mut db = vec![0.0; self.frequency_bin_count()];
        self.float_frequency_data(&mut db);
        let (lo, hi) = (self.shared.min_db, self.shared.max_db);
        let k = 255.0 / (hi - lo);
        for (o, d) in out.iter_mut().zip(db) {
            *o = (k * (d - lo)).clamp(0.0, 255.0) as u8;
        }
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AnalysisConfig {
        AnalysisConfig { fft_size: 1024, smoothing: 0.0, ..AnalysisConfig::default() }
    }

    #[test]
    fn sizes_follow_config() {
        let a = Analyser::new(&AnalysisConfig::default());
        assert_eq!(a.fft_size(), 4096);
        assert_eq!(a.frequency_bin_count(), 2048);
        assert!((a.smoothing() - 0.92).abs() < 1e-6);
    }

    #[test]
    fn time_domain_is_oldest_first() {
        let a = Analyser::new(&AnalysisConfig { fft_size: 32, ..AnalysisConfig::default() });
        let samples: Vec<f32> = (0..40).map(|i| i as f32).collect();
        assert!(a.push(&samples));
        let mut out = vec![0.0; 32];
        a.float_time_domain_data(&mut out);
        assert_eq!(out[0], 8.0);
        assert_eq!(out[31], 39.0);
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let a = Analyser::new(&cfg());
        let sr = 48_000.0;
        // exactly bin 32 of a 1024-point FFT
        let hz = 32.0 * sr / 1024.0;
        let s: Vec<f32> = (0..1024).map(|i| (TAU * hz * i as f32 / sr).sin()).collect();
        a.push(&s);
        let mut db = vec![0.0; 512];
        a.float_frequency_data(&mut db);
        let peak = db
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        assert_eq!(peak.0, 32);
        assert!(db[32] > db[200] + 40.0);

        let mut bytes = vec![0u8; 512];
        a.byte_frequency_data(&mut bytes);
        assert_eq!(bytes[32], 255);
        assert_eq!(bytes[400], 0);
    }

    #[test]
    fn silence_reads_as_floor() {
        let a = Analyser::new(&cfg());
        let mut db = vec![0.0; 512];
        a.float_frequency_data(&mut db);
        assert!(db.iter().all(|&d| d <= -100.0));
    }
}
