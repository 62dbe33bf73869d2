//! Convolution reverb (uniformly partitioned, FFT based).
//!
//! Design
//! - The impulse response is cut into `B`-sample partitions, each zero-padded to
//!   `2B` and transformed once at construction.
//! - Input is gathered into `B`-sample blocks; every full block is transformed
//!   (overlap-save over the last `2B` input samples) and pushed into a frequency
//!   delay line. The output spectrum is `Σ X[k-p]·H[p]`, so a 5 s tail costs one
//!   forward and one inverse FFT per block plus the complex multiply-adds.
//! - Latency is one block. Everything is allocated in `new`; `process` never
//!   allocates (FFTs run with preallocated scratch).
//!
//! The synthetic impulse is decaying uniform noise, `(1 - n/len)^decay`, one
//! independent draw per channel, normalised the way a browser convolver
//! normalises its buffer (RMS power, −58 dB calibration, 44.1 kHz reference).

use std::sync::Arc;

use rand::Rng;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use somnium_core::dsp::{kill_denormals, pow, sqrt};

/// Floor for the measured IR power, so a silent buffer cannot blow the scale up.
const MIN_POWER: f32 = 0.000125;
/// −58 dB.
const GAIN_CALIBRATION: f32 = 0.00125;
const CALIBRATION_SR: f32 = 44_100.0;

/// Build the stereo decaying-noise impulse response.
pub fn synthetic_ir(seconds: f32, decay: f32, sr: f32, rng: &mut impl Rng) -> [Vec<f32>; 2] {
    let len = ((seconds * sr) as usize).max(1);
    let mut make = || {
        (0..len)
            .map(|n| {
                let env = pow(1.0 - n as f32 / len as f32, decay);
                rng.gen_range(-1.0f32..=1.0) * env
            })
            .collect::<Vec<f32>>()
    };
    let mut ir = [make(), make()];
    normalize(&mut ir, sr);
    ir
}

/// Scale an impulse response by `(1/power) · 10^(-58/20) · 44100/sr`.
pub fn normalize(ir: &mut [Vec<f32>], sr: f32) {
    let channels = ir.len().max(1);
    let len = ir.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let energy: f32 = ir.iter().flat_map(|c| c.iter()).map(|s| s * s).sum();
    let power = sqrt(energy / (channels * len) as f32).max(MIN_POWER);
    let scale = GAIN_CALIBRATION / power * CALIBRATION_SR / sr.max(1.0);
    for s in ir.iter_mut().flat_map(|c| c.iter_mut()) {
        *s *= scale;
    }
}

/// Single-channel uniformly partitioned convolver.
pub struct Convolver {
    block: usize,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Transformed IR partitions.
    parts: Vec<Vec<Complex<f32>>>,
    /// Frequency delay line, ring indexed by `fdl_head`.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_head: usize,
    /// Last `2B` input samples (previous block, current block).
    window: Vec<f32>,
    work: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    out: Vec<f32>,
    pos: usize,
}

impl core::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Convolver")
            .field("block", &self.block)
            .field("partitions", &self.parts.len())
            .finish()
    }
}

impl Convolver {
    /// `block` must be a power of two; `ir` may have any length.
    pub fn new(ir: &[f32], block: usize, planner: &mut FftPlanner<f32>) -> Self {
        let block = block.max(1).next_power_of_two();
        let n = 2 * block;
        let fwd = planner.plan_fft_forward(n);
        let inv = planner.plan_fft_inverse(n);
        let scratch_len = fwd.get_inplace_scratch_len().max(inv.get_inplace_scratch_len());
        let mut scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let count = ir.len().div_ceil(block).max(1);
        let mut parts = Vec::with_capacity(count);
        for p in 0..count {
            let mut buf = vec![Complex::new(0.0, 0.0); n];
            let start = p * block;
            let end = (start + block).min(ir.len());
            for (slot, &s) in buf.iter_mut().zip(ir.get(start..end).unwrap_or(&[])) {
                *slot = Complex::new(s, 0.0);
            }
            fwd.process_with_scratch(&mut buf, &mut scratch);
            parts.push(buf);
        }

        Self {
            block,
            fwd,
            inv,
            scratch,
            fdl: vec![vec![Complex::new(0.0, 0.0); n]; count],
            parts,
            fdl_head: 0,
            window: vec![0.0; n],
            work: vec![Complex::new(0.0, 0.0); n],
            acc: vec![Complex::new(0.0, 0.0); n],
            out: vec![0.0; block],
            pos: 0,
        }
    }

    #[inline] pub fn latency(&self) -> usize { self.block }
    #[inline] pub fn partitions(&self) -> usize { self.parts.len() }

    /// Push one input sample, get one (block-delayed) output sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.out[self.pos];
        self.window[self.block + self.pos] = x;
        self.pos += 1;
        if self.pos == self.block {
            self.pos = 0;
            self.run_block();
        }
        y
    }

    fn run_block(&mut self) {
        let n = 2 * self.block;
        let half = self.block;

        for (w, &s) in self.work.iter_mut().zip(self.window.iter()) {
            *w = Complex::new(s, 0.0);
        }
        self.fwd.process_with_scratch(&mut self.work, &mut self.scratch);

        let count = self.parts.len();
        self.fdl_head = (self.fdl_head + count - 1) % count;
        self.fdl[self.fdl_head].copy_from_slice(&self.work);

        // The input is real, so only bins 0..=B are accumulated; the upper half
        // is the conjugate mirror.
        for a in self.acc[..=half].iter_mut() {
            *a = Complex::new(0.0, 0.0);
        }
        for p in 0..count {
            let x = &self.fdl[(self.fdl_head + p) % count];
            let h = &self.parts[p];
            for k in 0..=half {
                self.acc[k] += x[k] * h[k];
            }
        }
        for k in 1..half {
            self.acc[n - k] = self.acc[k].conj();
        }
        self.inv.process_with_scratch(&mut self.acc, &mut self.scratch);

        let norm = 1.0 / n as f32;
        for (o, c) in self.out.iter_mut().zip(self.acc[half..].iter()) {
            *o = kill_denormals(c.re * norm);
        }
        self.window.copy_within(half.., 0);
    }
}

/// Two convolvers, left input through the left IR and right through the right.
#[derive(Debug)]
pub struct StereoConvolver {
    l: Convolver,
    r: Convolver,
}

impl StereoConvolver {
    pub fn new(ir: &[Vec<f32>; 2], block: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            l: Convolver::new(&ir[0], block, &mut planner),
            r: Convolver::new(&ir[1], block, &mut planner),
        }
    }

    #[inline]
    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        (self.l.process(l), self.r.process(r))
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn direct(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len()];
        for n in 0..x.len() {
            for (k, &hk) in h.iter().enumerate() {
                if k <= n {
                    y[n] += hk * x[n - k];
                }
            }
        }
        y
    }

    #[test]
    fn matches_direct_convolution() {
        let mut rng = SmallRng::seed_from_u64(3);
        let h: Vec<f32> = (0..150).map(|_| rng.gen_range(-0.5..0.5)).collect();
        let x: Vec<f32> = (0..400).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let expect = direct(&x, &h);

        let mut planner = FftPlanner::new();
        let mut conv = Convolver::new(&h, 64, &mut planner);
        assert_eq!(conv.partitions(), 3);
        let lat = conv.latency();
        let mut got = Vec::new();
        for &s in x.iter().chain(std::iter::repeat(&0.0).take(lat)) {
            got.push(conv.process(s));
        }
        for n in 0..x.len() {
            assert!((got[n + lat] - expect[n]).abs() < 1e-4, "n={} got={} want={}", n, got[n + lat], expect[n]);
        }
    }

    #[test]
    fn ir_decays_and_is_normalised() {
        let sr = 48_000.0;
        let mut rng = SmallRng::seed_from_u64(11);
        let ir = synthetic_ir(1.0, 2.0, sr, &mut rng);
        assert_eq!(ir[0].len(), 48_000);
        assert_ne!(&ir[0][..16], &ir[1][..16]);

        let head: f32 = ir[0][..4800].iter().map(|s| s * s).sum();
        let tail: f32 = ir[0][43_200..].iter().map(|s| s * s).sum();
        assert!(head > 100.0 * tail, "head={} tail={}", head, tail);

        let energy: f32 = ir.iter().flat_map(|c| c.iter()).map(|s| s * s).sum();
        let rms = (energy / (2.0 * 48_000.0)).sqrt();
        let want = GAIN_CALIBRATION * CALIBRATION_SR / sr;
        assert!((rms - want).abs() < want * 1e-2, "rms={} want={}", rms, want);
    }

    #[test]
    fn silent_ir_stays_silent() {
        let mut ir = [vec![0.0; 64], vec![0.0; 64]];
        normalize(&mut ir, 48_000.0);
        assert!(ir.iter().flatten().all(|&s| s == 0.0));
    }
}
