//! Math backend and scalar helpers shared by every Somnium stage.
//!
//! With `no-std` the transcendental functions go through `libm`; with
//! `fast-math` the trig and tanh used on hot paths become polynomial or
//! rational approximations. Everything here is pure and allocation free.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ------------------------------------ Backend --------------------------------------

cfg_if! {
    // no_std: libm
    if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] pub(crate) fn m_cos(x: f32) -> f32 { libm::cosf(x) }
        #[inline] pub(crate) fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] pub(crate) fn m_ln(x: f32) -> f32 { libm::logf(x) }
        #[inline] pub(crate) fn m_tanh(x: f32) -> f32 { libm::tanhf(x) }
        #[inline] pub(crate) fn m_tan(x: f32) -> f32 { libm::tanf(x) }
        #[inline] pub(crate) fn m_pow(x: f32, y: f32) -> f32 { libm::powf(x, y) }
        #[inline] pub(crate) fn m_sqrt(x: f32) -> f32 { libm::sqrtf(x) }
    // std
    } else {
        #[inline] pub(crate) fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] pub(crate) fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] pub(crate) fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] pub(crate) fn m_ln(x: f32) -> f32 { x.ln() }
        #[inline] pub(crate) fn m_tanh(x: f32) -> f32 { x.tanh() }
        #[inline] pub(crate) fn m_tan(x: f32) -> f32 { x.tan() }
        #[inline] pub(crate) fn m_pow(x: f32, y: f32) -> f32 { x.powf(y) }
        #[inline] pub(crate) fn m_sqrt(x: f32) -> f32 { x.sqrt() }
    }
}

// ----------------------------------- Constants -------------------------------------

/// One full turn in radians.
pub const TAU: f32 = 2.0 * PI;

/// Magnitudes below this are flushed to zero by [`kill_denormals`].
pub const EPS_SMALL: f32 = 1.0e-20;

/// Lowest corner of the tone control (tone = 0).
pub const TONE_MIN_HZ: f32 = 200.0;

/// Highest corner of the tone control (tone = 100).
pub const TONE_MAX_HZ: f32 = 22_000.0;

// ------------------------------------ Scalars --------------------------------------

/// Clamp `x` into `[lo, hi]`. NaN maps to `lo` so a bad control value can never
/// poison a filter or gain stage.
#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x.is_nan() || x < lo { lo } else if x > hi { hi } else { x }
}

/// Wrap phase into [0, 1). Negative phases (from through-zero FM) wrap too.
#[inline]
pub fn wrap_phase01(p: f32) -> f32 {
    let w = p - (p as i64) as f32;
    if w < 0.0 { w + 1.0 } else if w >= 1.0 { w - 1.0 } else { w }
}

/// Flush tiny feedback states to zero before they turn subnormal.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

/// Detune ratio for an offset in cents: `2^(c/1200)`.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    m_exp(core::f32::consts::LN_2 * (cents / 1200.0))
}

/// Map the 0–100 tone control onto the low-pass corner:
/// `200 * (22000/200)^(v/100)`, so 0 → 200 Hz, 50 → ~2.1 kHz, 100 → 22 kHz.
#[inline]
pub fn tone_to_hz(tone: f32) -> f32 {
    let v = clamp(tone, 0.0, 100.0);
    TONE_MIN_HZ * m_pow(TONE_MAX_HZ / TONE_MIN_HZ, v / 100.0)
}

#[inline]
pub fn pow(x: f32, y: f32) -> f32 {
    m_pow(x, y)
}

#[inline]
pub fn sqrt(x: f32) -> f32 {
    m_sqrt(x)
}

#[inline]
pub fn exp(x: f32) -> f32 {
    m_exp(x)
}

#[inline]
pub fn ln(x: f32) -> f32 {
    m_ln(x)
}

// ------------------------------------ Levels ---------------------------------------

/// `10^(db/20)`; anything at or below -120 dB is silence.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { m_exp(0.11512925464970229_f32 * db) } // ln(10)/20
}

/// `20·log10(lin)`, floored at -120 dB.
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin <= EPS_SMALL { -120.0 } else { 8.685889638065036553_f32 * m_ln(lin) } // 20/ln(10)
}

// ------------------------------------- Trig ----------------------------------------

/// Sine used by the oscillators. Under `fast-math` the argument is folded into
/// [-π, π] and fed to a quintic, good to about 1e-3.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;

            // odd quintic on [-π, π]
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            m_sin(x)
        }
    }
}

#[inline]
pub fn fast_cos(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            fast_sin(x + core::f32::consts::PI * 0.5)
        } else {
            m_cos(x)
        }
    }
}

// ------------------------------------ Shaping --------------------------------------

/// `tanh`, or under `fast-math` the Padé form `x (27 + x²) / (27 + 9x²)`
/// saturated to ±1 beyond ±3.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            if x > 3.0 { return 1.0; }
            if x < -3.0 { return -1.0; }
            let x2 = x * x;
            x * (27.0 + x2) / (27.0 + 9.0 * x2)
        } else {
            m_tanh(x)
        }
    }
}

// --------------------------------- Smoothing / filter coefficients ---------------

/// Per-sample pole for a time constant in seconds: `exp(-1/(tau * sr))`.
/// A smoother steps with `y += (1 - a) * (x - y)`; `tau <= 0` gives `0.0`,
/// an immediate jump.
#[inline]
pub fn time_constant_coeff(tau_s: f32, sr: f32) -> f32 {
    if tau_s <= 0.0 { return 0.0; }
    m_exp(-1.0 / (tau_s * sr.max(1.0)))
}

/// Prewarped SVF gain `g = tan(π fc / sr)`.
///
/// The cutoff is kept below 0.49·sr so `g` stays finite.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let fc = cut_hz.max(1.0).min(0.49 * sr);
    let x = PI * (fc / sr);
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            fast_sin(x) / fast_cos(x)
        } else {
            m_tan(x)
        }
    }
}

// ------------------------------------ Tests ----------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_invert_each_other() {
        for db in [-90.0, -48.0, -12.0, -3.0, 0.0, 9.0] {
            assert!((lin_to_db(db_to_lin(db)) - db).abs() < 0.1, "db={}", db);
        }
    }

    #[test]
    fn shaper_never_exceeds_unity() {
        for x in [-40.0, -3.5, -0.5, 0.0, 0.5, 3.5, 40.0] {
            assert!(soft_clip(x).abs() <= 1.0 + 1e-4, "x={}", x);
        }
    }

    #[test]
    fn clamp_limits_both_sides() {
        assert_eq!(clamp(2.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.25, 0.0, 1.0), 0.25);
        assert_eq!(clamp(f32::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn tone_curve_hits_its_anchors() {
        assert!((tone_to_hz(0.0) - 200.0).abs() < 0.01);
        assert!((tone_to_hz(100.0) - 22_000.0).abs() < 1.0);
        let expected = 200.0 * 110f32.powf(0.2);
        assert!((tone_to_hz(20.0) - expected).abs() < 0.5, "{}", tone_to_hz(20.0));
        assert!(tone_to_hz(500.0) <= 22_000.5);
    }

    #[test]
    fn phase_wraps_negative() {
        let p = wrap_phase01(-0.25);
        assert!((p - 0.75).abs() < 1e-6, "p={}", p);
        let q = wrap_phase01(2.5);
        assert!((q - 0.5).abs() < 1e-6, "q={}", q);
    }

    #[test]
    fn time_constant_converges() {
        let sr = 48000.0;
        let a = time_constant_coeff(0.1, sr);
        let mut y = 0.0;
        for _ in 0..(sr as usize / 2) {
            y += (1.0 - a) * (1.0 - y);
        }
        // five time constants
        assert!((1.0 - y) < 0.01, "y={}", y);
    }
}
