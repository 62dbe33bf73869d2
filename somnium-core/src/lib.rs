#![cfg_attr(not(feature = "std"), no_std)]
//! Somnium Core: no_std-ready DSP primitives with an optional fast-math backend.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use the `libm` math backend
//! - `fast-math`: enable approximations (polys/rationals) for tanh/trig
//!
//! Modules
//! - [`dsp`]        : math backend, utils (db/lin, tone curve, time constants, fast trig)
//! - [`automation`] : sample-accurate parameter lanes (set/linear/exponential/target)
//! - [`filters`]    : TPT state-variable filter
//! - [`noise`]      : white/pink/brown/violet shapers and buffer fill
//!
//! Design
//! - No heap allocations; pure sample-by-sample primitives
//! - Clear separation between math helpers and filter/automation building blocks
//! - Friendly to embedded / real-time targets

pub mod automation;
pub mod dsp;
pub mod filters;
pub mod noise;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::automation::{Curve, Param, Ramp};
    pub use crate::dsp::{
        cents_to_ratio, clamp, db_to_lin, kill_denormals, lin_to_db, soft_clip,
        time_constant_coeff, tone_to_hz, TAU,
    };
    pub use crate::filters::{SvfMode, SvfTpt};
    pub use crate::noise::{NoiseColor, NoiseShaper};
}
