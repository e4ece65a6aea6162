#![cfg_attr(not(feature = "std"), no_std)]
//! Lullwave Core: DSP primitives for the generative ambient engine.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` (+ `alloc`) and use `libm`/`micromath` math backends
//! - `fast-math`: enable approximations (polys/rationals) for tanh/trig, etc.
//! - `simd`     : 4-lane block helpers via `wide`
//!
//! Modules
//! - [`dsp`]       : math backend, utils (db/lin, pitch, smoothing coefficients, meters)
//! - [`envelopes`] : absolute-time breakpoint envelopes, parameter slew
//! - [`filters`]   : one-pole LP/HP/DC blocker, TPT SVF, RBJ biquads
//! - [`delay`]     : fractional delay line
//! - [`noise`]     : white and dust noise

extern crate alloc;

pub mod delay;
pub mod dsp;
pub mod envelopes;
pub mod filters;
pub mod noise;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::delay::DelayLine;
    pub use crate::dsp::{
        apply_gain, approach_coeff, cents_to_ratio, clamp, decay_per_sample, kill_denormals, lerp,
        lin_to_db, map_exp, octave_ratio, shaper_curve, soft_clip, TAU,
    };
    pub use crate::envelopes::{ParamSlew, ScheduledEnvelope, EXP_FLOOR};
    pub use crate::filters::{DcBlock, OnePoleHP, OnePoleLP, Rbj, RbjKind, SvfTpt};
    pub use crate::noise::{DustNoise, WhiteNoise};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let _ = lin_to_db(0.5);
        let env = ScheduledEnvelope::starting_at(0.0, 0.0).linear_to(1.0, 1.0);
        assert!(env.value_at(0.5) > 0.0);
        let mut lp = OnePoleLP::new(1000.0, 48000.0);
        let _ = lp.process(0.1);
    }
}
