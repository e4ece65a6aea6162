//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for hot paths
//! - Clean, side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `fast-math` : enables polynomial/rational approximations (faster, approx.)
//! - `simd`      : 4-lane block gain via `wide`
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_ln(x: f32) -> f32 { x.ln() }
        #[inline] fn m_tanh(x: f32) -> f32 { x.tanh() }
        #[inline] fn m_tan(x: f32) -> f32 { (x.sin()) / (x.cos()) }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_cos(x: f32) -> f32 { libm::cosf(x) }
        #[inline] fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] fn m_ln(x: f32) -> f32 { libm::logf(x) }
        #[inline] fn m_tanh(x: f32) -> f32 { libm::tanhf(x) }
        #[inline] fn m_tan(x: f32) -> f32 { libm::tanf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_ln(x: f32) -> f32 { x.ln() }
        #[inline] fn m_tanh(x: f32) -> f32 { x.tanh() }
        #[inline] fn m_tan(x: f32) -> f32 { x.tan() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

const LN_2: f32 = core::f32::consts::LN_2;

// --------------------------------- Utilities -------------------------------------

/// Clamp `x` into `[lo, hi]`. NaN maps to `lo`.
#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x > hi {
        hi
    } else if x >= lo {
        x
    } else {
        lo
    }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

// --------------------------------- Pitch ------------------------------------------

/// Frequency ratio for a detune in cents: `2^(cents/1200)`.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    m_exp(cents * (LN_2 / 1200.0))
}

/// `2^octaves` for a (possibly negative) whole number of octaves.
#[inline]
pub fn octave_ratio(octaves: i32) -> f32 {
    if octaves >= 0 {
        (1u32 << octaves.min(16)) as f32
    } else {
        1.0 / (1u32 << (-octaves).min(16)) as f32
    }
}

/// Exponential map of `norm` in [0,1] onto `[lo, hi]` (`lo * (hi/lo)^norm`).
///
/// Equal steps of `norm` give equal frequency ratios, which is how cutoff sweeps
/// are perceived. `lo` must be positive.
#[inline]
pub fn map_exp(norm: f32, lo: f32, hi: f32) -> f32 {
    let n = clamp(norm, 0.0, 1.0);
    lo * m_exp(n * m_ln(hi / lo))
}

// --------------------------------- dB / linear -----------------------------------

/// Convert linear gain to dB: db = 20*log10(lin).
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin <= EPS_SMALL { -120.0 } else { 8.685889638065036553_f32 * m_ln(lin) } // 20/ln(10)
}

// --------------------------------- Fast trig -------------------------------------

/// Fast sine with range reduction into [-π, π] and 5th-order poly.
/// Max abs error ~1e-3 when `fast-math` is enabled; falls back to exact otherwise.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;

            // sin(x) ≈ x * (a + b x^2 + c x^4)
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

// --------------------------------- Nonlinearities --------------------------------

/// Soft clip via tanh. With `fast-math`, uses
/// `tanh(x) ≈ x * (27 + x^2) / (27 + 9 x^2)`.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    #[cfg(feature = "fast-math")]
    {
        let x2 = x * x;
        let num = x * (27.0 + x2);
        let den = 27.0 + 9.0 * x2;
        return num / den;
    }
    #[allow(unreachable_code)]
    m_tanh(x)
}

/// Waveshaper curve `((1 + k) x) / (1 + k |x|)`.
///
/// Odd, monotonic, unity at `x = ±1`; `k` sets how hard the knee is
/// (12 is a gentle tape-ish drive, 40+ is audibly broken).
#[inline]
pub fn shaper_curve(x: f32, k: f32) -> f32 {
    let k = k.max(0.0);
    ((1.0 + k) * x) / (1.0 + k * x.abs())
}

// --------------------------------- Exponentials / smoothing ----------------------

/// Fraction of the remaining distance covered after `dt` seconds when
/// approaching a target with time constant `tau_s`: `1 - exp(-dt/tau)`.
///
/// Non-positive `tau_s` jumps (returns 1).
#[inline]
pub fn approach_coeff(dt: f32, tau_s: f32) -> f32 {
    if tau_s <= 0.0 || dt <= 0.0 {
        return if tau_s <= 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - m_exp(-dt / tau_s)
}

/// Convert cutoff in Hz to a simple one-pole (non-TPT) coefficient `exp(-2π fc / sr)`.
#[inline]
pub fn one_pole_coeff_hz(cut_hz: f32, sr: f32) -> f32 {
    let fc = cut_hz.max(0.0).min(0.499 * sr);
    m_exp(-2.0 * PI * fc / sr)
}

/// Per-sample multiplier that decays by 60 dB over `t60_s` seconds.
#[inline]
pub fn decay_per_sample(t60_s: f32, sr: f32) -> f32 {
    if t60_s <= 0.0 { return 0.0; }
    // ln(1000) = 6.9078
    m_exp(-6.907_755_3 / (t60_s * sr))
}

/// TPT `g = tan(π fc / sr)` helper for state-variable filters.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let x = core::f32::consts::PI * (cut_hz.min(0.49 * sr) / sr);
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let s = fast_sin(x);
            let c = fast_cos(x);
            s / c
        } else {
            m_tan(x)
        }
    }
}

// --------------------------------- Block helpers ---------------------------------

/// In-place gain: `buf[i] *= gain`.
#[inline]
pub fn apply_gain(buf: &mut [f32], gain: f32) {
    cfg_if! {
        if #[cfg(feature = "simd")] {
            use wide::f32x4;
            let g = f32x4::splat(gain);
            let mut chunks = buf.chunks_exact_mut(4);
            for c in &mut chunks {
                let v = f32x4::from([c[0], c[1], c[2], c[3]]) * g;
                c.copy_from_slice(&v.to_array());
            }
            for s in chunks.into_remainder() {
                *s *= gain;
            }
        } else {
            for s in buf.iter_mut() {
                *s *= gain;
            }
        }
    }
}

// --------------------------------- Tests (std only) ------------------------------
