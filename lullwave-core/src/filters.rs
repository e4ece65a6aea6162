//! Filters: lightweight one-poles, a TPT state-variable filter and RBJ biquads.
//!
//! Contents
//! - `OnePoleLP`  : “RC-style” one-pole low-pass (comb damping, tone tilt)
//! - `OnePoleHP`  : “RC-style” one-pole high-pass
//! - `DcBlock`    : convenience wrapper specialized for DC removal
//! - `SvfTpt`     : State-Variable Filter via Topology Preserving Transform,
//!                  cheap to retune per sample (resonator banks, wandering bands)
//! - `Rbj`        : cookbook biquad (LP/HP/BP/shelves/peaking) on top of the
//!                  `biquad` crate, retuned at control rate
//!
//! Notes
//! - `OnePole*` use the inexpensive `y += a * (x - y)` form, where
//!   `a = 1 - exp(-2π fc / sr)`.
//! - `SvfTpt` uses the “g = tan(π fc / sr)” formulation with `R = 1/(2Q)`.
//! - `Rbj` keeps its previous coefficients when the crate rejects a parameter
//!   set (e.g. a cutoff above Nyquist), so a bad update never silences a bus.

use crate::dsp::{clamp, kill_denormals, one_pole_coeff_hz, tpt_g};
use biquad::{Biquad as _, Coefficients, DirectForm2Transposed, ToHertz, Type};
use core::fmt::Debug;

/// One-pole low-pass `y += a * (x - y)`.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleLP {
    a: f32,
    y: f32,
    sr: f32,
    fc: f32,
}

impl OnePoleLP {
    /// Create a low-pass with cutoff `cut_hz` and sample rate `sr`.
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        let mut s = Self { a: 0.0, y: 0.0, sr: sr.max(1.0), fc: cut_hz.max(0.0) };
        s.update_coeffs();
        s
    }

    #[inline]
    pub fn set_cutoff_hz(&mut self, cut_hz: f32) {
        self.fc = cut_hz.max(0.0);
        self.update_coeffs();
    }

    #[inline]
    fn update_coeffs(&mut self) {
        self.a = 1.0 - one_pole_coeff_hz(self.fc, self.sr);
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.a * (x - self.y);
        self.y = kill_denormals(self.y);
        self.y
    }

    #[inline] pub fn value(&self) -> f32 { self.y }
}

/// One-pole high-pass, `y[n] = x[n] - x[n-1] + b * y[n-1]` with `b = exp(-2π fc / sr)`.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleHP {
    b: f32,
    x1: f32,
    y1: f32,
    sr: f32,
    fc: f32,
}

impl OnePoleHP {
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        let mut s = Self { b: 0.0, x1: 0.0, y1: 0.0, sr: sr.max(1.0), fc: cut_hz.max(0.0) };
        s.update_coeffs();
        s
    }

    #[inline] pub fn set_cutoff_hz(&mut self, cut_hz: f32) { self.fc = cut_hz.max(0.0); self.update_coeffs(); }

    #[inline]
    fn update_coeffs(&mut self) {
        self.b = one_pole_coeff_hz(self.fc, self.sr);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = kill_denormals(x - self.x1 + self.b * self.y1);
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// DC blocker: a one-pole high-pass with a very low cutoff (5–30 Hz).
#[derive(Copy, Clone, Debug)]
pub struct DcBlock {
    hp: OnePoleHP,
}

impl DcBlock {
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        Self { hp: OnePoleHP::new(cut_hz, sr) }
    }

    #[inline] pub fn process(&mut self, x: f32) -> f32 { self.hp.process(x) }
}

/// Topology-Preserving Transform SVF.
///
/// - `g = tan(π fc / sr)`
/// - `R = 1 / (2Q)`
///
/// Stable under fast modulation and very high Q, which is what the bowl
/// resonators and wandering texture bands need.
#[derive(Copy, Clone, Debug)]
pub struct SvfTpt {
    sr: f32,
    cut: f32,
    q: f32,
    g: f32,
    r: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfTpt {
    #[inline]
    pub fn new(cut_hz: f32, q: f32, sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            cut: cut_hz.max(0.0),
            q: q.max(1e-4),
            g: 0.0,
            r: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        s.recalc();
        s
    }

    #[inline] pub fn set_cutoff_hz(&mut self, cut_hz: f32) { self.cut = cut_hz.max(0.0); self.recalc(); }
    #[inline] pub fn cutoff_hz(&self) -> f32 { self.cut }

    #[inline]
    fn recalc(&mut self) {
        self.g = tpt_g(self.cut, self.sr);
        self.r = 1.0 / (2.0 * self.q);
    }

    /// Process one sample, returning `(lp, bp, hp)`.
    #[inline]
    pub fn process_all(&mut self, x: f32) -> (f32, f32, f32) {
        let v0 = x - self.r * self.ic1eq - self.ic2eq;
        let v1 = self.g * v0 + self.ic1eq;
        let v2 = self.g * v1 + self.ic2eq;

        self.ic1eq = kill_denormals(self.g * v0 + v1);
        self.ic2eq = kill_denormals(self.g * v1 + v2);

        let hp = v0 - self.r * v1 - v2;
        (v2, v1, hp)
    }

    /// Constant-peak band-pass (unity gain at the centre frequency).
    #[inline]
    pub fn process_bp(&mut self, x: f32) -> f32 {
        let r = self.r;
        2.0 * r * self.process_all(x).1
    }
}

// ------------------------------------ RBJ biquads --------------------------------

/// Response of an [`Rbj`] section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RbjKind {
    LowPass,
    HighPass,
    LowShelf,
    HighShelf,
    Peaking,
}

/// Cookbook biquad with control-rate retuning.
#[derive(Copy, Clone, Debug)]
pub struct Rbj {
    kind: RbjKind,
    sr: f32,
    freq: f32,
    q: f32,
    gain_db: f32,
    filter: DirectForm2Transposed<f32>,
}

const PASS_THROUGH: Coefficients<f32> = Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 };

impl Rbj {
    pub fn new(kind: RbjKind, freq: f32, q: f32, gain_db: f32, sr: f32) -> Self {
        let mut s = Self {
            kind,
            sr: sr.max(1.0),
            freq: f32::NAN,
            q,
            gain_db,
            filter: DirectForm2Transposed::<f32>::new(PASS_THROUGH),
        };
        s.set(freq, q, gain_db);
        s
    }

    #[inline] pub fn low_pass(freq: f32, q: f32, sr: f32) -> Self { Self::new(RbjKind::LowPass, freq, q, 0.0, sr) }
    #[inline] pub fn high_pass(freq: f32, q: f32, sr: f32) -> Self { Self::new(RbjKind::HighPass, freq, q, 0.0, sr) }

    fn coefficients(&self, freq: f32, q: f32, gain_db: f32) -> Option<Coefficients<f32>> {
        let ty = match self.kind {
            RbjKind::LowPass => Type::LowPass,
            RbjKind::HighPass => Type::HighPass,
            RbjKind::LowShelf => Type::LowShelf(gain_db),
            RbjKind::HighShelf => Type::HighShelf(gain_db),
            RbjKind::Peaking => Type::PeakingEQ(gain_db),
        };
        let f0 = clamp(freq, 10.0, 0.45 * self.sr);
        Coefficients::<f32>::from_params(ty, self.sr.hz(), f0.hz(), q.max(0.05)).ok()
    }

    /// Retune. Returns `false` when the parameters were rejected and the
    /// previous response is kept. Skips work for sub-threshold changes.
    pub fn set(&mut self, freq: f32, q: f32, gain_db: f32) -> bool {
        let moved = (freq - self.freq).abs() > 5e-4 * self.freq.abs().max(1.0)
            || (q - self.q).abs() > 1e-3
            || (gain_db - self.gain_db).abs() > 1e-2;
        if !moved && self.freq.is_finite() {
            return true;
        }
        if !(freq.is_finite() && q.is_finite() && gain_db.is_finite()) {
            return false;
        }
        match self.coefficients(freq, q, gain_db) {
            Some(c) => {
                self.filter.update_coefficients(c);
                self.freq = freq;
                self.q = q;
                self.gain_db = gain_db;
                true
            }
            None => false,
        }
    }

    #[inline] pub fn set_freq(&mut self, freq: f32) -> bool { self.set(freq, self.q, self.gain_db) }
    #[inline] pub fn set_gain_db(&mut self, gain_db: f32) -> bool { self.set(self.freq, self.q, gain_db) }

    #[inline] pub fn freq(&self) -> f32 { self.freq }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        kill_denormals(self.filter.run(x))
    }
}

// ------------------------------------ Tests --------------------------------------
