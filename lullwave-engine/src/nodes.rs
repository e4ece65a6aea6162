//! Building blocks (nodes) the voices and the effect chain are wired from.
//!
//! These are zero-allocation, per-sample components designed for realtime use.
//! Everything here is `Copy` and cheap to move; no locks, no heap.
//!
//! Contents:
//! - `Wave`, `Osc`     : basic oscillators (Sine/Tri) with stable phase wrap
//! - `Lfo`             : low-frequency oscillator (same core as `Osc`), for modulation
//! - `NoiseMod`        : ultra-low-rate random modulator with slewed steps
//!
//! Notes:
//! - Frequency is **Hz**; methods expect the current **sample rate** when stepping.

use lullwave_core::dsp::{fast_sin, TAU};
use lullwave_core::filters::OnePoleLP;
use lullwave_core::noise::WhiteNoise;

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Tri }

/// Naive triangle; the soft ambient material never stresses aliasing.
#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine => fast_sin(TAU * phase01),
        Wave::Tri  => 4.0 * (phase01 - 0.5).abs() - 1.0,
    }
}

/// Free-running oscillator.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,   // [0,1)
    freq:  f32,   // Hz
    wave:  Wave,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz.max(0.0), wave } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz.max(0.0); }
    #[inline] pub fn freq(&self) -> f32 { self.freq }

    /// Start at phase `p` (wrapped into [0,1)).
    #[inline]
    pub fn with_phase(mut self, p: f32) -> Self {
        self.phase = p.rem_euclid(1.0);
        self
    }

    /// Advance one sample and return the oscillator sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        self.phase += self.freq / sr;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        osc_sample(self.phase, self.wave)
    }
}

/// Low-frequency oscillator; identical to `Osc` but with convenience constructors.
#[derive(Copy, Clone, Debug)]
pub struct Lfo(Osc);

impl Lfo {
    #[inline] pub fn sine(rate_hz: f32) -> Self { Self(Osc::new(rate_hz, Wave::Sine)) }
    #[inline] pub fn tri(rate_hz: f32)  -> Self { Self(Osc::new(rate_hz, Wave::Tri))  }

    #[inline] pub fn with_phase(self, p: f32) -> Self { Self(self.0.with_phase(p)) }

    /// Next LFO value in **[-1,1]**.
    #[inline] pub fn next_norm(&mut self, sr: f32) -> f32 { self.0.next(sr) }
}

/// Slowly changing random modulator (ambient drift).
///
/// Every `period_s` seconds a new random target in [low, high] is chosen and
/// approached through a one-pole low-pass.
#[derive(Copy, Clone, Debug)]
pub struct NoiseMod {
    low: f32,
    high: f32,
    period_s: f32,
    t: f32,
    target: f32,
    lp: OnePoleLP,
    rng: WhiteNoise,
}

impl NoiseMod {
    /// `period_s`: how often to pick a new target
    /// `cut_hz`  : slew cutoff over the targets (smaller = slower)
    #[inline]
    pub fn new(low: f32, high: f32, period_s: f32, cut_hz: f32, sr: f32, seed: u32) -> Self {
        let mut s = Self {
            low, high, period_s: period_s.max(0.1),
            t: 0.0,
            target: 0.0,
            lp: OnePoleLP::new(cut_hz.max(0.01), sr),
            rng: WhiteNoise::new(seed),
        };
        s.pick_target();
        s
    }

    #[inline]
    fn pick_target(&mut self) {
        self.target = self.low + (self.high - self.low) * self.rng.next01();
        self.t = 0.0;
    }

    /// Next smoothed value in [low, high], updated once per sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        self.t += 1.0 / sr;
        if self.t >= self.period_s {
            self.pick_target();
        }
        self.lp.process(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc_stays_in_range() {
        let sr = 48_000.0;
        for wave in [Wave::Sine, Wave::Tri] {
            let mut o = Osc::new(440.0, wave).with_phase(1.25);
            for _ in 0..10_000 {
                let s = o.next(sr);
                assert!((-1.001..=1.001).contains(&s), "{wave:?} -> {s}");
            }
        }
    }

    #[test]
    fn noise_mod_stays_within_bounds() {
        let sr = 1000.0;
        let mut m = NoiseMod::new(-6.0, 6.0, 0.5, 2.0, sr, 11);
        for _ in 0..20_000 {
            let v = m.next(sr);
            assert!((-6.0..=6.0).contains(&v));
        }
    }
}
