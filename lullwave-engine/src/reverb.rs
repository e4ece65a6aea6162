//! Mono "bloom" reverb (realtime-safe once built).
//!
//! Design
//! - Modulated pre-delay → 5 LFO-modulated LP-combs in parallel → 2 series all-passes.
//! - Wet path: tone low-pass → high-pass → shimmer high-shelf, plus a short
//!   modulated "space" tap and a long low-passed "bloom" feedback delay layered
//!   on the tail.
//! - Decay (T60) maps to comb feedback `g = 10^(-3·len/T60)`, capped below unity.
//!   Re-applying decay retunes five loops at once, so callers rate-limit it via
//!   [`BloomReverb::set_decay`].

use lullwave_core::delay::DelayLine;
use lullwave_core::dsp::{clamp, kill_denormals};
use lullwave_core::filters::{OnePoleLP, Rbj, RbjKind};

use crate::nodes::Lfo;

/// Comb loop gain never reaches this.
pub const MAX_COMB_FEEDBACK: f32 = 0.97;

const COMB_TIMES_S: [f32; 5] = [0.031, 0.037, 0.041, 0.047, 0.053];
const COMB_MERGE_GAIN: f32 = 0.16;
const ALLPASS_TIMES_S: [f32; 2] = [0.005, 0.0017];
const ALLPASS_G: f32 = 0.5;
const SPACE_DELAY_S: f32 = 0.019;
const SPACE_MIX: f32 = 0.13;
const MAX_PRE_DELAY_S: f32 = 0.1;
const MAX_BLOOM_S: f32 = 2.1;

/// Feedback comb with an LFO-swept length and a low-pass in the loop.
#[derive(Clone, Debug)]
struct ModComb {
    line: DelayLine,
    base_s: f32,
    depth_s: f32,
    lfo: Lfo,
    damp: OnePoleLP,
    fb: f32,
}

impl ModComb {
    fn new(i: usize, sr: f32) -> Self {
        let fi = i as f32;
        let base_s = COMB_TIMES_S[i];
        let depth_s = 0.000_18 + fi * 0.000_06;
        Self {
            line: DelayLine::new(base_s + depth_s + 0.001, sr),
            base_s,
            depth_s,
            lfo: Lfo::sine(0.034 + fi * 0.013).with_phase(fi * 0.21),
            damp: OnePoleLP::new(4300.0 - fi * 280.0, sr),
            fb: 0.8,
        }
    }

    fn set_decay(&mut self, t60_s: f32) {
        let g = 10f32.powf(-3.0 * self.base_s / t60_s.max(0.1));
        self.fb = clamp(g, 0.0, MAX_COMB_FEEDBACK);
    }

    #[inline]
    fn process(&mut self, x: f32, sr: f32) -> f32 {
        let d = self.base_s + self.depth_s * self.lfo.next_norm(sr);
        let z = self.line.read_seconds(d, sr);
        let damped = self.damp.process(z);
        self.line.write(x + self.fb * damped);
        z
    }
}

/// Schroeder all-pass on a single delay.
#[derive(Clone, Debug)]
struct Allpass {
    line: DelayLine,
    len: f32,
    g: f32,
}

impl Allpass {
    fn new(time_s: f32, g: f32, sr: f32) -> Self {
        Self { line: DelayLine::new(time_s + 0.001, sr), len: time_s * sr, g: g.clamp(-0.999, 0.999) }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let z = self.line.read(self.len);
        let y = z - self.g * x;
        self.line.write(x + self.g * y);
        kill_denormals(y)
    }
}

/// Settable reverb character (already smoothed by the caller).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReverbParams {
    pub wet: f32,
    pub pre_delay_s: f32,
    pub tone_hz: f32,
    pub highpass_hz: f32,
    pub shimmer_db: f32,
    pub bloom_time_s: f32,
    pub bloom_feedback: f32,
    pub bloom_mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            wet: 0.46,
            pre_delay_s: 0.028,
            tone_hz: 6200.0,
            highpass_hz: 220.0,
            shimmer_db: 0.0,
            bloom_time_s: 0.62,
            bloom_feedback: 0.16,
            bloom_mix: 0.07,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BloomReverb {
    sr: f32,
    pre: DelayLine,
    combs: [ModComb; 5],
    allpasses: [Allpass; 2],
    tone: Rbj,
    highpass: Rbj,
    shimmer: Rbj,
    space: DelayLine,
    space_lfo: Lfo,
    bloom: DelayLine,
    bloom_lp: OnePoleLP,
    params: ReverbParams,
    decay_s: f32,
}

impl BloomReverb {
    pub fn new(sr: f32) -> Self {
        let sr = sr.max(1.0);
        let params = ReverbParams::default();
        let mut s = Self {
            sr,
            pre: DelayLine::new(MAX_PRE_DELAY_S, sr),
            combs: [0, 1, 2, 3, 4].map(|i| ModComb::new(i, sr)),
            allpasses: ALLPASS_TIMES_S.map(|t| Allpass::new(t, ALLPASS_G, sr)),
            tone: Rbj::low_pass(params.tone_hz, 0.707, sr),
            highpass: Rbj::high_pass(params.highpass_hz, 0.707, sr),
            shimmer: Rbj::new(RbjKind::HighShelf, 2500.0, 0.707, params.shimmer_db, sr),
            space: DelayLine::new(SPACE_DELAY_S + 0.005, sr),
            space_lfo: Lfo::sine(0.06),
            bloom: DelayLine::new(MAX_BLOOM_S, sr),
            bloom_lp: OnePoleLP::new(4600.0, sr),
            params,
            decay_s: 0.0,
        };
        s.set_decay(4.0, 0.0);
        s
    }

    /// Apply a new T60 if it differs from the applied one by at least
    /// `min_delta_s`. Returns whether the loops were retuned.
    pub fn set_decay(&mut self, t60_s: f32, min_delta_s: f32) -> bool {
        if !t60_s.is_finite() || (t60_s - self.decay_s).abs() < min_delta_s {
            return false;
        }
        self.decay_s = t60_s;
        for c in &mut self.combs {
            c.set_decay(t60_s);
        }
        true
    }

    pub fn decay_s(&self) -> f32 {
        self.decay_s
    }

    /// Largest comb loop gain currently applied.
    pub fn max_feedback(&self) -> f32 {
        self.combs.iter().fold(0.0, |m, c| m.max(c.fb))
    }

    pub fn set_params(&mut self, p: ReverbParams) {
        if p.tone_hz != self.params.tone_hz {
            self.tone.set_freq(p.tone_hz);
        }
        if p.highpass_hz != self.params.highpass_hz {
            self.highpass.set_freq(p.highpass_hz);
        }
        if p.shimmer_db != self.params.shimmer_db {
            self.shimmer.set_gain_db(p.shimmer_db);
        }
        self.params = ReverbParams {
            wet: clamp(p.wet, 0.0, 1.0),
            pre_delay_s: clamp(p.pre_delay_s, 0.0, MAX_PRE_DELAY_S),
            bloom_time_s: clamp(p.bloom_time_s, 0.01, MAX_BLOOM_S),
            bloom_feedback: clamp(p.bloom_feedback, 0.0, 0.9),
            ..p
        };
    }

    /// Process one mono sample; returns dry + wet.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let sr = self.sr;
        let p = self.params;

        let pre = self.pre.read_seconds(p.pre_delay_s, sr);
        self.pre.write(x);

        let mut sum = 0.0;
        for c in &mut self.combs {
            sum += c.process(pre, sr);
        }
        let mut tail = sum * COMB_MERGE_GAIN;
        for ap in &mut self.allpasses {
            tail = ap.process(tail);
        }

        let wet = self.shimmer.process(self.highpass.process(self.tone.process(tail)));

        let space_d = SPACE_DELAY_S + 0.0013 * self.space_lfo.next_norm(sr);
        let space = self.space.read_seconds(space_d, sr);
        self.space.write(wet);

        let bloom = self.bloom.read_seconds(p.bloom_time_s, sr);
        self.bloom.write(wet + self.bloom_lp.process(bloom) * p.bloom_feedback);

        let wet_sum = wet + space * SPACE_MIX + bloom * p.bloom_mix;
        kill_denormals(x * (1.0 - p.wet) + wet_sum * p.wet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comb_feedback_stays_below_unity_for_any_decay() {
        let mut r = BloomReverb::new(48_000.0);
        for t60 in [0.1, 1.5, 4.0, 9.0, 60.0, 1.0e6] {
            r.set_decay(t60, 0.0);
            assert!(r.max_feedback() < 1.0, "t60={t60}");
        }
    }

    #[test]
    fn decay_changes_are_rate_limited() {
        let mut r = BloomReverb::new(48_000.0);
        assert!(r.set_decay(6.0, 0.5));
        assert!(!r.set_decay(6.3, 0.5));
        assert_eq!(r.decay_s(), 6.0);
        assert!(r.set_decay(6.6, 0.5));
        assert!(!r.set_decay(f32::NAN, 0.0));
    }

    #[test]
    fn impulse_tail_decays_and_stays_finite() {
        let sr = 16_000.0;
        let mut r = BloomReverb::new(sr);
        r.set_decay(2.0, 0.0);
        r.set_params(ReverbParams { wet: 1.0, ..ReverbParams::default() });
        let mut early = 0.0_f32;
        let mut late = 0.0_f32;
        for i in 0..(sr as usize * 8) {
            let y = r.process(if i == 0 { 1.0 } else { 0.0 });
            assert!(y.is_finite());
            if i < sr as usize {
                early = early.max(y.abs());
            } else if i > sr as usize * 7 {
                late = late.max(y.abs());
            }
        }
        assert!(early > 0.0);
        assert!(late < early * 0.01, "early={early} late={late}");
    }

    #[test]
    fn fully_dry_passes_input() {
        let mut r = BloomReverb::new(48_000.0);
        r.set_params(ReverbParams { wet: 0.0, ..ReverbParams::default() });
        assert_eq!(r.process(0.5), 0.5);
    }
}
