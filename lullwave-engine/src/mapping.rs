//! XY → every modulatable target.
//!
//! [`map_params`] is pure: the same point always yields the same targets, and
//! every value is clamped to a [`SafeRange`] that keeps filters below
//! self-oscillation and every feedback loop below unity gain.

use serde::Serialize;
use lullwave_core::dsp::{clamp, map_exp};

use crate::world::{ControlPoint, QuadrantWeights};

/// Closed interval a target is held inside.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SafeRange {
    pub min: f32,
    pub max: f32,
}

impl SafeRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn clamp(&self, v: f32) -> f32 {
        clamp(v, self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }
}

pub mod limits {
    use super::SafeRange;

    pub const CUTOFF_HZ: SafeRange = SafeRange::new(150.0, 8000.0);
    pub const FILTER_Q: SafeRange = SafeRange::new(0.5, 1.2);
    pub const PAD_CUTOFF_HZ: SafeRange = SafeRange::new(300.0, 4400.0);
    pub const MOOD_HZ: SafeRange = SafeRange::new(200.0, 4800.0);
    pub const REVERB_WET: SafeRange = SafeRange::new(0.1, 0.9);
    pub const REVERB_DECAY_S: SafeRange = SafeRange::new(1.5, 9.0);
    pub const PRE_DELAY_S: SafeRange = SafeRange::new(0.005, 0.08);
    pub const WET_TONE_HZ: SafeRange = SafeRange::new(2500.0, 8000.0);
    pub const WET_HIGHPASS_HZ: SafeRange = SafeRange::new(80.0, 400.0);
    pub const SHIMMER_DB: SafeRange = SafeRange::new(-3.0, 3.0);
    pub const BLOOM_TIME_S: SafeRange = SafeRange::new(0.2, 2.0);
    pub const BLOOM_FEEDBACK: SafeRange = SafeRange::new(0.07, 0.35);
    pub const BLOOM_MIX: SafeRange = SafeRange::new(0.02, 0.2);
    pub const DELAY_TIME_S: SafeRange = SafeRange::new(0.1, 0.8);
    pub const DELAY_FEEDBACK: SafeRange = SafeRange::new(0.05, 0.35);
    pub const CRYSTAL_SEND: SafeRange = SafeRange::new(0.0, 0.05);
    pub const CRYSTAL_MIX: SafeRange = SafeRange::new(0.02, 0.25);
    pub const CRYSTAL_FEEDBACK: SafeRange = SafeRange::new(0.1, 0.4);
    pub const PRISM_SEND: SafeRange = SafeRange::new(0.0, 0.03);
    pub const PRISM_MIX: SafeRange = SafeRange::new(0.01, 0.2);
    pub const PRISM_FEEDBACK: SafeRange = SafeRange::new(0.1, 0.35);
    pub const WARMTH_SHELF_DB: SafeRange = SafeRange::new(0.0, 6.0);
    pub const WARMTH_LOWPASS_HZ: SafeRange = SafeRange::new(8000.0, 14000.0);
    pub const DRIVE: SafeRange = SafeRange::new(0.0, 0.5);
    pub const MASTER_LEVEL: SafeRange = SafeRange::new(0.25, 0.5);
    pub const TAPE_GAIN: SafeRange = SafeRange::new(0.00008, 0.004);
    pub const CRACKLE_DENSITY: SafeRange = SafeRange::new(0.0, 1.0);
    pub const CRACKLE_GAIN: SafeRange = SafeRange::new(0.02, 0.7);
    pub const DUST_GAIN: SafeRange = SafeRange::new(0.0001, 0.012);
    pub const TEXTURE_GAIN: SafeRange = SafeRange::new(0.0, 0.05);
    pub const CATEGORY_GAIN: SafeRange = SafeRange::new(0.0, 1.0);
    pub const STRIKE_PROBABILITY: SafeRange = SafeRange::new(0.0, 0.95);
}

/// Flat record of every modulatable value.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ParamTargets {
    pub filter_cutoff_hz: f32,
    pub filter_q: f32,
    pub pad_cutoff_hz: f32,
    pub mood_hz: f32,
    pub reverb_wet: f32,
    pub reverb_decay_s: f32,
    pub pre_delay_s: f32,
    pub wet_tone_hz: f32,
    pub wet_highpass_hz: f32,
    pub shimmer_db: f32,
    pub bloom_time_s: f32,
    pub bloom_feedback: f32,
    pub bloom_mix: f32,
    pub delay_time_s: f32,
    pub delay_feedback: f32,
    pub crystal_send: f32,
    pub crystal_mix: f32,
    pub crystal_feedback: f32,
    pub prism_send: f32,
    pub prism_mix: f32,
    pub prism_feedback: f32,
    pub warmth_shelf_db: f32,
    pub warmth_lowpass_hz: f32,
    pub drive: f32,
    pub master_level: f32,
    pub tape_gain: f32,
    pub crackle_density: f32,
    pub crackle_gain: f32,
    pub dust_gain: f32,
    pub texture_gain: f32,
    pub melody_gain: f32,
    pub pad_gain: f32,
    pub drone_gain: f32,
    pub strike_gain: f32,
    pub texture_voice_gain: f32,
    pub strike_probability: f32,
}

impl ParamTargets {
    /// `(name, value, range)` for every target.
    pub fn entries(&self) -> [(&'static str, f32, SafeRange); 36] {
        use limits::*;
        [
            ("filter_cutoff_hz", self.filter_cutoff_hz, CUTOFF_HZ),
            ("filter_q", self.filter_q, FILTER_Q),
            ("pad_cutoff_hz", self.pad_cutoff_hz, PAD_CUTOFF_HZ),
            ("mood_hz", self.mood_hz, MOOD_HZ),
            ("reverb_wet", self.reverb_wet, REVERB_WET),
            ("reverb_decay_s", self.reverb_decay_s, REVERB_DECAY_S),
            ("pre_delay_s", self.pre_delay_s, PRE_DELAY_S),
            ("wet_tone_hz", self.wet_tone_hz, WET_TONE_HZ),
            ("wet_highpass_hz", self.wet_highpass_hz, WET_HIGHPASS_HZ),
            ("shimmer_db", self.shimmer_db, SHIMMER_DB),
            ("bloom_time_s", self.bloom_time_s, BLOOM_TIME_S),
            ("bloom_feedback", self.bloom_feedback, BLOOM_FEEDBACK),
            ("bloom_mix", self.bloom_mix, BLOOM_MIX),
            ("delay_time_s", self.delay_time_s, DELAY_TIME_S),
            ("delay_feedback", self.delay_feedback, DELAY_FEEDBACK),
            ("crystal_send", self.crystal_send, CRYSTAL_SEND),
            ("crystal_mix", self.crystal_mix, CRYSTAL_MIX),
            ("crystal_feedback", self.crystal_feedback, CRYSTAL_FEEDBACK),
            ("prism_send", self.prism_send, PRISM_SEND),
            ("prism_mix", self.prism_mix, PRISM_MIX),
            ("prism_feedback", self.prism_feedback, PRISM_FEEDBACK),
            ("warmth_shelf_db", self.warmth_shelf_db, WARMTH_SHELF_DB),
            ("warmth_lowpass_hz", self.warmth_lowpass_hz, WARMTH_LOWPASS_HZ),
            ("drive", self.drive, DRIVE),
            ("master_level", self.master_level, MASTER_LEVEL),
            ("tape_gain", self.tape_gain, TAPE_GAIN),
            ("crackle_density", self.crackle_density, CRACKLE_DENSITY),
            ("crackle_gain", self.crackle_gain, CRACKLE_GAIN),
            ("dust_gain", self.dust_gain, DUST_GAIN),
            ("texture_gain", self.texture_gain, TEXTURE_GAIN),
            ("melody_gain", self.melody_gain, CATEGORY_GAIN),
            ("pad_gain", self.pad_gain, CATEGORY_GAIN),
            ("drone_gain", self.drone_gain, CATEGORY_GAIN),
            ("strike_gain", self.strike_gain, CATEGORY_GAIN),
            ("texture_voice_gain", self.texture_voice_gain, CATEGORY_GAIN),
            ("strike_probability", self.strike_probability, STRIKE_PROBABILITY),
        ]
    }
}

/// Blend the world table at `point`.
///
/// Cutoff combines X with the worlds' brightness on an exponential axis, so
/// equal moves in X are equal moves in perceived brightness.
pub fn map_params(point: ControlPoint, weights: &QuadrantWeights) -> ParamTargets {
    use limits::*;

    let brightness = weights.blend(|p| p.brightness);
    let cutoff = CUTOFF_HZ.clamp(map_exp(0.35 * point.x + 0.65 * brightness, CUTOFF_HZ.min, CUTOFF_HZ.max));
    let warmth = weights.blend(|p| p.warmth);
    let drive = DRIVE.clamp(weights.blend(|p| p.drive));
    let crystal = weights.blend(|p| p.crystal);
    let prism = weights.blend(|p| p.prism);
    let crackle = CRACKLE_DENSITY.clamp(weights.blend(|p| p.crackle));
    let texture = clamp(weights.blend(|p| p.texture), 0.0, 1.0);

    ParamTargets {
        filter_cutoff_hz: cutoff,
        filter_q: FILTER_Q.clamp(0.8 - 0.2 * point.y),
        pad_cutoff_hz: PAD_CUTOFF_HZ.clamp(400.0 + cutoff * 0.5),
        mood_hz: MOOD_HZ.clamp(cutoff * 0.6),
        reverb_wet: REVERB_WET.clamp(weights.blend(|p| p.reverb_wet)),
        reverb_decay_s: REVERB_DECAY_S.clamp(weights.blend(|p| p.reverb_decay_s)),
        pre_delay_s: PRE_DELAY_S.clamp(weights.blend(|p| p.pre_delay_s)),
        wet_tone_hz: WET_TONE_HZ.clamp(weights.blend(|p| p.wet_tone_hz)),
        wet_highpass_hz: WET_HIGHPASS_HZ.clamp(weights.blend(|p| p.wet_highpass_hz)),
        shimmer_db: SHIMMER_DB.clamp(weights.blend(|p| p.shimmer_db)),
        bloom_time_s: BLOOM_TIME_S.clamp(weights.blend(|p| p.bloom_time_s)),
        bloom_feedback: BLOOM_FEEDBACK.clamp(weights.blend(|p| p.bloom_feedback)),
        bloom_mix: BLOOM_MIX.clamp(weights.blend(|p| p.bloom_mix)),
        delay_time_s: DELAY_TIME_S.clamp(weights.blend(|p| p.delay_time_s)),
        delay_feedback: DELAY_FEEDBACK.clamp(weights.blend(|p| p.delay_feedback)),
        crystal_send: CRYSTAL_SEND.clamp(0.01 + crystal * 0.04),
        crystal_mix: CRYSTAL_MIX.clamp(crystal * 0.15),
        crystal_feedback: CRYSTAL_FEEDBACK.clamp(0.2 + crystal * 0.15),
        prism_send: PRISM_SEND.clamp(0.005 + prism * 0.02),
        prism_mix: PRISM_MIX.clamp(prism * 0.1),
        prism_feedback: PRISM_FEEDBACK.clamp(0.18 + prism * 0.15),
        warmth_shelf_db: WARMTH_SHELF_DB.clamp(warmth * 6.0),
        warmth_lowpass_hz: WARMTH_LOWPASS_HZ.clamp(14_000.0 - warmth * 6000.0),
        drive,
        master_level: MASTER_LEVEL.clamp(weights.blend(|p| p.master_level)),
        tape_gain: TAPE_GAIN.clamp(weights.blend(|p| p.tape)),
        crackle_density: crackle,
        crackle_gain: CRACKLE_GAIN.clamp(0.05 + crackle * 0.6),
        dust_gain: DUST_GAIN.clamp(0.0002 + crackle * 0.01),
        texture_gain: TEXTURE_GAIN.clamp(texture * 0.04),
        melody_gain: CATEGORY_GAIN.clamp(weights.blend(|p| p.melody_gain)),
        pad_gain: CATEGORY_GAIN.clamp(weights.blend(|p| p.pad_gain)),
        drone_gain: CATEGORY_GAIN.clamp(weights.blend(|p| p.drone_gain)),
        strike_gain: CATEGORY_GAIN.clamp(weights.blend(|p| p.strike_gain)),
        texture_voice_gain: CATEGORY_GAIN.clamp(0.6 + 0.4 * crackle),
        strike_probability: STRIKE_PROBABILITY.clamp(weights.blend(|p| p.strike_probability)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    fn at(x: f32, y: f32) -> ParamTargets {
        let p = ControlPoint::new(x, y);
        map_params(p, &QuadrantWeights::from_point(p))
    }

    #[test]
    fn every_target_is_inside_its_range_across_the_square() {
        for i in 0..=20 {
            for j in 0..=20 {
                let t = at(i as f32 / 20.0, j as f32 / 20.0);
                for (name, v, range) in t.entries() {
                    assert!(v.is_finite() && range.contains(v), "{name}={v} outside {range:?} at ({i},{j})");
                }
            }
        }
    }

    #[test]
    fn feedback_loops_stay_below_unity() {
        for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.5, 0.5)] {
            let t = at(x, y);
            assert!(t.delay_feedback < 1.0 && t.bloom_feedback < 1.0);
            assert!(t.crystal_feedback < 1.0 && t.prism_feedback < 1.0);
        }
    }

    #[test]
    fn out_of_range_input_maps_like_the_nearest_corner() {
        assert_eq!(at(-5.0, 9.0), at(0.0, 1.0));
        assert_eq!(at(f32::NAN, 0.5), at(0.5, 0.5));
    }

    #[test]
    fn cutoff_rises_with_x() {
        let mut last = 0.0;
        for i in 0..=10 {
            let c = at(i as f32 / 10.0, 0.5).filter_cutoff_hz;
            assert!(c > last, "cutoff not rising at step {i}: {c} <= {last}");
            last = c;
        }
    }

    #[test]
    fn overtone_corner_maxes_wet_and_strikes() {
        let t = at(1.0, 1.0);
        let p = World::Overtone.profile();
        assert!((t.reverb_wet - p.reverb_wet).abs() < 1e-6);
        assert!((t.strike_probability - p.strike_probability).abs() < 1e-6);
        assert!(t.strike_probability > at(0.0, 0.0).strike_probability);
    }

    #[test]
    fn mapping_is_pure() {
        assert_eq!(at(0.31, 0.77), at(0.31, 0.77));
    }
}
