//! The four sonic worlds on the corners of the XY square, and the per-world
//! coefficient table everything else blends.
//!
//! ```text
//!   y=1  Pulse ───────── Overtone
//!          │                │
//!          │                │
//!   y=0  Space ───────── Grain
//!        x=0              x=1
//! ```
//!
//! Weights are bilinear, so they always sum to one and each world owns its
//! corner outright.

use serde::Serialize;

use crate::harmony::Chord;

/// One corner character.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum World {
    /// Space & silence: slow tape tones, long reverb, rests.
    Space,
    /// Repetition & pulse: bright arpeggios, short delays.
    Pulse,
    /// Drones & overtones: just-intoned drones, struck bowls.
    Overtone,
    /// Texture & degradation: crackle, resonant pops, broken tones.
    Grain,
}

impl World {
    pub const ALL: [World; 4] = [World::Space, World::Pulse, World::Overtone, World::Grain];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            World::Space => 0,
            World::Pulse => 1,
            World::Overtone => 2,
            World::Grain => 3,
        }
    }

    #[inline]
    pub fn profile(self) -> &'static WorldProfile {
        &WORLDS[self.index()]
    }

    pub fn label(self) -> &'static str {
        self.profile().label
    }
}

/// The single steering input. Always inside the unit square.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ControlPoint {
    pub x: f32,
    pub y: f32,
}

impl ControlPoint {
    pub const CENTRE: ControlPoint = ControlPoint { x: 0.5, y: 0.5 };

    /// Clamp into `[0,1]²`; a NaN coordinate falls back to the centre.
    pub fn new(x: f32, y: f32) -> Self {
        let fix = |v: f32| if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) };
        Self { x: fix(x), y: fix(y) }
    }

    /// Move a fraction `t` of the way towards `to`.
    pub fn approach(&mut self, to: ControlPoint, t: f32) {
        self.x += (to.x - self.x) * t;
        self.y += (to.y - self.y) * t;
    }
}

impl Default for ControlPoint {
    fn default() -> Self {
        Self::CENTRE
    }
}

/// Bilinear corner weights, indexed by [`World::index`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct QuadrantWeights([f32; 4]);

impl QuadrantWeights {
    pub fn from_point(p: ControlPoint) -> Self {
        let (x, y) = (p.x, p.y);
        Self([(1.0 - x) * (1.0 - y), (1.0 - x) * y, x * y, x * (1.0 - y)])
    }

    #[inline]
    pub fn get(&self, world: World) -> f32 {
        self.0[world.index()]
    }

    /// Heaviest world; ties go to the earlier entry of [`World::ALL`].
    pub fn dominant(&self) -> World {
        let mut best = World::Space;
        for w in World::ALL {
            if self.get(w) > self.get(best) {
                best = w;
            }
        }
        best
    }

    /// Weighted sum of a per-world coefficient.
    #[inline]
    pub fn blend(&self, field: impl Fn(&WorldProfile) -> f32) -> f32 {
        World::ALL.iter().map(|w| self.get(*w) * field(w.profile())).sum()
    }

    /// Blend a `(min, max)` range field.
    #[inline]
    pub fn blend_range(&self, field: impl Fn(&WorldProfile) -> (f32, f32)) -> (f32, f32) {
        (self.blend(|p| field(p).0), self.blend(|p| field(p).1))
    }
}

/// Melody voice character; blended numerically across worlds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ToneShape {
    pub attack_s: (f32, f32),
    pub sustain_s: (f32, f32),
    pub release_s: (f32, f32),
    pub peak: f32,
    /// 0 = pure sine body, 1 = triangle body.
    pub tri_mix: f32,
    /// Level of the octave partial relative to the body.
    pub octave_partial: f32,
    /// Random pitch drift amplitude in cents.
    pub drift_cents: f32,
}

/// Every per-world constant in one place.
#[derive(Debug)]
pub struct WorldProfile {
    pub world: World,
    pub label: &'static str,

    // -- mapping coefficients
    /// Position of the world's cutoff on the exponential cutoff axis (0..1).
    pub brightness: f32,
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
    pub master_level: f32,
    pub warmth: f32,
    pub drive: f32,
    pub tape: f32,
    pub crystal: f32,
    pub prism: f32,
    pub crackle: f32,
    pub texture: f32,
    pub melody_gain: f32,
    pub pad_gain: f32,
    pub drone_gain: f32,
    pub strike_gain: f32,

    // -- harmony
    pub chords: &'static [Chord],
    pub patterns: &'static [&'static [u8]],
    pub melody_octave: i32,
    pub pad_octave: i32,
    pub chord_interval_s: (f32, f32),
    pub reverse_prob: f32,
    pub skip_prob: f32,

    // -- melody
    pub tone: ToneShape,
    pub melody_interval_s: (f32, f32),
    pub rest_prob: f32,
    pub octave_drop_prob: f32,
    pub pair_prob: f32,

    // -- percussion
    pub strike_probability: f32,
    pub strike_interval_s: (f32, f32),
    /// Share of strikes that are bowls rather than resonant pop clusters.
    pub bowl_share: f32,
    pub grit_prob: f32,
}

const MAJOR_PENT: &[f32] = &[1.0, 9.0 / 8.0, 5.0 / 4.0, 3.0 / 2.0, 5.0 / 3.0];
const LYDIAN: &[f32] = &[1.0, 9.0 / 8.0, 5.0 / 4.0, 45.0 / 32.0, 3.0 / 2.0, 5.0 / 3.0, 15.0 / 8.0];
const MIXO_JUST: &[f32] = &[1.0, 9.0 / 8.0, 5.0 / 4.0, 4.0 / 3.0, 3.0 / 2.0, 5.0 / 3.0, 16.0 / 9.0];
const HARMONIC: &[f32] = &[1.0, 9.0 / 8.0, 5.0 / 4.0, 11.0 / 8.0, 3.0 / 2.0, 13.0 / 8.0, 7.0 / 4.0];
const SUS_PENT: &[f32] = &[1.0, 9.0 / 8.0, 4.0 / 3.0, 3.0 / 2.0, 16.0 / 9.0];

const SPACE_CHORDS: &[Chord] = &[
    Chord { name: "Dmaj7", root_hz: 146.83, scale: MAJOR_PENT, pad: &[2.0, 3.0, 3.75], drone: 1.0 },
    Chord { name: "Gmaj", root_hz: 196.00, scale: MAJOR_PENT, pad: &[1.0, 1.5, 2.5], drone: 0.5 },
    Chord { name: "Amaj", root_hz: 220.00, scale: MAJOR_PENT, pad: &[1.0, 1.25, 1.5], drone: 0.5 },
    Chord { name: "D/F#", root_hz: 146.83, scale: MAJOR_PENT, pad: &[1.25, 2.0, 3.0], drone: 1.0 },
];

const PULSE_CHORDS: &[Chord] = &[
    Chord { name: "Cmaj7#11", root_hz: 130.81, scale: LYDIAN, pad: &[2.0, 2.5, 2.8125], drone: 1.0 },
    Chord { name: "Fmaj9", root_hz: 174.61, scale: LYDIAN, pad: &[1.0, 1.25, 1.125 * 2.0], drone: 0.5 },
    Chord { name: "G6", root_hz: 196.00, scale: MIXO_JUST, pad: &[1.0, 1.25, 5.0 / 3.0], drone: 0.5 },
    Chord { name: "Dadd9", root_hz: 146.83, scale: MAJOR_PENT, pad: &[2.0, 2.25, 3.0], drone: 1.0 },
];

const OVERTONE_CHORDS: &[Chord] = &[
    Chord { name: "C harmonic", root_hz: 65.41, scale: HARMONIC, pad: &[2.0, 3.0, 4.0], drone: 1.0 },
    Chord { name: "G harmonic", root_hz: 98.00, scale: HARMONIC, pad: &[2.0, 3.0, 5.0], drone: 1.0 },
    Chord { name: "F harmonic", root_hz: 87.31, scale: HARMONIC, pad: &[2.0, 3.0, 4.0], drone: 1.0 },
    Chord { name: "Bb harmonic", root_hz: 116.54, scale: HARMONIC, pad: &[1.0, 1.5, 2.0], drone: 0.5 },
];

const GRAIN_CHORDS: &[Chord] = &[
    Chord { name: "F#sus", root_hz: 92.50, scale: SUS_PENT, pad: &[2.0, 3.0, 4.5], drone: 1.0 },
    Chord { name: "Esus", root_hz: 82.41, scale: SUS_PENT, pad: &[2.0, 8.0 / 3.0, 3.0], drone: 1.0 },
    Chord { name: "Bsus", root_hz: 123.47, scale: SUS_PENT, pad: &[1.0, 4.0 / 3.0, 2.0], drone: 0.5 },
    Chord { name: "C#sus", root_hz: 138.59, scale: SUS_PENT, pad: &[1.0, 1.5, 2.25], drone: 0.5 },
];

pub static WORLDS: [WorldProfile; 4] = [
    WorldProfile {
        world: World::Space,
        label: "space",
        brightness: 0.75,
        reverb_wet: 0.70,
        reverb_decay_s: 6.5,
        pre_delay_s: 0.04,
        wet_tone_hz: 5000.0,
        wet_highpass_hz: 180.0,
        shimmer_db: 0.3,
        bloom_time_s: 0.8,
        bloom_feedback: 0.25,
        bloom_mix: 0.12,
        delay_time_s: 0.5,
        delay_feedback: 0.25,
        master_level: 0.40,
        warmth: 0.6,
        drive: 0.05,
        tape: 0.0006,
        crystal: 0.1,
        prism: 0.05,
        crackle: 0.3,
        texture: 0.0,
        melody_gain: 0.9,
        pad_gain: 0.8,
        drone_gain: 0.5,
        strike_gain: 0.6,
        chords: SPACE_CHORDS,
        patterns: &[&[0, 2, 4, 3, 1, 0], &[5, 4, 3, 4, 5], &[0, 3, 5, 3, 0], &[2, 4, 6, 5, 3, 2]],
        melody_octave: 1,
        pad_octave: 0,
        chord_interval_s: (45.0, 75.0),
        reverse_prob: 0.15,
        skip_prob: 0.1,
        tone: ToneShape {
            attack_s: (2.0, 6.0),
            sustain_s: (8.0, 20.0),
            release_s: (4.0, 10.0),
            peak: 0.024,
            tri_mix: 0.0,
            octave_partial: 0.08,
            drift_cents: 5.0,
        },
        melody_interval_s: (4.0, 9.0),
        rest_prob: 0.3,
        octave_drop_prob: 0.4,
        pair_prob: 0.2,
        strike_probability: 0.06,
        strike_interval_s: (18.0, 40.0),
        bowl_share: 0.9,
        grit_prob: 0.0,
    },
    WorldProfile {
        world: World::Pulse,
        label: "pulse",
        brightness: 0.93,
        reverb_wet: 0.38,
        reverb_decay_s: 3.5,
        pre_delay_s: 0.02,
        wet_tone_hz: 7000.0,
        wet_highpass_hz: 250.0,
        shimmer_db: 1.5,
        bloom_time_s: 0.45,
        bloom_feedback: 0.15,
        bloom_mix: 0.05,
        delay_time_s: 0.35,
        delay_feedback: 0.2,
        master_level: 0.42,
        warmth: 0.2,
        drive: 0.02,
        tape: 0.0001,
        crystal: 0.6,
        prism: 0.4,
        crackle: 0.05,
        texture: 0.0,
        melody_gain: 1.0,
        pad_gain: 0.5,
        drone_gain: 0.25,
        strike_gain: 0.5,
        chords: PULSE_CHORDS,
        patterns: &[
            &[0, 2, 4, 2],
            &[0, 4, 7, 4],
            &[0, 2, 4, 7, 4, 2],
            &[7, 4, 2, 0],
            &[0, 4, 2, 7, 4, 9],
            &[2, 4, 7, 9, 7, 4],
            &[0, 7, 4, 11, 7, 4],
            &[4, 2, 0, 2, 4, 7],
        ],
        melody_octave: 1,
        pad_octave: 0,
        chord_interval_s: (30.0, 50.0),
        reverse_prob: 0.05,
        skip_prob: 0.05,
        tone: ToneShape {
            attack_s: (0.01, 0.03),
            sustain_s: (0.1, 0.3),
            release_s: (0.4, 0.8),
            peak: 0.03,
            tri_mix: 1.0,
            octave_partial: 0.15,
            drift_cents: 2.0,
        },
        melody_interval_s: (0.3, 0.6),
        rest_prob: 0.05,
        octave_drop_prob: 0.0,
        pair_prob: 0.1,
        strike_probability: 0.12,
        strike_interval_s: (15.0, 40.0),
        bowl_share: 0.6,
        grit_prob: 0.0,
    },
    WorldProfile {
        world: World::Overtone,
        label: "overtone",
        brightness: 0.71,
        reverb_wet: 0.80,
        reverb_decay_s: 8.0,
        pre_delay_s: 0.05,
        wet_tone_hz: 4500.0,
        wet_highpass_hz: 160.0,
        shimmer_db: 0.2,
        bloom_time_s: 1.6,
        bloom_feedback: 0.30,
        bloom_mix: 0.15,
        delay_time_s: 0.3,
        delay_feedback: 0.3,
        master_level: 0.38,
        warmth: 0.4,
        drive: 0.01,
        tape: 0.0002,
        crystal: 0.15,
        prism: 0.1,
        crackle: 0.03,
        texture: 0.0,
        melody_gain: 0.6,
        pad_gain: 0.6,
        drone_gain: 1.0,
        strike_gain: 1.0,
        chords: OVERTONE_CHORDS,
        patterns: &[&[0, 4, 7], &[0, 2, 4, 6], &[7, 4, 0], &[0, 4, 2, 6]],
        melody_octave: 2,
        pad_octave: 0,
        chord_interval_s: (50.0, 75.0),
        reverse_prob: 0.25,
        skip_prob: 0.2,
        tone: ToneShape {
            attack_s: (1.0, 3.0),
            sustain_s: (4.0, 10.0),
            release_s: (4.0, 8.0),
            peak: 0.02,
            tri_mix: 0.0,
            octave_partial: 0.2,
            drift_cents: 4.0,
        },
        melody_interval_s: (6.0, 14.0),
        rest_prob: 0.2,
        octave_drop_prob: 0.2,
        pair_prob: 0.3,
        strike_probability: 0.9,
        strike_interval_s: (15.0, 45.0),
        bowl_share: 1.0,
        grit_prob: 0.0,
    },
    WorldProfile {
        world: World::Grain,
        label: "grain",
        brightness: 0.83,
        reverb_wet: 0.48,
        reverb_decay_s: 4.0,
        pre_delay_s: 0.015,
        wet_tone_hz: 3500.0,
        wet_highpass_hz: 300.0,
        shimmer_db: -0.5,
        bloom_time_s: 0.3,
        bloom_feedback: 0.1,
        bloom_mix: 0.04,
        delay_time_s: 0.2,
        delay_feedback: 0.15,
        master_level: 0.36,
        warmth: 0.8,
        drive: 0.4,
        tape: 0.003,
        crystal: 0.4,
        prism: 0.3,
        crackle: 0.8,
        texture: 1.0,
        melody_gain: 0.7,
        pad_gain: 0.4,
        drone_gain: 0.5,
        strike_gain: 0.9,
        chords: GRAIN_CHORDS,
        patterns: &[&[0, 1, 3], &[3, 2, 0, 4], &[0, 4, 1, 3], &[2, 0, 3]],
        melody_octave: 2,
        pad_octave: 0,
        chord_interval_s: (35.0, 60.0),
        reverse_prob: 0.3,
        skip_prob: 0.3,
        tone: ToneShape {
            attack_s: (0.05, 0.3),
            sustain_s: (0.5, 2.0),
            release_s: (1.0, 3.0),
            peak: 0.02,
            tri_mix: 0.5,
            octave_partial: 0.05,
            drift_cents: 12.0,
        },
        melody_interval_s: (1.5, 4.0),
        rest_prob: 0.35,
        octave_drop_prob: 0.1,
        pair_prob: 0.05,
        strike_probability: 0.8,
        strike_interval_s: (1.5, 4.0),
        bowl_share: 0.0,
        grit_prob: 0.12,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_world() {
        for w in World::ALL {
            assert_eq!(w.profile().world, w);
            assert!(!w.profile().chords.is_empty());
            assert!(!w.profile().patterns.is_empty());
        }
    }

    #[test]
    fn weights_sum_to_one_everywhere() {
        for i in 0..=10 {
            for j in 0..=10 {
                let w = QuadrantWeights::from_point(ControlPoint::new(i as f32 / 10.0, j as f32 / 10.0));
                let sum: f32 = World::ALL.iter().map(|k| w.get(*k)).sum();
                assert!((sum - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn corners_belong_to_their_world() {
        let at = |x, y| QuadrantWeights::from_point(ControlPoint::new(x, y)).dominant();
        assert_eq!(at(0.0, 0.0), World::Space);
        assert_eq!(at(0.0, 1.0), World::Pulse);
        assert_eq!(at(1.0, 1.0), World::Overtone);
        assert_eq!(at(1.0, 0.0), World::Grain);
        assert_eq!(at(0.3, 0.35), World::Space);
    }

    #[test]
    fn control_point_clamps_and_rejects_nan() {
        assert_eq!(ControlPoint::new(-3.0, 7.0), ControlPoint { x: 0.0, y: 1.0 });
        assert_eq!(ControlPoint::new(f32::NAN, f32::NAN), ControlPoint::CENTRE);
        assert_eq!(ControlPoint::new(f32::NAN, 0.2), ControlPoint { x: 0.5, y: 0.2 });
        assert_eq!(ControlPoint::new(f32::INFINITY, f32::NEG_INFINITY), ControlPoint { x: 1.0, y: 0.0 });
    }

    #[test]
    fn blend_at_corner_is_that_world() {
        let w = QuadrantWeights::from_point(ControlPoint::new(1.0, 1.0));
        assert!((w.blend(|p| p.reverb_wet) - 0.80).abs() < 1e-6);
    }

    #[test]
    fn every_pattern_fits_the_degree_range() {
        for w in World::ALL {
            for p in w.profile().patterns {
                assert!(p.iter().all(|d| *d <= crate::harmony::MAX_DEGREE));
            }
        }
    }
}
