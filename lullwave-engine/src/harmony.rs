//! Chords, scale degrees and the mutating arpeggio pattern.

use rand::Rng;
use lullwave_core::dsp::octave_ratio;

/// Highest scale degree a pattern may reach after drift (two octaves and a bit).
pub const MAX_DEGREE: u8 = 14;

/// One harmonic state: a root, a one-octave scale (ratios in `[1, 2)`), the
/// voiced pad ratios and the drone ratio, all relative to the root.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Chord {
    pub name: &'static str,
    pub root_hz: f32,
    pub scale: &'static [f32],
    pub pad: &'static [f32],
    pub drone: f32,
}

impl Chord {
    /// Frequency of scale `degree` (wrapping into higher octaves), shifted by
    /// `octave` whole octaves.
    pub fn degree_hz(&self, degree: u8, octave: i32) -> f32 {
        let n = self.scale.len().max(1);
        let d = usize::from(degree);
        let ratio = self.scale.get(d % n).copied().unwrap_or(1.0);
        self.root_hz * ratio * octave_ratio((d / n) as i32 + octave)
    }

    /// Pad voicing, lifted by `octave` octaves.
    pub fn pad_hz(&self, octave: i32) -> impl Iterator<Item = f32> + '_ {
        let lift = octave_ratio(octave);
        self.pad.iter().map(move |r| self.root_hz * r * lift)
    }

    pub fn drone_hz(&self) -> f32 {
        self.root_hz * self.drone
    }

    /// Whether `hz` is a scale tone of this chord in any octave (within `tol_cents`).
    pub fn contains(&self, hz: f32, tol_cents: f32) -> bool {
        if !(hz > 0.0) {
            return false;
        }
        let tol = tol_cents / 1200.0;
        self.scale.iter().any(|r| {
            let octaves = (hz / (self.root_hz * r)).log2();
            (octaves - octaves.round()).abs() <= tol
        })
    }
}

/// Where the harmony scheduler is in the active palette.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChordCursor {
    pub index: usize,
    forward: bool,
}

impl Default for ChordCursor {
    fn default() -> Self {
        Self { index: 0, forward: true }
    }
}

impl ChordCursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move through a palette of `len` chords. `reverse_prob` flips direction
    /// first; `skip_prob` makes the step two instead of one.
    pub fn advance<R: Rng + ?Sized>(&mut self, len: usize, reverse_prob: f32, skip_prob: f32, rng: &mut R) {
        if len <= 1 {
            self.index = 0;
            return;
        }
        if rng.gen::<f32>() < reverse_prob {
            self.forward = !self.forward;
        }
        let step = if rng.gen::<f32>() < skip_prob { 2 } else { 1 };
        self.index = if self.forward {
            (self.index + step) % len
        } else {
            (self.index + len * 2 - step) % len
        };
    }
}

/// Arpeggio pattern: scale degrees played in order, drifting by occasional
/// mutation and replaced outright after too many mutations.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    steps: Vec<u8>,
    cursor: usize,
    steps_since_mutation: u32,
    mutate_after: u32,
    mutations: u32,
}

/// What happened to the pattern on the last [`Pattern::advance`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PatternChange {
    None,
    Reversed,
    Rotated,
    Transposed,
    Replaced,
}

impl Pattern {
    /// Mutations allowed before the pattern is replaced.
    pub const MAX_MUTATIONS: u32 = 3;

    pub fn new<R: Rng + ?Sized>(steps: &[u8], rng: &mut R) -> Self {
        let mut steps: Vec<u8> = steps.iter().map(|d| (*d).min(MAX_DEGREE)).collect();
        if steps.is_empty() {
            steps.push(0);
        }
        Self { steps, cursor: 0, steps_since_mutation: 0, mutate_after: rng.gen_range(16..=32), mutations: 0 }
    }

    /// Pick one of `library` at random.
    pub fn pick<R: Rng + ?Sized>(library: &[&[u8]], rng: &mut R) -> Self {
        let idx = if library.is_empty() { 0 } else { rng.gen_range(0..library.len()) };
        Self::new(library.get(idx).copied().unwrap_or(&[0]), rng)
    }

    pub fn current(&self) -> u8 {
        self.steps[self.cursor % self.steps.len()]
    }

    pub fn steps(&self) -> &[u8] {
        &self.steps
    }

    pub fn mutations(&self) -> u32 {
        self.mutations
    }

    /// Restart from the first step (after a chord change).
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Step the cursor; every 16–32 steps mutate, and once more than
    /// [`Self::MAX_MUTATIONS`] have accumulated, swap in a fresh pattern from `library`.
    pub fn advance<R: Rng + ?Sized>(&mut self, library: &[&[u8]], rng: &mut R) -> PatternChange {
        self.cursor = (self.cursor + 1) % self.steps.len();
        self.steps_since_mutation += 1;
        if self.steps_since_mutation < self.mutate_after {
            return PatternChange::None;
        }
        self.steps_since_mutation = 0;
        self.mutate_after = rng.gen_range(16..=32);
        if self.mutations >= Self::MAX_MUTATIONS {
            *self = Self::pick(library, rng);
            return PatternChange::Replaced;
        }
        self.mutations += 1;
        let r = rng.gen::<f32>();
        if r < 0.4 {
            self.steps.reverse();
            PatternChange::Reversed
        } else if r < 0.7 {
            self.steps.rotate_left(1);
            PatternChange::Rotated
        } else {
            let up = self.steps.iter().all(|d| *d + 2 <= MAX_DEGREE);
            for d in &mut self.steps {
                *d = if up { *d + 2 } else { d.saturating_sub(2) };
            }
            PatternChange::Transposed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const PENT: &[f32] = &[1.0, 9.0 / 8.0, 5.0 / 4.0, 3.0 / 2.0, 5.0 / 3.0];
    const CHORD: Chord = Chord { name: "D", root_hz: 146.83, scale: PENT, pad: &[2.0, 3.0], drone: 1.0 };

    #[test]
    fn degrees_wrap_into_octaves() {
        assert!((CHORD.degree_hz(0, 0) - 146.83).abs() < 1e-3);
        assert!((CHORD.degree_hz(5, 0) - 293.66).abs() < 1e-3);
        assert!((CHORD.degree_hz(3, 1) - 146.83 * 3.0).abs() < 1e-2);
        assert!((CHORD.degree_hz(1, -1) - 146.83 * 9.0 / 16.0).abs() < 1e-3);
    }

    #[test]
    fn membership_allows_octaves_only() {
        assert!(CHORD.contains(CHORD.degree_hz(7, 2), 1.0));
        assert!(CHORD.contains(440.5, 5.0));
        assert!(!CHORD.contains(311.13, 5.0)); // D#
        assert!(!CHORD.contains(f32::NAN, 5.0));
    }

    #[test]
    fn cursor_wraps_both_ways() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut c = ChordCursor::default();
        for _ in 0..100 {
            c.advance(4, 0.3, 0.3, &mut rng);
            assert!(c.index < 4);
        }
        c.advance(1, 0.0, 0.0, &mut rng);
        assert_eq!(c.index, 0);
    }

    #[test]
    fn pattern_drift_is_bounded_and_replaced() {
        let mut rng = StdRng::seed_from_u64(9);
        let library: &[&[u8]] = &[&[0, 2, 4, 3, 1, 0], &[12, 13, 14]];
        let mut p = Pattern::new(library[1], &mut rng);
        let mut replaced = 0;
        for _ in 0..5_000 {
            if p.advance(library, &mut rng) == PatternChange::Replaced {
                replaced += 1;
            }
            assert!(p.mutations() <= Pattern::MAX_MUTATIONS);
            assert!(p.steps().iter().all(|d| *d <= MAX_DEGREE));
            assert!(!p.steps().is_empty());
        }
        assert!(replaced > 0);
    }

    #[test]
    fn first_mutation_waits_at_least_sixteen_steps() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = Pattern::new(&[0, 1, 2, 3], &mut rng);
        for _ in 0..15 {
            assert_eq!(p.advance(&[], &mut rng), PatternChange::None);
        }
    }
}
