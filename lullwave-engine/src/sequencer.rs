//! What each scheduler role does when its timer fires.
//!
//! A firing reads the current blend and targets, may trigger voices, emits
//! notifications, and returns the delay until the role should fire again.
//! With no voice pools present (before `init`, after a reset) the musical
//! state still moves and events are still emitted; only sound is skipped.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::TimingConfig;
use crate::events::{EnergyMeter, EventBus, EventKind, MusicalEvent, StrikeStyle};
use crate::harmony::{Chord, ChordCursor, Pattern, PatternChange};
use crate::mapping::ParamTargets;
use crate::pool::Voices;
use crate::voice::{NoteSpec, VoiceCategory};
use crate::world::{QuadrantWeights, World};

const PAD_PEAK: f32 = 0.05;
const DRONE_PEAK: f32 = 0.06;
const MIN_MELODY_INTERVAL_S: f64 = 0.12;
const MIN_CRACKLE_INTERVAL_S: f64 = 0.03;

/// Everything a firing may read or touch.
pub struct Stage<'a> {
    pub now: f64,
    pub weights: QuadrantWeights,
    pub targets: &'a ParamTargets,
    pub timing: &'a TimingConfig,
    pub voices: Option<&'a mut Voices>,
    pub events: &'a mut EventBus,
    pub energy: &'a mut EnergyMeter,
    pub rng: &'a mut StdRng,
}

impl Stage<'_> {
    fn trigger(&mut self, start: f64, spec: &NoteSpec) {
        let seed = self.rng.gen::<u32>();
        if let Some(voices) = self.voices.as_deref_mut() {
            voices.trigger(self.now, start, spec, seed);
        }
    }

    fn emit(&mut self, time: f64, kind: EventKind) {
        self.events.emit(MusicalEvent { time, kind });
    }

    fn range(&mut self, (lo, hi): (f32, f32)) -> f32 {
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}

/// Harmonic and melodic state carried between firings.
#[derive(Clone, Debug)]
pub struct Sequencer {
    world: World,
    cursor: ChordCursor,
    pattern: Pattern,
    chord_applied: bool,
}

impl Sequencer {
    pub fn new(world: World, rng: &mut StdRng) -> Self {
        Self {
            world,
            cursor: ChordCursor::default(),
            pattern: Pattern::pick(world.profile().patterns, rng),
            chord_applied: false,
        }
    }

    /// Fresh session state for `world`.
    pub fn reset(&mut self, world: World, rng: &mut StdRng) {
        *self = Self::new(world, rng);
    }

    /// World whose palette harmony is currently using.
    #[inline]
    pub fn world(&self) -> World {
        self.world
    }

    #[inline]
    pub fn chord_index(&self) -> usize {
        self.cursor.index
    }

    pub fn chord(&self) -> &'static Chord {
        let chords = self.world.profile().chords;
        &chords[self.cursor.index % chords.len()]
    }

    /// Whether harmony has fired at least once since the last reset.
    #[inline]
    pub fn chord_applied(&self) -> bool {
        self.chord_applied
    }

    #[inline]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Rotate the chord, swap pads and drone, re-aim the melody.
    pub fn fire_harmony(&mut self, st: &mut Stage<'_>) -> f64 {
        let world = st.weights.dominant();
        if world != self.world {
            tracing::debug!(from = self.world.label(), to = world.label(), "harmony follows new world");
            self.world = world;
            self.cursor.reset();
            self.chord_applied = false;
            self.pattern = Pattern::pick(world.profile().patterns, st.rng);
        }
        let profile = world.profile();
        if self.chord_applied {
            let reverse = st.weights.blend(|p| p.reverse_prob);
            let skip = st.weights.blend(|p| p.skip_prob);
            self.cursor.advance(profile.chords.len(), reverse, skip, st.rng);
        } else {
            self.chord_applied = true;
        }
        let chord = self.chord();

        let fade = st.timing.chord_crossfade_s;
        if let Some(voices) = st.voices.as_deref_mut() {
            voices.pool_mut(VoiceCategory::Pad).release_all(st.now, fade);
            voices.pool_mut(VoiceCategory::Drone).release_all(st.now, fade);
        }
        let mut freqs = [chord.root_hz; 3];
        for (slot, f) in freqs.iter_mut().zip(chord.pad_hz(profile.pad_octave)) {
            *slot = f;
        }
        st.trigger(st.now, &NoteSpec::Pad { freqs, attack_s: fade, peak: PAD_PEAK });
        st.trigger(st.now, &NoteSpec::Drone { freq: chord.drone_hz(), attack_s: fade * 1.3, peak: DRONE_PEAK });

        self.pattern.rewind();
        tracing::debug!(chord = chord.name, index = self.cursor.index, world = world.label(), "chord change");
        st.emit(st.now, EventKind::ChordChange { name: chord.name, index: self.cursor.index, world });
        st.energy.chord();

        f64::from(st.range(st.weights.blend_range(|p| p.chord_interval_s)))
    }

    /// Play the next pattern step (or rest), then step the pattern.
    pub fn fire_melody(&mut self, st: &mut Stage<'_>) -> f64 {
        let w = st.weights;
        let profile = self.world.profile();
        let chord = self.chord();

        if st.rng.gen::<f32>() >= w.blend(|p| p.rest_prob) {
            let degree = self.pattern.current();
            let drop = if st.rng.gen::<f32>() < w.blend(|p| p.octave_drop_prob) { -1 } else { 0 };
            let octave = profile.melody_octave + drop;
            let freq = chord.degree_hz(degree, octave);
            let attack_s = st.range(w.blend_range(|p| p.tone.attack_s));
            let hold_s = st.range(w.blend_range(|p| p.tone.sustain_s));
            let release_s = st.range(w.blend_range(|p| p.tone.release_s));
            let peak = w.blend(|p| p.tone.peak);
            let tone = |freq: f32, peak: f32| NoteSpec::Tone {
                freq,
                attack_s,
                hold_s,
                release_s,
                peak,
                tri_mix: w.blend(|p| p.tone.tri_mix),
                octave_partial: w.blend(|p| p.tone.octave_partial),
                drift_cents: w.blend(|p| p.tone.drift_cents),
            };
            st.trigger(st.now, &tone(freq, peak));
            st.emit(st.now, EventKind::NoteOn { freq, degree });
            st.energy.note();

            if st.rng.gen::<f32>() < w.blend(|p| p.pair_prob) {
                let pair_degree = degree.saturating_add(2);
                let pair_freq = chord.degree_hz(pair_degree, octave);
                let at = st.now + f64::from(st.rng.gen_range(0.15f32..=0.6));
                st.trigger(at, &tone(pair_freq, peak * 0.7));
                st.emit(at, EventKind::NoteOn { freq: pair_freq, degree: pair_degree });
            }
        } else {
            tracing::trace!("melody rest");
        }

        match self.pattern.advance(profile.patterns, st.rng) {
            PatternChange::None => {}
            change => tracing::debug!(?change, mutations = self.pattern.mutations(), "pattern mutated"),
        }

        let base = st.range(w.blend_range(|p| p.melody_interval_s));
        let jitter = st.rng.gen_range(0.2f32..=0.5);
        let sign = if st.rng.gen::<bool>() { 1.0 } else { -1.0 };
        f64::from(base * (1.0 + sign * jitter)).max(MIN_MELODY_INTERVAL_S)
    }

    /// Maybe strike a bowl or a pop cluster (plus the odd degraded tone).
    pub fn fire_strike(&mut self, st: &mut Stage<'_>) -> f64 {
        let w = st.weights;
        let interval = f64::from(st.range(w.blend_range(|p| p.strike_interval_s)));
        if st.rng.gen::<f32>() >= st.targets.strike_probability {
            return interval;
        }
        let chord = self.chord();
        let degree = st.rng.gen_range(0..chord.scale.len().max(1)) as u8;

        if st.rng.gen::<f32>() < w.blend(|p| p.bowl_share) {
            let freq = chord.degree_hz(degree, 1);
            let spec = NoteSpec::Bowl {
                freq,
                peak: 0.12,
                decay_s: st.rng.gen_range(4.0..=9.0),
                partials: st.rng.gen_range(6..=8),
                q: st.rng.gen_range(30.0..=60.0),
            };
            st.trigger(st.now, &spec);
            st.emit(st.now, EventKind::Strike { freq, style: StrikeStyle::Bowl });
        } else {
            let count = st.rng.gen_range(2..=6);
            let mut at = st.now;
            let first = chord.degree_hz(degree, 3);
            for i in 0..count {
                let d = st.rng.gen_range(0..chord.scale.len().max(1)) as u8;
                let freq = if i == 0 { first } else { chord.degree_hz(d, 3) };
                let spec = NoteSpec::Pop {
                    freq,
                    q: st.rng.gen_range(20.0..=40.0),
                    peak: st.rng.gen_range(0.05..=0.12),
                    decay_s: st.rng.gen_range(0.04..=0.15),
                };
                st.trigger(at, &spec);
                at += f64::from(st.rng.gen_range(0.08f32..=0.2));
            }
            st.emit(st.now, EventKind::Strike { freq: first, style: StrikeStyle::Pop });
        }

        if st.rng.gen::<f32>() < w.blend(|p| p.grit_prob) {
            let freq = chord.degree_hz(degree, 0);
            let spec = NoteSpec::Grit {
                freq,
                drive: st.rng.gen_range(40.0..=70.0),
                cutoff_hz: st.rng.gen_range(1200.0..=2600.0),
                peak: 0.05,
                dur_s: st.rng.gen_range(1.5..=4.0),
            };
            st.trigger(st.now, &spec);
            st.emit(st.now, EventKind::Strike { freq, style: StrikeStyle::Grit });
        }
        st.energy.strike();
        tracing::debug!(world = self.world.label(), "strike");
        interval
    }

    /// A burst of one or two surface clicks; density comes from the mapping.
    pub fn fire_crackle(&mut self, st: &mut Stage<'_>) -> f64 {
        let amt = st.targets.crackle_density;
        if st.rng.gen::<f32>() < 0.012 + amt * amt * 0.22 {
            let clicks = 1 + usize::from(st.rng.gen::<f32>() < amt * 0.5);
            for _ in 0..clicks {
                let r: [f32; 5] = st.rng.gen();
                let spec = NoteSpec::Click {
                    highpass_hz: 260.0 + r[0] * 2000.0,
                    lowpass_hz: 1700.0 + amt * 3000.0 + r[1] * 2500.0,
                    peak: (0.0008 + amt * 0.01) * (0.8 + r[2] * 1.8),
                    dur_s: 0.006 + r[3] * (0.024 + amt * 0.03),
                };
                st.trigger(st.now + f64::from(r[4] * 0.04), &spec);
            }
            st.energy.texture();
        }
        let jitter = st.rng.gen_range(-0.015f32..=0.015);
        f64::from(0.1 - amt * 0.06 + jitter).max(MIN_CRACKLE_INTERVAL_S)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolsConfig, TimingConfig};
    use crate::mapping::map_params;
    use crate::world::ControlPoint;
    use rand::SeedableRng;

    struct Rig {
        rng: StdRng,
        events: EventBus,
        energy: EnergyMeter,
        voices: Voices,
        timing: TimingConfig,
    }

    impl Rig {
        fn new(seed: u64) -> Self {
            Self {
                rng: StdRng::seed_from_u64(seed),
                events: EventBus::new(4096),
                energy: EnergyMeter::default(),
                voices: Voices::new(&PoolsConfig::default(), 48_000.0),
                timing: TimingConfig::default(),
            }
        }
    }

    fn at(x: f32, y: f32) -> (QuadrantWeights, ParamTargets) {
        let p = ControlPoint::new(x, y);
        let w = QuadrantWeights::from_point(p);
        (w, map_params(p, &w))
    }

    macro_rules! stage {
        ($rig:expr, $now:expr, $w:expr, $t:expr) => {
            Stage {
                now: $now,
                weights: $w,
                targets: &$t,
                timing: &$rig.timing,
                voices: Some(&mut $rig.voices),
                events: &mut $rig.events,
                energy: &mut $rig.energy,
                rng: &mut $rig.rng,
            }
        };
    }

    #[test]
    fn first_harmony_fire_plays_palette_head() {
        let mut rig = Rig::new(1);
        let (w, t) = at(0.3, 0.35);
        let mut seq = Sequencer::new(World::Space, &mut rig.rng);
        let next = seq.fire_harmony(&mut stage!(rig, 1.0, w, t));
        assert!(next >= 45.0 * 0.5);
        match rig.events.poll().map(|e| e.kind) {
            Some(EventKind::ChordChange { name, index, world }) => {
                assert_eq!((name, index, world), ("Dmaj7", 0, World::Space));
            }
            other => panic!("expected chord change, got {other:?}"),
        }
        assert_eq!(rig.voices.pool(VoiceCategory::Pad).len(), 1);
        assert_eq!(rig.voices.pool(VoiceCategory::Drone).len(), 1);
    }

    #[test]
    fn world_change_restarts_palette() {
        let mut rig = Rig::new(2);
        let (w, t) = at(0.9, 0.9);
        let mut seq = Sequencer::new(World::Space, &mut rig.rng);
        seq.fire_harmony(&mut stage!(rig, 0.0, w, t));
        assert_eq!(seq.world(), World::Overtone);
        assert_eq!(seq.chord().name, "C harmonic");
        seq.fire_harmony(&mut stage!(rig, 60.0, w, t));
        assert!(seq.chord_applied());
    }

    #[test]
    fn melody_notes_stay_in_chord() {
        for (x, y) in [(0.1, 0.1), (0.1, 0.9), (0.9, 0.9), (0.9, 0.1), (0.5, 0.5)] {
            let mut rig = Rig::new(3);
            let (w, t) = at(x, y);
            let mut seq = Sequencer::new(w.dominant(), &mut rig.rng);
            seq.fire_harmony(&mut stage!(rig, 0.0, w, t));
            let chord = *seq.chord();
            for i in 0..200 {
                let next = seq.fire_melody(&mut stage!(rig, f64::from(i), w, t));
                assert!(next >= MIN_MELODY_INTERVAL_S);
            }
            while let Some(e) = rig.events.poll() {
                if let EventKind::NoteOn { freq, .. } = e.kind {
                    assert!(chord.contains(freq, 0.5), "{freq} not in {}", chord.name);
                }
            }
            assert!(rig.voices.pool(VoiceCategory::Melody).len() <= PoolsConfig::default().melody.max_concurrent);
        }
    }

    #[test]
    fn strikes_follow_probability() {
        let mut rig = Rig::new(4);
        let (w, mut t) = at(0.1, 0.1);
        let mut seq = Sequencer::new(World::Space, &mut rig.rng);
        t.strike_probability = 0.0;
        for i in 0..100 {
            seq.fire_strike(&mut stage!(rig, f64::from(i), w, t));
        }
        assert_eq!(rig.events.sent(), 0);
        t.strike_probability = 0.95;
        for i in 0..100 {
            seq.fire_strike(&mut stage!(rig, f64::from(i), w, t));
        }
        assert!(rig.events.sent() > 70);
    }

    #[test]
    fn crackle_interval_bounds_and_texture_only() {
        let mut rig = Rig::new(5);
        let (w, t) = at(1.0, 0.0);
        let mut seq = Sequencer::new(World::Grain, &mut rig.rng);
        for i in 0..500 {
            let next = seq.fire_crackle(&mut stage!(rig, f64::from(i) * 0.05, w, t));
            assert!((MIN_CRACKLE_INTERVAL_S..=0.12).contains(&next));
        }
        assert!(rig.voices.pool(VoiceCategory::Texture).admitted() > 0);
        assert_eq!(rig.voices.pool(VoiceCategory::Melody).admitted(), 0);
        assert_eq!(rig.events.sent(), 0);
    }

    #[test]
    fn crackle_is_the_fastest_role() {
        for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)] {
            let mut rig = Rig::new(7);
            let (w, t) = at(x, y);
            let mut seq = Sequencer::new(w.dominant(), &mut rig.rng);
            let mut slowest_crackle = 0.0f64;
            let mut fastest_melody = f64::MAX;
            for i in 0..2000 {
                let now = f64::from(i) * 0.1;
                slowest_crackle = slowest_crackle.max(seq.fire_crackle(&mut stage!(rig, now, w, t)));
                fastest_melody = fastest_melody.min(seq.fire_melody(&mut stage!(rig, now, w, t)));
            }
            assert!(slowest_crackle < 0.5, "({x}, {y}) crackle every {slowest_crackle}s");
            assert!(
                slowest_crackle < fastest_melody,
                "({x}, {y}) crackle {slowest_crackle}s vs melody {fastest_melody}s"
            );
        }
    }

    #[test]
    fn firing_without_pools_is_a_quiet_no_op() {
        let mut rig = Rig::new(6);
        let (w, t) = at(0.5, 0.5);
        let mut seq = Sequencer::new(World::Space, &mut rig.rng);
        let mut st = Stage {
            now: 0.0,
            weights: w,
            targets: &t,
            timing: &rig.timing,
            voices: None,
            events: &mut rig.events,
            energy: &mut rig.energy,
            rng: &mut rig.rng,
        };
        seq.fire_harmony(&mut st);
        seq.fire_melody(&mut st);
        seq.fire_strike(&mut st);
        seq.fire_crackle(&mut st);
        assert_eq!(rig.voices.active(), 0);
    }
}
