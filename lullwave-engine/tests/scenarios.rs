//! Musical scenarios driven by the simulated clock.

use lullwave_engine::mapping::limits;
use lullwave_engine::{Composer, ComposerConfig, EventKind, MusicalEvent, OfflineHost, World};

const SR: f32 = 48_000.0;

fn running(config: ComposerConfig) -> Composer {
    let mut c = Composer::new(config);
    c.init(&mut OfflineHost::new(SR)).unwrap();
    c.start();
    c
}

fn seeded(seed: u64) -> ComposerConfig {
    ComposerConfig { seed: Some(seed), ..ComposerConfig::default() }
}

fn drain(c: &Composer) -> Vec<MusicalEvent> {
    std::iter::from_fn(|| c.poll_event()).collect()
}

#[test]
fn cold_start_opens_with_the_palette_head() {
    for seed in 0..8 {
        let mut c = running(seeded(seed));
        assert_eq!(c.dominant_world(), World::Space);
        c.advance(10.0);
        let first_chord = drain(&c).into_iter().find_map(|e| match e.kind {
            EventKind::ChordChange { name, index, world } => Some((name, index, world)),
            _ => None,
        });
        let (name, index, world) = first_chord.expect("no chord change within 10 s");
        assert_eq!(world, World::Space);
        assert_eq!(index, 0);
        assert_eq!(name, World::Space.profile().chords[0].name);
        assert_eq!(c.snapshot().chord_name, name);
    }
}

#[test]
fn holding_the_far_corner_reaches_its_targets() {
    let mut c = running(seeded(21));
    c.set_xy(1.0, 1.0);
    for _ in 0..(30 * 60) {
        c.advance(1.0 / 60.0);
        for (name, value, range) in c.targets().entries() {
            assert!(range.contains(value), "{name} = {value} outside {range:?}");
        }
    }

    let p = World::Overtone.profile();
    let t = c.targets();
    assert!((t.reverb_wet - limits::REVERB_WET.clamp(p.reverb_wet)).abs() < 1e-3);
    assert!((t.strike_probability - limits::STRIKE_PROBABILITY.clamp(p.strike_probability)).abs() < 1e-3);
    assert_eq!(c.dominant_world(), World::Overtone);

    let chain = c.chain().unwrap();
    assert!((chain.reverb_wet() - t.reverb_wet).abs() < 1e-3);
    assert!(chain.max_loop_gain() < 1.0);
}

#[test]
fn corners_and_centre_stay_in_range() {
    for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0), (0.5, 0.5)] {
        let mut c = running(seeded(3));
        c.set_xy(x, y);
        c.advance(10.0);
        for (name, value, range) in c.targets().entries() {
            assert!(range.contains(value), "({x},{y}) {name} = {value}");
        }
        assert!(c.targets().reverb_wet < 1.0 && c.targets().delay_feedback < 1.0);
    }
}

#[test]
fn melody_stays_inside_the_active_chord() {
    let mut c = running(seeded(42));
    let path = [(0.3, 0.35), (0.1, 0.9), (0.9, 0.9), (0.9, 0.1), (0.5, 0.5)];
    let mut chord = None;
    let mut notes = 0;
    for (x, y) in path {
        c.set_xy(x, y);
        for _ in 0..60 {
            c.advance(1.0);
            for e in drain(&c) {
                match e.kind {
                    EventKind::ChordChange { index, world, .. } => chord = Some(world.profile().chords[index]),
                    EventKind::NoteOn { freq, .. } => {
                        let active = chord.expect("melody before any chord");
                        assert!(active.contains(freq, 1.0), "{freq} Hz not in {}", active.name);
                        notes += 1;
                    }
                    _ => {}
                }
            }
        }
    }
    assert!(notes > 20, "only {notes} notes");
}

#[test]
fn world_changes_are_announced() {
    let mut c = running(seeded(8));
    c.advance(2.0);
    drain(&c);
    c.set_xy(0.05, 0.95);
    c.advance(1.0);
    let worlds: Vec<World> = drain(&c)
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::WorldChange { world } => Some(world),
            _ => None,
        })
        .collect();
    assert_eq!(worlds, vec![World::Pulse]);
}

#[test]
fn energy_rises_with_activity_and_decays_after_stop() {
    let mut c = running(seeded(13));
    c.advance(20.0);
    let busy = c.energy();
    assert!(busy.drone > 0.0 && busy.overall > 0.0);
    c.stop();
    c.advance(10.0);
    let quiet = c.energy();
    assert!(quiet.overall < 0.01 && quiet.drone < 0.01 && quiet.motif < 0.01);
}

#[test]
fn an_unread_event_queue_drops_instead_of_blocking() {
    let mut c = running(ComposerConfig { event_capacity: 4, ..seeded(5) });
    c.set_xy(0.1, 0.9);
    c.advance(120.0);
    assert!(c.dropped_events() > 0);
    assert!(c.last_event().is_some());
    assert_eq!(drain(&c).len(), 4);
}

#[test]
fn same_seed_same_music() {
    let run = |seed| {
        let mut c = running(seeded(seed));
        c.set_xy(0.7, 0.4);
        c.advance(45.0);
        drain(&c)
    };
    assert_eq!(run(77), run(77));
}

#[test]
fn subscribers_see_the_same_stream() {
    let mut c = running(seeded(31));
    let rx = c.subscribe();
    c.advance(15.0);
    let seen: Vec<MusicalEvent> = rx.try_iter().collect();
    assert!(!seen.is_empty());
    assert!(c.poll_event().is_none());
    assert_eq!(c.last_event(), seen.last().copied());
}
