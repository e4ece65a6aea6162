//! Lifecycle properties on a simulated clock: idempotent start/stop, no timer
//! outlives `stop`, init failures leave a retryable composer.

use lullwave_engine::host::{AudioSubsystem, OfflineHost, StreamSpec};
use lullwave_engine::{Composer, ComposerConfig, ComposerError, InitError, Lifecycle, VoiceCategory};

const SR: f32 = 48_000.0;

fn composer(seed: u64) -> Composer {
    Composer::new(ComposerConfig { seed: Some(seed), ..ComposerConfig::default() })
}

fn initialized(seed: u64) -> Composer {
    let mut c = composer(seed);
    c.init(&mut OfflineHost::new(SR)).unwrap();
    c
}

fn admitted(c: &Composer) -> u64 {
    c.voices().map_or(0, |v| v.iter().map(|p| p.admitted()).sum())
}

fn drain(c: &Composer) -> usize {
    std::iter::from_fn(|| c.poll_event()).count()
}

/// Refuses the first `failures` opens.
struct FlakyHost {
    failures: u32,
    opens: u32,
}

impl AudioSubsystem for FlakyHost {
    fn open(&mut self) -> Result<StreamSpec, InitError> {
        self.opens += 1;
        if self.opens <= self.failures {
            Err(InitError::PermissionDenied("autoplay blocked".into()))
        } else {
            Ok(StreamSpec { sample_rate: SR, channels: 2 })
        }
    }
}

#[test]
fn stop_twice_and_stop_before_start_leave_no_timers() {
    let mut c = initialized(1);
    c.stop();
    assert_eq!(c.pending_timers(), 0);
    assert_eq!(c.lifecycle(), Lifecycle::Stopped);

    c.start();
    c.advance(5.0);
    c.stop();
    c.stop();
    assert_eq!(c.pending_timers(), 0);
    assert_eq!(c.lifecycle(), Lifecycle::Stopped);
}

#[test]
fn start_twice_keeps_one_loop_per_role() {
    let mut c = initialized(2);
    c.start();
    c.start();
    assert_eq!(c.pending_timers(), 4);
    c.advance(60.0);
    assert_eq!(c.pending_timers(), 4);
    c.start();
    assert_eq!(c.pending_timers(), 4);
}

#[test]
fn nothing_fires_after_stop() {
    let mut c = initialized(3);
    c.start();
    c.advance(20.0);
    c.stop();
    drain(&c);
    let voices_before = admitted(&c);
    let targets_before = *c.targets();

    c.set_xy(1.0, 0.0);
    for _ in 0..120 {
        c.advance(1.0);
    }
    assert_eq!(admitted(&c), voices_before);
    assert_eq!(*c.targets(), targets_before);
    assert_eq!(drain(&c), 0);
    assert_eq!(c.pending_timers(), 0);
}

#[test]
fn stop_lets_voices_finish_and_pools_empty() {
    let mut c = initialized(4);
    c.start();
    c.advance(30.0);
    assert!(c.total_voices() > 0);
    c.stop();
    c.advance(30.0);
    assert_eq!(c.total_voices(), 0);
    for cat in VoiceCategory::ALL {
        assert_eq!(c.active_voices(cat), 0, "{cat:?}");
    }
}

#[test]
fn rapid_toggle_within_one_tick_ends_silent() {
    let mut c = initialized(5);
    c.start();
    c.stop();
    c.start();
    c.stop();
    assert_eq!(c.lifecycle(), Lifecycle::Stopped);
    assert_eq!(c.pending_timers(), 0);

    let mut buf = vec![1.0f32; SR as usize];
    c.render(&mut buf);
    let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak < 1e-6, "peak {peak}");
    assert_eq!(admitted(&c), 0);
}

#[test]
fn failed_init_can_be_retried() {
    let mut c = composer(6);
    let mut host = FlakyHost { failures: 2, opens: 0 };

    for _ in 0..2 {
        let err = c.init(&mut host).unwrap_err();
        assert!(matches!(err, ComposerError::Initialization(InitError::PermissionDenied(_))));
        assert_eq!(c.lifecycle(), Lifecycle::Uninitialized);
        assert!(c.chain().is_none() && c.voices().is_none());
        c.start();
        assert_eq!(c.pending_timers(), 0);
    }

    c.init(&mut host).unwrap();
    assert!(c.is_initialized());
    c.start();
    assert!(c.is_running());
    assert_eq!(host.opens, 3);
}

#[test]
fn init_is_idempotent() {
    let mut c = initialized(7);
    let mut other = OfflineHost::new(96_000.0);
    assert_eq!(c.init(&mut other), Ok(()));
    assert_eq!(c.sample_rate(), SR);
    c.start();
    c.advance(2.0);
    assert_eq!(c.init(&mut other), Ok(()));
    assert!(c.is_running());
}

#[test]
fn invalid_rate_is_an_initialization_error() {
    let mut c = composer(8);
    let err = c.init(&mut OfflineHost::new(0.0)).unwrap_err();
    assert_eq!(err, ComposerError::Initialization(InitError::InvalidSampleRate(0.0)));
    assert!(!c.is_initialized());
}

#[test]
fn immediate_stop_silences_quickly() {
    let mut c = initialized(9);
    c.start();
    let mut buf = vec![0.0f32; SR as usize];
    for _ in 0..8 {
        c.render(&mut buf);
    }
    c.stop_immediately();
    assert_eq!(c.pending_timers(), 0);
    c.render(&mut buf);
    let tail = &buf[buf.len() / 2..];
    let peak = tail.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak < 1e-4, "tail peak {peak}");
}
