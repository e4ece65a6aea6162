//! C ABI wrapper for the Lullwave composer.
//!
//! Exposes a small set of functions to create/destroy a composer, drive its
//! lifecycle, steer it with an XY point, render interleaved f32 samples and
//! read back the energy signal, the current chord and musical events.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `LullwaveComposer` (heap-allocated; you own/delete it).
//! - Render path produces **mono** internally and duplicates to N channels.
//! - Every function tolerates a null handle (no-op / zero / error code).
//!
//! Threading
//! - The object is NOT thread-safe; call all functions from the same thread,
//!   typically the host's audio thread.

use std::os::raw::c_char;

use lullwave_engine::{
    Composer, ComposerConfig, ComposerError, Engine, EventKind, Generator, InitError, MusicalEvent, OfflineHost,
    StrikeStyle,
};

pub const LULLWAVE_OK: i32 = 0;
pub const LULLWAVE_ERR_NULL: i32 = -1;
pub const LULLWAVE_ERR_SAMPLE_RATE: i32 = -2;
pub const LULLWAVE_ERR_NO_DEVICE: i32 = -3;
pub const LULLWAVE_ERR_DEVICE_UNAVAILABLE: i32 = -4;
pub const LULLWAVE_ERR_PERMISSION: i32 = -5;
pub const LULLWAVE_ERR_FORMAT: i32 = -6;
pub const LULLWAVE_ERR_DUPLICATE_CHAIN: i32 = -7;

pub const LULLWAVE_EVENT_NOTE_ON: u32 = 1;
pub const LULLWAVE_EVENT_CHORD_CHANGE: u32 = 2;
pub const LULLWAVE_EVENT_STRIKE: u32 = 3;
pub const LULLWAVE_EVENT_WORLD_CHANGE: u32 = 4;

/// Opaque composer wrapper we hand to C.
///
/// The sample rate lives here so the render call does not need it; call
/// `lullwave_reset` when the host reconfigures.
pub struct LullwaveComposer {
    sr: f32,
    inner: Engine<Composer>,
}

impl LullwaveComposer {
    fn new(sr: f32, seed: u64) -> Self {
        let sr = if sr.is_finite() { sr.max(1.0) } else { 48_000.0 };
        let config = ComposerConfig { seed: (seed != 0).then_some(seed), ..ComposerConfig::default() };
        Self { sr, inner: Engine::new(Composer::new(config), sr) }
    }

    fn composer(&mut self) -> &mut Composer {
        self.inner.generator_mut()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LullwaveEnergy {
    pub overall: f32,
    pub drone: f32,
    pub motif: f32,
    pub texture: f32,
}

/// Flattened musical event. Unused fields are zero (`index`, `world`,
/// `style` are -1 when not applicable).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LullwaveEvent {
    pub time: f64,
    pub kind: u32,
    pub freq: f32,
    pub degree: i32,
    pub index: i32,
    pub world: i32,
    pub style: i32,
}

impl From<MusicalEvent> for LullwaveEvent {
    fn from(e: MusicalEvent) -> Self {
        let mut out = LullwaveEvent { time: e.time, kind: 0, freq: 0.0, degree: -1, index: -1, world: -1, style: -1 };
        match e.kind {
            EventKind::NoteOn { freq, degree } => {
                out.kind = LULLWAVE_EVENT_NOTE_ON;
                out.freq = freq;
                out.degree = i32::from(degree);
            }
            EventKind::ChordChange { index, world, .. } => {
                out.kind = LULLWAVE_EVENT_CHORD_CHANGE;
                out.index = index as i32;
                out.world = world.index() as i32;
            }
            EventKind::Strike { freq, style } => {
                out.kind = LULLWAVE_EVENT_STRIKE;
                out.freq = freq;
                out.style = match style {
                    StrikeStyle::Bowl => 0,
                    StrikeStyle::Pop => 1,
                    StrikeStyle::Grit => 2,
                };
            }
            EventKind::WorldChange { world } => {
                out.kind = LULLWAVE_EVENT_WORLD_CHANGE;
                out.world = world.index() as i32;
            }
        }
        out
    }
}

fn error_code(err: &ComposerError) -> i32 {
    match err {
        ComposerError::Initialization(InitError::InvalidSampleRate(_)) => LULLWAVE_ERR_SAMPLE_RATE,
        ComposerError::Initialization(InitError::NoOutputDevice) => LULLWAVE_ERR_NO_DEVICE,
        ComposerError::Initialization(InitError::DeviceUnavailable(_)) => LULLWAVE_ERR_DEVICE_UNAVAILABLE,
        ComposerError::Initialization(InitError::PermissionDenied(_)) => LULLWAVE_ERR_PERMISSION,
        ComposerError::Initialization(InitError::UnsupportedFormat(_)) => LULLWAVE_ERR_FORMAT,
        ComposerError::DuplicateChain => LULLWAVE_ERR_DUPLICATE_CHAIN,
    }
}

#[inline]
fn handle<'a>(p: *mut LullwaveComposer) -> Option<&'a mut LullwaveComposer> {
    // SAFETY: the caller passes a pointer from `lullwave_create` (or null).
    unsafe { p.as_mut() }
}

// --- Creation / destruction -------------------------------------------------------

/// Create a composer for `sample_rate`. `seed == 0` seeds from entropy.
#[no_mangle]
pub extern "C" fn lullwave_create(sample_rate: f32, seed: u64) -> *mut LullwaveComposer {
    Box::into_raw(Box::new(LullwaveComposer::new(sample_rate, seed)))
}

/// Destroy a composer previously returned by `lullwave_create`.
#[no_mangle]
pub extern "C" fn lullwave_destroy(composer: *mut LullwaveComposer) {
    if !composer.is_null() {
        unsafe {
            drop(Box::from_raw(composer));
        }
    }
}

/// Build the session. The host owns the audio device, so this only validates
/// the sample rate. Idempotent. Returns `LULLWAVE_OK` or a negative error code;
/// after an error it is safe to call again.
#[no_mangle]
pub extern "C" fn lullwave_init(composer: *mut LullwaveComposer) -> i32 {
    let Some(c) = handle(composer) else { return LULLWAVE_ERR_NULL };
    let mut host = OfflineHost::new(c.sr);
    match c.composer().init(&mut host) {
        Ok(()) => LULLWAVE_OK,
        Err(err) => error_code(&err),
    }
}

/// Reset to a new sample rate (e.g. when the host changes device config).
#[no_mangle]
pub extern "C" fn lullwave_reset(composer: *mut LullwaveComposer, sample_rate: f32) {
    let Some(c) = handle(composer) else { return };
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        tracing::warn!(sample_rate, "ignoring invalid sample rate");
        return;
    }
    c.sr = sample_rate;
    c.composer().reset(sample_rate);
}

// --- Lifecycle -------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn lullwave_start(composer: *mut LullwaveComposer) {
    if let Some(c) = handle(composer) {
        c.composer().start();
    }
}

/// Fade out and cancel every scheduler. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn lullwave_stop(composer: *mut LullwaveComposer) {
    if let Some(c) = handle(composer) {
        c.composer().stop();
    }
}

/// Like `lullwave_stop`, with a very short fade on every voice.
#[no_mangle]
pub extern "C" fn lullwave_stop_immediately(composer: *mut LullwaveComposer) {
    if let Some(c) = handle(composer) {
        c.composer().stop_immediately();
    }
}

/// 1 while running, 0 otherwise.
#[no_mangle]
pub extern "C" fn lullwave_is_running(composer: *mut LullwaveComposer) -> i32 {
    handle(composer).map_or(0, |c| i32::from(c.composer().is_running()))
}

// --- Steering --------------------------------------------------------------------

/// Set the steering point. Values outside [0, 1] are clamped.
#[no_mangle]
pub extern "C" fn lullwave_set_xy(composer: *mut LullwaveComposer, x: f32, y: f32) {
    if let Some(c) = handle(composer) {
        c.composer().set_xy(x, y);
    }
}

/// Jump to a random point; writes it to `out_x` / `out_y` when non-null.
#[no_mangle]
pub extern "C" fn lullwave_randomize(composer: *mut LullwaveComposer, out_x: *mut f32, out_y: *mut f32) {
    let Some(c) = handle(composer) else { return };
    let p = c.composer().randomize_point();
    unsafe {
        if let Some(x) = out_x.as_mut() {
            *x = p.x;
        }
        if let Some(y) = out_y.as_mut() {
            *y = p.y;
        }
    }
}

/// Output gain applied after the composer. Non-finite values are ignored.
#[no_mangle]
pub extern "C" fn lullwave_set_gain(composer: *mut LullwaveComposer, gain: f32) {
    if let Some(c) = handle(composer) {
        c.inner.set_gain(gain);
    }
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of audio into an interleaved f32 buffer with `channels` channels.
/// The composer is mono; the sample is duplicated to all channels.
///
/// Returns the number of frames rendered (0 on error).
#[no_mangle]
pub extern "C" fn lullwave_render_interleaved_f32(
    composer: *mut LullwaveComposer,
    out_interleaved: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    let Some(c) = handle(composer) else { return 0 };
    if out_interleaved.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let ch = channels as usize;
    let out = unsafe { std::slice::from_raw_parts_mut(out_interleaved, frames as usize * ch) };
    let sr = c.sr;
    c.inner.render_interleaved(out, ch, sr);
    frames
}

// --- Observers -------------------------------------------------------------------

/// Copy the energy scalars into `out`. Returns 0 on success.
#[no_mangle]
pub extern "C" fn lullwave_energy(composer: *mut LullwaveComposer, out: *mut LullwaveEnergy) -> i32 {
    let Some(c) = handle(composer) else { return LULLWAVE_ERR_NULL };
    let Some(out) = (unsafe { out.as_mut() }) else { return LULLWAVE_ERR_NULL };
    let e = c.composer().energy();
    *out = LullwaveEnergy { overall: e.overall, drone: e.drone, motif: e.motif, texture: e.texture };
    LULLWAVE_OK
}

/// Palette index of the active chord, or -1 for a null handle.
#[no_mangle]
pub extern "C" fn lullwave_chord_index(composer: *mut LullwaveComposer) -> i32 {
    handle(composer).map_or(-1, |c| c.composer().snapshot().chord_index as i32)
}

/// Copy the active chord's name (NUL-terminated, truncated to fit) into `buf`.
/// Returns the full name length in bytes, excluding the terminator.
#[no_mangle]
pub extern "C" fn lullwave_chord_name(composer: *mut LullwaveComposer, buf: *mut c_char, len: usize) -> usize {
    let Some(c) = handle(composer) else { return 0 };
    let name = c.composer().snapshot().chord_name.as_bytes();
    if !buf.is_null() && len > 0 {
        let n = name.len().min(len - 1);
        let dst = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), len) };
        dst[..n].copy_from_slice(&name[..n]);
        dst[n] = 0;
    }
    name.len()
}

/// Dominant world index (0 space, 1 pulse, 2 overtone, 3 grain), or -1.
#[no_mangle]
pub extern "C" fn lullwave_world(composer: *mut LullwaveComposer) -> i32 {
    handle(composer).map_or(-1, |c| c.composer().dominant_world().index() as i32)
}

/// Pop the oldest musical event into `out`. Returns 1 if an event was written,
/// 0 if the queue is empty, negative on a null argument.
#[no_mangle]
pub extern "C" fn lullwave_poll_event(composer: *mut LullwaveComposer, out: *mut LullwaveEvent) -> i32 {
    let Some(c) = handle(composer) else { return LULLWAVE_ERR_NULL };
    let Some(out) = (unsafe { out.as_mut() }) else { return LULLWAVE_ERR_NULL };
    match c.composer().poll_event() {
        Some(e) => {
            *out = e.into();
            1
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    struct Handle(*mut LullwaveComposer);

    impl Drop for Handle {
        fn drop(&mut self) {
            lullwave_destroy(self.0);
        }
    }

    fn running() -> Handle {
        let h = Handle(lullwave_create(SR, 99));
        assert_eq!(lullwave_init(h.0), LULLWAVE_OK);
        lullwave_start(h.0);
        h
    }

    #[test]
    fn null_handles_are_tolerated() {
        let null = std::ptr::null_mut();
        assert_eq!(lullwave_init(null), LULLWAVE_ERR_NULL);
        lullwave_start(null);
        lullwave_stop(null);
        lullwave_set_xy(null, 0.5, 0.5);
        let mut buf = [0.0f32; 8];
        assert_eq!(lullwave_render_interleaved_f32(null, buf.as_mut_ptr(), 4, 2), 0);
        assert_eq!(lullwave_chord_index(null), -1);
        lullwave_destroy(null);
    }

    #[test]
    fn invalid_rate_reports_and_allows_retry() {
        let h = Handle(lullwave_create(0.5, 1));
        assert_eq!(lullwave_init(h.0), LULLWAVE_ERR_SAMPLE_RATE);
        lullwave_reset(h.0, SR);
        assert_eq!(lullwave_init(h.0), LULLWAVE_OK);
        assert_eq!(lullwave_init(h.0), LULLWAVE_OK);
    }

    #[test]
    fn render_and_read_back_state() {
        let h = running();
        assert_eq!(lullwave_is_running(h.0), 1);
        let mut buf = vec![0.0f32; 4800 * 2];
        for _ in 0..50 {
            assert_eq!(lullwave_render_interleaved_f32(h.0, buf.as_mut_ptr(), 4800, 2), 4800);
        }
        assert!(buf.iter().all(|s| s.is_finite()));

        let mut energy = LullwaveEnergy::default();
        assert_eq!(lullwave_energy(h.0, &mut energy), LULLWAVE_OK);
        assert!(energy.drone > 0.0);

        let mut name = [0 as c_char; 32];
        let n = lullwave_chord_name(h.0, name.as_mut_ptr(), name.len());
        assert!(n > 0 && n < 32);
        assert_eq!(name[n], 0);
        assert!(lullwave_chord_index(h.0) >= 0);

        let mut ev = LullwaveEvent::from(MusicalEvent { time: 0.0, kind: EventKind::WorldChange { world: lullwave_engine::World::Grain } });
        let mut chords = 0;
        while lullwave_poll_event(h.0, &mut ev) == 1 {
            if ev.kind == LULLWAVE_EVENT_CHORD_CHANGE {
                chords += 1;
                assert!(ev.index >= 0 && ev.world >= 0);
            }
        }
        assert!(chords >= 1);
    }

    #[test]
    fn chord_name_truncates() {
        let h = running();
        let mut buf = vec![0.0f32; 48_000];
        lullwave_render_interleaved_f32(h.0, buf.as_mut_ptr(), 48_000, 1);
        lullwave_render_interleaved_f32(h.0, buf.as_mut_ptr(), 48_000, 1);
        let mut tiny = [0x7f as c_char; 3];
        let full = lullwave_chord_name(h.0, tiny.as_mut_ptr(), tiny.len());
        assert!(full >= 2);
        assert_eq!(tiny[2], 0);
    }

    #[test]
    fn stop_is_idempotent_over_the_abi() {
        let h = running();
        lullwave_stop(h.0);
        lullwave_stop(h.0);
        assert_eq!(lullwave_is_running(h.0), 0);
        let (mut x, mut y) = (-1.0f32, -1.0f32);
        lullwave_randomize(h.0, &mut x, &mut y);
        assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));
    }
}
