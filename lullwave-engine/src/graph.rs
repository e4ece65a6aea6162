//! Realtime synthesis graph core.
//!
//! This module defines the minimal `Generator` trait and a lightweight `Engine<G>`
//! wrapper that owns a generator, tracks sample rate and time, and produces
//! **mono** samples, fanned out to however many channels the host wants.
//!
//! Design goals
//! - No dynamic allocations in the audio thread (the fan-out scratch is sized up front)
//! - SR changes handled lazily (if the host reconfigures), with cheap branching
//! - Generic over the generator type, no trait objects

use lullwave_core::dsp::apply_gain;

/// Largest block rendered in one go; longer requests are chunked.
pub const MAX_BLOCK: usize = 1024;

/// Anything that can generate mono audio.
pub trait Generator {
    /// Called when the engine is (re)initialized or when the sample rate changes.
    fn reset(&mut self, sr: f32);

    /// Generate the next mono sample.
    fn next(&mut self) -> f32;

    /// Fill `out` with consecutive samples. Override when block processing is cheaper.
    fn render(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            *s = self.next();
        }
    }
}

/// Realtime engine that owns a generator.
pub struct Engine<G: Generator> {
    sr: f32,
    t: f64,
    gain: f32,
    gen: G,
    scratch: Vec<f32>,
}

impl<G: Generator> Engine<G> {
    /// Wrap `gen`, telling it the sample rate up front.
    pub fn new(mut gen: G, sr: f32) -> Self {
        let sr = sr.max(1.0);
        gen.reset(sr);
        Self { sr, t: 0.0, gain: 1.0, gen, scratch: vec![0.0; MAX_BLOCK] }
    }

    #[inline]
    fn follow_rate(&mut self, sr: f32) {
        if sr != self.sr && sr > 0.0 {
            tracing::warn!(from = self.sr, to = sr, "sample rate changed, resetting generator");
            self.sr = sr;
            self.gen.reset(sr);
        }
    }

    /// Produce **one** mono sample at the given sample rate.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        self.follow_rate(sr);
        self.t += 1.0 / f64::from(self.sr);
        self.gen.next() * self.gain
    }

    /// Render `out.len() / channels` frames into an interleaved buffer,
    /// duplicating the mono signal to every channel.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize, sr: f32) {
        let channels = channels.max(1);
        self.follow_rate(sr);
        for frames in out.chunks_mut(MAX_BLOCK * channels) {
            let n = frames.len() / channels;
            let block = &mut self.scratch[..n];
            self.gen.render(block);
            apply_gain(block, self.gain);
            for (frame, s) in frames.chunks_mut(channels).zip(block.iter()) {
                frame.fill(*s);
            }
            self.t += n as f64 / f64::from(self.sr);
        }
    }

    /// Output gain applied after the generator (clamped to >= 0, non-finite ignored).
    pub fn set_gain(&mut self, gain: f32) {
        if gain.is_finite() {
            self.gain = gain.max(0.0);
        }
    }

    /// Return the engine’s current sample rate.
    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }

    /// Elapsed rendered time in seconds.
    #[inline] pub fn time(&self) -> f64 { self.t }

    #[inline] pub fn generator(&self) -> &G { &self.gen }

    /// Mutable access for live control.
    #[inline] pub fn generator_mut(&mut self) -> &mut G { &mut self.gen }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp {
        v: f32,
        resets: u32,
    }

    impl Generator for Ramp {
        fn reset(&mut self, _sr: f32) {
            self.resets += 1;
            self.v = 0.0;
        }
        fn next(&mut self) -> f32 {
            self.v += 1.0;
            self.v
        }
    }

    #[test]
    fn interleaved_duplicates_channels_and_chunks() {
        let mut e = Engine::new(Ramp { v: 0.0, resets: 0 }, 100.0);
        let mut out = vec![0.0; (MAX_BLOCK + 3) * 2];
        e.render_interleaved(&mut out, 2, 100.0);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 1.0);
        let last = out.len() - 1;
        assert_eq!(out[last], (MAX_BLOCK + 3) as f32);
        assert!((e.time() - (MAX_BLOCK + 3) as f64 / 100.0).abs() < 1e-9);
    }

    #[test]
    fn rate_change_resets_once() {
        let mut e = Engine::new(Ramp { v: 0.0, resets: 0 }, 48_000.0);
        e.next(48_000.0);
        e.next(44_100.0);
        e.next(44_100.0);
        assert_eq!(e.generator().resets, 2);
        assert_eq!(e.sample_rate(), 44_100.0);
    }

    #[test]
    fn gain_scales_output() {
        let mut e = Engine::new(Ramp { v: 0.0, resets: 0 }, 10.0);
        e.set_gain(0.5);
        e.set_gain(f32::NAN);
        assert_eq!(e.next(10.0), 0.5);
    }
}
