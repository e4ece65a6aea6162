//! Heap-backed delay line with fractional (linearly interpolated) reads.
//!
//! The buffer is sized once at construction for the longest delay the owner
//! will ever ask for; reads and writes never allocate afterwards.

use alloc::{vec, vec::Vec};

use crate::dsp::kill_denormals;

#[derive(Clone, Debug)]
pub struct DelayLine {
    buf: Vec<f32>,
    w: usize,
}

impl DelayLine {
    /// Capacity for `max_seconds` of delay at `sr`.
    pub fn new(max_seconds: f32, sr: f32) -> Self {
        let len = (max_seconds.max(0.0) * sr.max(1.0)).ceil() as usize + 4;
        Self { buf: vec![0.0; len], w: 0 }
    }

    /// Longest usable delay in samples.
    #[inline]
    pub fn max_delay(&self) -> f32 {
        (self.buf.len() - 3) as f32
    }

    /// Read `delay` samples behind the write head (clamped to `[1, max_delay]`).
    #[inline]
    pub fn read(&self, delay: f32) -> f32 {
        let len = self.buf.len();
        let d = delay.max(1.0).min(self.max_delay());
        let whole = d as usize;
        let frac = d - whole as f32;
        let i0 = (self.w + len - whole) % len;
        let i1 = (i0 + len - 1) % len;
        let a = self.buf[i0];
        let b = self.buf[i1];
        a + (b - a) * frac
    }

    /// Read `seconds` behind the write head.
    #[inline]
    pub fn read_seconds(&self, seconds: f32, sr: f32) -> f32 {
        self.read(seconds * sr)
    }

    /// Write one sample and advance the head.
    #[inline]
    pub fn write(&mut self, x: f32) {
        self.buf[self.w] = kill_denormals(x);
        self.w += 1;
        if self.w >= self.buf.len() {
            self.w = 0;
        }
    }

    pub fn clear(&mut self) {
        self.buf.iter_mut().for_each(|s| *s = 0.0);
    }
}
