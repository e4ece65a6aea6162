//! Bounded, self-cleaning voice pools.
//!
//! A pool owns its voices outright. Voices leave in two ways:
//! - naturally, when [`VoicePool::collect`] finds them past their stop time;
//! - by eviction, when admitting one more voice would exceed `max_concurrent`.
//!   The oldest active voice is moved to a short fade-out list and dropped once
//!   its fade completes. Evicted voices no longer count as active.

use std::collections::VecDeque;

use lullwave_core::prelude::ParamSlew;

use crate::config::{PoolConfig, PoolsConfig};
use crate::effects::BusFrame;
use crate::voice::{Bus, NoteSpec, Voice, VoiceCategory};

/// Opaque reference to an admitted voice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub category: VoiceCategory,
    pub id: u64,
}

/// Voices of one category.
#[derive(Debug)]
pub struct VoicePool {
    category: VoiceCategory,
    config: PoolConfig,
    active: VecDeque<Voice>,
    fading: Vec<Voice>,
    next_id: u64,
    admitted: u64,
    evicted: u64,
    gain: ParamSlew,
    sr: f32,
}

impl VoicePool {
    pub fn new(category: VoiceCategory, config: PoolConfig, sr: f32) -> Self {
        let cap = config.max_concurrent.max(1);
        Self {
            category,
            config: PoolConfig { max_concurrent: cap, ..config },
            active: VecDeque::with_capacity(cap + 1),
            fading: Vec::with_capacity(cap),
            next_id: 1,
            admitted: 0,
            evicted: 0,
            gain: ParamSlew::new(1.0),
            sr: sr.max(1.0),
        }
    }

    #[inline]
    pub fn category(&self) -> VoiceCategory {
        self.category
    }

    #[inline]
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Active (non-evicted) voices.
    #[inline]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Evicted voices still fading out.
    #[inline]
    pub fn fading(&self) -> usize {
        self.fading.len()
    }

    #[inline]
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Ids of the active voices, oldest first.
    pub fn active_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.active.iter().map(Voice::id)
    }

    /// Build and admit a voice starting at `start`, evicting the oldest if full.
    pub fn trigger(&mut self, now: f64, start: f64, spec: &NoteSpec, seed: u32) -> VoiceHandle {
        debug_assert_eq!(spec.category(), self.category, "voice routed to the wrong pool");
        let mut voice = Voice::new(spec, start.max(now), self.sr, seed);
        let id = self.next_id;
        self.next_id += 1;
        voice.set_id(id);

        if self.active.len() >= self.config.max_concurrent {
            if let Some(mut oldest) = self.active.pop_front() {
                oldest.force_release(now, self.config.eviction_fade_s);
                tracing::trace!(pool = self.category.label(), id = oldest.id(), "evicting oldest voice");
                self.evicted += 1;
                self.fading.push(oldest);
            }
        }
        self.active.push_back(voice);
        self.admitted += 1;
        tracing::trace!(pool = self.category.label(), id, active = self.active.len(), "voice admitted");
        VoiceHandle { category: self.category, id }
    }

    /// Drop every voice past its stop time. Returns how many were removed.
    pub fn collect(&mut self, now: f64) -> usize {
        let before = self.active.len() + self.fading.len();
        self.active.retain(|v| !v.is_finished(now));
        self.fading.retain(|v| !v.is_finished(now));
        before - self.active.len() - self.fading.len()
    }

    /// Fade every voice out over `fade_s` (never lengthening a natural ending).
    pub fn release_all(&mut self, now: f64, fade_s: f32) {
        for v in self.active.iter_mut().chain(self.fading.iter_mut()) {
            v.force_release(now, fade_s);
        }
    }

    /// Drop everything immediately.
    pub fn clear(&mut self) {
        self.active.clear();
        self.fading.clear();
    }

    pub fn set_gain(&mut self, gain: f32, tau_s: f32) {
        self.gain.set_target(gain, tau_s);
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.value()
    }

    pub fn advance(&mut self, dt: f32) {
        self.gain.advance(dt);
    }

    /// Mix one sample of every voice into `bus`.
    pub fn render(&mut self, t: f64, bus: &mut BusFrame) {
        let gain = self.gain.value();
        if gain <= 0.0 {
            return;
        }
        let sr = self.sr;
        for v in self.active.iter_mut().chain(self.fading.iter_mut()) {
            let y = v.render(t, sr) * gain;
            if y == 0.0 {
                continue;
            }
            let s = v.sends();
            match s.bus {
                Bus::Main => bus.main += y,
                Bus::Pad => bus.pad += y,
                Bus::Crackle => bus.crackle += y,
            }
            bus.reverb += y * s.reverb;
            bus.crystal += y * s.crystal;
            bus.prism += y * s.prism;
        }
    }
}

/// All five pools of a session.
#[derive(Debug)]
pub struct Voices {
    pools: [VoicePool; 5],
}

impl Voices {
    pub fn new(config: &PoolsConfig, sr: f32) -> Self {
        Self { pools: VoiceCategory::ALL.map(|c| VoicePool::new(c, config.get(c), sr)) }
    }

    #[inline]
    pub fn pool(&self, category: VoiceCategory) -> &VoicePool {
        &self.pools[category.index()]
    }

    #[inline]
    pub fn pool_mut(&mut self, category: VoiceCategory) -> &mut VoicePool {
        &mut self.pools[category.index()]
    }

    /// Route `spec` to its category's pool.
    pub fn trigger(&mut self, now: f64, start: f64, spec: &NoteSpec, seed: u32) -> VoiceHandle {
        self.pool_mut(spec.category()).trigger(now, start, spec, seed)
    }

    pub fn collect(&mut self, now: f64) -> usize {
        self.pools.iter_mut().map(|p| p.collect(now)).sum()
    }

    /// Release every pool with its own configured stop fade, scaled by `scale`.
    pub fn release_all(&mut self, now: f64, scale: f32) {
        for p in &mut self.pools {
            let fade = p.config().stop_fade_s * scale;
            p.release_all(now, fade);
        }
    }

    /// Release every pool with the same fade.
    pub fn cut_all(&mut self, now: f64, fade_s: f32) {
        for p in &mut self.pools {
            p.release_all(now, fade_s);
        }
    }

    pub fn active(&self) -> usize {
        self.pools.iter().map(VoicePool::len).sum()
    }

    pub fn advance(&mut self, dt: f32) {
        for p in &mut self.pools {
            p.advance(dt);
        }
    }

    pub fn render(&mut self, t: f64, bus: &mut BusFrame) {
        for p in &mut self.pools {
            p.render(t, bus);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoicePool> {
        self.pools.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn pop() -> NoteSpec {
        NoteSpec::Pop { freq: 1200.0, q: 30.0, peak: 0.1, decay_s: 0.08 }
    }

    fn pool(max: usize) -> VoicePool {
        VoicePool::new(
            VoiceCategory::Strike,
            PoolConfig { max_concurrent: max, eviction_fade_s: 0.3, stop_fade_s: 1.0 },
            SR,
        )
    }

    #[test]
    fn bound_holds_after_every_trigger() {
        let mut p = pool(4);
        for i in 0..50 {
            p.trigger(0.0, 0.0, &pop(), i);
            assert!(p.len() <= 4);
        }
        assert_eq!(p.len(), 4);
        assert_eq!(p.admitted(), 50);
        assert_eq!(p.evicted(), 46);
    }

    #[test]
    fn eviction_is_fifo() {
        let mut p = pool(3);
        let handles: Vec<_> = (0..5).map(|i| p.trigger(0.0, 0.0, &pop(), i)).collect();
        let ids: Vec<u64> = p.active_ids().collect();
        assert_eq!(ids, handles[2..].iter().map(|h| h.id).collect::<Vec<_>>());
        assert_eq!(p.fading(), 2);
    }

    #[test]
    fn finished_voices_are_unreachable() {
        let mut p = pool(8);
        p.trigger(0.0, 0.0, &pop(), 1);
        p.trigger(0.0, 0.5, &pop(), 2);
        assert_eq!(p.collect(0.2), 1);
        assert_eq!(p.len(), 1);
        assert_eq!(p.collect(1.0), 1);
        assert!(p.is_empty());
        assert_eq!(p.fading(), 0);
    }

    #[test]
    fn evicted_voices_drop_after_their_fade() {
        let mut p = VoicePool::new(
            VoiceCategory::Pad,
            PoolConfig { max_concurrent: 1, eviction_fade_s: 0.5, stop_fade_s: 2.0 },
            SR,
        );
        let pad = NoteSpec::Pad { freqs: [110.0, 165.0, 220.0], attack_s: 0.1, peak: 0.1 };
        p.trigger(0.0, 0.0, &pad, 1);
        p.trigger(1.0, 1.0, &pad, 2);
        assert_eq!((p.len(), p.fading()), (1, 1));
        p.collect(1.2);
        assert_eq!(p.fading(), 1);
        p.collect(1.6);
        assert_eq!(p.fading(), 0);
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn voices_route_by_category() {
        let mut v = Voices::new(&PoolsConfig::default(), SR);
        let h = v.trigger(0.0, 0.0, &pop(), 3);
        assert_eq!(h.category, VoiceCategory::Strike);
        assert_eq!(v.pool(VoiceCategory::Strike).len(), 1);
        assert_eq!(v.active(), 1);
        v.release_all(0.0, 1.0);
        v.collect(5.0);
        assert_eq!(v.active(), 0);
    }

    #[test]
    fn render_feeds_the_right_bus() {
        let mut p = pool(2);
        p.trigger(0.0, 0.0, &pop(), 11);
        let mut bus = BusFrame::default();
        let mut crackle = 0.0f32;
        for i in 0..200 {
            bus.clear();
            p.render(f64::from(i) / f64::from(SR), &mut bus);
            crackle = crackle.max(bus.crackle.abs());
            assert_eq!(bus.main, 0.0);
        }
        assert!(crackle > 0.0);
    }
}
