//! The composition orchestrator.
//!
//! A [`Composer`] owns one session: the effect chain, the voice pools, the
//! four role timers, harmonic state, events and energy. Everything runs on a
//! single simulated clock:
//!
//! - [`Composer::advance`] runs control only (frame ticks and timer firings in
//!   time order, frame tick first on ties);
//! - [`Composer::render`] (and [`Generator::next`]) produce audio in blocks of
//!   `control_block` samples, running control up to the end of each block
//!   before rendering it. Voices are scheduled on absolute time, so a voice
//!   triggered mid-block still starts on its exact sample.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use lullwave_core::prelude::approach_coeff;

use crate::config::ComposerConfig;
use crate::effects::{BusFrame, EffectChain, SessionContext};
use crate::error::ComposerError;
use crate::events::{Energy, EnergyMeter, EventBus, EventKind, MusicalEvent};
use crate::graph::Generator;
use crate::host::AudioSubsystem;
use crate::mapping::{map_params, ParamTargets};
use crate::pool::Voices;
use crate::scheduler::{Role, Timers};
use crate::sequencer::{Sequencer, Stage};
use crate::voice::VoiceCategory;
use crate::world::{ControlPoint, QuadrantWeights, World};

/// Fade used by [`Composer::stop_immediately`].
const IMMEDIATE_FADE_S: f32 = 0.05;
/// Bounds of [`Composer::randomize_point`].
const RANDOM_POINT_RANGE: (f32, f32) = (0.08, 0.92);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    Uninitialized,
    Stopped,
    Running,
}

/// Display-oriented view of the musical state.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: f64,
    pub lifecycle: Lifecycle,
    pub chord_name: &'static str,
    pub chord_index: usize,
    pub harmony_world: World,
    pub dominant_world: World,
    pub point: ControlPoint,
    pub smoothed_point: ControlPoint,
    pub active_voices: usize,
    pub energy: Energy,
}

#[derive(Copy, Clone, Debug, Default)]
struct Block {
    start: f64,
    len: usize,
    pos: usize,
}

pub struct Composer {
    config: ComposerConfig,
    sr: f32,
    lifecycle: Lifecycle,

    clock: f64,
    control_time: f64,
    next_frame: f64,
    block: Block,

    target_point: ControlPoint,
    point: ControlPoint,
    weights: QuadrantWeights,
    targets: ParamTargets,
    dominant: World,

    chain: Option<EffectChain>,
    voices: Option<Voices>,
    bus: BusFrame,

    timers: Timers,
    sequencer: Sequencer,
    events: EventBus,
    energy: EnergyMeter,
    rng: StdRng,
}

impl Composer {
    /// A composer at the configured initial point. Nothing is allocated for
    /// audio until [`Composer::init`].
    pub fn new(config: ComposerConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let point = ControlPoint::new(config.initial_point[0], config.initial_point[1]);
        let weights = QuadrantWeights::from_point(point);
        let dominant = weights.dominant();
        let sequencer = Sequencer::new(dominant, &mut rng);
        Self {
            events: EventBus::new(config.event_capacity),
            config,
            sr: 48_000.0,
            lifecycle: Lifecycle::Uninitialized,
            clock: 0.0,
            control_time: 0.0,
            next_frame: 0.0,
            block: Block::default(),
            target_point: point,
            point,
            weights,
            targets: map_params(point, &weights),
            dominant,
            chain: None,
            voices: None,
            bus: BusFrame::default(),
            timers: Timers::default(),
            sequencer,
            energy: EnergyMeter::default(),
            rng,
        }
    }

    // ------------------------------------------------------------------ lifecycle

    /// Bring up the audio subsystem and build the session. Calling it again
    /// once initialized does nothing. On failure nothing is built and the
    /// composer stays uninitialized, so a retry is safe.
    pub fn init(&mut self, host: &mut dyn AudioSubsystem) -> Result<(), ComposerError> {
        if self.lifecycle != Lifecycle::Uninitialized {
            tracing::debug!("init: already initialized");
            return Ok(());
        }
        let spec = host.open().map_err(|err| {
            tracing::error!(%err, "audio subsystem could not be initialized");
            ComposerError::from(err)
        })?;
        self.sr = spec.sample_rate;
        self.build_session()?;
        self.sequencer.reset(self.dominant, &mut self.rng);
        self.timers.disarm_all();
        self.energy.reset();
        self.lifecycle = Lifecycle::Stopped;
        tracing::info!(sample_rate = self.sr, channels = spec.channels, world = self.dominant.label(), "session initialized");
        Ok(())
    }

    fn build_session(&mut self) -> Result<(), ComposerError> {
        let ctx = SessionContext { sample_rate: self.sr, seed: self.rng.gen() };
        EffectChain::install(&mut self.chain, ctx, &self.targets)?;
        let mut voices = Voices::new(&self.config.pools, self.sr);
        for cat in VoiceCategory::ALL {
            let gain = category_gain(&self.targets, cat);
            let pool = voices.pool_mut(cat);
            pool.set_gain(gain, 0.0);
            pool.advance(0.0);
        }
        self.voices = Some(voices);
        Ok(())
    }

    /// Fade in and arm every role with a staggered first firing. Does nothing
    /// before `init` or while already running.
    pub fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Uninitialized => {
                tracing::warn!("start: session not initialized, ignoring");
                return;
            }
            Lifecycle::Running => return,
            Lifecycle::Stopped => {}
        }
        self.lifecycle = Lifecycle::Running;
        if let Some(chain) = self.chain.as_mut() {
            chain.fade_to(1.0, self.config.fade_in_tau_s);
        }
        let now = self.control_time;
        let t = self.config.timing;
        for (role, window) in [
            (Role::Harmony, t.harmony_first_s),
            (Role::Melody, t.melody_first_s),
            (Role::Strike, t.strike_first_s),
            (Role::Crackle, t.crackle_first_s),
        ] {
            let delay = self.pick(window);
            self.timers.arm(role, now + f64::from(delay));
        }
        tracing::info!(time = now, "session started");
    }

    /// Fade to silence, disarm every timer and release the voices. Safe to
    /// call repeatedly and before `start`.
    pub fn stop(&mut self) {
        self.timers.disarm_all();
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;
        let now = self.control_time;
        if let Some(chain) = self.chain.as_mut() {
            chain.fade_to(0.0, self.config.fade_out_tau_s);
        }
        if let Some(voices) = self.voices.as_mut() {
            voices.release_all(now, 1.0);
        }
        tracing::info!(time = now, "session stopped");
    }

    /// Like [`Composer::stop`] but every voice gets a very short fade.
    pub fn stop_immediately(&mut self) {
        self.timers.disarm_all();
        if self.lifecycle == Lifecycle::Uninitialized {
            return;
        }
        let was_running = self.lifecycle == Lifecycle::Running;
        self.lifecycle = Lifecycle::Stopped;
        let now = self.control_time;
        if let Some(chain) = self.chain.as_mut() {
            chain.fade_to(0.0, IMMEDIATE_FADE_S);
        }
        if let Some(voices) = self.voices.as_mut() {
            voices.cut_all(now, IMMEDIATE_FADE_S);
        }
        if was_running {
            tracing::info!(time = now, "session stopped immediately");
        }
    }

    // ------------------------------------------------------------------ steering

    /// Store a new ControlPoint (clamped). Picked up by the next frame tick.
    pub fn set_xy(&mut self, x: f32, y: f32) {
        self.target_point = ControlPoint::new(x, y);
        tracing::trace!(x = self.target_point.x, y = self.target_point.y, "set_xy");
    }

    /// Jump to a random point away from the edges.
    pub fn randomize_point(&mut self) -> ControlPoint {
        let (lo, hi) = RANDOM_POINT_RANGE;
        let x = self.rng.gen_range(lo..=hi);
        let y = self.rng.gen_range(lo..=hi);
        self.set_xy(x, y);
        tracing::debug!(x, y, "random point");
        self.target_point
    }

    // ------------------------------------------------------------------ time

    /// Run control for `dt` seconds without rendering audio.
    pub fn advance(&mut self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }
        let end = self.clock + dt;
        self.run_control_until(end);
        let step = dt as f32;
        if let Some(chain) = self.chain.as_mut() {
            chain.advance(step);
        }
        if let Some(voices) = self.voices.as_mut() {
            voices.advance(step);
        }
        self.clock = end;
        self.block = Block::default();
    }

    /// Render mono samples into `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            *s = self.next_sample();
        }
    }

    fn begin_block(&mut self) {
        let len = self.config.control_block.max(1);
        let dt = len as f64 / f64::from(self.sr);
        self.block = Block { start: self.clock, len, pos: 0 };
        self.run_control_until(self.clock + dt);
        if let Some(chain) = self.chain.as_mut() {
            chain.advance(dt as f32);
        }
        if let Some(voices) = self.voices.as_mut() {
            voices.advance(dt as f32);
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        if self.block.pos >= self.block.len {
            self.begin_block();
        }
        let sr = f64::from(self.sr);
        let t = self.block.start + self.block.pos as f64 / sr;
        self.block.pos += 1;
        self.clock = self.block.start + self.block.pos as f64 / sr;

        match (self.chain.as_mut(), self.voices.as_mut()) {
            (Some(chain), Some(voices)) => {
                self.bus.clear();
                voices.render(t, &mut self.bus);
                chain.process(&self.bus)
            }
            _ => 0.0,
        }
    }

    fn run_control_until(&mut self, end: f64) {
        let frame_dt = self.config.frame_dt();
        loop {
            let frame = self.next_frame;
            let timer = self.timers.next_due();
            match timer {
                Some((role, due)) if due <= end && due < frame => {
                    self.control_time = self.control_time.max(due);
                    self.fire(role, due);
                }
                _ if frame <= end => {
                    self.control_time = self.control_time.max(frame);
                    self.frame_tick(frame, frame_dt as f32);
                    self.next_frame = frame + frame_dt;
                }
                _ => break,
            }
        }
        self.control_time = self.control_time.max(end);
    }

    fn frame_tick(&mut self, now: f64, dt: f32) {
        self.energy.decay(dt);
        if let Some(voices) = self.voices.as_mut() {
            voices.collect(now);
        }
        if self.lifecycle != Lifecycle::Running {
            return;
        }

        self.point.approach(self.target_point, approach_coeff(dt, self.config.point_smoothing_tau_s));
        self.weights = QuadrantWeights::from_point(self.point);
        self.targets = map_params(self.point, &self.weights);

        let smoothing = self.config.smoothing;
        if let Some(chain) = self.chain.as_mut() {
            chain.apply(&self.targets, &smoothing);
        }
        if let Some(voices) = self.voices.as_mut() {
            for cat in VoiceCategory::ALL {
                voices.pool_mut(cat).set_gain(category_gain(&self.targets, cat), smoothing.medium_tau_s);
            }
        }

        let dominant = self.weights.dominant();
        if dominant != self.dominant {
            tracing::info!(from = self.dominant.label(), to = dominant.label(), "world change");
            self.dominant = dominant;
            self.events.emit(MusicalEvent { time: now, kind: EventKind::WorldChange { world: dominant } });
            if dominant != self.sequencer.world() {
                let soon = now + f64::from(self.pick(self.config.timing.world_change_s));
                let later = match self.timers.state(Role::Harmony) {
                    crate::scheduler::TimerState::Armed { due } => due > soon,
                    _ => true,
                };
                if later {
                    self.timers.arm(Role::Harmony, soon);
                }
            }
        }
    }

    fn fire(&mut self, role: Role, due: f64) {
        if !self.timers.begin_fire(role) {
            return;
        }
        if self.lifecycle != Lifecycle::Running {
            self.timers.end_fire(role);
            return;
        }
        let mut stage = Stage {
            now: due,
            weights: self.weights,
            targets: &self.targets,
            timing: &self.config.timing,
            voices: self.voices.as_mut(),
            events: &mut self.events,
            energy: &mut self.energy,
            rng: &mut self.rng,
        };
        let next = match role {
            Role::Harmony => self.sequencer.fire_harmony(&mut stage),
            Role::Melody => self.sequencer.fire_melody(&mut stage),
            Role::Strike => self.sequencer.fire_strike(&mut stage),
            Role::Crackle => self.sequencer.fire_crackle(&mut stage),
        };
        tracing::trace!(role = role.label(), time = due, next, "fired");
        self.timers.arm(role, due + next.max(0.01));
    }

    fn pick(&mut self, [lo, hi]: [f32; 2]) -> f32 {
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo.max(0.0)
        }
    }

    // ------------------------------------------------------------------ observers

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.lifecycle != Lifecycle::Uninitialized
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    #[inline]
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Session time in seconds.
    #[inline]
    pub fn time(&self) -> f64 {
        self.clock
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sr
    }

    /// Latest targets from the mapping (frozen while stopped).
    #[inline]
    pub fn targets(&self) -> &ParamTargets {
        &self.targets
    }

    #[inline]
    pub fn weights(&self) -> QuadrantWeights {
        self.weights
    }

    /// The point most recently passed to `set_xy`.
    #[inline]
    pub fn point(&self) -> ControlPoint {
        self.target_point
    }

    /// The smoothed point the mapping actually reads.
    #[inline]
    pub fn smoothed_point(&self) -> ControlPoint {
        self.point
    }

    #[inline]
    pub fn dominant_world(&self) -> World {
        self.dominant
    }

    /// Armed or firing timers; zero whenever the session is not running.
    #[inline]
    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    #[inline]
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    #[inline]
    pub fn energy(&self) -> Energy {
        self.energy.value()
    }

    pub fn active_voices(&self, category: VoiceCategory) -> usize {
        self.voices.as_ref().map_or(0, |v| v.pool(category).len())
    }

    pub fn total_voices(&self) -> usize {
        self.voices.as_ref().map_or(0, Voices::active)
    }

    #[inline]
    pub fn voices(&self) -> Option<&Voices> {
        self.voices.as_ref()
    }

    #[inline]
    pub fn chain(&self) -> Option<&EffectChain> {
        self.chain.as_ref()
    }

    /// A receiver for musical events. Multiple receivers share one queue.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<MusicalEvent> {
        self.events.subscribe()
    }

    /// Pop the oldest queued event.
    pub fn poll_event(&self) -> Option<MusicalEvent> {
        self.events.poll()
    }

    #[inline]
    pub fn last_event(&self) -> Option<MusicalEvent> {
        self.events.last()
    }

    #[inline]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    pub fn snapshot(&self) -> Snapshot {
        let chord = self.sequencer.chord();
        Snapshot {
            time: self.clock,
            lifecycle: self.lifecycle,
            chord_name: chord.name,
            chord_index: self.sequencer.chord_index(),
            harmony_world: self.sequencer.world(),
            dominant_world: self.dominant,
            point: self.target_point,
            smoothed_point: self.point,
            active_voices: self.total_voices(),
            energy: self.energy.value(),
        }
    }
}

fn category_gain(t: &ParamTargets, category: VoiceCategory) -> f32 {
    match category {
        VoiceCategory::Melody => t.melody_gain,
        VoiceCategory::Strike => t.strike_gain,
        VoiceCategory::Pad => t.pad_gain,
        VoiceCategory::Drone => t.drone_gain,
        VoiceCategory::Texture => t.texture_voice_gain,
    }
}

impl Generator for Composer {
    /// Rebuild the chain and pools for a new sample rate. Voices in flight are
    /// dropped; timers and harmonic state carry on.
    fn reset(&mut self, sr: f32) {
        if !(sr.is_finite() && sr > 0.0) {
            return;
        }
        let same = sr == self.sr;
        self.sr = sr;
        self.block = Block::default();
        if self.lifecycle == Lifecycle::Uninitialized || same {
            return;
        }
        tracing::warn!(sample_rate = sr, "rebuilding session for new sample rate");
        self.chain = None;
        self.voices = None;
        if let Err(err) = self.build_session() {
            tracing::warn!(%err, "session rebuild failed");
            return;
        }
        if self.lifecycle == Lifecycle::Running {
            if let Some(chain) = self.chain.as_mut() {
                chain.fade_to(1.0, self.config.fade_in_tau_s);
            }
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        self.next_sample()
    }

    fn render(&mut self, out: &mut [f32]) {
        Composer::render(self, out);
    }
}
