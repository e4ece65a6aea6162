//! The session's effect chain: everything between the voice buses and the
//! output.
//!
//! ```text
//! main ─ LP(cutoff,q) ─┐
//! pad  ─ LP(pad)  ─────┴─ peak(mood) ─┬──────────────────────────┐
//!        echo ◄── reverb send ────────┤                          │
//!        crystal ◄── crystal send ────┤                          │
//!        prism A/B ◄── prism send ────┘                          │
//!                      (echo + crystal + prism + dry) ─► bloom reverb
//!   ─► warmth shelf ─► warmth LP ─► drive ─► + tape + crackle + texture
//!   ─► DC block ─► master level × fade ─► peak limiter ─► out
//! ```
//!
//! Continuous parameters are slewed at control rate ([`EffectChain::advance`]);
//! the master fade is the only per-sample ramp. Reverb decay bypasses the
//! slews and is retuned only when it moves by at least the configured delta.

use lullwave_core::dsp::{clamp, kill_denormals, shaper_curve, soft_clip};
use lullwave_core::prelude::{
    approach_coeff, DcBlock, DelayLine, DustNoise, OnePoleHP, OnePoleLP, ParamSlew, Rbj, RbjKind, SvfTpt,
    WhiteNoise,
};

use crate::config::SmoothingConfig;
use crate::error::ComposerError;
use crate::guard::{GuardStats, PeakLimiter, PeakLimiterParams};
use crate::mapping::ParamTargets;
use crate::nodes::Lfo;
use crate::reverb::{BloomReverb, ReverbParams};

const ECHO_MAX_S: f32 = 1.0;
const ECHO_SEND: f32 = 0.3;
const CRYSTAL_DELAY_S: f32 = 0.68;
const PRISM_A_S: f32 = 0.31;
const PRISM_B_S: f32 = 0.53;
const TEXTURE_BANDS: [(f32, f32, f32); 4] = [(420.0, 0.013, 300.0), (950.0, 0.021, 450.0), (1800.0, 0.034, 650.0), (3300.0, 0.047, 800.0)];

/// One sample of every bus the voices write into.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BusFrame {
    pub main: f32,
    pub pad: f32,
    pub crackle: f32,
    pub reverb: f32,
    pub crystal: f32,
    pub prism: f32,
}

impl BusFrame {
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What a chain needs to know about the session it belongs to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SessionContext {
    pub sample_rate: f32,
    pub seed: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Knob {
    Cutoff,
    Q,
    PadCutoff,
    Mood,
    Wet,
    PreDelay,
    Tone,
    Highpass,
    Shimmer,
    BloomTime,
    BloomFeedback,
    BloomMix,
    DelayTime,
    DelayFeedback,
    CrystalSend,
    CrystalMix,
    CrystalFeedback,
    PrismSend,
    PrismMix,
    PrismFeedback,
    WarmthDb,
    WarmthLowpass,
    Drive,
    Level,
    Tape,
    CrackleGain,
    DustGain,
    TextureGain,
}

const KNOBS: usize = Knob::TextureGain as usize + 1;

/// Which smoothing class a knob follows and the value it takes from `t`.
fn knob_targets(t: &ParamTargets, s: &SmoothingConfig) -> [(Knob, f32, f32); KNOBS] {
    let (fast, medium, slow) = (s.fast_tau_s, s.medium_tau_s, s.slow_tau_s);
    [
        (Knob::Cutoff, t.filter_cutoff_hz, fast),
        (Knob::Q, t.filter_q, fast),
        (Knob::PadCutoff, t.pad_cutoff_hz, fast),
        (Knob::Mood, t.mood_hz, medium),
        (Knob::Wet, t.reverb_wet, slow),
        (Knob::PreDelay, t.pre_delay_s, slow),
        (Knob::Tone, t.wet_tone_hz, medium),
        (Knob::Highpass, t.wet_highpass_hz, medium),
        (Knob::Shimmer, t.shimmer_db, medium),
        (Knob::BloomTime, t.bloom_time_s, slow),
        (Knob::BloomFeedback, t.bloom_feedback, slow),
        (Knob::BloomMix, t.bloom_mix, slow),
        (Knob::DelayTime, t.delay_time_s, slow),
        (Knob::DelayFeedback, t.delay_feedback, slow),
        (Knob::CrystalSend, t.crystal_send, medium),
        (Knob::CrystalMix, t.crystal_mix, slow),
        (Knob::CrystalFeedback, t.crystal_feedback, slow),
        (Knob::PrismSend, t.prism_send, medium),
        (Knob::PrismMix, t.prism_mix, slow),
        (Knob::PrismFeedback, t.prism_feedback, slow),
        (Knob::WarmthDb, t.warmth_shelf_db, slow),
        (Knob::WarmthLowpass, t.warmth_lowpass_hz, slow),
        (Knob::Drive, t.drive, slow),
        (Knob::Level, t.master_level, slow),
        (Knob::Tape, t.tape_gain, slow),
        (Knob::CrackleGain, t.crackle_gain, medium),
        (Knob::DustGain, t.dust_gain, medium),
        (Knob::TextureGain, t.texture_gain, slow),
    ]
}

/// Per-sample exponential ramp used for fade in/out.
#[derive(Copy, Clone, Debug)]
struct Fader {
    value: f32,
    target: f32,
    coeff: f32,
}

impl Fader {
    #[inline]
    fn tick(&mut self) -> f32 {
        self.value += (self.target - self.value) * self.coeff;
        if (self.value - self.target).abs() < 1e-6 {
            self.value = self.target;
        }
        self.value
    }
}

#[derive(Clone, Debug)]
struct TextureBand {
    base_hz: f32,
    depth_hz: f32,
    lfo: Lfo,
    bp: SvfTpt,
}

/// Filters, delays, reverb, beds and the limiter for one session.
#[derive(Clone, Debug)]
pub struct EffectChain {
    sr: f32,
    knobs: [ParamSlew; KNOBS],

    main_lp: Rbj,
    pad_lp: Rbj,
    mood: Rbj,

    echo: DelayLine,
    crystal: DelayLine,
    crystal_hp: OnePoleHP,
    crystal_lp: OnePoleLP,
    prism_a: DelayLine,
    prism_b: DelayLine,
    prism_lfo_a: Lfo,
    prism_lfo_b: Lfo,
    prism_hp: OnePoleHP,
    prism_lp: OnePoleLP,

    reverb: BloomReverb,

    warm_shelf: Rbj,
    warm_lp: Rbj,

    tape_noise: DustNoise,
    tape_hp: OnePoleHP,
    tape_lp: OnePoleLP,
    tape_peak: Rbj,

    crackle_hp: Rbj,
    crackle_lp: Rbj,
    crackle_peak: Rbj,
    crackle_low: Rbj,
    crackle_high: Rbj,
    dust_noise: DustNoise,
    dust_hp: OnePoleHP,
    dust_lp: OnePoleLP,

    texture_noise: WhiteNoise,
    texture_bands: [TextureBand; 4],
    texture_lp: OnePoleLP,

    dc: DcBlock,
    fade: Fader,
    limiter: PeakLimiter,
}

impl EffectChain {
    /// Build a chain settled on `initial` with the master faded all the way down.
    pub fn new(ctx: SessionContext, initial: &ParamTargets) -> Self {
        let sr = ctx.sample_rate.max(1.0);
        let seed = ctx.seed | 1;
        let t = initial;
        let mut knobs = [ParamSlew::new(0.0); KNOBS];
        for (knob, value, _) in knob_targets(t, &SmoothingConfig::default()) {
            knobs[knob as usize].jump(value);
        }
        let texture_bands = TEXTURE_BANDS.map(|(base_hz, rate, depth_hz)| TextureBand {
            base_hz,
            depth_hz,
            lfo: Lfo::sine(rate).with_phase(base_hz / 4000.0),
            bp: SvfTpt::new(base_hz, 4.0 + base_hz / 550.0, sr),
        });

        let mut chain = Self {
            sr,
            knobs,
            main_lp: Rbj::low_pass(t.filter_cutoff_hz, t.filter_q, sr),
            pad_lp: Rbj::low_pass(t.pad_cutoff_hz, 0.707, sr),
            mood: Rbj::new(RbjKind::Peaking, t.mood_hz, 0.9, 2.0, sr),
            echo: DelayLine::new(ECHO_MAX_S, sr),
            crystal: DelayLine::new(CRYSTAL_DELAY_S + 0.01, sr),
            crystal_hp: OnePoleHP::new(1300.0, sr),
            crystal_lp: OnePoleLP::new(7400.0, sr),
            prism_a: DelayLine::new(PRISM_A_S + 0.01, sr),
            prism_b: DelayLine::new(PRISM_B_S + 0.01, sr),
            prism_lfo_a: Lfo::tri(0.11),
            prism_lfo_b: Lfo::sine(0.07).with_phase(0.25),
            prism_hp: OnePoleHP::new(900.0, sr),
            prism_lp: OnePoleLP::new(7600.0, sr),
            reverb: BloomReverb::new(sr),
            warm_shelf: Rbj::new(RbjKind::LowShelf, 220.0, 0.707, t.warmth_shelf_db, sr),
            warm_lp: Rbj::low_pass(t.warmth_lowpass_hz, 0.707, sr),
            tape_noise: DustNoise::new(seed.wrapping_mul(0x9E37_79B9)),
            tape_hp: OnePoleHP::new(160.0, sr),
            tape_lp: OnePoleLP::new(4600.0, sr),
            tape_peak: Rbj::new(RbjKind::Peaking, 1200.0, 0.8, 3.0, sr),
            crackle_hp: Rbj::high_pass(420.0, 0.707, sr),
            crackle_lp: Rbj::low_pass(6800.0, 0.707, sr),
            crackle_peak: Rbj::new(RbjKind::Peaking, 1450.0, 0.9, 4.0, sr),
            crackle_low: Rbj::new(RbjKind::LowShelf, 380.0, 0.707, -4.0, sr),
            crackle_high: Rbj::new(RbjKind::HighShelf, 4200.0, 0.707, -3.0, sr),
            dust_noise: DustNoise::new(seed.wrapping_mul(0x85EB_CA6B)),
            dust_hp: OnePoleHP::new(520.0, sr),
            dust_lp: OnePoleLP::new(6200.0, sr),
            texture_noise: WhiteNoise::new(seed.wrapping_mul(0xC2B2_AE35)),
            texture_bands,
            texture_lp: OnePoleLP::new(5200.0, sr),
            dc: DcBlock::new(10.0, sr),
            fade: Fader { value: 0.0, target: 0.0, coeff: 1.0 },
            limiter: PeakLimiter::new(PeakLimiterParams::default(), sr),
        };
        chain.reverb.set_decay(t.reverb_decay_s, 0.0);
        chain.push_coefficients();
        chain
    }

    /// Build a chain into an empty slot. A session holds at most one chain;
    /// an occupied slot is left untouched.
    pub fn install<'a>(
        slot: &'a mut Option<EffectChain>,
        ctx: SessionContext,
        initial: &ParamTargets,
    ) -> Result<&'a mut EffectChain, ComposerError> {
        if slot.is_some() {
            tracing::warn!("effect chain already installed, refusing to build a second one");
            return Err(ComposerError::DuplicateChain);
        }
        tracing::debug!(sample_rate = ctx.sample_rate, "building effect chain");
        Ok(slot.insert(EffectChain::new(ctx, initial)))
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sr
    }

    /// Retarget every slewed parameter. Reverb decay is applied directly,
    /// subject to `decay_min_delta_s`.
    pub fn apply(&mut self, targets: &ParamTargets, smoothing: &SmoothingConfig) {
        for (knob, value, tau) in knob_targets(targets, smoothing) {
            self.knobs[knob as usize].set_target(value, tau);
        }
        if self.reverb.set_decay(targets.reverb_decay_s, smoothing.decay_min_delta_s) {
            tracing::trace!(decay_s = targets.reverb_decay_s, "reverb decay retuned");
        }
    }

    /// Move the slews forward by `dt` seconds and push the result into the
    /// filters. Called once per control block.
    pub fn advance(&mut self, dt: f32) {
        for k in &mut self.knobs {
            k.advance(dt);
        }
        self.push_coefficients();
    }

    /// Ramp the master fade toward `level` with time constant `tau_s`.
    pub fn fade_to(&mut self, level: f32, tau_s: f32) {
        self.fade.target = clamp(level, 0.0, 1.0);
        self.fade.coeff = approach_coeff(1.0 / self.sr, tau_s);
    }

    #[inline]
    pub fn fade_level(&self) -> f32 {
        self.fade.value
    }

    #[inline]
    pub fn fade_target(&self) -> f32 {
        self.fade.target
    }

    /// Current smoothed value of the main filter cutoff.
    #[inline]
    pub fn cutoff_hz(&self) -> f32 {
        self.knob(Knob::Cutoff)
    }

    /// Current smoothed reverb mix.
    #[inline]
    pub fn reverb_wet(&self) -> f32 {
        self.knob(Knob::Wet)
    }

    #[inline]
    pub fn reverb_decay_s(&self) -> f32 {
        self.reverb.decay_s()
    }

    /// Largest loop gain across every feedback path in the chain.
    pub fn max_loop_gain(&self) -> f32 {
        let fbs = [
            self.knob(Knob::DelayFeedback),
            self.knob(Knob::CrystalFeedback),
            self.knob(Knob::PrismFeedback),
            self.knob(Knob::BloomFeedback),
            self.reverb.max_feedback(),
        ];
        fbs.into_iter().fold(0.0, f32::max)
    }

    pub fn take_guard_stats(&mut self) -> GuardStats {
        self.limiter.take_stats()
    }

    #[inline]
    fn knob(&self, k: Knob) -> f32 {
        self.knobs[k as usize].value()
    }

    fn push_coefficients(&mut self) {
        let (cut, q) = (self.knob(Knob::Cutoff), self.knob(Knob::Q));
        self.main_lp.set(cut, q, 0.0);
        self.pad_lp.set_freq(self.knob(Knob::PadCutoff));
        self.mood.set_freq(self.knob(Knob::Mood));
        self.warm_shelf.set_gain_db(self.knob(Knob::WarmthDb));
        self.warm_lp.set_freq(self.knob(Knob::WarmthLowpass));
        self.reverb.set_params(ReverbParams {
            wet: self.knob(Knob::Wet),
            pre_delay_s: self.knob(Knob::PreDelay),
            tone_hz: self.knob(Knob::Tone),
            highpass_hz: self.knob(Knob::Highpass),
            shimmer_db: self.knob(Knob::Shimmer),
            bloom_time_s: self.knob(Knob::BloomTime),
            bloom_feedback: self.knob(Knob::BloomFeedback),
            bloom_mix: self.knob(Knob::BloomMix),
        });
    }

    /// Run one sample of bus input through the chain.
    pub fn process(&mut self, bus: &BusFrame) -> f32 {
        let sr = self.sr;

        let dry = self.mood.process(self.main_lp.process(bus.main) + self.pad_lp.process(bus.pad));

        let echo = self.echo.read_seconds(self.knob(Knob::DelayTime), sr);
        self.echo.write(bus.reverb + echo * self.knob(Knob::DelayFeedback));

        let crystal_tap = self.crystal.read_seconds(CRYSTAL_DELAY_S, sr);
        let crystal = self.crystal_lp.process(self.crystal_hp.process(crystal_tap));
        self.crystal.write(bus.crystal * self.knob(Knob::CrystalSend) * 20.0 + crystal * self.knob(Knob::CrystalFeedback));

        let a_t = PRISM_A_S + 0.004 * self.prism_lfo_a.next_norm(sr);
        let b_t = PRISM_B_S + 0.006 * self.prism_lfo_b.next_norm(sr);
        let prism_tap = 0.5 * (self.prism_a.read_seconds(a_t, sr) + self.prism_b.read_seconds(b_t, sr));
        let prism = self.prism_lp.process(self.prism_hp.process(prism_tap));
        let prism_in = bus.prism * self.knob(Knob::PrismSend) * 30.0 + prism * self.knob(Knob::PrismFeedback);
        self.prism_a.write(prism_in);
        self.prism_b.write(prism_in);

        let pre_verb = dry
            + echo * ECHO_SEND
            + crystal * self.knob(Knob::CrystalMix)
            + prism * self.knob(Knob::PrismMix);
        let verb = self.reverb.process(pre_verb);

        let warm = self.warm_lp.process(self.warm_shelf.process(verb));
        let drive = self.knob(Knob::Drive);
        let driven = soft_clip(warm * (1.0 + drive)) * (0.95 - drive * 0.1);

        let beds = self.tape_bed() + self.crackle_bed(bus.crackle) + self.texture_bed();

        let level = self.knob(Knob::Level) * self.fade.tick();
        let out = self.dc.process(driven + beds) * level;
        kill_denormals(self.limiter.process(out))
    }

    fn tape_bed(&mut self) -> f32 {
        let n = self.tape_lp.process(self.tape_hp.process(self.tape_noise.next()));
        self.tape_peak.process(n) * self.knob(Knob::Tape)
    }

    fn crackle_bed(&mut self, pops: f32) -> f32 {
        let dust = self.dust_lp.process(self.dust_hp.process(self.dust_noise.next())) * self.knob(Knob::DustGain);
        let x = self.crackle_lp.process(self.crackle_hp.process(pops));
        let coloured = self.crackle_high.process(self.crackle_low.process(self.crackle_peak.process(x)));
        coloured * self.knob(Knob::CrackleGain) + dust
    }

    fn texture_bed(&mut self) -> f32 {
        let gain = self.knob(Knob::TextureGain);
        if gain < 1e-5 {
            return 0.0;
        }
        let sr = self.sr;
        let n = self.texture_noise.next();
        let mut sum = 0.0;
        for band in &mut self.texture_bands {
            let f = band.base_hz + band.depth_hz * band.lfo.next_norm(sr);
            band.bp.set_cutoff_hz(f.max(60.0));
            sum += band.bp.process_bp(n);
        }
        self.texture_lp.process(shaper_curve(sum * 0.5, 3.0)) * gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lullwave_core::dsp::TAU;
    use crate::mapping::map_params;
    use crate::world::{ControlPoint, QuadrantWeights};

    fn targets(x: f32, y: f32) -> ParamTargets {
        let p = ControlPoint::new(x, y);
        map_params(p, &QuadrantWeights::from_point(p))
    }

    fn ctx() -> SessionContext {
        SessionContext { sample_rate: 48_000.0, seed: 7 }
    }

    #[test]
    fn install_refuses_a_second_chain() {
        let mut slot = None;
        assert!(EffectChain::install(&mut slot, ctx(), &targets(0.3, 0.3)).is_ok());
        let err = EffectChain::install(&mut slot, ctx(), &targets(0.9, 0.9)).unwrap_err();
        assert_eq!(err, ComposerError::DuplicateChain);
        assert!(slot.is_some());
    }

    #[test]
    fn silent_until_faded_in() {
        let mut chain = EffectChain::new(ctx(), &targets(0.5, 0.5));
        let tone = |i: usize| BusFrame { main: 0.5 * (i as f32 * 220.0 * TAU / 48_000.0).sin(), ..BusFrame::default() };
        for i in 0..2_000 {
            assert_eq!(chain.process(&tone(i)), 0.0);
        }
        chain.fade_to(1.0, 0.05);
        let mut peak = 0.0f32;
        for i in 0..48_000 {
            peak = peak.max(chain.process(&tone(i)).abs());
        }
        assert!(peak > 0.01, "peak {peak}");
        assert!((chain.fade_level() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn slews_converge_on_new_targets() {
        let mut chain = EffectChain::new(ctx(), &targets(0.0, 0.0));
        let goal = targets(1.0, 1.0);
        let smoothing = SmoothingConfig::default();
        chain.apply(&goal, &smoothing);
        for _ in 0..2_000 {
            chain.advance(64.0 / 48_000.0);
        }
        assert!((chain.cutoff_hz() - goal.filter_cutoff_hz).abs() / goal.filter_cutoff_hz < 0.01);
        assert!((chain.reverb_wet() - goal.reverb_wet).abs() < 0.01);
    }

    #[test]
    fn small_decay_moves_are_ignored() {
        let mut chain = EffectChain::new(ctx(), &targets(0.2, 0.2));
        let smoothing = SmoothingConfig::default();
        let before = chain.reverb_decay_s();
        let mut nudged = targets(0.2, 0.2);
        nudged.reverb_decay_s = before + smoothing.decay_min_delta_s * 0.5;
        chain.apply(&nudged, &smoothing);
        assert_eq!(chain.reverb_decay_s(), before);
        nudged.reverb_decay_s = before + smoothing.decay_min_delta_s * 2.0;
        chain.apply(&nudged, &smoothing);
        assert_eq!(chain.reverb_decay_s(), nudged.reverb_decay_s);
    }

    #[test]
    fn loud_buses_stay_under_the_ceiling() {
        let mut chain = EffectChain::new(ctx(), &targets(0.9, 0.9));
        chain.fade_to(1.0, 0.0);
        let bus = BusFrame { main: 4.0, pad: 4.0, crackle: 4.0, reverb: 4.0, crystal: 4.0, prism: 4.0 };
        for i in 0..96_000 {
            let y = chain.process(&bus);
            assert!(y.is_finite() && y.abs() <= 0.98 + 1e-6, "sample {i}: {y}");
        }
        assert!(chain.max_loop_gain() < 1.0);
    }
}
