//! Voices: one sounding note or strike each.
//!
//! A voice is fully scheduled when it is built: its amplitude is a
//! [`ScheduledEnvelope`] on the session clock, so what it plays does not depend
//! on when the control loop next looks at it. The only later change a voice
//! accepts is [`Voice::force_release`].

use lullwave_core::dsp::{cents_to_ratio, lerp, shaper_curve};
use lullwave_core::prelude::{decay_per_sample, OnePoleHP, OnePoleLP, ScheduledEnvelope, SvfTpt, WhiteNoise, EXP_FLOOR};
use serde::Serialize;

use crate::nodes::{Lfo, NoiseMod, Osc, Wave};

/// Voices with no natural end (pads, drones) hold until this far past their start.
const SUSTAIN_FOREVER_S: f64 = 1.0e6;
const BOWL_RATIOS: [f32; 8] = [1.0, 2.76, 5.40, 8.93, 13.34, 18.64, 24.81, 31.87];
const BOWL_GAINS: [f32; 8] = [1.0, 0.62, 0.40, 0.26, 0.17, 0.11, 0.07, 0.05];
const DRONE_RATIOS: [f32; 5] = [1.0, 1.5, 2.0, 3.0, 4.0];
const DRONE_DETUNE_CENTS: [f32; 5] = [5.0, -3.0, 8.0, -6.0, 4.0];
const DRONE_GAINS: [f32; 5] = [0.4, 0.25, 0.2, 0.1, 0.06];

/// Pool a voice belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceCategory {
    Melody,
    Strike,
    Pad,
    Drone,
    Texture,
}

impl VoiceCategory {
    pub const ALL: [VoiceCategory; 5] = [
        VoiceCategory::Melody,
        VoiceCategory::Strike,
        VoiceCategory::Pad,
        VoiceCategory::Drone,
        VoiceCategory::Texture,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            VoiceCategory::Melody => 0,
            VoiceCategory::Strike => 1,
            VoiceCategory::Pad => 2,
            VoiceCategory::Drone => 3,
            VoiceCategory::Texture => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VoiceCategory::Melody => "melody",
            VoiceCategory::Strike => "strike",
            VoiceCategory::Pad => "pad",
            VoiceCategory::Drone => "drone",
            VoiceCategory::Texture => "texture",
        }
    }
}

/// Everything needed to build one voice. Durations are already resolved
/// (no ranges); randomness is the caller's business.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NoteSpec {
    /// Melodic tone: sine/triangle body, detuned partner, octave partial, slow drift.
    Tone {
        freq: f32,
        attack_s: f32,
        hold_s: f32,
        release_s: f32,
        peak: f32,
        tri_mix: f32,
        octave_partial: f32,
        drift_cents: f32,
    },
    /// Struck bowl: a noise burst exciting `partials` narrow resonators.
    Bowl { freq: f32, peak: f32, decay_s: f32, partials: usize, q: f32 },
    /// Resonant pop: a click through one very narrow band-pass.
    Pop { freq: f32, q: f32, peak: f32, decay_s: f32 },
    /// Surface click for the crackle bed.
    Click { highpass_hz: f32, lowpass_hz: f32, peak: f32, dur_s: f32 },
    /// Three-note chord pad; sustains until released.
    Pad { freqs: [f32; 3], attack_s: f32, peak: f32 },
    /// Five-partial detuned drone; sustains until released.
    Drone { freq: f32, attack_s: f32, peak: f32 },
    /// Degraded tone: a sine folded through a waveshaper.
    Grit { freq: f32, drive: f32, cutoff_hz: f32, peak: f32, dur_s: f32 },
}

impl NoteSpec {
    pub fn category(&self) -> VoiceCategory {
        match self {
            NoteSpec::Tone { .. } => VoiceCategory::Melody,
            NoteSpec::Bowl { .. } | NoteSpec::Pop { .. } | NoteSpec::Grit { .. } => VoiceCategory::Strike,
            NoteSpec::Click { .. } => VoiceCategory::Texture,
            NoteSpec::Pad { .. } => VoiceCategory::Pad,
            NoteSpec::Drone { .. } => VoiceCategory::Drone,
        }
    }

    /// Main pitch, if the voice has one.
    pub fn freq(&self) -> Option<f32> {
        match *self {
            NoteSpec::Tone { freq, .. }
            | NoteSpec::Bowl { freq, .. }
            | NoteSpec::Pop { freq, .. }
            | NoteSpec::Drone { freq, .. }
            | NoteSpec::Grit { freq, .. } => Some(freq),
            NoteSpec::Pad { freqs, .. } => Some(freqs[0]),
            NoteSpec::Click { .. } => None,
        }
    }
}

/// Which summing bus the dry signal lands on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bus {
    Main,
    Pad,
    Crackle,
}

/// Per-voice send levels into the chain's effect inputs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sends {
    pub bus: Bus,
    pub reverb: f32,
    pub crystal: f32,
    pub prism: f32,
}

impl Sends {
    const fn new(bus: Bus, reverb: f32, crystal: f32, prism: f32) -> Self {
        Self { bus, reverb, crystal, prism }
    }
}

#[derive(Clone, Debug)]
struct ToneBody {
    body: Osc,
    tri: Osc,
    partner: Osc,
    octave: Osc,
    freq: f32,
    tri_mix: f32,
    octave_partial: f32,
    drift: NoiseMod,
}

#[derive(Clone, Debug)]
struct BowlBody {
    noise: WhiteNoise,
    partials_osc: [Osc; 8],
    resonators: [SvfTpt; 8],
    levels: [f32; 8],
    decays: [f32; 8],
    partials: usize,
    burst_end: f64,
}

#[derive(Clone, Debug)]
struct PopBody {
    noise: WhiteNoise,
    bp: SvfTpt,
    burst_end: f64,
    gain: f32,
}

#[derive(Clone, Debug)]
struct ClickBody {
    noise: WhiteNoise,
    hp: OnePoleHP,
    lp: OnePoleLP,
}

#[derive(Clone, Debug)]
struct PadBody {
    notes: [Osc; 3],
    detuned: [Osc; 3],
}

#[derive(Clone, Debug)]
struct DroneBody {
    partials: [Osc; 5],
    breath: Lfo,
}

#[derive(Clone, Debug)]
struct GritBody {
    osc: Osc,
    drive: f32,
    lp: OnePoleLP,
}

#[derive(Clone, Debug)]
enum Body {
    Tone(ToneBody),
    Bowl(BowlBody),
    Pop(PopBody),
    Click(ClickBody),
    Pad(PadBody),
    Drone(DroneBody),
    Grit(GritBody),
}

/// One sounding voice.
#[derive(Clone, Debug)]
pub struct Voice {
    id: u64,
    category: VoiceCategory,
    start: f64,
    stop: f64,
    env: ScheduledEnvelope,
    body: Body,
    sends: Sends,
}

impl Voice {
    /// Build a voice whose sound begins at absolute time `start`.
    pub fn new(spec: &NoteSpec, start: f64, sr: f32, seed: u32) -> Self {
        let sr = sr.max(1.0);
        let (env, body, sends) = match *spec {
            NoteSpec::Tone { freq, attack_s, hold_s, release_s, peak, tri_mix, octave_partial, drift_cents } => {
                let a = start + f64::from(attack_s.max(0.005));
                let h = a + f64::from(hold_s.max(0.0));
                let r = h + f64::from(release_s.max(0.01));
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(a, peak)
                    .hold_to(h)
                    .exp_to(r, EXP_FLOOR)
                    .linear_to(r + 0.005, 0.0);
                let body = Body::Tone(ToneBody {
                    body: Osc::new(freq, Wave::Sine),
                    tri: Osc::new(freq, Wave::Tri),
                    partner: Osc::new(freq, Wave::Sine).with_phase(0.31),
                    octave: Osc::new(freq * 2.0, Wave::Sine),
                    freq,
                    tri_mix,
                    octave_partial,
                    drift: NoiseMod::new(-drift_cents, drift_cents, 2.5, 0.4, sr, seed),
                });
                (env, body, Sends::new(Bus::Main, 0.35, 0.6, 0.4))
            }
            NoteSpec::Bowl { freq, peak, decay_s, partials, q } => {
                let partials = partials.clamp(1, BOWL_RATIOS.len());
                let decay_s = decay_s.max(0.1);
                let end = start + f64::from(decay_s);
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(start + 0.004, peak)
                    .exp_to(end, EXP_FLOOR)
                    .linear_to(end + 0.005, 0.0);
                let mut partials_osc = [Osc::new(freq, Wave::Sine); 8];
                let mut resonators = [SvfTpt::new(freq, q, sr); 8];
                let mut decays = [0.0; 8];
                for i in 0..partials {
                    partials_osc[i] = Osc::new(freq * BOWL_RATIOS[i], Wave::Sine).with_phase(i as f32 * 0.13);
                    resonators[i] = SvfTpt::new(freq * BOWL_RATIOS[i], q, sr);
                    decays[i] = decay_per_sample(decay_s / (1.0 + i as f32 * 0.7), sr);
                }
                let body = Body::Bowl(BowlBody {
                    noise: WhiteNoise::new(seed),
                    partials_osc,
                    resonators,
                    levels: BOWL_GAINS,
                    decays,
                    partials,
                    burst_end: start + 0.04,
                });
                (env, body, Sends::new(Bus::Main, 0.5, 0.3, 0.3))
            }
            NoteSpec::Pop { freq, q, peak, decay_s } => {
                let end = start + f64::from(decay_s.max(0.01));
                let env = ScheduledEnvelope::starting_at(start, peak)
                    .exp_to(end, EXP_FLOOR)
                    .linear_to(end + 0.003, 0.0);
                let body = Body::Pop(PopBody {
                    noise: WhiteNoise::new(seed),
                    bp: SvfTpt::new(freq, q, sr),
                    burst_end: start + 0.002,
                    gain: 2.0 + q * 0.25,
                });
                (env, body, Sends::new(Bus::Crackle, 0.15, 0.0, 0.0))
            }
            NoteSpec::Click { highpass_hz, lowpass_hz, peak, dur_s } => {
                let end = start + f64::from(dur_s.max(0.002));
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(start + 0.001, peak)
                    .exp_to(end, EXP_FLOOR)
                    .linear_to(end + 0.002, 0.0);
                let body = Body::Click(ClickBody {
                    noise: WhiteNoise::new(seed),
                    hp: OnePoleHP::new(highpass_hz, sr),
                    lp: OnePoleLP::new(lowpass_hz, sr),
                });
                (env, body, Sends::new(Bus::Crackle, 0.0, 0.0, 0.0))
            }
            NoteSpec::Pad { freqs, attack_s, peak } => {
                let a = start + f64::from(attack_s.max(0.05));
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(a, peak)
                    .hold_to(start + SUSTAIN_FOREVER_S);
                let body = Body::Pad(PadBody {
                    notes: freqs.map(|f| Osc::new(f, Wave::Sine)),
                    detuned: freqs.map(|f| Osc::new(f * cents_to_ratio(4.0), Wave::Tri).with_phase(0.5)),
                });
                (env, body, Sends::new(Bus::Pad, 0.4, 0.0, 0.2))
            }
            NoteSpec::Drone { freq, attack_s, peak } => {
                let a = start + f64::from(attack_s.max(0.05));
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(a, peak)
                    .hold_to(start + SUSTAIN_FOREVER_S);
                let mut partials = [Osc::new(freq, Wave::Sine); 5];
                for (i, p) in partials.iter_mut().enumerate() {
                    *p = Osc::new(freq * DRONE_RATIOS[i] * cents_to_ratio(DRONE_DETUNE_CENTS[i]), Wave::Sine)
                        .with_phase(i as f32 * 0.17);
                }
                let body = Body::Drone(DroneBody { partials, breath: Lfo::sine(0.05) });
                (env, body, Sends::new(Bus::Pad, 0.3, 0.0, 0.0))
            }
            NoteSpec::Grit { freq, drive, cutoff_hz, peak, dur_s } => {
                let end = start + f64::from(dur_s.max(0.05));
                let env = ScheduledEnvelope::starting_at(start, 0.0)
                    .linear_to(start + 0.01, peak)
                    .exp_to(end, EXP_FLOOR)
                    .linear_to(end + 0.005, 0.0);
                let body = Body::Grit(GritBody {
                    osc: Osc::new(freq, Wave::Sine),
                    drive,
                    lp: OnePoleLP::new(cutoff_hz, sr),
                });
                (env, body, Sends::new(Bus::Main, 0.2, 0.0, 0.1))
            }
        };
        Self { id: 0, category: spec.category(), start, stop: env.end_time(), env, body, sends }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    #[inline]
    pub fn category(&self) -> VoiceCategory {
        self.category
    }

    #[inline]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Absolute time after which the voice is silent for good.
    #[inline]
    pub fn stop(&self) -> f64 {
        self.stop
    }

    #[inline]
    pub fn sends(&self) -> Sends {
        self.sends
    }

    #[inline]
    pub fn is_finished(&self, now: f64) -> bool {
        now >= self.stop
    }

    /// Envelope level at `t`.
    #[inline]
    pub fn level_at(&self, t: f64) -> f32 {
        self.env.value_at(t)
    }

    /// Fade out over `fade_s` from `now`. Never lengthens the voice; releasing
    /// a voice that is already gone is harmless.
    pub fn force_release(&mut self, now: f64, fade_s: f32) {
        if self.is_finished(now) {
            return;
        }
        let natural = self.stop;
        if natural <= now + f64::from(fade_s) {
            return;
        }
        self.env.release_from(now, fade_s);
        self.stop = self.env.end_time().min(natural);
    }

    /// One sample at absolute time `t`.
    #[inline]
    pub fn render(&mut self, t: f64, sr: f32) -> f32 {
        if t < self.start || t >= self.stop {
            return 0.0;
        }
        let amp = self.env.value_at(t);
        let x = match &mut self.body {
            Body::Tone(b) => {
                let f = b.freq * cents_to_ratio(b.drift.next(sr));
                b.body.set_freq(f);
                b.tri.set_freq(f);
                b.partner.set_freq(f * cents_to_ratio(3.0));
                b.octave.set_freq(f * 2.0);
                let core = lerp(b.body.next(sr), b.tri.next(sr), b.tri_mix);
                (core + 0.35 * b.partner.next(sr) + b.octave_partial * b.octave.next(sr)) * 0.7
            }
            Body::Bowl(b) => {
                // The resonators colour the strike; the sines carry the ring.
                let excite = if t < b.burst_end { b.noise.next() } else { 0.0 };
                let mut sum = 0.0;
                for i in 0..b.partials {
                    let strike = b.resonators[i].process_bp(excite) * 8.0;
                    sum += (b.partials_osc[i].next(sr) + strike) * b.levels[i];
                    b.levels[i] *= b.decays[i];
                }
                sum * 0.4
            }
            Body::Pop(b) => {
                let excite = if t < b.burst_end { b.noise.next() } else { 0.0 };
                b.bp.process_bp(excite) * b.gain
            }
            Body::Click(b) => b.lp.process(b.hp.process(b.noise.next())),
            Body::Pad(b) => {
                let mut sum = 0.0;
                for (n, d) in b.notes.iter_mut().zip(b.detuned.iter_mut()) {
                    sum += n.next(sr) + 0.5 * d.next(sr);
                }
                sum * (1.0 / 3.0)
            }
            Body::Drone(b) => {
                let breath = 1.0 + 0.15 * b.breath.next_norm(sr);
                let mut sum = 0.0;
                for (i, p) in b.partials.iter_mut().enumerate() {
                    let g = if i == 0 { DRONE_GAINS[i] } else { DRONE_GAINS[i] * breath };
                    sum += p.next(sr) * g;
                }
                sum
            }
            Body::Grit(b) => b.lp.process(shaper_curve(b.osc.next(sr), b.drive)) * 0.5,
        };
        x * amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn tone(freq: f32) -> NoteSpec {
        NoteSpec::Tone {
            freq,
            attack_s: 0.05,
            hold_s: 0.1,
            release_s: 0.2,
            peak: 0.5,
            tri_mix: 0.3,
            octave_partial: 0.1,
            drift_cents: 4.0,
        }
    }

    fn run(v: &mut Voice, from: f64, secs: f64) -> f32 {
        let n = (secs * f64::from(SR)) as usize;
        let mut peak = 0.0f32;
        for i in 0..n {
            let y = v.render(from + i as f64 / f64::from(SR), SR);
            assert!(y.is_finite());
            peak = peak.max(y.abs());
        }
        peak
    }

    #[test]
    fn stop_time_is_known_at_creation() {
        let v = Voice::new(&tone(220.0), 1.0, SR, 3);
        assert!((v.stop() - (1.0 + 0.05 + 0.1 + 0.2 + 0.005)).abs() < 1e-6);
        assert!(!v.is_finished(1.2));
        assert!(v.is_finished(1.36));
    }

    #[test]
    fn silent_before_start_and_after_stop() {
        let mut v = Voice::new(&tone(220.0), 0.5, SR, 3);
        assert_eq!(run(&mut v, 0.0, 0.4), 0.0);
        assert!(run(&mut v, 0.5, 0.35) > 0.05);
        assert_eq!(v.render(v.stop() + 0.01, SR), 0.0);
    }

    #[test]
    fn categories_follow_the_spec_kind() {
        assert_eq!(tone(1.0).category(), VoiceCategory::Melody);
        let pop = NoteSpec::Pop { freq: 900.0, q: 30.0, peak: 0.1, decay_s: 0.05 };
        assert_eq!(pop.category(), VoiceCategory::Strike);
        let click = NoteSpec::Click { highpass_hz: 500.0, lowpass_hz: 3000.0, peak: 0.01, dur_s: 0.01 };
        assert_eq!(click.category(), VoiceCategory::Texture);
        assert_eq!(click.freq(), None);
        let pad = NoteSpec::Pad { freqs: [110.0, 165.0, 220.0], attack_s: 1.0, peak: 0.1 };
        assert_eq!(pad.category(), VoiceCategory::Pad);
    }

    #[test]
    fn force_release_shortens_sustained_voices() {
        let mut v = Voice::new(&NoteSpec::Drone { freq: 65.0, attack_s: 0.5, peak: 0.2 }, 0.0, SR, 9);
        assert!(v.stop() > 1000.0);
        v.force_release(2.0, 0.5);
        assert!(v.stop() <= 2.5 + 0.006);
        assert!(v.level_at(2.0) > 0.1);
        assert_eq!(v.level_at(2.6), 0.0);
    }

    #[test]
    fn force_release_never_lengthens() {
        let mut v = Voice::new(&tone(330.0), 0.0, SR, 1);
        let natural = v.stop();
        v.force_release(0.3, 5.0);
        assert_eq!(v.stop(), natural);
        v.force_release(natural + 1.0, 0.1);
        assert_eq!(v.stop(), natural);
    }

    #[test]
    fn bowl_rings_and_decays() {
        let spec = NoteSpec::Bowl { freq: 220.0, peak: 0.3, decay_s: 2.0, partials: 7, q: 40.0 };
        let mut v = Voice::new(&spec, 0.0, SR, 5);
        let early = run(&mut v, 0.0, 0.3);
        let late = run(&mut v, 1.6, 0.3);
        assert!(early > 0.0);
        assert!(late < early);
    }
}
