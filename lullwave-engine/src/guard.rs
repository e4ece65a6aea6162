//! Terminal safety stage: a peak limiter that also swallows non-finite samples.

use lullwave_core::dsp::lin_to_db;

#[derive(Clone, Copy, Debug)]
pub struct PeakLimiterParams {
    pub ceiling: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for PeakLimiterParams {
    fn default() -> Self {
        Self { ceiling: 0.98, attack_ms: 0.5, release_ms: 120.0 }
    }
}

/// What the limiter did since the last [`PeakLimiter::take_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GuardStats {
    pub max_abs_in: f32,
    pub max_reduction_db: f32,
    pub num_over: u64,
    pub num_non_finite: u64,
}

#[derive(Debug, Clone)]
pub struct PeakLimiter {
    ceiling: f32,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
    stats: GuardStats,
}

impl PeakLimiter {
    pub fn new(params: PeakLimiterParams, sample_rate: f32) -> Self {
        let sample_rate = sample_rate.max(1.0);
        Self {
            ceiling: params.ceiling.abs().max(1e-6),
            gain: 1.0,
            attack_coeff: time_to_coeff(params.attack_ms, sample_rate),
            release_coeff: time_to_coeff(params.release_ms, sample_rate),
            stats: GuardStats::default(),
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let x = if x.is_finite() {
            x
        } else {
            self.stats.num_non_finite += 1;
            0.0
        };
        let abs_in = x.abs();
        if abs_in > self.stats.max_abs_in {
            self.stats.max_abs_in = abs_in;
        }
        let target_gain = if abs_in > self.ceiling {
            self.stats.num_over += 1;
            self.ceiling / abs_in
        } else {
            1.0
        };
        self.gain = smooth_gain(self.gain, target_gain, self.attack_coeff, self.release_coeff);
        let y = (x * self.gain).clamp(-self.ceiling, self.ceiling);
        if abs_in > 1e-12 {
            let reduction = -lin_to_db(y.abs() / abs_in);
            if reduction > self.stats.max_reduction_db {
                self.stats.max_reduction_db = reduction;
            }
        }
        y
    }

    pub fn take_stats(&mut self) -> GuardStats {
        core::mem::take(&mut self.stats)
    }
}

fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_s = time_ms.max(0.0) * 0.001;
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate)).exp()
    }
}

fn smooth_gain(current: f32, target: f32, attack_coeff: f32, release_coeff: f32) -> f32 {
    if target < current {
        attack_coeff * current + (1.0 - attack_coeff) * target
    } else {
        release_coeff * current + (1.0 - release_coeff) * target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_never_exceeds_ceiling() {
        let mut l = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        for i in 0..48_000 {
            let x = 3.0 * ((i as f32) * 0.05).sin();
            assert!(l.process(x).abs() <= 0.98 + 1e-6);
        }
        let stats = l.take_stats();
        assert!(stats.num_over > 0);
        assert!(stats.max_reduction_db > 6.0);
        assert_eq!(l.take_stats(), GuardStats::default());
    }

    #[test]
    fn quiet_signal_passes_untouched() {
        let mut l = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        assert_eq!(l.process(0.25), 0.25);
        assert_eq!(l.take_stats().num_over, 0);
    }

    #[test]
    fn non_finite_input_becomes_silence() {
        let mut l = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        assert_eq!(l.process(f32::NAN), 0.0);
        assert_eq!(l.process(f32::INFINITY), 0.0);
        assert_eq!(l.take_stats().num_non_finite, 2);
    }
}
