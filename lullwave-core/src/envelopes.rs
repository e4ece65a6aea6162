//! Envelopes on an absolute timeline and parameter slewing.
//!
//! - `ScheduledEnvelope` : breakpoint envelope evaluated at absolute session time
//!   (seconds, `f64`). Segments ramp linearly or exponentially *into* each
//!   breakpoint, so a note can be fully scheduled the moment it is triggered
//!   and later cut short with [`ScheduledEnvelope::release_from`].
//! - `ParamSlew`         : exponential approach to a target with a time constant
//!   in seconds, advanced by arbitrary `dt` (control rate).
//!
//! Both are `Copy`, allocation free and cheap to evaluate.

use crate::dsp::approach_coeff;

/// Lowest value an exponential segment may touch (exp ramps cannot reach zero).
pub const EXP_FLOOR: f32 = 1.0e-4;

/// Maximum breakpoints per envelope.
pub const MAX_POINTS: usize = 6;

/// How a segment reaches its breakpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ramp {
    /// Jump at the breakpoint time.
    Step,
    Linear,
    Exponential,
}

#[derive(Copy, Clone, Debug)]
struct Breakpoint {
    t: f64,
    value: f32,
    ramp: Ramp,
}

/// Breakpoint envelope keyed to absolute time.
///
/// Before the first breakpoint the envelope reads 0; after the last it holds
/// the last value.
#[derive(Copy, Clone, Debug)]
pub struct ScheduledEnvelope {
    points: [Breakpoint; MAX_POINTS],
    len: usize,
}

impl ScheduledEnvelope {
    /// New envelope sitting at `value` from time `t`.
    #[inline]
    pub fn starting_at(t: f64, value: f32) -> Self {
        let points = [Breakpoint { t, value, ramp: Ramp::Step }; MAX_POINTS];
        Self { points, len: 1 }
    }

    #[inline]
    fn push(mut self, t: f64, value: f32, ramp: Ramp) -> Self {
        debug_assert!(self.len < MAX_POINTS, "envelope breakpoint capacity exceeded");
        if self.len >= MAX_POINTS {
            return self;
        }
        let prev = self.points[self.len - 1].t;
        self.points[self.len] = Breakpoint { t: t.max(prev), value, ramp };
        self.len += 1;
        self
    }

    /// Linear ramp arriving at `value` at time `t`.
    #[inline]
    pub fn linear_to(self, t: f64, value: f32) -> Self {
        self.push(t, value, Ramp::Linear)
    }

    /// Exponential ramp arriving at `value` at time `t` (values floored at [`EXP_FLOOR`]).
    #[inline]
    pub fn exp_to(self, t: f64, value: f32) -> Self {
        self.push(t, value.max(EXP_FLOOR), Ramp::Exponential)
    }

    /// Hold the current value until `t`.
    #[inline]
    pub fn hold_to(self, t: f64) -> Self {
        let v = self.points[self.len - 1].value;
        self.push(t, v, Ramp::Linear)
    }

    /// Time of the last breakpoint; the envelope is constant afterwards.
    #[inline]
    pub fn end_time(&self) -> f64 { self.points[self.len - 1].t }

    /// Evaluate at absolute time `t`.
    #[inline]
    pub fn value_at(&self, t: f64) -> f32 {
        let first = &self.points[0];
        if t < first.t {
            return 0.0;
        }
        for i in 1..self.len {
            let b = &self.points[i];
            if t < b.t {
                let a = &self.points[i - 1];
                let span = b.t - a.t;
                let frac = if span > 0.0 { ((t - a.t) / span) as f32 } else { 1.0 };
                return match b.ramp {
                    Ramp::Step => a.value,
                    Ramp::Linear => a.value + (b.value - a.value) * frac,
                    Ramp::Exponential => {
                        let v0 = a.value.max(EXP_FLOOR);
                        v0 * (b.value / v0).powf(frac)
                    }
                };
            }
        }
        self.points[self.len - 1].value
    }

    /// Replace everything after `now` with an exponential fade to silence
    /// lasting `fade_s`. Works whether or not the envelope has started yet.
    #[inline]
    pub fn release_from(&mut self, now: f64, fade_s: f32) {
        let v = self.value_at(now);
        let end = now + f64::from(fade_s.max(0.0));
        *self = if v <= EXP_FLOOR {
            Self::starting_at(now, 0.0).hold_to(end)
        } else {
            Self::starting_at(now, v).exp_to(end, EXP_FLOOR).linear_to(end + 0.005, 0.0)
        };
    }
}

// -------------------------------- Parameter slew ---------------------------------

/// Exponential approach to a target: after each `advance(dt)` the remaining
/// distance shrinks by `exp(-dt / tau)`.
#[derive(Copy, Clone, Debug)]
pub struct ParamSlew {
    value: f32,
    target: f32,
    tau_s: f32,
}

impl ParamSlew {
    #[inline]
    pub fn new(value: f32) -> Self {
        Self { value, target: value, tau_s: 0.0 }
    }

    /// Start moving towards `target` with time constant `tau_s` (0 jumps on next advance).
    #[inline]
    pub fn set_target(&mut self, target: f32, tau_s: f32) {
        if target.is_finite() {
            self.target = target;
            self.tau_s = tau_s.max(0.0);
        }
    }

    /// Set value and target immediately.
    #[inline]
    pub fn jump(&mut self, value: f32) {
        if value.is_finite() {
            self.value = value;
            self.target = value;
        }
    }

    #[inline]
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.value += (self.target - self.value) * approach_coeff(dt, self.tau_s);
        self.value
    }

    #[inline] pub fn value(&self) -> f32 { self.value }
    #[inline] pub fn target(&self) -> f32 { self.target }

    #[inline]
    pub fn is_settled(&self, eps: f32) -> bool {
        (self.target - self.value).abs() <= eps
    }
}

// ------------------------------------ Tests --------------------------------------
