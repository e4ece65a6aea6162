//! Self-re-arming timers on the session clock.
//!
//! Each role owns exactly one slot, so "two melody loops" cannot exist: arming
//! an armed role moves its due time instead of adding a second timer.
//!
//! ```text
//! Idle ──arm──► Armed{due} ──due reached──► Firing ──re-arm──► Armed{due}
//!   ▲                │                         │
//!   └──── disarm ────┴─────────────────────────┘
//! ```

use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Melody,
    Harmony,
    Strike,
    Crackle,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Melody, Role::Harmony, Role::Strike, Role::Crackle];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Role::Melody => 0,
            Role::Harmony => 1,
            Role::Strike => 2,
            Role::Crackle => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Melody => "melody",
            Role::Harmony => "harmony",
            Role::Strike => "strike",
            Role::Crackle => "crackle",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TimerState {
    Idle,
    Armed { due: f64 },
    Firing,
}

/// The four role timers of a session.
#[derive(Clone, Debug)]
pub struct Timers {
    slots: [TimerState; 4],
    fired: [u64; 4],
}

impl Default for Timers {
    fn default() -> Self {
        Self { slots: [TimerState::Idle; 4], fired: [0; 4] }
    }
}

impl Timers {
    #[inline]
    pub fn state(&self, role: Role) -> TimerState {
        self.slots[role.index()]
    }

    /// Arm (or re-arm) `role` to fire at absolute time `due`.
    pub fn arm(&mut self, role: Role, due: f64) {
        self.slots[role.index()] = TimerState::Armed { due };
    }

    pub fn disarm(&mut self, role: Role) {
        self.slots[role.index()] = TimerState::Idle;
    }

    pub fn disarm_all(&mut self) {
        self.slots = [TimerState::Idle; 4];
    }

    /// Earliest armed due time and its role; ties go to [`Role::ALL`] order.
    pub fn next_due(&self) -> Option<(Role, f64)> {
        let mut best: Option<(Role, f64)> = None;
        for role in Role::ALL {
            if let TimerState::Armed { due } = self.slots[role.index()] {
                if best.map_or(true, |(_, b)| due < b) {
                    best = Some((role, due));
                }
            }
        }
        best
    }

    /// Move `role` from armed to firing. Returns false if it was not armed.
    pub fn begin_fire(&mut self, role: Role) -> bool {
        let slot = &mut self.slots[role.index()];
        if matches!(slot, TimerState::Armed { .. }) {
            *slot = TimerState::Firing;
            self.fired[role.index()] += 1;
            true
        } else {
            false
        }
    }

    /// Leave the firing state without re-arming (the session stopped mid-fire).
    pub fn end_fire(&mut self, role: Role) {
        let slot = &mut self.slots[role.index()];
        if *slot == TimerState::Firing {
            *slot = TimerState::Idle;
        }
    }

    /// Timers that are armed or firing.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| **s != TimerState::Idle).count()
    }

    #[inline]
    pub fn fired(&self, role: Role) -> u64 {
        self.fired[role.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_twice_keeps_one_timer() {
        let mut t = Timers::default();
        t.arm(Role::Melody, 5.0);
        t.arm(Role::Melody, 2.0);
        assert_eq!(t.pending(), 1);
        assert_eq!(t.next_due(), Some((Role::Melody, 2.0)));
    }

    #[test]
    fn next_due_picks_earliest_then_role_order() {
        let mut t = Timers::default();
        t.arm(Role::Crackle, 1.0);
        t.arm(Role::Harmony, 1.0);
        t.arm(Role::Strike, 0.5);
        assert_eq!(t.next_due(), Some((Role::Strike, 0.5)));
        t.disarm(Role::Strike);
        assert_eq!(t.next_due(), Some((Role::Harmony, 1.0)));
    }

    #[test]
    fn fire_cycle() {
        let mut t = Timers::default();
        assert!(!t.begin_fire(Role::Melody));
        t.arm(Role::Melody, 0.0);
        assert!(t.begin_fire(Role::Melody));
        assert_eq!(t.state(Role::Melody), TimerState::Firing);
        assert_eq!(t.next_due(), None);
        t.arm(Role::Melody, 3.0);
        assert_eq!(t.fired(Role::Melody), 1);
        t.disarm_all();
        assert_eq!(t.pending(), 0);
        t.end_fire(Role::Melody);
        assert_eq!(t.state(Role::Melody), TimerState::Idle);
    }
}
