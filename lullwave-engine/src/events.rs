//! Fire-and-forget notifications and the energy meter for the visual layer.
//!
//! Nothing here is ever read back into audio decisions. Events go out over a
//! bounded channel with `try_send`: a slow or absent consumer loses events, it
//! never stalls the composer.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::world::World;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrikeStyle {
    Bowl,
    Pop,
    Grit,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    NoteOn { freq: f32, degree: u8 },
    ChordChange { name: &'static str, index: usize, world: World },
    Strike { freq: f32, style: StrikeStyle },
    WorldChange { world: World },
}

/// One notification, stamped with session time in seconds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MusicalEvent {
    pub time: f64,
    pub kind: EventKind,
}

/// Sending side of the event channel plus bookkeeping.
#[derive(Debug)]
pub struct EventBus {
    tx: Sender<MusicalEvent>,
    rx: Receiver<MusicalEvent>,
    last: Option<MusicalEvent>,
    sent: u64,
    dropped: u64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx, last: None, sent: 0, dropped: 0 }
    }

    pub fn emit(&mut self, event: MusicalEvent) {
        self.last = Some(event);
        match self.tx.try_send(event) {
            Ok(()) => self.sent += 1,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    tracing::warn!(dropped = self.dropped, "event channel full, dropping notifications");
                }
            }
        }
    }

    /// A receiver for the shared queue. Receivers compete for events; each
    /// event is delivered to one of them.
    pub fn subscribe(&self) -> Receiver<MusicalEvent> {
        self.rx.clone()
    }

    /// Pop the oldest queued event, if any.
    pub fn poll(&self) -> Option<MusicalEvent> {
        self.rx.try_recv().ok()
    }

    #[inline]
    pub fn last(&self) -> Option<MusicalEvent> {
        self.last
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Audio-reactive scalars in `[0, 1]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Energy {
    pub overall: f32,
    pub drone: f32,
    pub motif: f32,
    pub texture: f32,
}

/// Per-frame decay factors at the reference frame rate.
const REFERENCE_FPS: f32 = 60.0;
const DECAY: Energy = Energy { overall: 0.985, drone: 0.992, motif: 0.975, texture: 0.988 };

#[derive(Copy, Clone, Debug, Default)]
pub struct EnergyMeter {
    e: Energy,
}

impl EnergyMeter {
    #[inline]
    pub fn value(&self) -> Energy {
        self.e
    }

    /// Decay by `dt` seconds; identical result however `dt` is sliced.
    pub fn decay(&mut self, dt: f32) {
        let frames = dt.max(0.0) * REFERENCE_FPS;
        self.e.overall *= DECAY.overall.powf(frames);
        self.e.drone *= DECAY.drone.powf(frames);
        self.e.motif *= DECAY.motif.powf(frames);
        self.e.texture *= DECAY.texture.powf(frames);
    }

    pub fn note(&mut self) {
        self.e.motif = self.e.motif.max(0.6);
        self.e.overall = self.e.overall.max(0.5);
    }

    pub fn chord(&mut self) {
        self.e.drone = self.e.drone.max(0.7);
        self.e.overall = self.e.overall.max(0.6);
    }

    pub fn strike(&mut self) {
        self.e.drone = self.e.drone.max(0.4);
        self.e.overall = self.e.overall.max(0.8);
    }

    pub fn texture(&mut self) {
        self.e.texture = self.e.texture.max(0.5);
    }

    pub fn reset(&mut self) {
        self.e = Energy::default();
    }
}
