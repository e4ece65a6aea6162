//! Lullwave engine: a generative ambient composer steered by one XY point.
//!
//! Crate layout:
//! - [`world`], [`mapping`] : the control square, quadrant weights and parameter targets
//! - [`harmony`]            : per-world chord palettes, scales and pattern walks
//! - [`voice`], [`pool`]    : note bodies and bounded, self-cleaning voice pools
//! - [`effects`]            : the master chain (filters, delays, reverb, drive, limiter)
//! - [`scheduler`], [`sequencer`] : role timers and what each role plays when it fires
//! - [`events`]             : musical event bus and the energy meter
//! - [`composer`]           : the orchestrator tying the above to one session clock
//! - [`host`]               : the audio subsystem seam (offline, or cpal with `realtime`)
//! - [`graph`]              : `Generator` trait and `Engine<G>` wrapper
//!
//! Nothing allocates on the render path once a session is initialized.

pub mod composer;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod graph;
pub mod guard;
pub mod harmony;
pub mod host;
pub mod mapping;
pub mod nodes;
pub mod pool;
pub mod reverb;
pub mod scheduler;
pub mod sequencer;
pub mod voice;
pub mod world;

pub use composer::{Composer, Lifecycle, Snapshot};
pub use config::ComposerConfig;
pub use error::{ComposerError, InitError};
pub use events::{Energy, EventKind, MusicalEvent, StrikeStyle};
pub use graph::{Engine, Generator};
pub use host::{AudioSubsystem, OfflineHost, StreamSpec};
pub use mapping::ParamTargets;
pub use voice::VoiceCategory;
pub use world::{ControlPoint, QuadrantWeights, World};

#[cfg(feature = "realtime")]
pub use host::CpalHost;
