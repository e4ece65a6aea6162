//! Session configuration, loadable from TOML. Every field has a default so a
//! partial (or empty) file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::voice::VoiceCategory;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposerConfig {
    /// Control ("animation frame") ticks per second.
    #[serde(default = "ComposerConfig::default_tick_rate_hz")]
    pub tick_rate_hz: f32,
    /// Samples rendered between control updates inside `render`.
    #[serde(default = "ComposerConfig::default_control_block")]
    pub control_block: usize,
    /// Fixed RNG seed; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "ComposerConfig::default_fade_in_tau_s")]
    pub fade_in_tau_s: f32,
    #[serde(default = "ComposerConfig::default_fade_out_tau_s")]
    pub fade_out_tau_s: f32,
    /// Time constant of the smoothed ControlPoint copy the mapping reads.
    #[serde(default = "ComposerConfig::default_point_smoothing_tau_s")]
    pub point_smoothing_tau_s: f32,
    #[serde(default = "ComposerConfig::default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "ComposerConfig::default_initial_point")]
    pub initial_point: [f32; 2],
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl ComposerConfig {
    fn default_tick_rate_hz() -> f32 {
        60.0
    }
    fn default_control_block() -> usize {
        64
    }
    fn default_fade_in_tau_s() -> f32 {
        2.5
    }
    fn default_fade_out_tau_s() -> f32 {
        0.5
    }
    fn default_point_smoothing_tau_s() -> f32 {
        0.25
    }
    fn default_event_capacity() -> usize {
        256
    }
    fn default_initial_point() -> [f32; 2] {
        [0.3, 0.35]
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read `path` if it exists and parses, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(text) => match Self::from_toml_str(&text) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read config, using defaults");
                Self::default()
            }
        }
    }

    pub fn frame_dt(&self) -> f64 {
        1.0 / f64::from(self.tick_rate_hz.max(1.0))
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: Self::default_tick_rate_hz(),
            control_block: Self::default_control_block(),
            seed: None,
            fade_in_tau_s: Self::default_fade_in_tau_s(),
            fade_out_tau_s: Self::default_fade_out_tau_s(),
            point_smoothing_tau_s: Self::default_point_smoothing_tau_s(),
            event_capacity: Self::default_event_capacity(),
            initial_point: Self::default_initial_point(),
            smoothing: SmoothingConfig::default(),
            pools: PoolsConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

/// Time constants used when applying mapped targets to the effect chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SmoothingConfig {
    /// Filter cutoffs and other "light" parameters.
    #[serde(default = "SmoothingConfig::default_fast_tau_s")]
    pub fast_tau_s: f32,
    /// Gains, sends, delay times.
    #[serde(default = "SmoothingConfig::default_medium_tau_s")]
    pub medium_tau_s: f32,
    /// Reverb character.
    #[serde(default = "SmoothingConfig::default_slow_tau_s")]
    pub slow_tau_s: f32,
    /// Reverb decay is only re-applied when it moved at least this much.
    #[serde(default = "SmoothingConfig::default_decay_min_delta_s")]
    pub decay_min_delta_s: f32,
}

impl SmoothingConfig {
    fn default_fast_tau_s() -> f32 {
        0.1
    }
    fn default_medium_tau_s() -> f32 {
        0.2
    }
    fn default_slow_tau_s() -> f32 {
        0.35
    }
    fn default_decay_min_delta_s() -> f32 {
        0.5
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            fast_tau_s: Self::default_fast_tau_s(),
            medium_tau_s: Self::default_medium_tau_s(),
            slow_tau_s: Self::default_slow_tau_s(),
            decay_min_delta_s: Self::default_decay_min_delta_s(),
        }
    }
}

/// Bounds and fades for one voice pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    /// Fade applied to the oldest voice when the bound is exceeded.
    pub eviction_fade_s: f32,
    /// Fade applied to every active voice on `stop()`.
    pub stop_fade_s: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoolsConfig {
    #[serde(default = "PoolsConfig::default_melody")]
    pub melody: PoolConfig,
    #[serde(default = "PoolsConfig::default_strike")]
    pub strike: PoolConfig,
    #[serde(default = "PoolsConfig::default_pad")]
    pub pad: PoolConfig,
    #[serde(default = "PoolsConfig::default_drone")]
    pub drone: PoolConfig,
    #[serde(default = "PoolsConfig::default_texture")]
    pub texture: PoolConfig,
}

impl PoolsConfig {
    fn default_melody() -> PoolConfig {
        PoolConfig { max_concurrent: 12, eviction_fade_s: 0.3, stop_fade_s: 1.5 }
    }
    fn default_strike() -> PoolConfig {
        PoolConfig { max_concurrent: 8, eviction_fade_s: 0.5, stop_fade_s: 1.0 }
    }
    fn default_pad() -> PoolConfig {
        PoolConfig { max_concurrent: 3, eviction_fade_s: 0.5, stop_fade_s: 2.0 }
    }
    fn default_drone() -> PoolConfig {
        PoolConfig { max_concurrent: 2, eviction_fade_s: 0.5, stop_fade_s: 2.0 }
    }
    fn default_texture() -> PoolConfig {
        PoolConfig { max_concurrent: 24, eviction_fade_s: 0.2, stop_fade_s: 0.2 }
    }

    pub fn get(&self, category: VoiceCategory) -> PoolConfig {
        match category {
            VoiceCategory::Melody => self.melody,
            VoiceCategory::Strike => self.strike,
            VoiceCategory::Pad => self.pad,
            VoiceCategory::Drone => self.drone,
            VoiceCategory::Texture => self.texture,
        }
    }
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            melody: Self::default_melody(),
            strike: Self::default_strike(),
            pad: Self::default_pad(),
            drone: Self::default_drone(),
            texture: Self::default_texture(),
        }
    }
}

/// First-fire windows `[min, max]` in seconds after `start()`, plus the pad
/// cross-fade used on chord changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "TimingConfig::default_harmony_first")]
    pub harmony_first_s: [f32; 2],
    #[serde(default = "TimingConfig::default_melody_first")]
    pub melody_first_s: [f32; 2],
    #[serde(default = "TimingConfig::default_strike_first")]
    pub strike_first_s: [f32; 2],
    #[serde(default = "TimingConfig::default_crackle_first")]
    pub crackle_first_s: [f32; 2],
    #[serde(default = "TimingConfig::default_chord_crossfade_s")]
    pub chord_crossfade_s: f32,
    /// Delay before harmony follows a change of dominant world.
    #[serde(default = "TimingConfig::default_world_change_s")]
    pub world_change_s: [f32; 2],
}

impl TimingConfig {
    fn default_harmony_first() -> [f32; 2] {
        [0.5, 2.0]
    }
    fn default_melody_first() -> [f32; 2] {
        [4.0, 9.0]
    }
    fn default_strike_first() -> [f32; 2] {
        [6.0, 12.0]
    }
    fn default_crackle_first() -> [f32; 2] {
        [0.3, 1.5]
    }
    fn default_chord_crossfade_s() -> f32 {
        6.0
    }
    fn default_world_change_s() -> [f32; 2] {
        [1.0, 3.0]
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            harmony_first_s: Self::default_harmony_first(),
            melody_first_s: Self::default_melody_first(),
            strike_first_s: Self::default_strike_first(),
            crackle_first_s: Self::default_crackle_first(),
            chord_crossfade_s: Self::default_chord_crossfade_s(),
            world_change_s: Self::default_world_change_s(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("lullwave_config_test_{}_{}", name, std::process::id()));
        p
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ComposerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ComposerConfig::default());
        assert_eq!(cfg.pools.melody.max_concurrent, 12);
        assert_eq!(cfg.initial_point, [0.3, 0.35]);
    }

    #[test]
    fn partial_document_overrides_only_named_keys() {
        let text = r#"
            seed = 42
            tick_rate_hz = 30.0

            [smoothing]
            slow_tau_s = 0.3

            [pools.texture]
            max_concurrent = 4
            eviction_fade_s = 0.25
            stop_fade_s = 0.1
        "#;
        let cfg = ComposerConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.tick_rate_hz, 30.0);
        assert_eq!(cfg.smoothing.slow_tau_s, 0.3);
        assert_eq!(cfg.smoothing.fast_tau_s, 0.1);
        assert_eq!(cfg.pools.texture.max_concurrent, 4);
        assert_eq!(cfg.pools.melody, ComposerConfig::default().pools.melody);
    }

    #[test]
    fn load_or_default_reads_existing_and_tolerates_garbage() {
        let path = unique_path("custom.toml");
        let custom = ComposerConfig { seed: Some(7), event_capacity: 16, ..ComposerConfig::default() };
        fs::write(&path, toml::to_string_pretty(&custom).unwrap()).unwrap();
        assert_eq!(ComposerConfig::load_or_default(&path), custom);

        fs::write(&path, "tick_rate_hz = \"fast\"").unwrap();
        assert_eq!(ComposerConfig::load_or_default(&path), ComposerConfig::default());
        let _ = fs::remove_file(&path);

        assert_eq!(ComposerConfig::load_or_default(unique_path("missing.toml")), ComposerConfig::default());
    }
}
