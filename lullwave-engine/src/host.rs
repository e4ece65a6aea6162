//! The audio subsystem seam.
//!
//! [`Composer::init`](crate::Composer::init) asks an [`AudioSubsystem`] for a
//! stream description before it builds anything; this is where platform
//! failures (no device, permission denied) enter the engine.
//!
//! - [`OfflineHost`] always succeeds; used for rendering to buffers and tests.
//! - `CpalHost` (feature `realtime`) probes a real output device.

use crate::error::InitError;

/// What the engine needs to know about the output it will feed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StreamSpec {
    pub sample_rate: f32,
    pub channels: u16,
}

impl StreamSpec {
    pub fn validate(self) -> Result<Self, InitError> {
        if !self.sample_rate.is_finite() || self.sample_rate < 1000.0 {
            return Err(InitError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(InitError::UnsupportedFormat("zero output channels".into()));
        }
        Ok(self)
    }
}

pub trait AudioSubsystem {
    /// Bring the subsystem up (or confirm it is up) and describe the stream.
    fn open(&mut self) -> Result<StreamSpec, InitError>;
}

/// Buffer-rendering host: no device, never fails for a sane rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OfflineHost {
    pub sample_rate: f32,
    pub channels: u16,
}

impl OfflineHost {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate, channels: 1 }
    }
}

impl AudioSubsystem for OfflineHost {
    fn open(&mut self) -> Result<StreamSpec, InitError> {
        StreamSpec { sample_rate: self.sample_rate, channels: self.channels }.validate()
    }
}

#[cfg(feature = "realtime")]
pub use self::realtime::CpalHost;

#[cfg(feature = "realtime")]
mod realtime {
    use cpal::traits::{DeviceTrait, HostTrait};

    use super::{AudioSubsystem, StreamSpec};
    use crate::error::InitError;

    /// Output device picked through cpal. After a successful `open` the chosen
    /// device and stream config are available for building the stream.
    pub struct CpalHost {
        device_name: Option<String>,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        opened: Option<(cpal::Device, cpal::SupportedStreamConfig)>,
    }

    impl CpalHost {
        pub fn new(device_name: Option<String>, sample_rate: Option<u32>, channels: Option<u16>) -> Self {
            Self { device_name, sample_rate, channels, opened: None }
        }

        pub fn device(&self) -> Option<&cpal::Device> {
            self.opened.as_ref().map(|(d, _)| d)
        }

        pub fn stream_config(&self) -> Option<&cpal::SupportedStreamConfig> {
            self.opened.as_ref().map(|(_, c)| c)
        }

        /// Names of every output device on the default host.
        pub fn list_devices() -> Result<Vec<String>, InitError> {
            let host = cpal::default_host();
            let devices = host.output_devices().map_err(|e| InitError::DeviceUnavailable(e.to_string()))?;
            Ok(devices.filter_map(|d| d.name().ok()).collect())
        }

        fn pick_device(&self) -> Result<cpal::Device, InitError> {
            let host = cpal::default_host();
            if let Some(name) = &self.device_name {
                let devices = host.output_devices().map_err(|e| InitError::DeviceUnavailable(e.to_string()))?;
                for d in devices {
                    if d.name().map(|n| n == *name).unwrap_or(false) {
                        return Ok(d);
                    }
                }
                return Err(InitError::DeviceUnavailable(format!("requested device not found: {name}")));
            }
            host.default_output_device().ok_or(InitError::NoOutputDevice)
        }

        fn choose_config(&self, device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, InitError> {
            let (req_sr, req_ch) = (self.sample_rate, self.channels);
            if req_sr.is_none() && req_ch.is_none() {
                return device.default_output_config().map_err(map_default_config_error);
            }

            let ranges = device
                .supported_output_configs()
                .map_err(|e| InitError::DeviceUnavailable(e.to_string()))?;
            let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
            for range in ranges {
                let ch = range.channels();
                let sr_min = range.min_sample_rate().0;
                let sr_max = range.max_sample_rate().0;

                let ch_pen = req_ch.map_or(0, |c| u64::from(ch.abs_diff(c)));
                let sr_pen = match req_sr {
                    Some(sr) if !(sr_min..=sr_max).contains(&sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
                    _ => 0,
                };
                let score = sr_pen.saturating_mul(1000) + ch_pen;
                if best.as_ref().map_or(true, |(s, _)| score < *s) {
                    best = Some((score, range));
                }
            }

            let (_, range) = best.ok_or_else(|| InitError::UnsupportedFormat("no supported output configs".into()))?;
            let pick_sr = match req_sr {
                Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
                None => range.max_sample_rate(),
            };
            Ok(range.with_sample_rate(pick_sr))
        }
    }

    fn map_default_config_error(e: cpal::DefaultStreamConfigError) -> InitError {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => InitError::NoOutputDevice,
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                InitError::UnsupportedFormat("output stream type not supported".into())
            }
            other => InitError::DeviceUnavailable(other.to_string()),
        }
    }

    impl AudioSubsystem for CpalHost {
        fn open(&mut self) -> Result<StreamSpec, InitError> {
            let device = self.pick_device()?;
            let config = self.choose_config(&device)?;
            let spec = StreamSpec { sample_rate: config.sample_rate().0 as f32, channels: config.channels() }.validate()?;
            tracing::info!(
                device = device.name().unwrap_or_default(),
                sample_rate = spec.sample_rate,
                channels = spec.channels,
                "audio output opened"
            );
            self.opened = Some((device, config));
            Ok(spec)
        }
    }
}
