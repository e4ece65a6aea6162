//! Error types crossing the engine's public surface.
//!
//! Only [`ComposerError::Initialization`] is expected in normal operation; every
//! in-session hiccup (rejected filter coefficients, events nobody reads, voices
//! released twice) is absorbed where it happens.

use thiserror::Error;

/// The audio subsystem could not be brought up.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InitError {
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f32),
    #[error("no output device available")]
    NoOutputDevice,
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio permission denied: {0}")]
    PermissionDenied(String),
    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComposerError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitError),
    #[error("effect chain already built for this session")]
    DuplicateChain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_converts_and_displays() {
        let err: ComposerError = InitError::PermissionDenied("blocked by host".into()).into();
        assert_eq!(err.to_string(), "initialization failed: audio permission denied: blocked by host");
        assert!(matches!(err, ComposerError::Initialization(InitError::PermissionDenied(_))));
    }
}
