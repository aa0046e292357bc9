//! Hard-failure error types.
//!
//! Signal-quality outcomes (short captures, weak pulse, ...) are not errors;
//! they travel as [`crate::measurement::Rejection`] values inside a
//! measurement result. `SignalError` is reserved for conditions where the
//! engine cannot continue at all.

use thiserror::Error;

/// Configuration loading / validation failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum SignalError {
    /// Frame buffer does not match its declared geometry
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame source could not be opened or read
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// Face detector could not be constructed (model missing, corrupt, ...)
    #[error("Face detector error: {0}")]
    Detector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[cfg(feature = "image-processing")]
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, SignalError>;
