//! Error types.
//!
//! Only two things can actually go wrong in the engine: the audio output cannot be
//! brought up, or a configuration file is unusable. Everything else (out-of-range
//! parameters, double stops, releasing a node twice) is clamped or ignored so
//! playback is never interrupted.

use std::path::PathBuf;

/// Engine-level failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The rendering context could not be created or attached to an output.
    /// Recoverable by calling `init()`/`play()` again once the device is back.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// A configuration value is out of its accepted range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A sound key outside the closed set of generator kinds.
    #[error("unknown sound kind `{0}`")]
    UnknownKind(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
