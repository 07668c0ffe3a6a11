// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the squat counter.

use std::fmt;

/// Result type alias for squat counter operations.
pub type Result<T> = std::result::Result<T, SquatError>;

/// Main error type for the squat counter.
#[derive(Debug)]
pub enum SquatError {
    /// Error loading the pose estimation model.
    ModelLoadError(String),
    /// Error during pose inference.
    InferenceError(String),
    /// Error processing images.
    ImageError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
    /// The pose lacks keypoints required for squat detection.
    IncompletePose(String),
    /// Frame source could not be opened or read.
    SourceError(String),
    /// Video/stream decoding error.
    VideoError(String),
    /// Preview window error.
    VisualizerError(String),
    /// Poller thread failure.
    PollerError(String),
    /// Feature not enabled.
    FeatureNotEnabled(String),
}

impl fmt::Display for SquatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::IncompletePose(msg) => write!(f, "Incomplete pose: {msg}"),
            Self::SourceError(msg) => write!(f, "Source error: {msg}"),
            Self::VideoError(msg) => write!(f, "Video error: {msg}"),
            Self::VisualizerError(msg) => write!(f, "Visualizer error: {msg}"),
            Self::PollerError(msg) => write!(f, "Poller error: {msg}"),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
        }
    }
}

impl std::error::Error for SquatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SquatError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for SquatError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
