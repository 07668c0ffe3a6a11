// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose estimator contract and configuration.
//!
//! This module defines the [`PoseEstimator`] trait consumed by the polling loop and
//! the [`EstimatorConfig`] used to load an estimator: architecture variant, output
//! stride, input resolution, channel multiplier and input scale factor.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SquatError};
use crate::pose::Pose;
use crate::source::Frame;

/// Produces one pose per frame.
///
/// Implementations may block for the duration of inference; the poller runs them on
/// its own thread and never issues overlapping calls.
pub trait PoseEstimator: Send {
    /// Estimate the single most prominent pose in `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the model output cannot be decoded.
    fn estimate_single_pose(&mut self, frame: &Frame) -> Result<Pose>;
}

impl<T: PoseEstimator + ?Sized> PoseEstimator for Box<T> {
    fn estimate_single_pose(&mut self, frame: &Frame) -> Result<Pose> {
        (**self).estimate_single_pose(frame)
    }
}

/// Network architecture, which decides pre- and post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Architecture {
    /// Ultralytics YOLO pose model (anchor-free boxes with 17 keypoints each).
    #[default]
    YoloPose,
    /// PoseNet `MobileNetV1` (heatmaps + offsets).
    MobileNetV1,
    /// PoseNet `ResNet50` (heatmaps + offsets).
    ResNet50,
}

impl Architecture {
    /// CLI / config spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::YoloPose => "yolo-pose",
            Self::MobileNetV1 => "mobilenet-v1",
            Self::ResNet50 => "resnet50",
        }
    }

    /// Whether this is a PoseNet heatmap model.
    #[must_use]
    pub const fn is_posenet(&self) -> bool {
        matches!(self, Self::MobileNetV1 | Self::ResNet50)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yolo-pose" | "yolo" | "yolopose" => Ok(Self::YoloPose),
            "mobilenet-v1" | "mobilenetv1" | "mobilenet" => Ok(Self::MobileNetV1),
            "resnet50" | "resnet" | "resnet-50" => Ok(Self::ResNet50),
            _ => Err(format!(
                "invalid architecture '{s}', expected one of: yolo-pose, mobilenet-v1, resnet50"
            )),
        }
    }
}

/// Input resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputResolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl InputResolution {
    /// Create a resolution.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Stride used by YOLO letterboxing.
const YOLO_STRIDE: u32 = 32;

/// Configuration for loading a pose estimator.
///
/// # Example
///
/// ```rust
/// use squat_counter::{Architecture, EstimatorConfig};
///
/// let config = EstimatorConfig::new()
///     .with_architecture(Architecture::MobileNetV1)
///     .with_output_stride(16)
///     .with_input_resolution(320, 240)
///     .with_multiplier(0.5)
///     .with_input_scale_factor(0.8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Network architecture.
    pub architecture: Architecture,
    /// Output stride of the network (PoseNet: 8, 16 or 32).
    pub output_stride: u32,
    /// Requested input resolution before scaling.
    pub input_resolution: InputResolution,
    /// Depth multiplier of the `MobileNetV1` backbone.
    pub multiplier: f32,
    /// Factor applied to the input resolution, in (0, 1].
    pub input_scale_factor: f32,
    /// Number of intra-op threads for ONNX Runtime (`0` = let it decide).
    pub num_threads: usize,
    /// Minimum person score for a YOLO candidate to be reported as a pose.
    pub min_pose_confidence: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::YoloPose,
            output_stride: YOLO_STRIDE,
            input_resolution: InputResolution::new(640, 640),
            multiplier: 1.0,
            input_scale_factor: 1.0,
            num_threads: 0,
            min_pose_confidence: 0.25,
        }
    }
}

impl EstimatorConfig {
    /// Create a configuration with default values (YOLO pose, 640x640).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// PoseNet `MobileNetV1` preset: stride 16, 320x240, multiplier 0.5, scale 0.8.
    #[must_use]
    pub fn posenet_mobilenet() -> Self {
        Self::new()
            .with_architecture(Architecture::MobileNetV1)
            .with_output_stride(16)
            .with_input_resolution(320, 240)
            .with_multiplier(0.5)
            .with_input_scale_factor(0.8)
    }

    /// Set the architecture.
    #[must_use]
    pub const fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Set the output stride.
    #[must_use]
    pub const fn with_output_stride(mut self, stride: u32) -> Self {
        self.output_stride = stride;
        self
    }

    /// Set the input resolution.
    #[must_use]
    pub const fn with_input_resolution(mut self, width: u32, height: u32) -> Self {
        self.input_resolution = InputResolution::new(width, height);
        self
    }

    /// Set the `MobileNetV1` depth multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the input scale factor.
    #[must_use]
    pub const fn with_input_scale_factor(mut self, scale: f32) -> Self {
        self.input_scale_factor = scale;
        self
    }

    /// Set the number of inference threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Set the minimum YOLO person score.
    #[must_use]
    pub const fn with_min_pose_confidence(mut self, confidence: f32) -> Self {
        self.min_pose_confidence = confidence;
        self
    }

    /// Check the configuration for invalid combinations.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let InputResolution { width, height } = self.input_resolution;
        if width == 0 || height == 0 {
            return Err(SquatError::ConfigError(format!(
                "input resolution must be non-zero, got {width}x{height}"
            )));
        }
        if !(self.input_scale_factor > 0.0 && self.input_scale_factor <= 1.0) {
            return Err(SquatError::ConfigError(format!(
                "input scale factor must be in (0, 1], got {}",
                self.input_scale_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.min_pose_confidence) {
            return Err(SquatError::ConfigError(format!(
                "min pose confidence must be in [0, 1], got {}",
                self.min_pose_confidence
            )));
        }

        match self.architecture {
            Architecture::YoloPose => {}
            Architecture::MobileNetV1 => {
                if ![8, 16, 32].contains(&self.output_stride) {
                    return Err(SquatError::ConfigError(format!(
                        "MobileNetV1 output stride must be 8, 16 or 32, got {}",
                        self.output_stride
                    )));
                }
                if ![0.5, 0.75, 1.0].contains(&self.multiplier) {
                    return Err(SquatError::ConfigError(format!(
                        "MobileNetV1 multiplier must be 0.5, 0.75 or 1.0, got {}",
                        self.multiplier
                    )));
                }
            }
            Architecture::ResNet50 => {
                if ![16, 32].contains(&self.output_stride) {
                    return Err(SquatError::ConfigError(format!(
                        "ResNet50 output stride must be 16 or 32, got {}",
                        self.output_stride
                    )));
                }
                if (self.multiplier - 1.0).abs() > f32::EPSILON {
                    return Err(SquatError::ConfigError(format!(
                        "ResNet50 multiplier must be 1.0, got {}",
                        self.multiplier
                    )));
                }
            }
        }

        if self.architecture.is_posenet() {
            let (h, w) = self.input_size();
            if h <= 1 || w <= 1 {
                return Err(SquatError::ConfigError(format!(
                    "scaled input resolution {w}x{h} is too small for stride {}",
                    self.output_stride
                )));
            }
        }

        Ok(())
    }

    /// Effective network input size as (height, width).
    ///
    /// PoseNet sizes are `k * stride + 1`; YOLO sizes are multiples of 32.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn input_size(&self) -> (u32, u32) {
        let scale = self.input_scale_factor;
        let scaled = |d: u32| (d as f32 * scale) as u32;

        if self.architecture.is_posenet() {
            let stride = self.output_stride.max(1);
            let valid = |d: u32| {
                let even = scaled(d).saturating_sub(1);
                even - even % stride + 1
            };
            (
                valid(self.input_resolution.height),
                valid(self.input_resolution.width),
            )
        } else {
            let round_up = |d: u32| scaled(d).max(1).div_ceil(YOLO_STRIDE) * YOLO_STRIDE;
            (
                round_up(self.input_resolution.height),
                round_up(self.input_resolution.width),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EstimatorConfig::default();
        assert_eq!(config.architecture, Architecture::YoloPose);
        assert_eq!(config.input_resolution, InputResolution::new(640, 640));
        assert!(config.validate().is_ok());
        assert_eq!(config.input_size(), (640, 640));
    }

    #[test]
    fn test_posenet_preset() {
        let config = EstimatorConfig::posenet_mobilenet();
        assert_eq!(config.architecture, Architecture::MobileNetV1);
        assert_eq!(config.output_stride, 16);
        assert_eq!(config.input_resolution, InputResolution::new(320, 240));
        assert!((config.multiplier - 0.5).abs() < f32::EPSILON);
        assert!((config.input_scale_factor - 0.8).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
        // 240 * 0.8 = 192 -> 191 -> 177; 320 * 0.8 = 256 -> 255 -> 241
        assert_eq!(config.input_size(), (177, 241));
    }

    #[test]
    fn test_yolo_size_rounds_up() {
        let config = EstimatorConfig::new().with_input_resolution(500, 300);
        assert_eq!(config.input_size(), (320, 512));
    }

    #[test]
    fn test_invalid_stride_rejected() {
        let config = EstimatorConfig::posenet_mobilenet().with_output_stride(12);
        assert!(matches!(config.validate(), Err(SquatError::ConfigError(_))));

        let config = EstimatorConfig::posenet_mobilenet()
            .with_architecture(Architecture::ResNet50)
            .with_multiplier(1.0)
            .with_output_stride(8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_multiplier_rejected() {
        let config = EstimatorConfig::posenet_mobilenet().with_multiplier(0.6);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn test_invalid_scale_rejected() {
        assert!(EstimatorConfig::new().with_input_scale_factor(0.0).validate().is_err());
        assert!(EstimatorConfig::new().with_input_scale_factor(1.5).validate().is_err());
        assert!(EstimatorConfig::new().with_input_resolution(0, 10).validate().is_err());
    }

    #[test]
    fn test_architecture_from_str() {
        assert_eq!("yolo-pose".parse::<Architecture>().unwrap(), Architecture::YoloPose);
        assert_eq!("MobileNetV1".parse::<Architecture>().unwrap(), Architecture::MobileNetV1);
        assert_eq!("resnet50".parse::<Architecture>().unwrap(), Architecture::ResNet50);
        assert!("vgg".parse::<Architecture>().is_err());
        assert_eq!(Architecture::MobileNetV1.to_string(), "mobilenet-v1");
    }
}
