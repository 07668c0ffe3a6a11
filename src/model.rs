// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX pose model loading and single-pose inference.
//!
//! [`OnnxPoseEstimator`] wraps an ONNX Runtime session and implements
//! [`PoseEstimator`] for YOLO pose and PoseNet graphs.

use std::path::Path;

#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::error::{Result, SquatError};
use crate::estimator::{Architecture, EstimatorConfig, PoseEstimator};
use crate::pose::Pose;
use crate::postprocessing::{RawOutput, decode_posenet, decode_yolo_pose};
use crate::preprocessing::preprocess;
use crate::source::Frame;

/// Pose estimator backed by an ONNX model.
///
/// # Example
///
/// ```no_run
/// use squat_counter::{EstimatorConfig, OnnxPoseEstimator};
///
/// let estimator = OnnxPoseEstimator::load("yolo11n-pose.onnx", EstimatorConfig::default())?;
/// # Ok::<(), squat_counter::SquatError>(())
/// ```
pub struct OnnxPoseEstimator {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    config: EstimatorConfig,
    warmed_up: bool,
}

impl OnnxPoseEstimator {
    /// Load a pose model from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::ConfigError`] for an invalid configuration and
    /// [`SquatError::ModelLoadError`] if the file is missing or ONNX Runtime rejects it.
    pub fn load<P: AsRef<Path>>(path: P, config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        if !path.exists() {
            return Err(SquatError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        #[allow(unused_mut)]
        let mut builder = Session::builder().map_err(|e| {
            SquatError::ModelLoadError(format!("Failed to create session builder: {e}"))
        })?;

        #[cfg(feature = "cuda")]
        {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| {
                    SquatError::ModelLoadError(format!("Failed to register CUDA EP: {e}"))
                })?;
        }

        #[cfg(feature = "coreml")]
        {
            builder = builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()])
                .map_err(|e| {
                    SquatError::ModelLoadError(format!("Failed to register CoreML EP: {e}"))
                })?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                SquatError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(config.num_threads)
            .map_err(|e| {
                SquatError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_file(path)
            .map_err(|e| SquatError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| SquatError::ModelLoadError("Model has no inputs".to_string()))?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(SquatError::ModelLoadError("Model has no outputs".to_string()));
        }
        if config.architecture.is_posenet() && output_names.len() < 2 {
            return Err(SquatError::ModelLoadError(format!(
                "PoseNet model needs heatmap and offset outputs, found {}",
                output_names.len()
            )));
        }

        Ok(Self {
            session,
            input_name,
            output_names,
            config,
            warmed_up: false,
        })
    }

    /// Run one inference on a zero tensor to allocate buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the dummy inference fails.
    pub fn warmup(&mut self) -> Result<()> {
        if self.warmed_up {
            return Ok(());
        }

        let (h, w) = self.config.input_size();
        let (h, w) = (h as usize, w as usize);
        let dummy = match self.config.architecture {
            Architecture::YoloPose => ndarray::Array4::<f32>::zeros((1, 3, h, w)),
            _ => ndarray::Array4::<f32>::zeros((1, h, w, 3)),
        };
        let _ = self.run_inference(&dummy)?;

        self.warmed_up = true;
        Ok(())
    }

    /// Estimator configuration.
    #[must_use]
    pub const fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Names of the model outputs, in graph order.
    #[must_use]
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Run the session and copy out every output.
    fn run_inference(&mut self, input: &ndarray::Array4<f32>) -> Result<Vec<RawOutput>> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            SquatError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| SquatError::InferenceError(format!("Inference failed: {e}")))?;

        self.output_names
            .iter()
            .map(|name| {
                let output = outputs.get(name.as_str()).ok_or_else(|| {
                    SquatError::InferenceError(format!("Output '{name}' not found"))
                })?;
                let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                    SquatError::InferenceError(format!("Failed to extract output '{name}': {e}"))
                })?;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
                Ok((data.to_vec(), shape))
            })
            .collect()
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate_single_pose(&mut self, frame: &Frame) -> Result<Pose> {
        if !self.warmed_up {
            self.warmup()?;
        }

        let prep = preprocess(&frame.image, &self.config)?;
        let outputs = self.run_inference(&prep.tensor)?;

        match self.config.architecture {
            Architecture::YoloPose => {
                let (data, shape) = outputs.first().ok_or_else(|| {
                    SquatError::InferenceError("Model produced no output".to_string())
                })?;
                decode_yolo_pose(data, shape, &prep, self.config.min_pose_confidence)
            }
            Architecture::MobileNetV1 | Architecture::ResNet50 => {
                decode_posenet(&outputs, self.config.output_stride, &prep)
            }
        }
    }
}

impl std::fmt::Debug for OnnxPoseEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPoseEstimator")
            .field("architecture", &self.config.architecture)
            .field("input_size", &self.config.input_size())
            .field("output_stride", &self.config.output_stride)
            .field("outputs", &self.output_names)
            .finish()
    }
}
