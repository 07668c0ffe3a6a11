// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Squat Counter
//!
//! Real-time squat counter written in Rust. A camera, video, stream or image
//! sequence is polled at a fixed interval; each available frame goes through a
//! single-pose estimator, the hip, knee and ankle confidences decide whether the
//! pose is a squat, a skeleton overlay is drawn and a running count is kept.
//!
//! ## Features
//!
//! - **ONNX Runtime** - YOLO pose and PoseNet (`MobileNetV1`, `ResNet50`) models
//! - **Serialized Polling** - At most one inference in flight, with a stop token
//! - **Skeleton Overlay** - Confidence-gated keypoints and limb segments
//! - **Multiple Sources** - Webcam, video, streams, images, directories and globs
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use squat_counter::{
//!     EstimatorConfig, OnnxPoseEstimator, Poller, PollerConfig, Session, SessionConfig, Source,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let estimator = OnnxPoseEstimator::load("yolo11n-pose.onnx", EstimatorConfig::default())?;
//!     let frames = squat_counter::source::open(Source::from("squats.mp4"))?;
//!     let session = Session::new(SessionConfig::default())?;
//!
//!     let poller = Poller::spawn(session, frames, estimator, PollerConfig::default(), |outcome, session| {
//!         if let Some(report) = outcome.report() {
//!             println!("frame {}: count {}", report.frame.index, session.count());
//!         }
//!     })?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     let session = poller.stop()?;
//!     println!("Squats: {}", session.count());
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Webcam 0 with the default model (auto-downloaded)
//! squat-counter run --show
//!
//! # Video file, saving composed frames to runs/squat/count
//! squat-counter run -m yolo11n-pose.onnx -s workout.mp4 --save
//!
//! # PoseNet MobileNetV1 at stride 16, 320x240, scale 0.8
//! squat-counter run -m posenet.onnx --architecture mobilenet-v1 --output-stride 16 --scale 0.8
//!
//! # Count only transitions into a squat
//! squat-counter run --count-mode on-entry
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pose`] | [`Pose`], [`Keypoint`] and the 17 [`KeypointPart`]s |
//! | [`estimator`] | [`PoseEstimator`] trait and [`EstimatorConfig`] |
//! | [`model`] | [`OnnxPoseEstimator`] backed by ONNX Runtime |
//! | [`detector`] | [`SquatDetector`]: min of six lower-body confidences |
//! | [`counter`] | [`SquatCounter`] and [`CountMode`] |
//! | [`render`] | [`Renderer`], [`RenderTarget`] and frame composition |
//! | [`session`] | [`Session`] and one poll cycle |
//! | [`poller`] | [`Poller`]: fixed-interval driver thread |
//! | [`source`] | [`Source`] parsing and [`FrameSource`] readers |
//! | [`error`] | Error types ([`SquatError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `visualize` | Preview window (default) |
//! | `video` | Video file, webcam and stream sources |
//! | `cuda` | NVIDIA CUDA acceleration |
//! | `coreml` | Apple `CoreML` (macOS/iOS) |
//!
//! ## License
//!
//! Licensed under [AGPL-3.0](https://ultralytics.com/license).

// Modules
pub mod cli;
pub mod counter;
pub mod detector;
pub mod download;
pub mod error;
pub mod estimator;
pub mod model;
pub mod poller;
pub mod pose;
pub mod postprocessing;
pub mod preprocessing;
pub mod render;
pub mod session;
pub mod source;
pub mod visualizer;

// Re-export main types for convenience
pub use counter::{CountMode, SquatCounter};
pub use detector::{DetectionResult, SquatDetector};
pub use error::{Result, SquatError};
pub use estimator::{Architecture, EstimatorConfig, PoseEstimator};
pub use model::OnnxPoseEstimator;
pub use poller::{Poller, PollerConfig};
pub use pose::{Keypoint, KeypointPart, Pose};
pub use render::{Overlay, RenderTarget, Renderer};
pub use session::{CycleOutcome, CycleReport, CycleStats, Session, SessionConfig, StopToken};
pub use source::{Frame, FrameSource, Source};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
