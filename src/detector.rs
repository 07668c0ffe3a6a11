// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Squat detection rule.
//!
//! The squat confidence is the weakest of the six lower-body keypoint confidences
//! (both hips, knees and ankles). A pose counts as a squat when that minimum reaches
//! the threshold.

use crate::error::{Result, SquatError};
use crate::pose::{KeypointPart, Pose};

/// Default squat threshold (inclusive).
pub const DEFAULT_SQUAT_THRESHOLD: f32 = 0.50;

/// Keypoints that gate squat detection.
pub const SQUAT_PARTS: [KeypointPart; 6] = [
    KeypointPart::LeftHip,
    KeypointPart::RightHip,
    KeypointPart::LeftKnee,
    KeypointPart::RightKnee,
    KeypointPart::LeftAnkle,
    KeypointPart::RightAnkle,
];

/// Outcome of running the detector on one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    /// Minimum confidence over [`SQUAT_PARTS`].
    pub squat_confidence: f32,
    /// Whether `squat_confidence` reached the threshold.
    pub is_squat: bool,
}

/// Pure squat decision rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquatDetector {
    threshold: f32,
}

impl Default for SquatDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SQUAT_THRESHOLD)
    }
}

impl SquatDetector {
    /// Create a detector with the given inclusive threshold.
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Detection threshold.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Run the rule on a pose.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::IncompletePose`] if any hip, knee or ankle is missing
    /// or has a non-finite confidence.
    pub fn detect(&self, pose: &Pose) -> Result<DetectionResult> {
        let mut squat_confidence = f32::INFINITY;

        for part in SQUAT_PARTS {
            let kpt = pose.get(part).ok_or_else(|| {
                SquatError::IncompletePose(format!("missing {part} (index {})", part.index()))
            })?;
            if !kpt.confidence.is_finite() {
                return Err(SquatError::IncompletePose(format!(
                    "{part} has no valid confidence"
                )));
            }
            squat_confidence = squat_confidence.min(kpt.confidence);
        }

        Ok(DetectionResult {
            squat_confidence,
            is_squat: squat_confidence >= self.threshold,
        })
    }
}
