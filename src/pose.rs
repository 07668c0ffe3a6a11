// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose data model.
//!
//! A [`Pose`] is an ordered list of 17 [`Keypoint`]s following the COCO / PoseNet
//! keypoint schema. The index of each keypoint in the list is fixed by
//! [`KeypointPart::index`], so index 11/12 are the hips, 13/14 the knees and
//! 15/16 the ankles.

use std::fmt;

/// Number of keypoints in a full pose.
pub const NUM_KEYPOINTS: usize = 17;

/// Anatomical keypoint label, in estimator output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypointPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointPart {
    /// All parts, indexed by their position in a pose.
    pub const ALL: [Self; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Position of this part in a pose.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Part at the given pose index, if any.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// PoseNet part name (e.g. `leftHip`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }
}

impl fmt::Display for KeypointPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tracked anatomical landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Anatomical label.
    pub part: KeypointPart,
    /// X coordinate in frame pixels.
    pub x: f32,
    /// Y coordinate in frame pixels.
    pub y: f32,
    /// Confidence score in [0, 1].
    pub confidence: f32,
}

impl Keypoint {
    /// Create a keypoint. The confidence is clamped to [0, 1]; NaN is kept as is.
    #[must_use]
    pub fn new(part: KeypointPart, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            part,
            x,
            y,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whether the position is finite and can be drawn.
    #[must_use]
    pub fn has_position(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Full set of keypoints for one person in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    keypoints: Vec<Keypoint>,
    /// Overall pose score reported by the estimator.
    pub score: f32,
}

impl Pose {
    /// Create a pose from keypoints in schema order.
    #[must_use]
    pub const fn new(keypoints: Vec<Keypoint>, score: f32) -> Self {
        Self { keypoints, score }
    }

    /// A full pose where every keypoint sits at the origin with zero confidence.
    #[must_use]
    pub fn empty() -> Self {
        let keypoints = KeypointPart::ALL
            .iter()
            .map(|&part| Keypoint::new(part, 0.0, 0.0, 0.0))
            .collect();
        Self::new(keypoints, 0.0)
    }

    /// Keypoints in schema order.
    #[must_use]
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Look up a keypoint by part.
    ///
    /// Returns `None` if the slot is missing or holds a different part.
    #[must_use]
    pub fn get(&self, part: KeypointPart) -> Option<&Keypoint> {
        self.keypoints
            .get(part.index())
            .filter(|kpt| kpt.part == part)
    }

    /// Number of keypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Check if the pose holds no keypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Whether all 17 keypoints are present in schema order.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.keypoints.len() == NUM_KEYPOINTS
            && self
                .keypoints
                .iter()
                .zip(KeypointPart::ALL)
                .all(|(kpt, part)| kpt.part == part)
    }
}
