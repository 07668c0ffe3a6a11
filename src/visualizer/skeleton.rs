// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use crate::pose::KeypointPart::{
    self, LeftAnkle, LeftElbow, LeftHip, LeftKnee, LeftShoulder, LeftWrist, RightAnkle,
    RightElbow, RightHip, RightKnee, RightShoulder, RightWrist,
};

/// Connected part pairs drawn as skeleton segments.
/// Torso sides, arms, legs, then the shoulder and hip lines. The face is not connected.
pub const SKELETON: [[KeypointPart; 2]; 12] = [
    [LeftHip, LeftShoulder],
    [LeftElbow, LeftShoulder],
    [LeftElbow, LeftWrist],
    [LeftHip, LeftKnee],
    [LeftKnee, LeftAnkle],
    [RightHip, RightShoulder],
    [RightElbow, RightShoulder],
    [RightElbow, RightWrist],
    [RightHip, RightKnee],
    [RightKnee, RightAnkle],
    [LeftShoulder, RightShoulder],
    [LeftHip, RightHip],
];

/// Limb color indices mapping to `POSE_COLORS`
/// Mapping: torso=pink, arms=blue, legs=orange
pub const LIMB_COLOR_INDICES: [usize; 12] = [7, 9, 9, 0, 0, 7, 9, 9, 0, 0, 7, 7];

/// Keypoint color indices mapping to `POSE_COLORS`
/// Mapping: face=green, arms=blue, legs=orange
pub const KPT_COLOR_INDICES: [usize; 17] = [16, 16, 16, 16, 16, 9, 9, 9, 9, 9, 9, 0, 0, 0, 0, 0, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_pairs_are_distinct() {
        for (i, [a, b]) in SKELETON.iter().enumerate() {
            assert_ne!(a, b);
            for [c, d] in &SKELETON[i + 1..] {
                assert!(!(a == c && b == d) && !(a == d && b == c));
            }
        }
    }

    #[test]
    fn test_legs_are_connected() {
        assert!(SKELETON.contains(&[LeftKnee, LeftAnkle]));
        assert!(SKELETON.contains(&[RightHip, RightKnee]));
        assert!(SKELETON.contains(&[LeftHip, RightHip]));
    }
}
