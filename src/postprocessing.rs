// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing of raw pose model outputs into a single [`Pose`].
//!
//! YOLO pose models emit one row per anchor: `4` box values, one score per class
//! and `17 * 3` keypoint values. PoseNet graphs emit a keypoint heatmap (17
//! channels) and a short-range offset map (34 channels: 17 y offsets then 17 x
//! offsets) on a grid `output_stride` pixels apart.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use ndarray::{Array2, s};

use crate::error::{Result, SquatError};
use crate::pose::{Keypoint, KeypointPart, NUM_KEYPOINTS, Pose};
use crate::preprocessing::PreprocessResult;

/// One raw model output: flat data and its shape.
pub type RawOutput = (Vec<f32>, Vec<usize>);

/// Values per YOLO keypoint (x, y, confidence).
const KPT_DIM: usize = 3;

/// Decode a YOLO pose output, keeping the highest scoring person.
///
/// Returns a zero-confidence pose at the origin when no candidate reaches
/// `min_confidence`, so the frame renders as empty and is never a squat.
///
/// # Errors
///
/// Returns [`SquatError::InferenceError`] if the output is empty, has an
/// unrecognised rank, or carries fewer than `4 + 1 + 17 * 3` features per
/// prediction.
pub fn decode_yolo_pose(
    output: &[f32],
    output_shape: &[usize],
    preprocess: &PreprocessResult,
    min_confidence: f32,
) -> Result<Pose> {
    let kpt_features = NUM_KEYPOINTS * KPT_DIM;
    let expected_features = 4 + 1 + kpt_features;

    // [1, features, preds] or [1, preds, features]
    let (num_preds, is_transposed) = match output_shape {
        [_, a, b] => {
            if *a == expected_features || (a < b && *a >= 4 + kpt_features) {
                (*b, false)
            } else {
                (*a, true)
            }
        }
        [a, b] => {
            if a < b {
                (*b, false)
            } else {
                (*a, true)
            }
        }
        _ => {
            return Err(SquatError::InferenceError(format!(
                "unrecognised pose output shape {output_shape:?}"
            )));
        }
    };

    if output.is_empty() || num_preds == 0 {
        return Err(SquatError::InferenceError(format!(
            "pose output {output_shape:?} has no predictions"
        )));
    }

    let actual_features = output.len() / num_preds;
    if actual_features < expected_features {
        return Err(SquatError::InferenceError(format!(
            "pose output has {actual_features} features per prediction, expected at least {expected_features}"
        )));
    }

    let output_2d = if is_transposed {
        Array2::from_shape_vec((num_preds, actual_features), output.to_vec())
    } else {
        Array2::from_shape_vec((actual_features, num_preds), output.to_vec())
            .map(|arr| arr.reversed_axes())
    }
    .map_err(|e| SquatError::InferenceError(format!("pose output {output_shape:?}: {e}")))?;

    let num_classes = (actual_features - 4 - kpt_features).max(1);

    let mut best: Option<(usize, f32)> = None;
    for i in 0..num_preds {
        let score = output_2d
            .slice(s![i, 4..4 + num_classes])
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(0.0f32, f32::max);
        if score >= min_confidence && best.is_none_or(|(_, b)| score > b) {
            best = Some((i, score));
        }
    }

    let Some((row, score)) = best else {
        return Ok(Pose::empty());
    };

    let (oh, ow) = preprocess.orig_shape;
    let kpt_start = 4 + num_classes;
    let keypoints = KeypointPart::ALL
        .iter()
        .map(|&part| {
            let offset = kpt_start + part.index() * KPT_DIM;
            let (x, y) = preprocess.to_frame(output_2d[[row, offset]], output_2d[[row, offset + 1]]);
            Keypoint::new(
                part,
                x.clamp(0.0, ow as f32),
                y.clamp(0.0, oh as f32),
                output_2d[[row, offset + 2]],
            )
        })
        .collect();

    Ok(Pose::new(keypoints, score))
}

/// Strided grid view over a 4-D PoseNet output.
struct FeatureMap<'a> {
    data: &'a [f32],
    height: usize,
    width: usize,
    channels: usize,
    channels_last: bool,
}

impl<'a> FeatureMap<'a> {
    /// Interpret `(data, shape)` as a map with `channels` channels.
    ///
    /// Accepts NHWC `[1, H, W, C]`, NCHW `[1, C, H, W]` and their batchless forms.
    fn new(data: &'a [f32], shape: &[usize], channels: usize) -> Option<Self> {
        let dims = match shape {
            [1, a, b, c] | [a, b, c] => [*a, *b, *c],
            _ => return None,
        };
        let (height, width, channels_last) = if dims[2] == channels {
            (dims[0], dims[1], true)
        } else if dims[0] == channels {
            (dims[1], dims[2], false)
        } else {
            return None;
        };
        (data.len() == height * width * channels).then_some(Self {
            data,
            height,
            width,
            channels,
            channels_last,
        })
    }

    fn matches(shape: &[usize], channels: usize) -> bool {
        match shape {
            [1, a, _, c] | [a, _, c] => *c == channels || *a == channels,
            _ => false,
        }
    }

    #[inline]
    fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        let idx = if self.channels_last {
            (y * self.width + x) * self.channels + c
        } else {
            (c * self.height + y) * self.width + x
        };
        self.data[idx]
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode PoseNet heatmap and offset outputs into a single pose.
///
/// For every part the heatmap cell with the highest score is taken; its position is
/// the cell center on the stride grid plus the short-range offset, mapped back to
/// frame pixels. Heatmaps are raw logits and pass through a sigmoid. The pose score
/// is the mean keypoint score.
///
/// # Errors
///
/// Returns [`SquatError::InferenceError`] if no 17-channel heatmap or matching
/// 34-channel offset output is present.
pub fn decode_posenet(
    outputs: &[RawOutput],
    output_stride: u32,
    preprocess: &PreprocessResult,
) -> Result<Pose> {
    let heatmaps = outputs
        .iter()
        .find(|(_, shape)| FeatureMap::matches(shape, NUM_KEYPOINTS))
        .and_then(|(data, shape)| FeatureMap::new(data, shape, NUM_KEYPOINTS))
        .ok_or_else(|| {
            SquatError::InferenceError("PoseNet output has no 17-channel heatmap".to_string())
        })?;
    let offsets = outputs
        .iter()
        .find(|(_, shape)| FeatureMap::matches(shape, 2 * NUM_KEYPOINTS))
        .and_then(|(data, shape)| FeatureMap::new(data, shape, 2 * NUM_KEYPOINTS))
        .ok_or_else(|| {
            SquatError::InferenceError("PoseNet output has no 34-channel offset map".to_string())
        })?;

    if heatmaps.height != offsets.height || heatmaps.width != offsets.width {
        return Err(SquatError::InferenceError(format!(
            "heatmap grid {}x{} does not match offset grid {}x{}",
            heatmaps.width, heatmaps.height, offsets.width, offsets.height
        )));
    }
    if heatmaps.height == 0 || heatmaps.width == 0 {
        return Err(SquatError::InferenceError("PoseNet output grid is empty".to_string()));
    }

    let stride = output_stride as f32;
    let (oh, ow) = preprocess.orig_shape;
    let mut total = 0.0f32;

    let keypoints = KeypointPart::ALL
        .iter()
        .map(|&part| {
            let k = part.index();
            let mut best = (0, 0, f32::NEG_INFINITY);
            for y in 0..heatmaps.height {
                for x in 0..heatmaps.width {
                    let v = heatmaps.get(y, x, k);
                    if v > best.2 {
                        best = (y, x, v);
                    }
                }
            }
            let (cy, cx, logit) = best;
            let score = sigmoid(logit);
            total += score;

            let py = cy as f32 * stride + offsets.get(cy, cx, k);
            let px = cx as f32 * stride + offsets.get(cy, cx, k + NUM_KEYPOINTS);
            let (x, y) = preprocess.to_frame(px, py);
            Keypoint::new(part, x.clamp(0.0, ow as f32), y.clamp(0.0, oh as f32), score)
        })
        .collect();

    Ok(Pose::new(keypoints, total / NUM_KEYPOINTS as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn identity_preprocess(h: u32, w: u32) -> PreprocessResult {
        PreprocessResult {
            tensor: Array4::zeros((1, 1, 1, 1)),
            orig_shape: (h, w),
            scale: (1.0, 1.0),
            padding: (0.0, 0.0),
        }
    }

    /// `[1, 56, preds]` output with one row per (score, keypoint confidence).
    fn yolo_output(rows: &[(f32, f32)]) -> (Vec<f32>, Vec<usize>) {
        let features = 4 + 1 + NUM_KEYPOINTS * KPT_DIM;
        let preds = rows.len();
        let mut data = vec![0.0f32; features * preds];
        for (i, &(score, kconf)) in rows.iter().enumerate() {
            data[4 * preds + i] = score;
            for k in 0..NUM_KEYPOINTS {
                let base = 5 + k * KPT_DIM;
                data[base * preds + i] = 10.0 * k as f32;
                data[(base + 1) * preds + i] = 20.0;
                data[(base + 2) * preds + i] = kconf;
            }
        }
        (data, vec![1, features, preds])
    }

    #[test]
    fn test_yolo_picks_best_candidate() {
        let (data, shape) = yolo_output(&[(0.4, 0.2), (0.9, 0.8), (0.6, 0.3)]);
        let pose = decode_yolo_pose(&data, &shape, &identity_preprocess(480, 640), 0.25).unwrap();
        assert!(pose.is_complete());
        assert!((pose.score - 0.9).abs() < 1e-6);
        let hip = pose.get(KeypointPart::LeftHip).unwrap();
        assert!((hip.confidence - 0.8).abs() < 1e-6);
        assert!((hip.x - 110.0).abs() < 1e-6);
        assert!((hip.y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_yolo_transposed_layout() {
        let features = 4 + 1 + NUM_KEYPOINTS * KPT_DIM;
        let mut data = vec![0.0f32; 2 * features];
        data[features + 4] = 0.7;
        data[features + 5 + 2] = 0.65;
        let pose = decode_yolo_pose(&data, &[1, 2, features], &identity_preprocess(100, 100), 0.25).unwrap();
        assert!((pose.score - 0.7).abs() < 1e-6);
        assert!((pose.keypoints()[0].confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_yolo_no_person_gives_empty_pose() {
        let (data, shape) = yolo_output(&[(0.1, 0.9), (0.2, 0.9)]);
        let pose = decode_yolo_pose(&data, &shape, &identity_preprocess(480, 640), 0.25).unwrap();
        assert!(pose.is_complete());
        assert!(pose.keypoints().iter().all(|k| k.confidence == 0.0));
    }

    #[test]
    fn test_yolo_short_output_is_error() {
        let err = decode_yolo_pose(&[0.0; 40], &[1, 10, 4], &identity_preprocess(10, 10), 0.25)
            .unwrap_err();
        assert!(matches!(err, SquatError::InferenceError(_)));
    }

    #[test]
    fn test_yolo_malformed_outputs_are_errors() {
        let prep = identity_preprocess(10, 10);
        assert!(decode_yolo_pose(&[], &[1, 56, 0], &prep, 0.25).is_err());
        assert!(decode_yolo_pose(&[0.0; 56], &[56], &prep, 0.25).is_err());
        assert!(decode_yolo_pose(&[0.0; 56], &[1, 1, 1, 56], &prep, 0.25).is_err());
    }

    #[test]
    fn test_posenet_decode_nhwc() {
        let (gh, gw, stride) = (3usize, 4usize, 16u32);
        let mut heat = vec![-5.0f32; gh * gw * NUM_KEYPOINTS];
        let mut offs = vec![0.0f32; gh * gw * 2 * NUM_KEYPOINTS];

        // Left knee peaks at cell (y=2, x=1) with offsets (+3, -2)
        let k = KeypointPart::LeftKnee.index();
        heat[(2 * gw + 1) * NUM_KEYPOINTS + k] = 4.0;
        offs[(2 * gw + 1) * 2 * NUM_KEYPOINTS + k] = 3.0;
        offs[(2 * gw + 1) * 2 * NUM_KEYPOINTS + k + NUM_KEYPOINTS] = -2.0;

        let outputs = vec![
            (offs, vec![1, gh, gw, 2 * NUM_KEYPOINTS]),
            (heat, vec![1, gh, gw, NUM_KEYPOINTS]),
        ];
        let pose = decode_posenet(&outputs, stride, &identity_preprocess(200, 200)).unwrap();

        let knee = pose.get(KeypointPart::LeftKnee).unwrap();
        assert!((knee.confidence - sigmoid(4.0)).abs() < 1e-6);
        assert!((knee.y - 35.0).abs() < 1e-4);
        assert!((knee.x - 14.0).abs() < 1e-4);

        let nose = pose.get(KeypointPart::Nose).unwrap();
        assert!((nose.confidence - sigmoid(-5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_posenet_decode_nchw() {
        let (gh, gw) = (2usize, 2usize);
        let mut heat = vec![0.0f32; NUM_KEYPOINTS * gh * gw];
        let k = KeypointPart::RightAnkle.index();
        heat[(k * gh + 1) * gw + 1] = 6.0;
        let offs = vec![0.0f32; 2 * NUM_KEYPOINTS * gh * gw];
        let outputs = vec![
            (heat, vec![1, NUM_KEYPOINTS, gh, gw]),
            (offs, vec![1, 2 * NUM_KEYPOINTS, gh, gw]),
        ];
        let pose = decode_posenet(&outputs, 8, &identity_preprocess(100, 100)).unwrap();
        let ankle = pose.get(KeypointPart::RightAnkle).unwrap();
        assert!((ankle.x - 8.0).abs() < 1e-6);
        assert!((ankle.y - 8.0).abs() < 1e-6);
        assert!(ankle.confidence > 0.99);
    }

    #[test]
    fn test_posenet_missing_offsets() {
        let outputs = vec![(vec![0.0; NUM_KEYPOINTS * 4], vec![1, 2, 2, NUM_KEYPOINTS])];
        let err = decode_posenet(&outputs, 16, &identity_preprocess(10, 10)).unwrap_err();
        assert!(matches!(err, SquatError::InferenceError(_)));
    }
}
