// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame preprocessing for pose estimation.
//!
//! YOLO pose models take a letterboxed NCHW tensor in [0, 1]. PoseNet graphs take a
//! stretched NHWC tensor normalized the way their backbone was trained.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use rayon::prelude::*;

use crate::error::{Result, SquatError};
use crate::estimator::{Architecture, EstimatorConfig};

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Per-channel offsets added to raw pixels for the ResNet50 PoseNet backbone.
pub const RESNET_MEAN: [f32; 3] = [-123.15, -115.90, -103.06];

/// Pixel normalization applied while building the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// `x / 255`, giving [0, 1].
    UnitRange,
    /// `x / 127.5 - 1`, giving [-1, 1].
    MobileNet,
    /// `x + RESNET_MEAN[c]`.
    ResNet,
}

impl Normalization {
    /// Normalization expected by an architecture.
    #[must_use]
    pub const fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::YoloPose => Self::UnitRange,
            Architecture::MobileNetV1 => Self::MobileNet,
            Architecture::ResNet50 => Self::ResNet,
        }
    }

    #[inline]
    fn apply(self, channel: usize, value: u8) -> f32 {
        let v = f32::from(value);
        match self {
            Self::UnitRange => v / 255.0,
            Self::MobileNet => v / 127.5 - 1.0,
            Self::ResNet => v + RESNET_MEAN[channel],
        }
    }
}

/// Result of preprocessing a frame, containing the tensor and transform info.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Input tensor, NCHW for YOLO and NHWC for PoseNet.
    pub tensor: Array4<f32>,
    /// Original frame dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

impl PreprocessResult {
    /// Map a point from model input space back to frame pixels.
    #[must_use]
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        scale_point(x, y, self.scale, self.padding)
    }
}

/// Preprocess a frame for the configured architecture.
///
/// # Errors
///
/// Returns an error if the frame has no pixels.
pub fn preprocess(image: &RgbImage, config: &EstimatorConfig) -> Result<PreprocessResult> {
    let (h, w) = config.input_size();
    let target_size = (h as usize, w as usize);
    match config.architecture {
        Architecture::YoloPose => letterbox(image, target_size),
        arch => resize_nhwc(image, target_size, Normalization::for_architecture(arch)),
    }
}

/// Letterbox a frame into a `(1, 3, H, W)` tensor in [0, 1].
///
/// The frame is resized to fit while keeping its aspect ratio and centered on a
/// gray canvas.
///
/// # Errors
///
/// Returns an error if the frame has no pixels.
pub fn letterbox(image: &RgbImage, target_size: (usize, usize)) -> Result<PreprocessResult> {
    let (orig_width, orig_height) = image.dimensions();
    check_not_empty(orig_width, orig_height)?;

    let (new_width, new_height, pad_left, pad_top, scale) =
        calculate_letterbox_params(orig_width, orig_height, target_size);

    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let (dst_h, dst_w) = target_size;
    let mut canvas = RgbImage::from_pixel(dst_w as u32, dst_h as u32, Rgb(LETTERBOX_COLOR));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(pad_left),
        i64::from(pad_top),
    );

    Ok(PreprocessResult {
        tensor: image_to_nchw(&canvas, Normalization::UnitRange),
        orig_shape: (orig_height, orig_width),
        scale,
        padding: (pad_top as f32, pad_left as f32),
    })
}

/// Stretch a frame to `target_size` into a `(1, H, W, 3)` tensor.
///
/// # Errors
///
/// Returns an error if the frame has no pixels.
pub fn resize_nhwc(
    image: &RgbImage,
    target_size: (usize, usize),
    normalization: Normalization,
) -> Result<PreprocessResult> {
    let (orig_width, orig_height) = image.dimensions();
    check_not_empty(orig_width, orig_height)?;

    let (dst_h, dst_w) = target_size;
    let resized = imageops::resize(image, dst_w as u32, dst_h as u32, FilterType::Triangle);

    let mut data = vec![0.0f32; dst_h * dst_w * 3];
    let src = resized.as_raw();
    data.par_chunks_mut(dst_w * 3)
        .zip(src.par_chunks(dst_w * 3))
        .for_each(|(dst_row, src_row)| {
            for (i, (d, &s)) in dst_row.iter_mut().zip(src_row).enumerate() {
                *d = normalization.apply(i % 3, s);
            }
        });

    let tensor = Array4::from_shape_vec((1, dst_h, dst_w, 3), data)
        .map_err(|e| SquatError::ImageError(format!("Failed to build input tensor: {e}")))?;

    Ok(PreprocessResult {
        tensor,
        orig_shape: (orig_height, orig_width),
        scale: (
            dst_h as f32 / orig_height as f32,
            dst_w as f32 / orig_width as f32,
        ),
        padding: (0.0, 0.0),
    })
}

/// Convert an RGB image to a `(1, 3, H, W)` tensor, one channel plane per task.
fn image_to_nchw(image: &RgbImage, normalization: Normalization) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let pixels = image.as_raw();

    let mut tensor = Array4::zeros((1, 3, h, w));
    if let Some(data) = tensor.as_slice_mut() {
        data.par_chunks_mut(h * w)
            .enumerate()
            .for_each(|(c, plane)| {
                for (dst, px) in plane.iter_mut().zip(pixels.chunks_exact(3)) {
                    *dst = normalization.apply(c, px[c]);
                }
            });
    }
    tensor
}

fn check_not_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(SquatError::ImageError(format!(
            "Frame has no pixels ({width}x{height})"
        )));
    }
    Ok(())
}

/// Calculate letterbox parameters.
///
/// Returns `(new_width, new_height, pad_left, pad_top, (scale_y, scale_x))`.
fn calculate_letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: (usize, usize),
) -> (u32, u32, u32, u32, (f32, f32)) {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_w = ((orig_w * scale).round() as u32).max(1);
    let new_h = ((orig_h * scale).round() as u32).max(1);

    // Center alignment: divide padding equally on both sides
    let pad_left = (target_size.1 as u32).saturating_sub(new_w) / 2;
    let pad_top = (target_size.0 as u32).saturating_sub(new_h) / 2;

    let scale_x = new_w as f32 / orig_w;
    let scale_y = new_h as f32 / orig_h;

    (new_w, new_h, pad_left, pad_top, (scale_y, scale_x))
}

/// Scale a point from model input space back to frame space.
///
/// * `scale` - Scale factors (`scale_y`, `scale_x`) from preprocessing.
/// * `padding` - Padding (`pad_top`, `pad_left`) from preprocessing.
#[must_use]
pub fn scale_point(x: f32, y: f32, scale: (f32, f32), padding: (f32, f32)) -> (f32, f32) {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;
    ((x - pad_left) / scale_x, (y - pad_top) / scale_y)
}
