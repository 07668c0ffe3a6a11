// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Keypoint and skeleton overlay.
//!
//! The [`Renderer`] turns a [`Pose`] into an [`Overlay`] (markers for confident
//! keypoints, segments for confident adjacent pairs) and paints it onto a
//! transparent [`RenderTarget`] sized to the frame. [`compose`] blends the target
//! over the frame for display, and [`draw_readout`] adds the squat count.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut, text_size};

use crate::download::check_font;
use crate::pose::{KeypointPart, Pose};
use crate::visualizer::Color;
use crate::visualizer::skeleton::{KPT_COLOR_INDICES, LIMB_COLOR_INDICES, SKELETON};

/// Minimum confidence for a keypoint marker (inclusive).
pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.6;

/// Minimum confidence of both endpoints for a skeleton segment (inclusive).
pub const DEFAULT_SKELETON_THRESHOLD: f32 = 0.7;

/// Font used for the count readout.
pub const READOUT_FONT: &str = "Arial.ttf";

/// A keypoint marker to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub part: KeypointPart,
    pub x: f32,
    pub y: f32,
    pub color: Color,
}

/// A skeleton segment to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: KeypointPart,
    pub to: KeypointPart,
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub color: Color,
}

/// Everything the renderer would draw for one pose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub markers: Vec<Marker>,
    pub segments: Vec<Segment>,
}

impl Overlay {
    /// Check if nothing would be drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.segments.is_empty()
    }
}

/// Transparent RGBA drawing surface matching the frame size.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    image: RgbaImage,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl RenderTarget {
    /// Create a cleared target.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Match the target to a frame size. Reallocates (and clears) only on change.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        }
    }

    /// Make every pixel transparent.
    pub fn clear(&mut self) {
        self.image.fill(0);
    }

    /// Whether every pixel is transparent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 0)
    }

    /// Overlay pixels.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether a point lies inside the target. The far edges are inclusive since
    /// decoders clamp keypoints to `[0, width]` and `[0, height]`.
    fn contains(&self, x: f32, y: f32) -> bool {
        !self.image.is_empty()
            && x >= 0.0
            && y >= 0.0
            && x <= self.width() as f32
            && y <= self.height() as f32
    }
}

/// Draws keypoints and skeleton for a pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderer {
    keypoint_threshold: f32,
    skeleton_threshold: f32,
    radius: i32,
    line_width: i32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_KEYPOINT_THRESHOLD, DEFAULT_SKELETON_THRESHOLD)
    }
}

impl Renderer {
    /// Create a renderer with marker and segment thresholds.
    #[must_use]
    pub const fn new(keypoint_threshold: f32, skeleton_threshold: f32) -> Self {
        Self {
            keypoint_threshold,
            skeleton_threshold,
            radius: 5,
            line_width: 2,
        }
    }

    /// Set the marker radius in pixels.
    #[must_use]
    pub const fn with_radius(mut self, radius: i32) -> Self {
        self.radius = radius;
        self
    }

    /// Set the segment width in pixels.
    #[must_use]
    pub const fn with_line_width(mut self, width: i32) -> Self {
        self.line_width = width;
        self
    }

    #[must_use]
    pub const fn keypoint_threshold(&self) -> f32 {
        self.keypoint_threshold
    }

    #[must_use]
    pub const fn skeleton_threshold(&self) -> f32 {
        self.skeleton_threshold
    }

    /// Markers and segments for `pose`, before clipping to a target.
    ///
    /// Keypoints that are missing, below threshold or have a non-finite position
    /// are left out.
    #[must_use]
    pub fn plan(&self, pose: &Pose) -> Overlay {
        let usable = |part: KeypointPart, threshold: f32| {
            pose.get(part)
                .filter(|k| k.confidence >= threshold && k.has_position())
        };

        let segments = SKELETON
            .iter()
            .zip(LIMB_COLOR_INDICES)
            .filter_map(|(&[from, to], color_idx)| {
                let a = usable(from, self.skeleton_threshold)?;
                let b = usable(to, self.skeleton_threshold)?;
                Some(Segment {
                    from,
                    to,
                    start: (a.x, a.y),
                    end: (b.x, b.y),
                    color: Color::from_pose_index(color_idx),
                })
            })
            .collect();

        let markers = KeypointPart::ALL
            .iter()
            .filter_map(|&part| {
                let k = usable(part, self.keypoint_threshold)?;
                Some(Marker {
                    part,
                    x: k.x,
                    y: k.y,
                    color: Color::from_pose_index(KPT_COLOR_INDICES[part.index()]),
                })
            })
            .collect();

        Overlay { markers, segments }
    }

    /// Clear `target` and draw the pose onto it, segments first.
    ///
    /// Markers and segments with an endpoint outside the target are skipped.
    pub fn render(&self, pose: &Pose, target: &mut RenderTarget) {
        target.clear();
        let overlay = self.plan(pose);

        for seg in &overlay.segments {
            if !target.contains(seg.start.0, seg.start.1) || !target.contains(seg.end.0, seg.end.1) {
                continue;
            }
            let color = seg.color.to_rgba(255);
            let half = self.line_width / 2;
            for d in -half..=(self.line_width - 1 - half) {
                let d = d as f32;
                draw_line_segment_mut(
                    &mut target.image,
                    (seg.start.0 + d, seg.start.1),
                    (seg.end.0 + d, seg.end.1),
                    color,
                );
                draw_line_segment_mut(
                    &mut target.image,
                    (seg.start.0, seg.start.1 + d),
                    (seg.end.0, seg.end.1 + d),
                    color,
                );
            }
        }

        for m in &overlay.markers {
            if !target.contains(m.x, m.y) {
                continue;
            }
            draw_filled_circle_mut(
                &mut target.image,
                (m.x.round() as i32, m.y.round() as i32),
                self.radius,
                m.color.to_rgba(255),
            );
        }
    }
}

/// Alpha-blend the overlay onto a copy of the frame.
#[must_use]
pub fn compose(frame: &RgbImage, target: &RenderTarget) -> RgbImage {
    let mut out = frame.clone();
    let (w, h) = (
        frame.width().min(target.width()),
        frame.height().min(target.height()),
    );
    for y in 0..h {
        for x in 0..w {
            let Rgba([r, g, b, a]) = *target.image.get_pixel(x, y);
            if a == 0 {
                continue;
            }
            let px = out.get_pixel_mut(x, y);
            let alpha = u16::from(a);
            for (c, src) in px.0.iter_mut().zip([r, g, b]) {
                *c = ((u16::from(src) * alpha + u16::from(*c) * (255 - alpha)) / 255) as u8;
            }
        }
    }
    out
}

/// Draw "Squats: N" at the top center with a 2 px black shadow.
///
/// Does nothing without a font.
pub fn draw_readout(image: &mut RgbImage, count: u64, font: Option<&FontVec>) {
    let Some(font) = font else {
        return;
    };
    let text = format!("Squats: {count}");
    let scale = PxScale::from((image.height() as f32 / 12.0).clamp(20.0, 64.0));
    let (tw, _) = text_size(scale, font, &text);
    let x = (image.width().saturating_sub(tw) / 2) as i32;
    let y = 10;

    draw_text_mut(image, Rgb([0, 0, 0]), x + 2, y + 2, scale, font, &text);
    draw_text_mut(image, Color::WHITE.to_rgb(), x, y, scale, font, &text);
}

/// Load the readout font, downloading it on first use.
#[must_use]
pub fn load_font() -> Option<FontVec> {
    let path = check_font(READOUT_FONT)?;
    let data = fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

/// Find the next free run directory (`count`, `count2`, `count3`, ...).
#[must_use]
pub fn find_next_run_dir(base: &str, prefix: &str) -> PathBuf {
    let base_path = Path::new(base);
    let first = base_path.join(prefix);
    if !first.exists() {
        return first;
    }
    (2u32..)
        .map(|i| base_path.join(format!("{prefix}{i}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn pose_with(conf: impl Fn(KeypointPart) -> f32) -> Pose {
        let keypoints = KeypointPart::ALL
            .iter()
            .enumerate()
            .map(|(i, &part)| Keypoint::new(part, 10.0 + 5.0 * i as f32, 20.0 + 4.0 * i as f32, conf(part)))
            .collect();
        Pose::new(keypoints, 0.9)
    }

    #[test]
    fn test_plan_thresholds() {
        let renderer = Renderer::default();
        let pose = pose_with(|part| match part {
            KeypointPart::Nose => 0.59,
            KeypointPart::LeftKnee => 0.65,
            _ => 0.7,
        });
        let overlay = renderer.plan(&pose);

        // Nose below 0.6 has no marker; the 0.65 knee has one
        assert_eq!(overlay.markers.len(), 16);
        assert!(overlay.markers.iter().all(|m| m.part != KeypointPart::Nose));
        assert!(overlay.markers.iter().any(|m| m.part == KeypointPart::LeftKnee));

        // Both left-knee segments are dropped (0.65 < 0.7)
        assert_eq!(overlay.segments.len(), 10);
        assert!(
            overlay
                .segments
                .iter()
                .all(|s| s.from != KeypointPart::LeftKnee && s.to != KeypointPart::LeftKnee)
        );
    }

    #[test]
    fn test_plan_low_confidence_pose_is_empty() {
        let overlay = Renderer::default().plan(&Pose::empty());
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_plan_skips_missing_and_nan() {
        let keypoints = vec![
            Keypoint::new(KeypointPart::Nose, f32::NAN, 3.0, 0.9),
            Keypoint::new(KeypointPart::LeftEye, 3.0, 3.0, f32::NAN),
        ];
        let overlay = Renderer::default().plan(&Pose::new(keypoints, 0.5));
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_render_clears_and_draws() {
        let renderer = Renderer::default();
        let mut target = RenderTarget::new(200, 200);
        renderer.render(&pose_with(|_| 0.95), &mut target);
        assert!(!target.is_blank());
        // Marker center for the nose
        assert_eq!(target.image().get_pixel(10, 20)[3], 255);

        renderer.render(&Pose::empty(), &mut target);
        assert!(target.is_blank());
    }

    #[test]
    fn test_render_out_of_bounds_is_skipped() {
        let keypoints = KeypointPart::ALL
            .iter()
            .map(|&part| Keypoint::new(part, 1.0e9, -50.0, 1.0))
            .collect();
        let mut target = RenderTarget::new(32, 32);
        Renderer::default().render(&Pose::new(keypoints, 1.0), &mut target);
        assert!(target.is_blank());

        let mut empty = RenderTarget::default();
        Renderer::default().render(&pose_with(|_| 1.0), &mut empty);
        assert!(empty.is_blank());
    }

    #[test]
    fn test_render_draws_edge_clamped_keypoints() {
        let keypoints = KeypointPart::ALL
            .iter()
            .map(|&part| Keypoint::new(part, 64.0, 10.0, 0.95))
            .collect();
        let mut target = RenderTarget::new(64, 48);
        Renderer::default().render(&Pose::new(keypoints, 0.95), &mut target);
        assert!(!target.is_blank());
        assert_eq!(target.image().get_pixel(63, 10)[3], 255);

        let bottom = KeypointPart::ALL
            .iter()
            .map(|&part| Keypoint::new(part, 20.0, 48.0, 0.95))
            .collect();
        Renderer::default().render(&Pose::new(bottom, 0.95), &mut target);
        assert_eq!(target.image().get_pixel(20, 47)[3], 255);
    }

    #[test]
    fn test_resize_keeps_same_size() {
        let mut target = RenderTarget::new(4, 4);
        target.image.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        target.resize(4, 4);
        assert!(!target.is_blank());
        target.resize(8, 2);
        assert_eq!((target.width(), target.height()), (8, 2));
        assert!(target.is_blank());
    }

    #[test]
    fn test_compose_blends_only_drawn_pixels() {
        let frame = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let mut target = RenderTarget::new(4, 4);
        target.image.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
        let out = compose(&frame, &target);
        assert_eq!(*out.get_pixel(1, 1), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_readout_without_font_is_noop() {
        let mut image = RgbImage::new(10, 10);
        draw_readout(&mut image, 3, None);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_find_next_run_dir() {
        let base = std::env::temp_dir().join(format!("squat-runs-{}", std::process::id()));
        let base_str = base.to_string_lossy().to_string();
        assert_eq!(find_next_run_dir(&base_str, "count"), base.join("count"));
        fs::create_dir_all(base.join("count")).unwrap();
        assert_eq!(find_next_run_dir(&base_str, "count"), base.join("count2"));
        let _ = fs::remove_dir_all(&base);
    }
}
