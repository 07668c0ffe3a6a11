// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Overlay colors, skeleton topology and the preview window.

/// Color definitions and palettes.
pub mod color;

/// Skeleton adjacency and color mapping.
pub mod skeleton;

#[cfg(feature = "visualize")]
pub mod viewer;

pub use color::Color;

#[cfg(feature = "visualize")]
pub use viewer::Viewer;
