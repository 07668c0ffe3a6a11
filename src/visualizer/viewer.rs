// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Preview window for composed frames.

use std::time::Duration;

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};

use crate::error::{Result, SquatError};
use crate::visualizer::Color;

/// Window refresh cap (~60 Hz).
const UPDATE_RATE: Duration = Duration::from_micros(16600);

/// A simple frame viewer using minifb.
pub struct Viewer {
    window: Window,
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Viewer {
    /// Create a new viewer window.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::VisualizerError`] if the window cannot be created.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width.max(1),
            height.max(1),
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| SquatError::VisualizerError(format!("Failed to create window: {e}")))?;

        window.limit_update_rate(Some(UPDATE_RATE));

        Ok(Self {
            window,
            width,
            height,
            buffer: Vec::new(),
        })
    }

    /// Whether the window is open and neither Esc nor Q is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.window.is_open()
            && !self.window.is_key_down(Key::Escape)
            && !self.window.is_key_down(Key::Q)
    }

    /// Show a new frame. Returns `false` once the user closed the window.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::VisualizerError`] if the window rejects the buffer.
    pub fn update(&mut self, image: &RgbImage) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }

        self.width = image.width() as usize;
        self.height = image.height() as usize;
        self.buffer.clear();
        self.buffer.extend(
            image
                .pixels()
                .map(|p| Color::new(p[0], p[1], p[2]).to_u32()),
        );

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| SquatError::VisualizerError(format!("Failed to update window: {e}")))?;

        Ok(true)
    }

    /// Replace the window title.
    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Keep the window responsive without a new frame. Returns `false` once closed.
    pub fn refresh(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.buffer.is_empty() {
            self.window.update();
        } else {
            let _ = self
                .window
                .update_with_buffer(&self.buffer, self.width, self.height);
        }
        true
    }
}
