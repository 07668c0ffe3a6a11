// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame sources for the polling loop.
//!
//! A [`FrameSource`] reports whether a frame is ready and hands out the current
//! frame. [`Source`] parses the user-facing input string (webcam index, video file,
//! stream URL, image, directory or glob) and [`open`] turns it into a source.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{Result, SquatError};

/// One video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixels.
    pub image: RgbImage,
    /// Sequence number within the source.
    pub index: u64,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub const fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Something the poller can read frames from.
pub trait FrameSource: Send {
    /// Whether a frame can be read right now.
    fn is_ready(&self) -> bool;

    /// Take the current frame. `None` means no frame is available this tick.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Whether the source has ended and will never be ready again.
    fn is_finished(&self) -> bool {
        false
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn current_frame(&mut self) -> Option<Frame> {
        (**self).current_frame()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }
}

/// Represents different inputs the counter can read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Path to an image file.
    Image(PathBuf),
    /// List of image paths.
    ImageList(Vec<PathBuf>),
    /// Directory containing images.
    Directory(PathBuf),
    /// Glob pattern for images.
    Glob(String),
    /// Path to a video file.
    Video(PathBuf),
    /// Webcam device index.
    Webcam(u32),
    /// Streaming URL (RTSP, RTMP, HTTP).
    Stream(String),
}

impl Source {
    /// Check if this source is a video, webcam or stream.
    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video(_) | Self::Webcam(_) | Self::Stream(_))
    }

    /// Check if this source is a live feed with no natural end.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Webcam(_) | Self::Stream(_))
    }

    /// Short description for logging.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Image(p) | Self::Directory(p) | Self::Video(p) => p.display().to_string(),
            Self::ImageList(paths) => format!("{} images", paths.len()),
            Self::Glob(pattern) | Self::Stream(pattern) => pattern.clone(),
            Self::Webcam(idx) => format!("webcam {idx}"),
        }
    }

    /// Check if a URL points to an image based on extension.
    fn is_image_url(url: &str) -> bool {
        let url_lower = url.to_lowercase();
        let path_part = url_lower.split('?').next().unwrap_or(&url_lower);
        has_image_extension(Path::new(path_part))
    }
}

/// Convert from a user-facing input string to a [`Source`].
impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if let Ok(idx) = s.parse::<u32>() {
            return Self::Webcam(idx);
        }

        if s.starts_with("rtsp://") || s.starts_with("rtmp://") {
            return Self::Stream(s.to_string());
        }

        // Remote stills are not supported as a live feed; treat everything else as a stream
        if (s.starts_with("http://") || s.starts_with("https://")) && !Self::is_image_url(s) {
            return Self::Stream(s.to_string());
        }

        if s.contains('*') {
            return Self::Glob(s.to_string());
        }

        let path = PathBuf::from(s);
        if path.is_dir() {
            return Self::Directory(path);
        }

        if let Some(ext) = path.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if matches!(
                ext.as_str(),
                "mp4" | "avi" | "mov" | "mkv" | "wmv" | "flv" | "webm" | "m4v" | "mpeg" | "mpg"
            ) {
                return Self::Video(path);
            }
        }

        Self::Image(path)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<u32> for Source {
    fn from(idx: u32) -> Self {
        Self::Webcam(idx)
    }
}

/// Open a frame source.
///
/// # Errors
///
/// Returns an error if the images cannot be listed, the video cannot be opened, or
/// video support is not compiled in.
pub fn open(source: Source) -> Result<Box<dyn FrameSource>> {
    match source {
        Source::Image(path) => {
            if !path.exists() {
                return Err(SquatError::SourceError(format!(
                    "Image not found: {}",
                    path.display()
                )));
            }
            Ok(Box::new(ImageSequence::new(vec![path])))
        }
        Source::ImageList(paths) => Ok(Box::new(ImageSequence::new(paths))),
        Source::Directory(dir) => Ok(Box::new(ImageSequence::new(collect_images_from_dir(
            &dir,
        )?))),
        Source::Glob(pattern) => Ok(Box::new(ImageSequence::new(collect_images_from_glob(
            &pattern,
        )?))),
        #[cfg(feature = "video")]
        video @ (Source::Video(_) | Source::Webcam(_) | Source::Stream(_)) => {
            Ok(Box::new(video::VideoStream::open(&video)?))
        }
        #[cfg(not(feature = "video"))]
        Source::Video(_) | Source::Webcam(_) | Source::Stream(_) => Err(
            SquatError::FeatureNotEnabled("Video support requires 'video' feature".to_string()),
        ),
    }
}

/// Finite sequence of still images, one per cycle.
#[derive(Debug)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    /// Create a sequence over the given image paths.
    #[must_use]
    pub const fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, next: 0 }
    }

    /// Total number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the sequence has no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn is_ready(&self) -> bool {
        self.next < self.paths.len()
    }

    fn current_frame(&mut self) -> Option<Frame> {
        let path = self.paths.get(self.next)?;
        let index = self.next as u64;
        self.next += 1;

        // Unreadable files count as a tick without a frame
        image::open(path)
            .ok()
            .map(|img| Frame::new(img.to_rgb8(), index))
    }

    fn is_finished(&self) -> bool {
        self.next >= self.paths.len()
    }
}

/// Check if a path has an image file extension.
fn has_image_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(
            ext.as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "webp" | "tiff" | "tif"
        )
    })
}

/// Collect image paths from a directory, sorted by name.
fn collect_images_from_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SquatError::SourceError(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| has_image_extension(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// Collect image paths from a simple `dir/*.ext` glob pattern.
fn collect_images_from_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let Some(star_pos) = pattern.find('*') else {
        return Ok(vec![PathBuf::from(pattern)]);
    };

    let dir_part = &pattern[..star_pos];
    let dir = if dir_part.is_empty() {
        Path::new(".")
    } else {
        Path::new(dir_part.trim_end_matches('/').trim_end_matches('\\'))
    };

    let ext_filter: Option<String> = pattern[star_pos..]
        .strip_prefix("*.")
        .map(str::to_lowercase);

    if !dir.is_dir() {
        return Err(SquatError::SourceError(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            ext_filter.as_ref().map_or_else(
                || has_image_extension(path),
                |ext| {
                    path.extension()
                        .is_some_and(|e| e.to_string_lossy().to_lowercase() == *ext)
                },
            )
        })
        .collect();

    paths.sort();
    Ok(paths)
}

#[cfg(feature = "video")]
mod video {
    //! Decoder-thread backed video, webcam and stream source.

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use image::RgbImage;

    use super::{Frame, FrameSource, Source};
    use crate::error::{Result, SquatError};

    /// Latest decoded frame, replaced as new frames arrive.
    type Slot = Arc<Mutex<Option<Frame>>>;

    /// Video source decoding on a background thread into a single-slot buffer.
    pub struct VideoStream {
        slot: Slot,
        finished: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
        decoder: Option<JoinHandle<()>>,
    }

    impl VideoStream {
        /// Open a video file, webcam or network stream and start decoding.
        pub fn open(source: &Source) -> Result<Self> {
            video_rs::init()
                .map_err(|e| SquatError::VideoError(format!("Failed to initialize FFmpeg: {e}")))?;

            let location: video_rs::Location = match source {
                Source::Video(path) => path.as_path().into(),
                Source::Webcam(idx) => PathBuf::from(format!("/dev/video{idx}")).into(),
                Source::Stream(url) => url
                    .parse::<video_rs::Url>()
                    .map_err(|e| SquatError::SourceError(format!("Invalid stream URL {url}: {e}")))?
                    .into(),
                other => {
                    return Err(SquatError::SourceError(format!(
                        "Not a video source: {}",
                        other.describe()
                    )));
                }
            };

            let slot: Slot = Arc::new(Mutex::new(None));
            let finished = Arc::new(AtomicBool::new(false));
            let stop = Arc::new(AtomicBool::new(false));

            let thread_slot = Arc::clone(&slot);
            let thread_finished = Arc::clone(&finished);
            let thread_stop = Arc::clone(&stop);
            let is_file = matches!(source, Source::Video(_));
            let (opened_tx, opened_rx) = crossbeam_channel::bounded::<Result<()>>(1);

            // The decoder lives on its own thread for its whole life
            let handle = thread::spawn(move || {
                let mut decoder = match video_rs::decode::Decoder::new(location) {
                    Ok(d) => {
                        let _ = opened_tx.send(Ok(()));
                        d
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(SquatError::VideoError(format!(
                            "Failed to create decoder: {e}"
                        ))));
                        thread_finished.store(true, Ordering::Release);
                        return;
                    }
                };

                // Files are paced at their frame rate; live feeds arrive in real time
                let fps = decoder.frame_rate();
                let pace = (is_file && fps > 0.0).then(|| Duration::from_secs_f32(1.0 / fps));

                let mut index = 0u64;
                while !thread_stop.load(Ordering::Relaxed) {
                    let Ok((_ts, frame)) = decoder.decode() else {
                        break;
                    };
                    if let Some(image) = frame_to_image(&frame) {
                        let mut slot = thread_slot.lock().unwrap_or_else(PoisonError::into_inner);
                        *slot = Some(Frame::new(image, index));
                    }
                    index += 1;
                    if let Some(delay) = pace {
                        thread::sleep(delay);
                    }
                }
                thread_finished.store(true, Ordering::Release);
            });

            match opened_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = handle.join();
                    return Err(e);
                }
                Err(_) => {
                    let _ = handle.join();
                    return Err(SquatError::VideoError(
                        "Decoder thread exited before opening the source".to_string(),
                    ));
                }
            }

            Ok(Self {
                slot,
                finished,
                stop,
                decoder: Some(handle),
            })
        }
    }

    impl FrameSource for VideoStream {
        fn is_ready(&self) -> bool {
            self.slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        }

        fn current_frame(&mut self) -> Option<Frame> {
            self.slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        }

        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::Acquire) && !self.is_ready()
        }
    }

    impl Drop for VideoStream {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = self.decoder.take() {
                let _ = handle.join();
            }
        }
    }

    /// Convert a `video_rs` HWC frame to an RGB image.
    fn frame_to_image(frame: &video_rs::Frame) -> Option<RgbImage> {
        let shape = frame.shape();
        let height = u32::try_from(shape[0]).ok()?;
        let width = u32::try_from(shape[1]).ok()?;
        let pixels = frame.as_standard_layout().iter().copied().collect();
        RgbImage::from_raw(width, height, pixels)
    }
}
