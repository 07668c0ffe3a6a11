// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Asset downloads.
//!
//! Fetches the default pose model and the readout font from the Ultralytics asset
//! releases when they are missing locally.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Result, SquatError};

/// Default pose model name.
pub const DEFAULT_POSE_MODEL: &str = "yolo11n-pose.onnx";

/// URL for downloading the default pose model.
const DEFAULT_POSE_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n-pose.onnx";

/// Release hosting fonts.
pub const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Read timeout in seconds.
const READ_TIMEOUT: u64 = 300;

/// Width of the progress bar in cells.
const BAR_WIDTH: usize = 12;

/// Minimum seconds between progress redraws.
const MIN_UPDATE_INTERVAL: f64 = 0.1;

/// Format bytes as human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Progress bar with `filled` heavy cells and a half cell for the remainder.
fn generate_bar(progress: f64, width: usize) -> String {
    let exact = progress.clamp(0.0, 1.0) * width as f64;
    let filled = exact as usize;

    let mut bar = "━".repeat(filled);
    if filled < width {
        let rest = width - filled;
        if exact - filled as f64 > 0.5 {
            bar.push('╸');
            bar.push_str(&"─".repeat(rest - 1));
        } else {
            bar.push_str(&"─".repeat(rest));
        }
    }
    bar
}

/// Single-line download progress on stderr.
struct Progress {
    desc: String,
    total: Option<u64>,
    done: u64,
    started: Instant,
    last_draw: Instant,
}

impl Progress {
    fn new(url: &str, dest: &Path, total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            desc: format!("Downloading {url} to '{}'", dest.display()),
            total: total.filter(|&t| t > 0),
            done: 0,
            started: now,
            last_draw: now,
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.done += bytes as u64;
        if self.last_draw.elapsed().as_secs_f64() >= MIN_UPDATE_INTERVAL {
            self.last_draw = Instant::now();
            eprint!("\r\x1b[K{}", self.line());
            let _ = std::io::stderr().flush();
        }
    }

    fn finish(&self) {
        eprintln!("\r\x1b[K{}", self.line());
    }

    fn line(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.done as f64 / elapsed
        } else {
            0.0
        };
        match self.total {
            Some(total) => {
                let progress = (self.done as f64 / total as f64).min(1.0);
                format!(
                    "{}: {}% {} {}/{} {}/s {elapsed:.1}s",
                    self.desc,
                    (progress * 100.0) as u8,
                    generate_bar(progress, BAR_WIDTH),
                    format_bytes(self.done as f64),
                    format_bytes(total as f64),
                    format_bytes(rate),
                )
            }
            None => format!(
                "{}: {} {}/s {elapsed:.1}s",
                self.desc,
                format_bytes(self.done as f64),
                format_bytes(rate)
            ),
        }
    }
}

/// Stream `url` into `dest` through a `.part` file, then rename it into place.
///
/// # Errors
///
/// Returns [`SquatError::ModelLoadError`] on network or file system failures.
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_recv_body(Some(Duration::from_secs(READ_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        SquatError::ModelLoadError(match &e {
            ureq::Error::Timeout(_) => format!("Connection timed out while downloading {url}"),
            _ => format!("Failed to download {url}: {e}"),
        })
    })?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let mut progress = Progress::new(url, dest, total);
    let mut reader = response.into_body().into_reader();

    let streamed = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        let mut buffer = [0u8; 65536];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
            progress.advance(n);
        }
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp_path);
        return Err(SquatError::ModelLoadError(format!(
            "Failed to download {url}: {e}"
        )));
    }
    progress.finish();

    fs::rename(&temp_path, dest).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        SquatError::ModelLoadError(format!(
            "Failed to move downloaded file to {}: {e}",
            dest.display()
        ))
    })
}

/// Download the model at `model_path` if it is the default pose model.
///
/// # Errors
///
/// Returns an error for any other file name, or if the download fails.
pub fn try_download_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if filename != DEFAULT_POSE_MODEL {
        return Err(SquatError::ModelLoadError(format!(
            "Model file not found: {}. Auto-download is only supported for {DEFAULT_POSE_MODEL}",
            path.display(),
        )));
    }

    download_file(DEFAULT_POSE_MODEL_URL, path)?;
    Ok(path.to_path_buf())
}

/// Return the cached path of an asset font, downloading it on first use.
///
/// Fonts live in the user config directory. Returns `None` if the directory is
/// unavailable or the download fails.
#[must_use]
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy().into_owned();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(&font_name);

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        crate::warn!("Failed to create config directory: {e}");
        return None;
    }

    match download_file(&format!("{ASSETS_URL}/{font_name}"), &font_path) {
        Ok(()) => Some(font_path),
        Err(e) => {
            crate::warn!("{e}");
            None
        }
    }
}
