// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::Path;
use std::process;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use image::RgbImage;

use crate::cli::args::RunArgs;
use crate::download::{DEFAULT_POSE_MODEL, try_download_model};
use crate::estimator::{Architecture, EstimatorConfig};
use crate::model::OnnxPoseEstimator;
use crate::poller::{Poller, PollerConfig};
use crate::render::{compose, draw_readout, find_next_run_dir, load_font};
use crate::session::{CycleOutcome, Session, SessionConfig};
use crate::source::{self, Source};
use crate::{VERSION, error, section, success, verbose, warn};

/// Window title for `--show`.
#[cfg(feature = "visualize")]
const WINDOW_TITLE: &str = "Squat Counter";

/// Run the squat counter until the source ends or the window is closed.
#[allow(clippy::too_many_lines)]
pub fn run_counter(args: &RunArgs) {
    let model_is_default = args.model.is_none();
    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_POSE_MODEL.to_string());

    if model_is_default && args.verbose {
        warn!("'model' argument is missing. Using default '--model={DEFAULT_POSE_MODEL}'.");
    }

    let estimator_config = estimator_config(args);
    let session_config = session_config(args);
    let poller_config =
        PollerConfig::new().with_interval(Duration::from_millis(args.interval_ms));

    if let Err(e) = poller_config.validate() {
        error!("{e}");
        process::exit(1);
    }

    let session = match Session::new(session_config) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if !Path::new(&model_path).exists()
        && let Err(e) = try_download_model(&model_path)
    {
        error!("Error loading model: {e}");
        process::exit(1);
    }

    let mut estimator = match OnnxPoseEstimator::load(&model_path, estimator_config) {
        Ok(m) => m,
        Err(e) => {
            error!("Error loading model: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = estimator.warmup() {
        warn!("Model warmup failed: {e}");
    }

    println!("Ultralytics {VERSION} 🚀 Rust ONNX squat counter");
    let (in_h, in_w) = estimator.config().input_size();
    let estimator_arch = estimator.config().architecture;
    verbose!(
        "{} summary: architecture={}, stride={}, imgsz=({}, {}), outputs={}",
        model_path,
        estimator.config().architecture,
        estimator.config().output_stride,
        in_h,
        in_w,
        estimator.output_names().len()
    );

    let source = Source::from(args.source.as_str());
    verbose!("Source: {}", source.describe());
    let frames = match source::open(source) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening source: {e}");
            process::exit(1);
        }
    };

    let save_dir = if args.save {
        let dir = find_next_run_dir("runs/squat", "count");
        if let Err(e) = fs::create_dir_all(&dir) {
            error!("Failed to create save directory {}: {e}", dir.display());
            process::exit(1);
        }
        Some(dir)
    } else {
        None
    };

    #[cfg(feature = "visualize")]
    let show = args.show;
    #[cfg(not(feature = "visualize"))]
    let show = {
        if args.show {
            warn!("--show requires the 'visualize' feature. Compile with --features visualize.");
        }
        false
    };

    let font = if show || save_dir.is_some() {
        let font = load_font();
        if font.is_none() {
            warn!("Readout font unavailable, frames will have no count overlay");
            if show {
                warn!("Showing the count in the window title instead");
            }
        }
        font
    } else {
        None
    };

    #[cfg(feature = "visualize")]
    let title_count = show && font.is_none();
    let (display_tx, display_rx) = bounded::<(RgbImage, u64)>(1);
    let frame_dir = save_dir.clone();
    let on_cycle = move |outcome: &CycleOutcome, session: &Session| {
        let Some(report) = outcome.report() else {
            return;
        };

        verbose!(
            "frame {} {}x{}: squat {:.2}{}, count {}, {:.1}ms",
            report.frame.index,
            report.frame.width(),
            report.frame.height(),
            report.detection.squat_confidence,
            if report.counted { " (+1)" } else { "" },
            report.count,
            report.inference.as_secs_f64() * 1000.0
        );

        if !show && frame_dir.is_none() {
            return;
        }

        let mut composed = compose(&report.frame.image, session.target());
        draw_readout(&mut composed, report.count, font.as_ref());

        if let Some(dir) = &frame_dir {
            let path = dir.join(format!("frame_{:06}.jpg", report.frame.index));
            if let Err(e) = composed.save(&path) {
                error!("Failed to save {}: {e}", path.display());
            }
        }
        if show {
            let _ = display_tx.try_send((composed, report.count));
        }
    };

    let poller = match Poller::spawn(session, frames, estimator, poller_config, on_cycle) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if show {
        #[cfg(feature = "visualize")]
        show_until_closed(&poller, &display_rx, title_count);
    } else {
        wait_until_finished(&poller, &display_rx);
    }

    let session = match poller.stop() {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let shape = input_shape(estimator_arch, (in_h, in_w));
    print_summary(&session, save_dir.as_deref(), &shape);
}

/// Map CLI flags onto an estimator configuration.
///
/// PoseNet architectures start from the `MobileNetV1` preset; explicit flags win.
fn estimator_config(args: &RunArgs) -> EstimatorConfig {
    let mut config = match args.architecture {
        Architecture::YoloPose => EstimatorConfig::new(),
        Architecture::MobileNetV1 => EstimatorConfig::posenet_mobilenet(),
        Architecture::ResNet50 => EstimatorConfig::posenet_mobilenet()
            .with_architecture(Architecture::ResNet50)
            .with_multiplier(1.0),
    };

    if let Some(stride) = args.output_stride {
        config = config.with_output_stride(stride);
    }
    if args.input_width.is_some() || args.input_height.is_some() {
        let current = config.input_resolution;
        config = config.with_input_resolution(
            args.input_width.unwrap_or(current.width),
            args.input_height.unwrap_or(current.height),
        );
    }
    if let Some(multiplier) = args.multiplier {
        config = config.with_multiplier(multiplier);
    }
    if let Some(scale) = args.scale {
        config = config.with_input_scale_factor(scale);
    }
    config.with_threads(args.threads)
}

fn session_config(args: &RunArgs) -> SessionConfig {
    SessionConfig::new()
        .with_squat_threshold(args.squat_threshold)
        .with_keypoint_threshold(args.keypoint_threshold)
        .with_skeleton_threshold(args.skeleton_threshold)
        .with_count_mode(args.count_mode)
}

/// Input tensor shape as fed to the network: NCHW for YOLO, NHWC for PoseNet.
fn input_shape(architecture: Architecture, (h, w): (u32, u32)) -> String {
    match architecture {
        Architecture::YoloPose => format!("(1, 3, {h}, {w})"),
        Architecture::MobileNetV1 | Architecture::ResNet50 => format!("(1, {h}, {w}, 3)"),
    }
}

/// Window title, carrying the count when frames have no drawn readout.
#[cfg(feature = "visualize")]
fn window_title(count: Option<u64>) -> String {
    match count {
        Some(n) => format!("{WINDOW_TITLE} - Squats: {n}"),
        None => WINDOW_TITLE.to_string(),
    }
}

/// Drive the preview window on this thread. Closing it stops the poller.
///
/// With `title_count` set the count is shown in the title bar instead of on the frame.
#[cfg(feature = "visualize")]
fn show_until_closed(poller: &Poller, frames: &Receiver<(RgbImage, u64)>, title_count: bool) {
    use crossbeam_channel::RecvTimeoutError;

    use crate::visualizer::Viewer;

    let mut viewer: Option<Viewer> = None;

    while !poller.is_finished() {
        match frames.recv_timeout(Duration::from_millis(16)) {
            Ok((image, count)) => {
                if viewer.is_none() {
                    match Viewer::new(
                        &window_title(None),
                        image.width() as usize,
                        image.height() as usize,
                    ) {
                        Ok(v) => viewer = Some(v),
                        Err(e) => {
                            error!("{e}");
                            poller.request_stop();
                            return;
                        }
                    }
                }
                if title_count && let Some(v) = viewer.as_mut() {
                    v.set_title(&window_title(Some(count)));
                }
                if let Some(v) = viewer.as_mut()
                    && !matches!(v.update(&image), Ok(true))
                {
                    poller.request_stop();
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(v) = viewer.as_mut()
                    && !v.refresh()
                {
                    poller.request_stop();
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Block until the source is exhausted. Live sources run until the process is killed.
fn wait_until_finished(poller: &Poller, frames: &Receiver<(RgbImage, u64)>) {
    while !poller.is_finished() {
        // Nothing is displayed; keep the channel drained.
        while frames.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(50));
    }
}

#[allow(clippy::cast_precision_loss)]
fn print_summary(session: &Session, save_dir: Option<&Path>, shape: &str) {
    let stats = session.stats();

    section!("Summary");
    success!("Squats: {}", session.count());
    verbose!(
        "Cycles: {} total, {} completed, {} not ready, {} aborted, {} cancelled",
        stats.cycles,
        stats.completed,
        stats.not_ready,
        stats.aborted,
        stats.cancelled
    );
    verbose!(
        "Squat cycles: {}, overrun ticks: {}",
        stats.squat_cycles,
        stats.overrun_ticks
    );
    if let Some(mean) = stats.mean_inference() {
        verbose!(
            "Speed: {:.1}ms inference per cycle at shape {shape}",
            mean.as_secs_f64() * 1000.0
        );
    }
    if let Some(dir) = save_dir {
        verbose!("Results saved to {}", dir.display());
    }
    verbose!("💡 Learn more at https://docs.ultralytics.com/tasks/pose");
}
