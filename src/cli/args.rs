// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::{Args, Parser, Subcommand};

use crate::counter::CountMode;
use crate::detector::DEFAULT_SQUAT_THRESHOLD;
use crate::estimator::Architecture;
use crate::render::{DEFAULT_KEYPOINT_THRESHOLD, DEFAULT_SKELETON_THRESHOLD};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Run Options:
    --model, -m <MODEL>      Path to ONNX pose model [default: yolo11n-pose.onnx]
    --source, -s <SOURCE>    Input source (webcam index, video, URL, image, directory, or glob) [default: 0]
    --architecture <ARCH>    yolo-pose, mobilenet-v1 or resnet50 [default: yolo-pose]
    --interval-ms <MS>       Poll interval in milliseconds [default: 100]
    --squat-threshold <T>    Minimum hip/knee/ankle confidence for a squat [default: 0.5]
    --count-mode <MODE>      every-cycle or on-entry [default: every-cycle]
    --show                   Display the overlay and count in a window
    --save                   Save composed frames to runs/squat/count
    --verbose                Show verbose output

Examples:
    squat-counter run
    squat-counter run --source 0 --show
    squat-counter run -m yolo11n-pose.onnx -s workout.mp4 --save
    squat-counter run -m posenet.onnx --architecture mobilenet-v1 --output-stride 16 --input-width 320 --input-height 240 --multiplier 0.5 --scale 0.8
    squat-counter run -s frames/ --count-mode on-entry"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count squats on a camera, video, stream or image sequence
    Run(RunArgs),
}

/// Arguments for the run command.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Path to ONNX pose model file
    #[arg(short, long)]
    pub model: Option<String>,

    /// Input source (webcam index, video, URL, image, directory, or glob)
    #[arg(short, long, default_value = "0")]
    pub source: String,

    /// Pose network architecture
    #[arg(long, default_value_t = Architecture::YoloPose)]
    pub architecture: Architecture,

    /// Network output stride (PoseNet: 8, 16 or 32)
    #[arg(long)]
    pub output_stride: Option<u32>,

    /// Network input width before scaling
    #[arg(long)]
    pub input_width: Option<u32>,

    /// Network input height before scaling
    #[arg(long)]
    pub input_height: Option<u32>,

    /// `MobileNetV1` depth multiplier (0.5, 0.75 or 1.0)
    #[arg(long)]
    pub multiplier: Option<f32>,

    /// Input scale factor in (0, 1]
    #[arg(long)]
    pub scale: Option<f32>,

    /// ONNX Runtime intra-op threads (0 = automatic)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// Minimum hip/knee/ankle confidence for a squat
    #[arg(long, default_value_t = DEFAULT_SQUAT_THRESHOLD)]
    pub squat_threshold: f32,

    /// Minimum confidence for drawing a keypoint
    #[arg(long, default_value_t = DEFAULT_KEYPOINT_THRESHOLD)]
    pub keypoint_threshold: f32,

    /// Minimum confidence of both ends for drawing a skeleton segment
    #[arg(long, default_value_t = DEFAULT_SKELETON_THRESHOLD)]
    pub skeleton_threshold: f32,

    /// When a squat detection adds to the count (every-cycle, on-entry)
    #[arg(long, default_value_t = CountMode::EveryCycle)]
    pub count_mode: CountMode,

    /// Display the overlay and count in a window
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Save composed frames to runs/squat/count
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_defaults() {
        let args = Cli::parse_from(["app", "run"]);
        let Commands::Run(run) = args.command;
        assert!(run.model.is_none());
        assert_eq!(run.source, "0");
        assert_eq!(run.architecture, Architecture::YoloPose);
        assert_eq!(run.interval_ms, 100);
        assert!((run.squat_threshold - 0.5).abs() < f32::EPSILON);
        assert!((run.keypoint_threshold - 0.6).abs() < f32::EPSILON);
        assert!((run.skeleton_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(run.count_mode, CountMode::EveryCycle);
        assert!(run.output_stride.is_none());
        assert!(!run.show);
        assert!(!run.save);
        assert!(run.verbose);
    }

    #[test]
    fn test_run_args_custom() {
        let args = Cli::parse_from([
            "app",
            "run",
            "-m",
            "posenet.onnx",
            "-s",
            "clip.mp4",
            "--architecture",
            "mobilenet-v1",
            "--output-stride",
            "16",
            "--scale",
            "0.8",
            "--count-mode",
            "on-entry",
            "--interval-ms",
            "50",
            "--verbose",
            "false",
        ]);
        let Commands::Run(run) = args.command;
        assert_eq!(run.model.as_deref(), Some("posenet.onnx"));
        assert_eq!(run.source, "clip.mp4");
        assert_eq!(run.architecture, Architecture::MobileNetV1);
        assert_eq!(run.output_stride, Some(16));
        assert_eq!(run.scale, Some(0.8));
        assert_eq!(run.count_mode, CountMode::OnEntry);
        assert_eq!(run.interval_ms, 50);
        assert!(!run.verbose);
    }

    #[test]
    fn test_invalid_architecture_rejected() {
        let result = Cli::try_parse_from(["app", "run", "--architecture", "vgg16"]);
        assert!(result.is_err());
    }
}
