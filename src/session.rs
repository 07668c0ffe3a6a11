// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! One frame → pose → detection → render → count cycle.
//!
//! A [`Session`] owns all mutable counting state: the detector, the renderer and
//! its [`RenderTarget`], the [`SquatCounter`] and running statistics. Each call to
//! [`Session::run_cycle`] either completes fully or leaves that state untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::counter::{CountMode, SquatCounter};
use crate::detector::{DEFAULT_SQUAT_THRESHOLD, DetectionResult, SquatDetector};
use crate::error::{Result, SquatError};
use crate::estimator::PoseEstimator;
use crate::pose::Pose;
use crate::render::{
    DEFAULT_KEYPOINT_THRESHOLD, DEFAULT_SKELETON_THRESHOLD, RenderTarget, Renderer,
};
use crate::source::{Frame, FrameSource};

/// Thresholds and counting policy for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Minimum lower-body confidence for a squat (inclusive).
    pub squat_threshold: f32,
    /// Minimum confidence for a keypoint marker.
    pub keypoint_threshold: f32,
    /// Minimum confidence of both endpoints for a skeleton segment.
    pub skeleton_threshold: f32,
    /// When squat detections increment the counter.
    pub count_mode: CountMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            squat_threshold: DEFAULT_SQUAT_THRESHOLD,
            keypoint_threshold: DEFAULT_KEYPOINT_THRESHOLD,
            skeleton_threshold: DEFAULT_SKELETON_THRESHOLD,
            count_mode: CountMode::EveryCycle,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the squat threshold.
    #[must_use]
    pub const fn with_squat_threshold(mut self, threshold: f32) -> Self {
        self.squat_threshold = threshold;
        self
    }

    /// Set the keypoint marker threshold.
    #[must_use]
    pub const fn with_keypoint_threshold(mut self, threshold: f32) -> Self {
        self.keypoint_threshold = threshold;
        self
    }

    /// Set the skeleton segment threshold.
    #[must_use]
    pub const fn with_skeleton_threshold(mut self, threshold: f32) -> Self {
        self.skeleton_threshold = threshold;
        self
    }

    /// Set the counting mode.
    #[must_use]
    pub const fn with_count_mode(mut self, mode: CountMode) -> Self {
        self.count_mode = mode;
        self
    }

    /// Check that every threshold lies in [0, 1].
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::ConfigError`] naming the first bad threshold.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("squat threshold", self.squat_threshold),
            ("keypoint threshold", self.keypoint_threshold),
            ("skeleton threshold", self.skeleton_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SquatError::ConfigError(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Shared cancellation flag checked after each inference.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the holder to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a completed cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Frame the pose was estimated on.
    pub frame: Frame,
    /// Estimated pose.
    pub pose: Pose,
    /// Squat decision for the pose.
    pub detection: DetectionResult,
    /// Whether the counter was incremented.
    pub counted: bool,
    /// Counter value after the cycle.
    pub count: u64,
    /// Time spent inside the estimator.
    pub inference: Duration,
    /// Wall time of the whole cycle.
    pub elapsed: Duration,
}

/// Result of one poll cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No frame was available. Nothing changed.
    NotReady,
    /// Estimation or detection failed. Nothing changed.
    Aborted(SquatError),
    /// Stop was requested while inference was in flight. The pose was discarded.
    Cancelled,
    /// The target was repainted and the counter updated.
    Completed(CycleReport),
}

impl CycleOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Report of a completed cycle.
    #[must_use]
    pub const fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Running totals over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles attempted.
    pub cycles: u64,
    pub completed: u64,
    pub not_ready: u64,
    pub aborted: u64,
    pub cancelled: u64,
    /// Completed cycles whose detection was a squat.
    pub squat_cycles: u64,
    /// Ticks that elapsed while a cycle was still running.
    pub overrun_ticks: u64,
    /// Inference time summed over completed cycles.
    pub total_inference: Duration,
}

impl CycleStats {
    /// Mean inference time of completed cycles.
    #[must_use]
    pub fn mean_inference(&self) -> Option<Duration> {
        let n = u32::try_from(self.completed).ok().filter(|&n| n > 0)?;
        Some(self.total_inference / n)
    }
}

/// Mutable counting state plus the pure components that update it.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    detector: SquatDetector,
    renderer: Renderer,
    counter: SquatCounter,
    target: RenderTarget,
    stats: CycleStats,
}

impl Default for Session {
    fn default() -> Self {
        Self::build(SessionConfig::default())
    }
}

impl Session {
    /// Create a session with a zero count and an empty target.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::ConfigError`] if a threshold is out of range.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SessionConfig) -> Self {
        Self {
            config,
            detector: SquatDetector::new(config.squat_threshold),
            renderer: Renderer::new(config.keypoint_threshold, config.skeleton_threshold),
            counter: SquatCounter::new(config.count_mode),
            target: RenderTarget::default(),
            stats: CycleStats::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current squat count.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.counter.value()
    }

    #[must_use]
    pub const fn counter(&self) -> &SquatCounter {
        &self.counter
    }

    #[must_use]
    pub const fn detector(&self) -> &SquatDetector {
        &self.detector
    }

    #[must_use]
    pub const fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Overlay painted by the last completed cycle.
    #[must_use]
    pub const fn target(&self) -> &RenderTarget {
        &self.target
    }

    #[must_use]
    pub const fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Record ticks that fired while a cycle was running.
    pub const fn record_overrun(&mut self, ticks: u64) {
        self.stats.overrun_ticks = self.stats.overrun_ticks.saturating_add(ticks);
    }

    /// Run one cycle.
    ///
    /// Blocks on the estimator. If `stop` is requested while the estimate is in
    /// flight its result is discarded.
    pub fn run_cycle<S, E>(&mut self, source: &mut S, estimator: &mut E, stop: &StopToken) -> CycleOutcome
    where
        S: FrameSource + ?Sized,
        E: PoseEstimator + ?Sized,
    {
        let started = Instant::now();
        self.stats.cycles += 1;

        let frame = if source.is_ready() {
            source.current_frame()
        } else {
            None
        };
        let Some(frame) = frame else {
            self.stats.not_ready += 1;
            return CycleOutcome::NotReady;
        };

        let inference_start = Instant::now();
        let estimate = estimator.estimate_single_pose(&frame);
        let inference = inference_start.elapsed();

        if stop.is_requested() {
            self.stats.cancelled += 1;
            return CycleOutcome::Cancelled;
        }

        let pose = match estimate {
            Ok(pose) => pose,
            Err(e) => {
                self.stats.aborted += 1;
                return CycleOutcome::Aborted(e);
            }
        };

        let detection = match self.detector.detect(&pose) {
            Ok(detection) => detection,
            Err(e) => {
                self.stats.aborted += 1;
                return CycleOutcome::Aborted(e);
            }
        };

        self.target.resize(frame.width(), frame.height());
        self.renderer.render(&pose, &mut self.target);
        let counted = self.counter.observe(detection.is_squat);

        self.stats.completed += 1;
        self.stats.total_inference += inference;
        if detection.is_squat {
            self.stats.squat_cycles += 1;
        }

        CycleOutcome::Completed(CycleReport {
            frame,
            pose,
            detection,
            counted,
            count: self.counter.value(),
            inference,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointPart};
    use image::RgbImage;

    struct OneFrame(Option<Frame>);

    impl FrameSource for OneFrame {
        fn is_ready(&self) -> bool {
            self.0.is_some()
        }

        fn current_frame(&mut self) -> Option<Frame> {
            self.0.take()
        }
    }

    struct Fixed(Result<Pose>);

    impl PoseEstimator for Fixed {
        fn estimate_single_pose(&mut self, _frame: &Frame) -> Result<Pose> {
            match &self.0 {
                Ok(pose) => Ok(pose.clone()),
                Err(e) => Err(SquatError::InferenceError(e.to_string())),
            }
        }
    }

    fn frame() -> OneFrame {
        OneFrame(Some(Frame::new(RgbImage::new(64, 48), 0)))
    }

    fn uniform(conf: f32) -> Pose {
        let keypoints = KeypointPart::ALL
            .iter()
            .map(|&part| Keypoint::new(part, 20.0, 20.0, conf))
            .collect();
        Pose::new(keypoints, conf)
    }

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::default().validate().is_ok());
        let bad = SessionConfig::new().with_squat_threshold(1.5);
        assert!(matches!(Session::new(bad), Err(SquatError::ConfigError(_))));
        assert!(SessionConfig::new().with_keypoint_threshold(-0.1).validate().is_err());
    }

    #[test]
    fn test_completed_cycle_counts_and_renders() {
        let mut session = Session::default();
        let outcome = session.run_cycle(&mut frame(), &mut Fixed(Ok(uniform(0.9))), &StopToken::new());
        let report = outcome.report().unwrap();
        assert!(report.detection.is_squat);
        assert!(report.counted);
        assert_eq!(report.count, 1);
        assert_eq!(session.count(), 1);
        assert_eq!((session.target().width(), session.target().height()), (64, 48));
        assert!(!session.target().is_blank());
        assert_eq!(session.stats().completed, 1);
        assert_eq!(session.stats().squat_cycles, 1);
    }

    #[test]
    fn test_not_ready_changes_nothing() {
        let mut session = Session::default();
        let mut empty = OneFrame(None);
        let outcome = session.run_cycle(&mut empty, &mut Fixed(Ok(uniform(0.9))), &StopToken::new());
        assert!(matches!(outcome, CycleOutcome::NotReady));
        assert_eq!(session.count(), 0);
        assert_eq!(session.target().width(), 0);
        assert_eq!(session.stats().not_ready, 1);
    }

    #[test]
    fn test_estimator_error_aborts() {
        let mut session = Session::default();
        let mut failing = Fixed(Err(SquatError::InferenceError("no model".to_string())));
        let outcome = session.run_cycle(&mut frame(), &mut failing, &StopToken::new());
        assert!(matches!(outcome, CycleOutcome::Aborted(SquatError::InferenceError(_))));
        assert_eq!(session.count(), 0);
        assert!(session.target().is_blank());
    }

    #[test]
    fn test_incomplete_pose_aborts() {
        let mut session = Session::default();
        let truncated = Pose::new(vec![Keypoint::new(KeypointPart::Nose, 1.0, 1.0, 1.0)], 1.0);
        let outcome = session.run_cycle(&mut frame(), &mut Fixed(Ok(truncated)), &StopToken::new());
        assert!(matches!(outcome, CycleOutcome::Aborted(SquatError::IncompletePose(_))));
        assert_eq!(session.stats().aborted, 1);
        assert_eq!(session.target().width(), 0);
    }

    #[test]
    fn test_stop_discards_late_result() {
        let mut session = Session::default();
        let stop = StopToken::new();
        stop.request();
        let outcome = session.run_cycle(&mut frame(), &mut Fixed(Ok(uniform(0.9))), &stop);
        assert!(matches!(outcome, CycleOutcome::Cancelled));
        assert_eq!(session.count(), 0);
        assert_eq!(session.target().width(), 0);
    }

    #[test]
    fn test_mean_inference() {
        let mut stats = CycleStats::default();
        assert!(stats.mean_inference().is_none());
        stats.completed = 2;
        stats.total_inference = Duration::from_millis(30);
        assert_eq!(stats.mean_inference(), Some(Duration::from_millis(15)));
    }
}
