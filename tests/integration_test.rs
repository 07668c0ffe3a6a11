// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! End-to-end tests driving `Session` and `Poller` with in-memory sources and estimators.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use image::RgbImage;
use ndarray::Array4;

use squat_counter::{
    CountMode, CycleOutcome, Frame, FrameSource, Keypoint, KeypointPart, Poller, PollerConfig,
    Pose, PoseEstimator, Result, Session, SessionConfig, SquatError, StopToken,
};
use squat_counter::postprocessing::decode_yolo_pose;
use squat_counter::preprocessing::PreprocessResult;

/// Hands out a fixed number of frames, one per call, then reports finished.
struct Frames {
    remaining: u64,
    next: u64,
}

impl Frames {
    fn new(count: u64) -> Self {
        Self {
            remaining: count,
            next: 0,
        }
    }

    fn endless() -> Self {
        Self::new(u64::MAX)
    }
}

impl FrameSource for Frames {
    fn is_ready(&self) -> bool {
        self.remaining > 0
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let frame = Frame::new(RgbImage::new(80, 60), self.next);
        self.next += 1;
        Some(frame)
    }

    fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

/// Returns scripted poses in order, repeating the last one.
struct Scripted {
    poses: VecDeque<Pose>,
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(poses: Vec<Pose>) -> Self {
        Self {
            poses: poses.into(),
            delay: Duration::ZERO,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl PoseEstimator for Scripted {
    fn estimate_single_pose(&mut self, _frame: &Frame) -> Result<Pose> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        let pose = if self.poses.len() > 1 {
            self.poses.pop_front()
        } else {
            self.poses.front().cloned()
        };
        pose.ok_or_else(|| SquatError::InferenceError("script exhausted".to_string()))
    }
}

/// Blocks inside inference until released.
struct Gated {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl PoseEstimator for Gated {
    fn estimate_single_pose(&mut self, _frame: &Frame) -> Result<Pose> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        Ok(lower_body(1.0, 1.0, 1.0))
    }
}

/// Full pose with the given hip, knee and ankle confidences; upper body at 1.0.
fn lower_body(hips: f32, knees: f32, ankles: f32) -> Pose {
    let keypoints = KeypointPart::ALL
        .iter()
        .enumerate()
        .map(|(i, &part)| {
            let conf = match part {
                KeypointPart::LeftHip | KeypointPart::RightHip => hips,
                KeypointPart::LeftKnee | KeypointPart::RightKnee => knees,
                KeypointPart::LeftAnkle | KeypointPart::RightAnkle => ankles,
                _ => 1.0,
            };
            Keypoint::new(part, 10.0 + i as f32 * 3.0, 5.0 + i as f32 * 3.0, conf)
        })
        .collect();
    Pose::new(keypoints, 1.0)
}

/// Decodes a fixed raw YOLO output, as the ONNX estimator does after inference.
struct RawYolo {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl PoseEstimator for RawYolo {
    fn estimate_single_pose(&mut self, frame: &Frame) -> Result<Pose> {
        let prep = PreprocessResult {
            tensor: Array4::zeros((1, 3, 1, 1)),
            orig_shape: (frame.height(), frame.width()),
            scale: (1.0, 1.0),
            padding: (0.0, 0.0),
        };
        decode_yolo_pose(&self.data, &self.shape, &prep, 0.25)
    }
}

fn run_one(session: &mut Session, pose: Pose) -> CycleOutcome {
    let mut source = Frames::new(1);
    let mut estimator = Scripted::new(vec![pose]);
    session.run_cycle(&mut source, &mut estimator, &StopToken::new())
}

#[test]
fn test_squat_scenario_counts_once() {
    let mut session = Session::default();
    let outcome = run_one(&mut session, lower_body(0.9, 0.8, 0.55));
    let report = outcome.report().unwrap();
    assert!((report.detection.squat_confidence - 0.55).abs() < f32::EPSILON);
    assert!(report.detection.is_squat);
    assert_eq!(session.count(), 1);
}

#[test]
fn test_weak_knee_is_not_squat() {
    let mut session = Session::default();
    let outcome = run_one(&mut session, lower_body(0.9, 0.49, 0.9));
    let report = outcome.report().unwrap();
    assert!((report.detection.squat_confidence - 0.49).abs() < f32::EPSILON);
    assert!(!report.detection.is_squat);
    assert_eq!(session.count(), 0);
    // The overlay is still painted for non-squat frames.
    assert!(!session.target().is_blank());
}

#[test]
fn test_threshold_is_inclusive() {
    let mut session = Session::default();
    let outcome = run_one(&mut session, lower_body(0.5, 1.0, 1.0));
    assert!(outcome.report().unwrap().detection.is_squat);
    assert_eq!(session.count(), 1);
}

#[test]
fn test_ten_alternating_cycles_count_five() {
    let mut session = Session::default();
    let poses: Vec<Pose> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                lower_body(0.9, 0.9, 0.9)
            } else {
                lower_body(0.9, 0.2, 0.9)
            }
        })
        .collect();
    let mut source = Frames::new(10);
    let mut estimator = Scripted::new(poses);
    let stop = StopToken::new();

    let mut previous = 0;
    for _ in 0..10 {
        assert!(session.run_cycle(&mut source, &mut estimator, &stop).is_completed());
        assert!(session.count() >= previous);
        previous = session.count();
    }
    assert_eq!(session.count(), 5);
    assert_eq!(session.stats().completed, 10);
}

#[test]
fn test_on_entry_counts_transitions() {
    let config = SessionConfig::new().with_count_mode(CountMode::OnEntry);
    let mut session = Session::new(config).unwrap();
    let squat = lower_body(0.9, 0.9, 0.9);
    let stand = lower_body(0.9, 0.1, 0.9);
    let script = vec![squat.clone(), squat.clone(), stand, squat.clone(), squat];
    let mut source = Frames::new(5);
    let mut estimator = Scripted::new(script);
    let stop = StopToken::new();
    for _ in 0..5 {
        session.run_cycle(&mut source, &mut estimator, &stop);
    }
    assert_eq!(session.count(), 2);
}

#[test]
fn test_not_ready_leaves_state_untouched() {
    let mut session = Session::default();
    run_one(&mut session, lower_body(0.9, 0.9, 0.9));
    let before = session.target().clone();

    let mut empty = Frames::new(0);
    let mut estimator = Scripted::new(vec![lower_body(0.9, 0.9, 0.9)]);
    let outcome = session.run_cycle(&mut empty, &mut estimator, &StopToken::new());

    assert!(matches!(outcome, CycleOutcome::NotReady));
    assert_eq!(session.count(), 1);
    assert_eq!(session.target().image(), before.image());
}

#[test]
fn test_malformed_model_output_aborts_cycle() {
    let mut session = Session::default();
    run_one(&mut session, lower_body(0.9, 0.9, 0.9));
    let before = session.target().clone();
    assert!(!before.is_blank());

    let mut source = Frames::new(1);
    let mut estimator = RawYolo {
        data: vec![0.0; 40],
        shape: vec![1, 10, 4],
    };
    let outcome = session.run_cycle(&mut source, &mut estimator, &StopToken::new());

    assert!(matches!(outcome, CycleOutcome::Aborted(SquatError::InferenceError(_))));
    assert_eq!(session.count(), 1);
    assert_eq!(session.stats().aborted, 1);
    assert_eq!(session.target().image(), before.image());
}

#[test]
fn test_render_gating_through_session() {
    let mut session = Session::default();
    // Ankles pass detection but fall below both drawing thresholds.
    let pose = lower_body(0.9, 0.8, 0.55);
    run_one(&mut session, pose.clone());

    let overlay = session.renderer().plan(&pose);
    assert!(
        overlay
            .markers
            .iter()
            .all(|m| !matches!(m.part, KeypointPart::LeftAnkle | KeypointPart::RightAnkle))
    );
    assert!(overlay.segments.iter().all(|s| {
        !matches!(s.from, KeypointPart::LeftAnkle | KeypointPart::RightAnkle)
            && !matches!(s.to, KeypointPart::LeftAnkle | KeypointPart::RightAnkle)
    }));
    assert!(!overlay.is_empty());
}

#[test]
fn test_poller_stop_during_inference_discards_result() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let estimator = Gated {
        entered: entered_tx,
        release: release_rx,
    };

    let poller = Poller::spawn(
        Session::default(),
        Frames::endless(),
        estimator,
        PollerConfig::new().with_interval(Duration::from_millis(5)),
        |_, _| {},
    )
    .unwrap();

    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("inference never started");
    poller.request_stop();
    release_tx.send(()).unwrap();

    let session = poller.join().unwrap();
    assert_eq!(session.count(), 0);
    assert_eq!(session.target().width(), 0);
    assert_eq!(session.stats().cancelled, 1);
    assert_eq!(session.stats().completed, 0);
}

#[test]
fn test_slow_inference_does_not_double_count() {
    let estimator = Scripted::new(vec![lower_body(0.9, 0.9, 0.9)])
        .with_delay(Duration::from_millis(40));
    let peak = Arc::clone(&estimator.peak);

    let poller = Poller::spawn(
        Session::default(),
        Frames::new(3),
        estimator,
        PollerConfig::new().with_interval(Duration::from_millis(10)),
        |_, _| {},
    )
    .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !poller.is_finished() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let session = poller.join().unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(session.stats().completed, 3);
    assert_eq!(session.count(), 3);
    assert!(session.stats().overrun_ticks > 0);
}

#[test]
fn test_poller_reports_every_cycle() {
    let (tx, rx) = bounded(16);
    let poller = Poller::spawn(
        Session::default(),
        Frames::new(4),
        Scripted::new(vec![lower_body(0.9, 0.9, 0.9)]),
        PollerConfig::new().with_interval(Duration::from_millis(5)),
        move |outcome, session| {
            if let Some(report) = outcome.report() {
                let _ = tx.try_send((report.count, session.count()));
            }
        },
    )
    .unwrap();

    let counts: Vec<(u64, u64)> = (0..4)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    let session = poller.join().unwrap();

    assert_eq!(counts, vec![(1, 1), (2, 2), (3, 3), (4, 4)]);
    assert_eq!(session.count(), 4);
}
