// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Fixed-interval driver for [`Session::run_cycle`].
//!
//! The poller thread owns the session, the frame source and the estimator. Cycles
//! run back to back on that thread, so at most one inference is ever in flight.
//! Ticks that fire during a long cycle collapse into a single pending tick and are
//! recorded as overruns.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};

use crate::error::{Result, SquatError};
use crate::estimator::PoseEstimator;
use crate::session::{CycleOutcome, Session, StopToken};
use crate::source::FrameSource;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poller timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between cycle starts.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollerConfig {
    /// Create a configuration with the default 100 ms interval.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// # Errors
    ///
    /// Returns [`SquatError::ConfigError`] for a zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(SquatError::ConfigError(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to a running poll loop.
///
/// Dropping the handle stops the loop and waits for it.
pub struct Poller {
    stop: StopToken,
    wake: Sender<()>,
    handle: Option<JoinHandle<Session>>,
}

impl Poller {
    /// Start polling on a new thread.
    ///
    /// `on_cycle` runs on the poller thread after every cycle, with the session as
    /// that cycle left it. The loop ends when stop is requested or the source is
    /// finished.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config or if the thread cannot be spawned.
    pub fn spawn<S, E, F>(
        session: Session,
        source: S,
        estimator: E,
        config: PollerConfig,
        on_cycle: F,
    ) -> Result<Self>
    where
        S: FrameSource + 'static,
        E: PoseEstimator + 'static,
        F: FnMut(&CycleOutcome, &Session) + Send + 'static,
    {
        config.validate()?;

        let stop = StopToken::new();
        let (wake_tx, wake_rx) = bounded(1);
        let loop_stop = stop.clone();

        let handle = thread::Builder::new()
            .name("squat-poller".to_string())
            .spawn(move || {
                poll_loop(
                    session,
                    source,
                    estimator,
                    config.interval,
                    &loop_stop,
                    &wake_rx,
                    on_cycle,
                )
            })
            .map_err(|e| SquatError::PollerError(format!("Failed to spawn poller thread: {e}")))?;

        Ok(Self {
            stop,
            wake: wake_tx,
            handle: Some(handle),
        })
    }

    /// Token that stops this poller when requested.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Ask the loop to stop and wake it if it is waiting for a tick.
    ///
    /// An inference already in flight runs to completion and its result is discarded.
    pub fn request_stop(&self) {
        self.stop.request();
        let _ = self.wake.try_send(());
    }

    /// Whether the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to exit and take back the session.
    ///
    /// # Errors
    ///
    /// Returns [`SquatError::PollerError`] if the poller thread panicked.
    pub fn join(mut self) -> Result<Session> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| SquatError::PollerError("poller already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| SquatError::PollerError("poller thread panicked".to_string()))
    }

    /// Request stop, then join.
    ///
    /// # Errors
    ///
    /// See [`Poller::join`].
    pub fn stop(self) -> Result<Session> {
        self.request_stop();
        self.join()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.request_stop();
            let _ = handle.join();
        }
    }
}

fn poll_loop<S, E, F>(
    mut session: Session,
    mut source: S,
    mut estimator: E,
    interval: Duration,
    stop: &StopToken,
    wake: &Receiver<()>,
    mut on_cycle: F,
) -> Session
where
    S: FrameSource,
    E: PoseEstimator,
    F: FnMut(&CycleOutcome, &Session),
{
    let ticker = tick(interval);

    loop {
        select! {
            recv(ticker) -> _ => {}
            recv(wake) -> _ => {}
        }
        if stop.is_requested() || source.is_finished() {
            break;
        }

        let started = Instant::now();
        let outcome = session.run_cycle(&mut source, &mut estimator, stop);
        let overrun = started.elapsed().as_nanos() / interval.as_nanos();
        session.record_overrun(u64::try_from(overrun).unwrap_or(u64::MAX));

        if let CycleOutcome::Aborted(e) = &outcome
            && crate::cli::logging::is_verbose()
        {
            crate::warn!("Cycle skipped: {e}");
        }

        on_cycle(&outcome, &session);

        if matches!(outcome, CycleOutcome::Cancelled) {
            break;
        }
    }

    session
}
