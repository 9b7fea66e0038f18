//! Progress reporting and cooperative cancellation

use crate::error::AlignError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives percentage updates from a running alignment
pub trait ProgressSink: Send + Sync {
    /// Progress in percent (0.0 - 100.0)
    fn report(&self, percent: f64);

    /// The run completed
    fn finished(&self);
}

/// Sink that ignores all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: f64) {}
    fn finished(&self) {}
}

#[derive(Debug, Default)]
struct RecorderState {
    updates: Vec<f64>,
    finished: bool,
}

/// Sink that keeps every update; clones share the same record
#[derive(Debug, Default, Clone)]
pub struct ProgressRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<f64> {
        self.state.lock().updates.clone()
    }

    pub fn last(&self) -> Option<f64> {
        self.state.lock().updates.last().copied()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

impl ProgressSink for ProgressRecorder {
    fn report(&self, percent: f64) {
        self.state.lock().updates.push(percent);
    }

    fn finished(&self) {
        self.state.lock().finished = true;
    }
}

/// Shared flag that asks a running alignment to stop
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Progress sink and cancel token of one run
#[derive(Clone, Copy)]
pub(crate) struct RunControl<'a> {
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancelToken,
}

impl<'a> RunControl<'a> {
    /// Fails with `Cancelled` once the token is set
    pub fn checkpoint(&self) -> Result<(), AlignError> {
        if self.cancel.is_cancelled() {
            Err(AlignError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn tracker(&self, total: Option<usize>) -> ProgressTracker<'a> {
        ProgressTracker {
            sink: self.progress,
            total,
            last_percent: 0,
        }
    }
}

/// Forwards whole-percent changes only
pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    total: Option<usize>,
    last_percent: usize,
}

impl ProgressTracker<'_> {
    pub fn update(&mut self, done: usize) {
        let Some(total) = self.total.filter(|&t| t > 0) else {
            return;
        };
        let percent = (done.saturating_mul(100) / total).min(100);
        if percent > self.last_percent {
            self.last_percent = percent;
            self.sink.report(percent as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_reports_whole_percent_steps() {
        let recorder = ProgressRecorder::new();
        let cancel = CancelToken::new();
        let control = RunControl {
            progress: &recorder,
            cancel: &cancel,
        };

        let mut tracker = control.tracker(Some(200));
        for done in 0..=200 {
            tracker.update(done);
        }

        let updates = recorder.updates();
        assert_eq!(updates.len(), 100);
        assert_eq!(recorder.last(), Some(100.0));
        assert!(updates.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_tracker_without_total_is_silent() {
        let recorder = ProgressRecorder::new();
        let cancel = CancelToken::new();
        let control = RunControl {
            progress: &recorder,
            cancel: &cancel,
        };
        control.tracker(None).update(10);
        assert!(recorder.updates().is_empty());
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        let recorder = NoProgress;
        let control = RunControl {
            progress: &recorder,
            cancel: &token,
        };

        assert!(control.checkpoint().is_ok());
        other.cancel();
        assert!(matches!(control.checkpoint(), Err(AlignError::Cancelled)));
    }
}
