//! Session metric aggregation
//!
//! Owns the capture buffers for one exam session and turns each measurement
//! window into a [`WindowReport`]. Flushing is snapshot-then-clear: an event
//! recorded after the flush belongs to the next window.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::capture::CaptureBuffers;
use crate::config::ProctorConfig;
use crate::features::keystroke::KeystrokeFeatureExtractor;
use crate::features::layout::FeatureLayout;
use crate::features::pointer::PointerFeatureExtractor;
use crate::types::{
    MeasurementWindow, PointerKind, RawPointerEvent, TransportMode, WindowReport, WindowState,
};

/// Per-session capture state and window lifecycle
#[derive(Debug)]
pub struct SessionAggregator {
    buffers: CaptureBuffers,
    keystrokes: KeystrokeFeatureExtractor,
    pointer: PointerFeatureExtractor,
    keystroke_layout: FeatureLayout,
    transport_mode: TransportMode,
    state: WindowState,
    window_start: DateTime<Utc>,
    question_index: Option<u32>,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new(&ProctorConfig::default())
    }
}

impl SessionAggregator {
    /// Create an aggregator that is capturing, with the window starting now
    pub fn new(config: &ProctorConfig) -> Self {
        Self::starting_at(config, Utc::now())
    }

    /// Create an aggregator whose first window starts at `start`
    pub fn starting_at(config: &ProctorConfig, start: DateTime<Utc>) -> Self {
        Self {
            buffers: CaptureBuffers::new(config.capture.high_water_mark),
            keystrokes: KeystrokeFeatureExtractor::new(config.extraction.clone()),
            pointer: PointerFeatureExtractor::new(config.extraction.clone()),
            keystroke_layout: config.session.keystroke_layout,
            transport_mode: config.session.transport_mode,
            state: WindowState::Idle,
            window_start: start,
            question_index: None,
        }
    }

    /// Resume capture. Starts a fresh window if capture was stopped.
    pub fn start(&mut self) {
        if !self.buffers.is_active() {
            self.buffers.start();
            self.window_start = Utc::now();
            self.state = WindowState::Idle;
        }
    }

    /// Stop capture and discard anything buffered
    pub fn stop(&mut self) {
        self.buffers.stop();
        self.state = WindowState::Idle;
    }

    pub fn is_capturing(&self) -> bool {
        self.buffers.is_active()
    }

    pub fn capture_key_down(&mut self, key: &str, timestamp: f64) {
        let accepted = self.buffers.record_key_down(key, timestamp);
        self.mark_recorded(accepted);
    }

    pub fn capture_key_up(&mut self, key: &str, timestamp: f64) {
        let accepted = self.buffers.record_key_up(key, timestamp);
        self.mark_recorded(accepted);
    }

    pub fn capture_pointer_event(
        &mut self,
        kind: PointerKind,
        x: Option<f64>,
        y: Option<f64>,
        timestamp: f64,
    ) {
        let accepted = self.buffers.record_pointer_event(kind, x, y, timestamp);
        self.mark_recorded(accepted);
    }

    pub fn capture_pointer(&mut self, event: RawPointerEvent) {
        let accepted = self.buffers.record_pointer(event);
        self.mark_recorded(accepted);
    }

    /// A capture call ends the Flushed state: Accumulating if the event was
    /// accepted, Idle otherwise.
    fn mark_recorded(&mut self, accepted: bool) {
        if accepted {
            self.state = WindowState::Accumulating;
        } else if self.state == WindowState::Flushed {
            self.state = WindowState::Idle;
        }
    }

    /// Tag subsequent windows with a question. Stays in effect until changed.
    pub fn set_question_index(&mut self, index: Option<u32>) {
        self.question_index = index;
    }

    pub fn question_index(&self) -> Option<u32> {
        self.question_index
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn keystroke_layout(&self) -> FeatureLayout {
        self.keystroke_layout
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    pub fn buffers(&self) -> &CaptureBuffers {
        &self.buffers
    }

    /// Close the current window now
    pub fn flush(&mut self) -> WindowReport {
        self.flush_at(Utc::now())
    }

    /// Close the current window at `end`.
    ///
    /// Computes both vectors, clears the buffers and starts the next window at
    /// `end`. An empty window yields all-zero vectors.
    pub fn flush_at(&mut self, end: DateTime<Utc>) -> WindowReport {
        let snapshot = self.buffers.take();

        let keystroke_vector = self.keystrokes.extract(&snapshot.keys, self.keystroke_layout);
        let pointer_vector = self.pointer.extract(&snapshot.pointer);
        let activity = self.pointer.activity(&snapshot.pointer);

        let window = MeasurementWindow {
            start: self.window_start,
            end,
            question_index: self.question_index,
        };
        debug!(
            keys = snapshot.keys.len(),
            pointer = snapshot.pointer.len(),
            question = ?self.question_index,
            duration_secs = window.duration_secs(),
            "flushed measurement window"
        );

        let keystroke_count = snapshot.keys.len();
        let pointer_count = snapshot.pointer.len();
        let (raw_keystrokes, raw_pointer) = if self.transport_mode.includes_raw() {
            (Some(snapshot.keys), Some(snapshot.pointer))
        } else {
            (None, None)
        };

        self.window_start = end;
        self.state = WindowState::Flushed;

        WindowReport {
            window,
            keystroke_vector,
            pointer_vector,
            activity,
            raw_keystrokes,
            raw_pointer,
            keystroke_count,
            pointer_count,
        }
    }
}

/// Thread-safe handle to an aggregator.
///
/// Input callbacks and the flush timer may run on different threads; the
/// mutex makes each record and each snapshot-then-clear atomic.
#[derive(Debug, Clone, Default)]
pub struct SharedAggregator {
    inner: Arc<Mutex<SessionAggregator>>,
}

impl SharedAggregator {
    pub fn new(aggregator: SessionAggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    /// Lock the aggregator. A poisoned lock is recovered, since capture
    /// state stays consistent between calls.
    pub fn lock(&self) -> MutexGuard<'_, SessionAggregator> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capture_key_down(&self, key: &str, timestamp: f64) {
        self.lock().capture_key_down(key, timestamp);
    }

    pub fn capture_key_up(&self, key: &str, timestamp: f64) {
        self.lock().capture_key_up(key, timestamp);
    }

    pub fn capture_pointer(&self, event: RawPointerEvent) {
        self.lock().capture_pointer(event);
    }

    pub fn flush(&self) -> WindowReport {
        self.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn aggregator() -> SessionAggregator {
        SessionAggregator::starting_at(&ProctorConfig::default(), t0())
    }

    #[test]
    fn test_state_transitions() {
        let mut agg = aggregator();
        assert_eq!(agg.state(), WindowState::Idle);

        agg.capture_key_down("a", 0.0);
        assert_eq!(agg.state(), WindowState::Accumulating);

        agg.flush_at(t0() + Duration::seconds(30));
        assert_eq!(agg.state(), WindowState::Flushed);

        agg.capture_key_up("a", 100.0);
        assert_eq!(agg.state(), WindowState::Accumulating);

        agg.stop();
        assert_eq!(agg.state(), WindowState::Idle);
    }

    #[test]
    fn test_flushed_returns_to_idle() {
        let mut agg = aggregator();
        agg.capture_key_down("a", 0.0);
        agg.flush_at(t0() + Duration::seconds(30));
        assert_eq!(agg.state(), WindowState::Flushed);

        // A rejected event still closes out the flushed state
        agg.capture_key_down("b", f64::NAN);
        assert_eq!(agg.state(), WindowState::Idle);
        assert!(agg.flush_at(t0() + Duration::seconds(60)).is_empty());
    }

    #[test]
    fn test_flush_clears_and_advances_window() {
        let mut agg = aggregator();
        agg.capture_key_down("a", 0.0);
        agg.capture_key_up("a", 100.0);
        agg.capture_pointer(RawPointerEvent::at(PointerKind::Move, 0.0, 0.0, 0.0));
        agg.capture_pointer(RawPointerEvent::at(PointerKind::Move, 100.0, 0.0, 1000.0));

        let end = t0() + Duration::seconds(30);
        let report = agg.flush_at(end);
        assert_eq!(report.window.start, t0());
        assert_eq!(report.window.end, end);
        assert_eq!(report.keystroke_count, 2);
        assert_eq!(report.pointer_count, 2);
        assert_eq!(report.keystroke_vector.get("typing_speed_mean"), None);
        assert_eq!(report.keystroke_vector.get("typing_speed"), Some(1.0));
        assert_eq!(report.pointer_vector.get("path_length"), Some(100.0));
        assert!(report.raw_keystrokes.is_none());

        assert!(agg.buffers().is_empty());
        assert_eq!(agg.window_start(), end);
    }

    #[test]
    fn test_flush_twice_yields_zero_vectors() {
        let mut agg = aggregator();
        agg.capture_key_down("a", 0.0);
        agg.capture_key_up("a", 100.0);
        agg.flush_at(t0() + Duration::seconds(10));

        let second = agg.flush_at(t0() + Duration::seconds(20));
        assert!(second.is_empty());
        assert!(second.keystroke_vector.is_zero());
        assert!(second.pointer_vector.is_zero());
        assert_eq!(second.keystroke_vector.len(), 256);
        assert_eq!(second.pointer_vector.len(), 11);
    }

    #[test]
    fn test_raw_batches_follow_transport_mode() {
        let mut config = ProctorConfig::default();
        config.session.transport_mode = TransportMode::Both;
        let mut agg = SessionAggregator::starting_at(&config, t0());
        agg.capture_key_down("a", 0.0);
        agg.capture_pointer_event(PointerKind::Click, Some(1.0), Some(2.0), 5.0);

        let report = agg.flush_at(t0() + Duration::seconds(1));
        assert_eq!(report.raw_keystrokes.map(|k| k.len()), Some(1));
        assert_eq!(report.raw_pointer.map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_question_index_tags_windows() {
        let mut agg = aggregator();
        agg.set_question_index(Some(3));
        let report = agg.flush_at(t0() + Duration::seconds(5));
        assert_eq!(report.window.question_index, Some(3));
        let report = agg.flush_at(t0() + Duration::seconds(10));
        assert_eq!(report.window.question_index, Some(3));
    }

    #[test]
    fn test_stopped_aggregator_ignores_events() {
        let mut agg = aggregator();
        agg.stop();
        agg.capture_key_down("a", 0.0);
        assert_eq!(agg.state(), WindowState::Idle);
        assert!(agg.buffers().is_empty());

        agg.start();
        agg.capture_key_down("a", 0.0);
        assert_eq!(agg.buffers().key_count(), 1);
    }

    #[test]
    fn test_shared_aggregator_across_threads() {
        let shared = SharedAggregator::new(aggregator());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        shared.capture_key_down("a", (i * 100 + j) as f64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let report = shared.flush();
        assert_eq!(report.keystroke_count, 40);
        assert!(shared.lock().buffers().is_empty());
    }
}
