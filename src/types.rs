//! Core data types for Proctor Flux
//!
//! These types flow through the pipeline: raw events from the host are
//! appended to capture buffers, reduced to feature vectors, and packaged into
//! window reports for submission and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::layout::FeatureLayout;
use crate::stats::finite_or_zero;

/// Key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPhase {
    Down,
    Up,
}

/// A single keyboard transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawKeyEvent {
    /// Logical key identity (e.g. `"a"`, `"Shift"`, `"Backspace"`), not a keycode
    pub key: String,
    pub phase: KeyPhase,
    /// Monotonic milliseconds
    pub timestamp: f64,
}

impl RawKeyEvent {
    pub fn down(key: impl Into<String>, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            phase: KeyPhase::Down,
            timestamp,
        }
    }

    pub fn up(key: impl Into<String>, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            phase: KeyPhase::Up,
            timestamp,
        }
    }
}

/// Pointer, clipboard and visibility event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Move,
    Click,
    Hover,
    DoubleClick,
    Copy,
    Cut,
    Paste,
    FocusChange,
}

impl PointerKind {
    /// Whether events of this kind carry cursor coordinates
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            PointerKind::Move | PointerKind::Click | PointerKind::Hover | PointerKind::DoubleClick
        )
    }
}

/// Cursor position in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A single pointer-level event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPointerEvent {
    pub kind: PointerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Monotonic milliseconds
    pub timestamp: f64,
    /// Tab visibility after a `FocusChange`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl RawPointerEvent {
    pub fn new(kind: PointerKind, x: Option<f64>, y: Option<f64>, timestamp: f64) -> Self {
        Self {
            kind,
            x,
            y,
            timestamp,
            visible: None,
        }
    }

    /// Positional event at `(x, y)`
    pub fn at(kind: PointerKind, x: f64, y: f64, timestamp: f64) -> Self {
        Self::new(kind, Some(x), Some(y), timestamp)
    }

    /// Tab visibility change
    pub fn focus_change(visible: bool, timestamp: f64) -> Self {
        Self {
            kind: PointerKind::FocusChange,
            x: None,
            y: None,
            timestamp,
            visible: Some(visible),
        }
    }

    /// Cursor position, if this event contributes spatially.
    ///
    /// Non-positional kinds and missing or non-finite coordinates yield `None`.
    pub fn position(&self) -> Option<Point> {
        if !self.kind.is_positional() {
            return None;
        }
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
            _ => None,
        }
    }
}

/// Fixed-length, position-significant numeric vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub layout: FeatureLayout,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector for `layout`, coercing non-finite values to zero and
    /// padding or truncating to the layout length.
    pub fn new(layout: FeatureLayout, mut values: Vec<f64>) -> Self {
        values.resize(layout.len(), 0.0);
        for v in values.iter_mut() {
            *v = finite_or_zero(*v);
        }
        Self { layout, values }
    }

    /// All-zero vector of the layout's length
    pub fn zeros(layout: FeatureLayout) -> Self {
        Self {
            layout,
            values: vec![0.0; layout.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Look up a value by feature name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.layout
            .index_of(name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Whether every element is zero (nothing happened in the window)
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

/// Span over which one pair of vectors was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Question the window belongs to, for per-question calibration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_index: Option<u32>,
}

impl MeasurementWindow {
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// Window lifecycle state of a session aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Buffers empty, window not yet started
    Idle,
    /// At least one event recorded since the last flush
    Accumulating,
    /// Vectors computed and buffers cleared. Holds the same data as an empty
    /// Idle window; the next capture call moves to Idle or Accumulating.
    Flushed,
}

/// What a window submission carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Pre-reduced feature vectors only
    #[default]
    Vectors,
    /// Raw event batches only
    RawEvents,
    /// Vectors and raw batches
    Both,
}

impl TransportMode {
    pub fn includes_vectors(self) -> bool {
        matches!(self, TransportMode::Vectors | TransportMode::Both)
    }

    pub fn includes_raw(self) -> bool {
        matches!(self, TransportMode::RawEvents | TransportMode::Both)
    }
}

/// Clipboard and visibility counters observed in a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerActivity {
    /// Copy and cut events
    pub copy_cut: u32,
    pub paste: u32,
    pub double_click: u32,
    /// Seconds spent with the tab hidden
    pub inactive_duration_secs: f64,
}

/// Result of flushing one measurement window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: MeasurementWindow,
    pub keystroke_vector: FeatureVector,
    pub pointer_vector: FeatureVector,
    pub activity: PointerActivity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_keystrokes: Option<Vec<RawKeyEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_pointer: Option<Vec<RawPointerEvent>>,
    pub keystroke_count: usize,
    pub pointer_count: usize,
}

impl WindowReport {
    /// Whether no event at all was captured in the window
    pub fn is_empty(&self) -> bool {
        self.keystroke_count == 0 && self.pointer_count == 0
    }
}
