//! proctor.input_record.v1 schema definition
//!
//! Normalized input records as delivered by a browser host, tagged with the
//! DOM event name they came from. Timestamps are monotonic milliseconds
//! (`performance.now()` in the browser).

use serde::{Deserialize, Serialize};

use crate::types::{PointerKind, RawPointerEvent};

/// Current schema version
pub const SCHEMA_VERSION: &str = "proctor.input_record.v1";

/// One host input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputRecord {
    #[serde(rename = "keydown")]
    KeyDown { key: String, timestamp: f64 },

    #[serde(rename = "keyup")]
    KeyUp { key: String, timestamp: f64 },

    #[serde(rename = "mousemove")]
    MouseMove {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        timestamp: f64,
    },

    #[serde(rename = "click")]
    Click {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        timestamp: f64,
    },

    #[serde(rename = "mouseover")]
    MouseOver {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        timestamp: f64,
    },

    #[serde(rename = "dblclick")]
    DoubleClick {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        timestamp: f64,
    },

    #[serde(rename = "copy")]
    Copy { timestamp: f64 },

    #[serde(rename = "cut")]
    Cut { timestamp: f64 },

    #[serde(rename = "paste")]
    Paste { timestamp: f64 },

    /// Tab shown or hidden
    #[serde(rename = "visibilitychange")]
    VisibilityChange { visible: bool, timestamp: f64 },

    /// The student moved to another question
    #[serde(rename = "question")]
    Question { index: u32, timestamp: f64 },
}

impl InputRecord {
    pub fn timestamp(&self) -> f64 {
        match self {
            InputRecord::KeyDown { timestamp, .. }
            | InputRecord::KeyUp { timestamp, .. }
            | InputRecord::MouseMove { timestamp, .. }
            | InputRecord::Click { timestamp, .. }
            | InputRecord::MouseOver { timestamp, .. }
            | InputRecord::DoubleClick { timestamp, .. }
            | InputRecord::Copy { timestamp }
            | InputRecord::Cut { timestamp }
            | InputRecord::Paste { timestamp }
            | InputRecord::VisibilityChange { timestamp, .. }
            | InputRecord::Question { timestamp, .. } => *timestamp,
        }
    }

    /// The pointer event this record maps to, if it is a pointer-level record
    pub fn pointer_event(&self) -> Option<RawPointerEvent> {
        let event = match *self {
            InputRecord::MouseMove { x, y, timestamp } => {
                RawPointerEvent::new(PointerKind::Move, x, y, timestamp)
            }
            InputRecord::Click { x, y, timestamp } => {
                RawPointerEvent::new(PointerKind::Click, x, y, timestamp)
            }
            InputRecord::MouseOver { x, y, timestamp } => {
                RawPointerEvent::new(PointerKind::Hover, x, y, timestamp)
            }
            InputRecord::DoubleClick { x, y, timestamp } => {
                RawPointerEvent::new(PointerKind::DoubleClick, x, y, timestamp)
            }
            InputRecord::Copy { timestamp } => {
                RawPointerEvent::new(PointerKind::Copy, None, None, timestamp)
            }
            InputRecord::Cut { timestamp } => {
                RawPointerEvent::new(PointerKind::Cut, None, None, timestamp)
            }
            InputRecord::Paste { timestamp } => {
                RawPointerEvent::new(PointerKind::Paste, None, None, timestamp)
            }
            InputRecord::VisibilityChange { visible, timestamp } => {
                RawPointerEvent::focus_change(visible, timestamp)
            }
            InputRecord::KeyDown { .. }
            | InputRecord::KeyUp { .. }
            | InputRecord::Question { .. } => return None,
        };
        Some(event)
    }
}
