//! Configuration for capture, extraction, sessions, transport and logging.
//!
//! Every threshold used by the extractors lives here with its default, so it
//! can be tuned without touching extraction logic.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProctorError;
use crate::features::layout::FeatureLayout;
use crate::types::TransportMode;

/// Default buffer high-water mark (events per buffer)
pub const DEFAULT_HIGH_WATER_MARK: usize = 2000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub capture: CaptureConfig,
    pub extraction: ExtractionConfig,
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// When a buffer grows past this many events it keeps only the most recent half
    pub high_water_mark: usize,
}

/// Extraction thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Gaps between events longer than this count as idle (ms)
    pub idle_threshold_ms: f64,
    /// Maximum drift from the anchor for a dwell run (px)
    pub dwell_radius_px: f64,
    /// Minimum duration of a dwell run (ms)
    pub dwell_min_ms: f64,
    /// Maximum drift from the hover point (px)
    pub hover_radius_px: f64,
    /// Minimum duration of a hover run (ms)
    pub hover_min_ms: f64,
    /// Distance from the first sample that ends the transition phase (px)
    pub transition_threshold_px: f64,
    /// Floor for elapsed time in typing speed (s)
    pub min_elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub keystroke_layout: FeatureLayout,
    pub transport_mode: TransportMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Scoring endpoint; submission is disabled when unset
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Windows waiting for the submission worker before new ones are dropped
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 2000.0,
            dwell_radius_px: 3.0,
            dwell_min_ms: 250.0,
            hover_radius_px: 3.0,
            hover_min_ms: 200.0,
            transition_threshold_px: 5.0,
            min_elapsed_secs: 1.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keystroke_layout: FeatureLayout::KeystrokeExtendedV1,
            transport_mode: TransportMode::Vectors,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 15,
            connect_timeout_secs: 5,
            queue_capacity: 32,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ProctorError> {
        let checks = [
            ("idle_threshold_ms", self.idle_threshold_ms),
            ("dwell_radius_px", self.dwell_radius_px),
            ("dwell_min_ms", self.dwell_min_ms),
            ("hover_radius_px", self.hover_radius_px),
            ("hover_min_ms", self.hover_min_ms),
            ("transition_threshold_px", self.transition_threshold_px),
            ("min_elapsed_secs", self.min_elapsed_secs),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(ProctorError::ConfigError(format!(
                    "extraction.{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl ProctorConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ProctorError> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        Ok(config)
    }

    /// Load from a JSON file if present; otherwise return defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "falling back to default config");
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON document. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ProctorError> {
        let config: ProctorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.capture.high_water_mark < 2 {
            return Err(ProctorError::ConfigError(
                "capture.high_water_mark must be at least 2".to_string(),
            ));
        }
        if self.transport.queue_capacity == 0 {
            return Err(ProctorError::ConfigError(
                "transport.queue_capacity must be at least 1".to_string(),
            ));
        }
        if !self.session.keystroke_layout.is_keystroke() {
            return Err(ProctorError::ConfigError(format!(
                "session.keystroke_layout must be a keystroke layout, got {}",
                self.session.keystroke_layout
            )));
        }
        self.extraction.validate()
    }
}
