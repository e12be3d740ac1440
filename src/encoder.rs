//! Submission and persistence encoding
//!
//! Packages window reports into the JSON payload accepted by the scoring
//! endpoint, decodes its responses, and shapes calibration windows into
//! behavioral-metric rows for the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProctorError;
use crate::features::layout::FeatureLayout;
use crate::types::{FeatureVector, PointerActivity, RawKeyEvent, RawPointerEvent, WindowReport};
use crate::{PRODUCER_NAME, PROCTOR_VERSION};

/// Student and exam session a window belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub student_id: String,
    pub session_id: String,
}

impl SessionIdentity {
    /// Build an identity, rejecting blank ids
    pub fn new(
        student_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, ProctorError> {
        let identity = Self {
            student_id: student_id.into(),
            session_id: session_id.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.student_id.trim().is_empty() {
            return Err(ProctorError::InvalidIdentity(
                "student id is empty".to_string(),
            ));
        }
        if self.session_id.trim().is_empty() {
            return Err(ProctorError::InvalidIdentity(
                "session id is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Producer metadata attached to every payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Body posted to the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub student_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keystroke_vector: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_keystroke_events: Option<Vec<RawKeyEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_vector: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_pointer_events: Option<Vec<RawPointerEvent>>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_index: Option<u32>,
    pub keystroke_layout: FeatureLayout,
    pub pointer_layout: FeatureLayout,
    pub activity: PointerActivity,
    pub producer: Producer,
}

/// Anomaly score returned by the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyScore {
    pub risk_score: f64,
    pub threshold_exceeded: bool,
    #[serde(default)]
    pub incident_count: u32,
}

/// Stored-without-scoring acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub status: String,
}

/// Either response shape of the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionResponse {
    Score(AnomalyScore),
    Acknowledged(Acknowledgment),
}

impl SubmissionResponse {
    /// Parse a response body
    pub fn from_json(body: &str) -> Result<Self, ProctorError> {
        serde_json::from_str(body).map_err(ProctorError::JsonError)
    }

    /// The only field forwarded to the UI
    pub fn threshold_exceeded(&self) -> bool {
        match self {
            SubmissionResponse::Score(score) => score.threshold_exceeded,
            SubmissionResponse::Acknowledged(_) => false,
        }
    }
}

/// Which vector a metric row stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Keystroke,
    Mouse,
}

/// Vector stored in a metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub vector: Vec<f64>,
    pub layout: FeatureLayout,
    pub feature_names: Vec<String>,
}

impl From<&FeatureVector> for MetricValues {
    fn from(vector: &FeatureVector) -> Self {
        Self {
            vector: vector.values.clone(),
            layout: vector.layout,
            feature_names: vector.layout.feature_names().to_vec(),
        }
    }
}

/// One per-question calibration row in the `behavioral_metrics` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralMetricRow {
    pub calibration_session_id: String,
    pub student_id: String,
    pub question_index: u32,
    pub metric_type: MetricType,
    pub metrics: MetricValues,
}

/// Encoder for submission payloads and metric rows
pub struct SubmissionEncoder {
    instance_id: String,
}

impl Default for SubmissionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Build the payload for one window.
    ///
    /// Vectors are included when `include_vectors` is set; raw batches are
    /// included whenever the report carries them.
    pub fn encode(
        &self,
        identity: &SessionIdentity,
        report: &WindowReport,
        include_vectors: bool,
    ) -> Result<SubmissionPayload, ProctorError> {
        identity.validate()?;

        let (keystroke_vector, pointer_vector) = if include_vectors {
            (
                Some(report.keystroke_vector.values.clone()),
                Some(report.pointer_vector.values.clone()),
            )
        } else {
            (None, None)
        };

        Ok(SubmissionPayload {
            student_id: identity.student_id.clone(),
            session_id: identity.session_id.clone(),
            keystroke_vector,
            raw_keystroke_events: report.raw_keystrokes.clone(),
            pointer_vector,
            raw_pointer_events: report.raw_pointer.clone(),
            window_start: report.window.start,
            window_end: report.window.end,
            question_index: report.window.question_index,
            keystroke_layout: report.keystroke_vector.layout,
            pointer_layout: report.pointer_vector.layout,
            activity: report.activity.clone(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: PROCTOR_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
        })
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        identity: &SessionIdentity,
        report: &WindowReport,
        include_vectors: bool,
    ) -> Result<String, ProctorError> {
        let payload = self.encode(identity, report, include_vectors)?;
        serde_json::to_string(&payload).map_err(ProctorError::JsonError)
    }
}

/// Keystroke and mouse rows for a calibration window tagged with a question
pub fn metric_rows(
    calibration_session_id: &str,
    student_id: &str,
    report: &WindowReport,
) -> Result<[BehavioralMetricRow; 2], ProctorError> {
    SessionIdentity::new(student_id, calibration_session_id)?;
    let question_index = report
        .window
        .question_index
        .ok_or(ProctorError::MissingQuestionIndex)?;

    let row = |metric_type, vector: &FeatureVector| BehavioralMetricRow {
        calibration_session_id: calibration_session_id.to_string(),
        student_id: student_id.to_string(),
        question_index,
        metric_type,
        metrics: MetricValues::from(vector),
    };

    Ok([
        row(MetricType::Keystroke, &report.keystroke_vector),
        row(MetricType::Mouse, &report.pointer_vector),
    ])
}
