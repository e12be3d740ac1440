//! Submission transport
//!
//! Window payloads are posted to the scoring endpoint from a background
//! worker so capture never waits on the network. Failures are logged and
//! reported through the outcome channel; a failed window is not retried.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::encoder::{SubmissionPayload, SubmissionResponse};
use crate::error::ProctorError;

/// Something that delivers a payload and returns the endpoint's response
pub trait Submitter: Send {
    fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResponse, ProctorError>;
}

/// Blocking HTTP submitter for the scoring endpoint
pub struct HttpSubmitter {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpSubmitter {
    /// Build a submitter from transport config. Fails if no endpoint is set.
    pub fn new(config: &TransportConfig) -> Result<Self, ProctorError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProctorError::ConfigError("transport.endpoint is not set".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ProctorError::TransportError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResponse, ProctorError> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .map_err(|e| ProctorError::TransportError(e.to_string()))?;
        let status = res.status();
        let text = res.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ProctorError::TransportError(format!("{} {}", status, text)));
        }
        SubmissionResponse::from_json(&text)
    }
}

/// Result of one background submission
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub window_end: DateTime<Utc>,
    pub result: Result<SubmissionResponse, ProctorError>,
}

impl SubmissionOutcome {
    pub fn threshold_exceeded(&self) -> bool {
        matches!(&self.result, Ok(response) if response.threshold_exceeded())
    }
}

/// Background submission worker fed by a bounded channel
pub struct SubmissionQueue {
    sender: Option<SyncSender<SubmissionPayload>>,
    outcomes: Receiver<SubmissionOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl SubmissionQueue {
    /// Start a worker thread that owns `submitter`. At most `capacity`
    /// payloads wait for the worker at a time.
    pub fn spawn<S: Submitter + 'static>(
        submitter: S,
        capacity: usize,
    ) -> Result<Self, ProctorError> {
        if capacity == 0 {
            return Err(ProctorError::ConfigError(
                "submission queue capacity must be at least 1".to_string(),
            ));
        }
        let (sender, payloads) = mpsc::sync_channel::<SubmissionPayload>(capacity);
        let (outcome_tx, outcomes) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("proctor-submit".to_string())
            .spawn(move || {
                for payload in payloads {
                    let result = submitter.submit(&payload);
                    match &result {
                        Ok(response) => info!(
                            session_id = %payload.session_id,
                            window_end = %payload.window_end,
                            threshold_exceeded = response.threshold_exceeded(),
                            "window submitted"
                        ),
                        Err(e) => warn!(
                            session_id = %payload.session_id,
                            window_end = %payload.window_end,
                            error = %e,
                            "window submission failed"
                        ),
                    }
                    let outcome = SubmissionOutcome {
                        window_end: payload.window_end,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        debug!("outcome receiver dropped");
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            outcomes,
            worker: Some(worker),
        })
    }

    /// Queue a payload. Never blocks; returns false and drops the window if
    /// the queue is full or the worker is gone.
    pub fn dispatch(&self, payload: SubmissionPayload) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(payload)) => {
                warn!(window_end = %payload.window_end, "submission queue full; window dropped");
                false
            }
            Err(TrySendError::Disconnected(payload)) => {
                warn!(window_end = %payload.window_end, "submission worker stopped; window dropped");
                false
            }
        }
    }

    /// Queue a payload, waiting for room if the queue is full. For batch
    /// callers that are not on a capture path.
    pub fn dispatch_wait(&self, payload: SubmissionPayload) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.send(payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(window_end = %e.0.window_end, "submission worker stopped; window dropped");
                false
            }
        }
    }

    /// Next finished submission, if any
    pub fn try_outcome(&self) -> Option<SubmissionOutcome> {
        self.outcomes.try_recv().ok()
    }

    /// Wait up to `timeout` for the next finished submission
    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<SubmissionOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Close the queue, wait for queued payloads, and return their outcomes
    pub fn shutdown(mut self) -> Vec<SubmissionOutcome> {
        self.close();
        self.outcomes.try_iter().collect()
    }

    fn close(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("submission worker panicked");
            }
        }
    }
}

impl Drop for SubmissionQueue {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Acknowledgment, AnomalyScore, Producer};
    use crate::features::layout::FeatureLayout;
    use crate::types::PointerActivity;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    struct FakeSubmitter {
        seen: Arc<Mutex<Vec<String>>>,
        exceed: bool,
    }

    impl Submitter for FakeSubmitter {
        fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResponse, ProctorError> {
            self.seen.lock().unwrap().push(payload.session_id.clone());
            Ok(SubmissionResponse::Score(AnomalyScore {
                risk_score: 0.9,
                threshold_exceeded: self.exceed,
                incident_count: 1,
            }))
        }
    }

    struct FailingSubmitter;

    impl Submitter for FailingSubmitter {
        fn submit(&self, _: &SubmissionPayload) -> Result<SubmissionResponse, ProctorError> {
            Err(ProctorError::TransportError("503 unavailable".to_string()))
        }
    }

    fn payload(session_id: &str, second: u32) -> SubmissionPayload {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, second).unwrap();
        SubmissionPayload {
            student_id: "student".to_string(),
            session_id: session_id.to_string(),
            keystroke_vector: Some(vec![0.0; 37]),
            raw_keystroke_events: None,
            pointer_vector: Some(vec![0.0; 11]),
            raw_pointer_events: None,
            window_start: end,
            window_end: end,
            question_index: None,
            keystroke_layout: FeatureLayout::KeystrokeCompactV1,
            pointer_layout: FeatureLayout::PointerV1,
            activity: PointerActivity::default(),
            producer: Producer {
                name: "test".to_string(),
                version: "0".to_string(),
                instance_id: "0".to_string(),
            },
        }
    }

    #[test]
    fn test_queue_delivers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = SubmissionQueue::spawn(
            FakeSubmitter {
                seen: Arc::clone(&seen),
                exceed: true,
            },
            8,
        )
        .unwrap();

        assert!(queue.dispatch(payload("a", 1)));
        assert!(queue.dispatch(payload("b", 2)));
        let outcomes = queue.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(SubmissionOutcome::threshold_exceeded));
        assert_eq!(
            outcomes[1].window_end,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 2).unwrap()
        );
    }

    #[test]
    fn test_failures_reported_not_retried() {
        let queue = SubmissionQueue::spawn(FailingSubmitter, 8).unwrap();
        queue.dispatch(payload("a", 1));
        let outcome = queue
            .recv_outcome_timeout(Duration::from_secs(5))
            .expect("outcome");
        assert!(matches!(outcome.result, Err(ProctorError::TransportError(_))));
        assert!(!outcome.threshold_exceeded());
        assert!(queue.try_outcome().is_none());
    }

    /// Blocks in `submit` until the test releases it
    struct GatedSubmitter {
        gate: Arc<(Mutex<bool>, std::sync::Condvar)>,
    }

    impl Submitter for GatedSubmitter {
        fn submit(&self, _: &SubmissionPayload) -> Result<SubmissionResponse, ProctorError> {
            let (open, cvar) = &*self.gate;
            let mut open = open.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
            Ok(SubmissionResponse::Acknowledged(Acknowledgment {
                status: "ok".to_string(),
            }))
        }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let gate = Arc::new((Mutex::new(false), std::sync::Condvar::new()));
        let queue = SubmissionQueue::spawn(
            GatedSubmitter {
                gate: Arc::clone(&gate),
            },
            1,
        )
        .unwrap();

        // The worker holds at most one payload, the channel one more
        let accepted = (0..10)
            .filter(|i| queue.dispatch(payload("a", *i)))
            .count();
        assert!((1..=2).contains(&accepted), "accepted {accepted}");

        let (open, cvar) = &*gate;
        *open.lock().unwrap() = true;
        cvar.notify_all();
        assert_eq!(queue.shutdown().len(), accepted);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            SubmissionQueue::spawn(FailingSubmitter, 0),
            Err(ProctorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_http_submitter_requires_endpoint() {
        let config = TransportConfig::default();
        assert!(matches!(
            HttpSubmitter::new(&config),
            Err(ProctorError::ConfigError(_))
        ));

        let config = TransportConfig {
            endpoint: Some("http://127.0.0.1:9/score".to_string()),
            ..TransportConfig::default()
        };
        let submitter = HttpSubmitter::new(&config).unwrap();
        assert_eq!(submitter.endpoint(), "http://127.0.0.1:9/score");
    }
}
