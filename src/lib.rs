//! Proctor Flux - Behavioral feature extraction for exam proctoring
//!
//! Flux turns raw keystroke and pointer events captured during an exam into
//! fixed-length feature vectors through a deterministic pipeline:
//! capture buffers → window flush → keystroke/pointer extraction → submission.
//!
//! ## Modules
//!
//! - **Capture**: bounded event buffers with key-down correlation
//! - **Features**: keystroke timing and pointer kinematics in versioned layouts
//! - **Session**: per-session window lifecycle
//! - **Transport**: payload encoding and background submission

pub mod baseline;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod schema;
pub mod session;
pub mod stats;
pub mod transport;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::ProctorConfig;
pub use error::ProctorError;
pub use features::{
    extract_keystroke_vector, extract_pointer_vector, FeatureLayout, KeystrokeFeatureExtractor,
    PointerFeatureExtractor,
};
pub use session::{SessionAggregator, SharedAggregator};
pub use types::{FeatureVector, RawKeyEvent, RawPointerEvent, WindowReport};

// Schema exports
pub use schema::{InputAdapter, InputRecord, SCHEMA_VERSION};

/// Flux version embedded in all submission payloads
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for submission payloads
pub const PRODUCER_NAME: &str = "proctor-flux";
