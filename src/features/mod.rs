//! Feature extraction
//!
//! Pure reductions from raw event batches to fixed-length vectors. Nothing in
//! this module holds state between windows.

pub mod keystroke;
pub mod layout;
pub mod pointer;

pub use keystroke::{
    canonical_key, extract_keystroke_vector, KeystrokeFeatureExtractor, KeystrokeQuantities,
};
pub use layout::{FeatureLayout, NamedQuantity, FLIGHT_SCALARS, KEYSTROKE_SCALARS, POINTER_FEATURES, TRACKED_KEYS};
pub use pointer::{extract_pointer_vector, PointerFeatureExtractor, PointerMetrics};
