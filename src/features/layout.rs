//! Versioned feature orderings
//!
//! A layout fixes the length of a vector and the meaning of each index. The
//! scoring model is trained against exactly one layout per vector kind, so a
//! layout never changes once published; a new ordering gets a new variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::stats::SUMMARY_FIELDS;

/// Key sequence whose timings are tracked, in canonical key labels
pub const TRACKED_KEYS: [&str; 11] = [
    "period", "t", "i", "e", "five", "Shift.r", "o", "a", "n", "l", "Return",
];

/// Per-window keystroke scalars, appended after the named quantities
pub const KEYSTROKE_SCALARS: [&str; 6] = [
    "typing_speed",
    "digraph_mean",
    "digraph_variance",
    "trigraph_mean",
    "trigraph_variance",
    "error_rate",
];

/// Up-Up flight scalars, appended after [`KEYSTROKE_SCALARS`] in the
/// extended layout only
pub const FLIGHT_SCALARS: [&str; 2] = ["up_up_mean", "up_up_variance"];

/// Pointer features in emission order
pub const POINTER_FEATURES: [&str; 11] = [
    "path_length",
    "avg_speed",
    "idle_time",
    "dwell_time",
    "hover_time",
    "click_frequency",
    "click_interval_mean",
    "click_ratio_per_question",
    "trajectory_smoothness",
    "path_curvature",
    "transition_time",
];

/// A named timing quantity over the tracked key sequence.
///
/// Indices refer to [`TRACKED_KEYS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedQuantity {
    /// `H.k`: hold duration of key k
    Hold(usize),
    /// `DD.a.b`: Down of a to the next Down of b
    DownDown(usize, usize),
    /// `UD.a.b`: Up of a to the next Down of b
    UpDown(usize, usize),
}

impl NamedQuantity {
    pub fn name(&self) -> String {
        match *self {
            NamedQuantity::Hold(k) => format!("H.{}", TRACKED_KEYS[k]),
            NamedQuantity::DownDown(a, b) => format!("DD.{}.{}", TRACKED_KEYS[a], TRACKED_KEYS[b]),
            NamedQuantity::UpDown(a, b) => format!("UD.{}.{}", TRACKED_KEYS[a], TRACKED_KEYS[b]),
        }
    }
}

/// Named quantities in emission order:
/// `H.period, DD.period.t, UD.period.t, H.t, ..., H.Return`
pub fn tracked_quantities() -> &'static [NamedQuantity] {
    static QUANTITIES: OnceLock<Vec<NamedQuantity>> = OnceLock::new();
    QUANTITIES.get_or_init(|| {
        let mut out = Vec::with_capacity(TRACKED_KEYS.len() * 3 - 2);
        for k in 0..TRACKED_KEYS.len() {
            out.push(NamedQuantity::Hold(k));
            if k + 1 < TRACKED_KEYS.len() {
                out.push(NamedQuantity::DownDown(k, k + 1));
                out.push(NamedQuantity::UpDown(k, k + 1));
            }
        }
        out
    })
}

/// Published feature orderings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureLayout {
    /// Bare mean per named quantity plus scalars (37 values).
    /// Used for lightweight per-question calibration sampling.
    #[serde(rename = "keystroke.compact.v1")]
    KeystrokeCompactV1,
    /// Eight aggregates per named quantity plus scalars and flight scalars (256 values)
    #[serde(rename = "keystroke.extended.v1")]
    KeystrokeExtendedV1,
    /// Eleven pointer features
    #[serde(rename = "pointer.v1")]
    PointerV1,
}

impl FeatureLayout {
    pub fn version(&self) -> &'static str {
        match self {
            FeatureLayout::KeystrokeCompactV1 => "keystroke.compact.v1",
            FeatureLayout::KeystrokeExtendedV1 => "keystroke.extended.v1",
            FeatureLayout::PointerV1 => "pointer.v1",
        }
    }

    pub fn is_keystroke(&self) -> bool {
        !matches!(self, FeatureLayout::PointerV1)
    }

    pub fn len(&self) -> usize {
        self.feature_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature names in index order
    pub fn feature_names(&self) -> &'static [String] {
        static COMPACT: OnceLock<Vec<String>> = OnceLock::new();
        static EXTENDED: OnceLock<Vec<String>> = OnceLock::new();
        static POINTER: OnceLock<Vec<String>> = OnceLock::new();

        match self {
            FeatureLayout::KeystrokeCompactV1 => COMPACT.get_or_init(|| {
                tracked_quantities()
                    .iter()
                    .map(NamedQuantity::name)
                    .chain(KEYSTROKE_SCALARS.iter().map(|s| s.to_string()))
                    .collect()
            }),
            FeatureLayout::KeystrokeExtendedV1 => EXTENDED.get_or_init(|| {
                let mut names = Vec::new();
                for q in tracked_quantities() {
                    let base = q.name();
                    for field in SUMMARY_FIELDS {
                        names.push(format!("{base}_{field}"));
                    }
                }
                names.extend(KEYSTROKE_SCALARS.iter().map(|s| s.to_string()));
                names.extend(FLIGHT_SCALARS.iter().map(|s| s.to_string()));
                names
            }),
            FeatureLayout::PointerV1 => {
                POINTER.get_or_init(|| POINTER_FEATURES.iter().map(|s| s.to_string()).collect())
            }
        }
    }

    /// Index of a feature name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.feature_names().iter().position(|n| n == name)
    }

    /// Parse a layout from its version string
    pub fn from_version(version: &str) -> Option<Self> {
        match version {
            "keystroke.compact.v1" => Some(FeatureLayout::KeystrokeCompactV1),
            "keystroke.extended.v1" => Some(FeatureLayout::KeystrokeExtendedV1),
            "pointer.v1" => Some(FeatureLayout::PointerV1),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}
