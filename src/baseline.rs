//! Calibration baselines
//!
//! A student's calibration windows establish per-feature mean and spread.
//! Later windows are expressed as z-scores against that baseline so the
//! scoring side sees deviation from the student's own behavior rather than
//! raw magnitudes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::ProctorError;
use crate::features::layout::FeatureLayout;
use crate::stats;
use crate::types::FeatureVector;

/// Default number of calibration windows kept per layout
pub const DEFAULT_CALIBRATION_WINDOW: usize = 50;

/// Spread assumed when only one calibration window exists
const SINGLE_WINDOW_STD: f64 = 1.0;

/// Mean and standard deviation of one feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std: f64,
}

impl FeatureStats {
    /// Formula: (value - mean) / std, or 0 when std <= 0
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std <= 0.0 || !self.std.is_finite() {
            return 0.0;
        }
        stats::finite_or_zero((value - self.mean) / self.std)
    }
}

/// Per-feature statistics for one layout, aligned with its feature names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub layout: FeatureLayout,
    pub features: Vec<FeatureStats>,
    /// Calibration windows the statistics were computed from
    pub windows: usize,
}

impl BaselineStats {
    /// Compute statistics across calibration vectors of one layout.
    ///
    /// Uses population standard deviation; a single window gets std 1.0.
    pub fn from_vectors(
        layout: FeatureLayout,
        vectors: &[FeatureVector],
    ) -> Result<Self, ProctorError> {
        if let Some(other) = vectors.iter().find(|v| v.layout != layout) {
            return Err(ProctorError::LayoutMismatch {
                expected: layout.to_string(),
                actual: other.layout.to_string(),
            });
        }
        let rows: Vec<&[f64]> = vectors.iter().map(|v| v.as_slice()).collect();
        Ok(Self::from_rows(layout, &rows))
    }

    fn from_rows(layout: FeatureLayout, rows: &[&[f64]]) -> Self {
        let features = (0..layout.len())
            .map(|i| {
                let column: Vec<f64> = rows
                    .iter()
                    .map(|row| row.get(i).copied().unwrap_or(0.0))
                    .collect();
                let std = match column.len() {
                    0 => 0.0,
                    1 => SINGLE_WINDOW_STD,
                    _ => stats::std_dev(&column),
                };
                FeatureStats {
                    mean: stats::mean(&column),
                    std,
                }
            })
            .collect();

        Self {
            layout,
            features,
            windows: rows.len(),
        }
    }

    /// Statistics for a feature by name
    pub fn get(&self, name: &str) -> Option<&FeatureStats> {
        self.layout
            .index_of(name)
            .and_then(|i| self.features.get(i))
    }

    /// Express a vector as z-scores. Features without statistics map to 0.
    pub fn normalize(&self, vector: &FeatureVector) -> Result<FeatureVector, ProctorError> {
        if vector.layout != self.layout {
            return Err(ProctorError::LayoutMismatch {
                expected: self.layout.to_string(),
                actual: vector.layout.to_string(),
            });
        }
        let values = vector
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| self.features.get(i).map_or(0.0, |s| s.z_score(*v)))
            .collect();
        Ok(FeatureVector::new(self.layout, values))
    }
}

/// Rolling calibration vectors, kept per layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineStore {
    /// Calibration vectors keyed by layout version
    vectors: BTreeMap<String, VecDeque<Vec<f64>>>,
    /// Maximum windows kept per layout
    window_size: usize,
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_WINDOW)
    }
}

impl BaselineStore {
    pub fn new(window_size: usize) -> Self {
        Self {
            vectors: BTreeMap::new(),
            window_size: window_size.max(1),
        }
    }

    /// Add a calibration vector, evicting the oldest beyond the window size
    pub fn add(&mut self, vector: &FeatureVector) {
        let queue = self
            .vectors
            .entry(vector.layout.version().to_string())
            .or_default();
        queue.push_back(vector.values.clone());
        while queue.len() > self.window_size {
            queue.pop_front();
        }
    }

    /// Current statistics for a layout
    pub fn stats(&self, layout: FeatureLayout) -> BaselineStats {
        let rows: Vec<&[f64]> = self
            .vectors
            .get(layout.version())
            .map(|queue| queue.iter().map(|v| v.as_slice()).collect())
            .unwrap_or_default();
        BaselineStats::from_rows(layout, &rows)
    }

    /// Z-score a vector against the calibration of its own layout.
    ///
    /// Without calibration data every feature maps to 0.
    pub fn normalize(&self, vector: &FeatureVector) -> FeatureVector {
        let stats = self.stats(vector.layout);
        let values = vector
            .values
            .iter()
            .zip(&stats.features)
            .map(|(v, s)| s.z_score(*v))
            .collect();
        FeatureVector::new(vector.layout, values)
    }

    /// Number of calibration windows held for a layout
    pub fn window_count(&self, layout: FeatureLayout) -> usize {
        self.vectors.get(layout.version()).map_or(0, VecDeque::len)
    }

    /// Load baseline store from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize baseline store to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer(path_length: f64, avg_speed: f64) -> FeatureVector {
        let mut values = vec![0.0; 11];
        values[0] = path_length;
        values[1] = avg_speed;
        FeatureVector::new(FeatureLayout::PointerV1, values)
    }

    #[test]
    fn test_single_window_uses_unit_std() {
        let stats = BaselineStats::from_vectors(FeatureLayout::PointerV1, &[pointer(100.0, 10.0)])
            .unwrap();
        let path = stats.get("path_length").unwrap();
        assert_eq!(path.mean, 100.0);
        assert_eq!(path.std, 1.0);
        assert_eq!(stats.windows, 1);
    }

    #[test]
    fn test_z_scores() {
        let stats = BaselineStats::from_vectors(
            FeatureLayout::PointerV1,
            &[pointer(100.0, 10.0), pointer(200.0, 10.0)],
        )
        .unwrap();
        let z = stats.normalize(&pointer(250.0, 30.0)).unwrap();
        // mean 150, population std 50
        assert_eq!(z.get("path_length"), Some(2.0));
        // zero spread maps to 0
        assert_eq!(z.get("avg_speed"), Some(0.0));
    }

    #[test]
    fn test_layout_mismatch() {
        let keys = FeatureVector::zeros(FeatureLayout::KeystrokeCompactV1);
        let err = BaselineStats::from_vectors(FeatureLayout::PointerV1, &[pointer(1.0, 1.0), keys]);
        assert!(matches!(err, Err(ProctorError::LayoutMismatch { .. })));
    }

    #[test]
    fn test_store_rolls_window() {
        let mut store = BaselineStore::new(3);
        for path in [10.0, 20.0, 30.0, 40.0, 50.0] {
            store.add(&pointer(path, 1.0));
        }
        assert_eq!(store.window_count(FeatureLayout::PointerV1), 3);
        assert_eq!(store.window_count(FeatureLayout::KeystrokeExtendedV1), 0);

        let stats = store.stats(FeatureLayout::PointerV1);
        assert_eq!(stats.get("path_length").unwrap().mean, 40.0);
    }

    #[test]
    fn test_uncalibrated_store_normalizes_to_zero() {
        let store = BaselineStore::default();
        assert!(store.normalize(&pointer(100.0, 5.0)).is_zero());
    }

    #[test]
    fn test_serialization() {
        let mut store = BaselineStore::new(10);
        store.add(&pointer(100.0, 5.0));
        store.add(&pointer(120.0, 7.0));

        let json = store.to_json().unwrap();
        let loaded = BaselineStore::from_json(&json).unwrap();
        assert_eq!(
            loaded.stats(FeatureLayout::PointerV1),
            store.stats(FeatureLayout::PointerV1)
        );
    }
}
