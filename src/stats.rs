//! Descriptive statistics kernel
//!
//! Pure functions over numeric samples. Every statistic collapses to `0.0`
//! when the sample is too small to define it, so callers never see `NaN`.
//!
//! Variance uses the population definition (divide by `n`) throughout the
//! pipeline. Skew and kurtosis are the biased standardized third and fourth
//! central moments; kurtosis is reported as excess kurtosis.

use serde::{Deserialize, Serialize};

/// Names of the aggregates in [`Summary::to_array`] order
pub const SUMMARY_FIELDS: [&str; 8] = [
    "mean", "std", "var", "min", "max", "median", "skew", "kurtosis",
];

/// All eight aggregates of one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub skew: f64,
    pub kurtosis: f64,
}

impl Summary {
    /// Summarize a sample
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mean = mean(values);
        let m2 = central_moment(values, mean, 2);
        let m3 = central_moment(values, mean, 3);
        let m4 = central_moment(values, mean, 4);

        let (skew, kurtosis) = if m2 > 0.0 {
            (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
        } else {
            (0.0, 0.0)
        };

        Self {
            mean,
            std: m2.sqrt(),
            variance: m2,
            min: min(values),
            max: max(values),
            median: median(values),
            skew: finite_or_zero(skew),
            kurtosis: finite_or_zero(kurtosis),
        }
    }

    /// Aggregates in emission order (see [`SUMMARY_FIELDS`])
    pub fn to_array(&self) -> [f64; 8] {
        [
            self.mean,
            self.std,
            self.variance,
            self.min,
            self.max,
            self.median,
            self.skew,
            self.kurtosis,
        ]
    }
}

/// Arithmetic mean; 0 for an empty sample
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divide by n); 0 for fewer than two values
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    central_moment(values, mean(values), 2)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Median; the mean of the two middle values for even-length samples
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Skewness (third standardized moment); 0 when the sample has no spread
pub fn skew(values: &[f64]) -> f64 {
    Summary::of(values).skew
}

/// Excess kurtosis (fourth standardized moment minus 3); 0 when the sample has no spread
pub fn kurtosis(values: &[f64]) -> f64 {
    Summary::of(values).kurtosis
}

fn central_moment(values: &[f64], mean: f64, order: i32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(order)).sum::<f64>() / values.len() as f64
}

/// Map `NaN`/`±inf` to zero
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample_is_all_zero() {
        assert_eq!(Summary::of(&[]), Summary::default());
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(min(&[]), 0.0);
        assert_eq!(max(&[]), 0.0);
    }

    #[test]
    fn test_single_value() {
        let s = Summary::of(&[42.0]);
        assert_eq!(s.mean, 42.0);
        assert_eq!(s.min, 42.0);
        assert_eq!(s.max, 42.0);
        assert_eq!(s.median, 42.0);
        assert_eq!(s.variance, 0.0);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.skew, 0.0);
        assert_eq!(s.kurtosis, 0.0);
    }

    #[test]
    fn test_population_variance() {
        // mean 5, squared deviations 9+1+1+9 = 20, / 4
        let values = [2.0, 4.0, 6.0, 8.0];
        assert!((variance(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew() {
        let s = Summary::of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(s.skew.abs() < 1e-12);
        // Uniform discrete sample: m4/m2^2 = 6.8/4 = 1.7, excess = -1.3
        assert!((s.kurtosis + 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_right_tail_has_positive_skew() {
        let s = Summary::of(&[1.0, 1.0, 1.0, 1.0, 10.0]);
        assert!(s.skew > 0.0);
    }

    #[test]
    fn test_constant_sample_guards_division() {
        let s = Summary::of(&[7.0, 7.0, 7.0]);
        assert_eq!(s.skew, 0.0);
        assert_eq!(s.kurtosis, 0.0);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn test_summary_array_order() {
        let s = Summary::of(&[1.0, 3.0]);
        let arr = s.to_array();
        assert_eq!(arr[0], 2.0); // mean
        assert_eq!(arr[1], 1.0); // std
        assert_eq!(arr[2], 1.0); // var
        assert_eq!(arr[3], 1.0); // min
        assert_eq!(arr[4], 3.0); // max
        assert_eq!(arr[5], 2.0); // median
        assert_eq!(SUMMARY_FIELDS.len(), arr.len());
    }
}
