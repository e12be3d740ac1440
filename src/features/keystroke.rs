//! Keystroke feature extraction
//!
//! Turns a raw key event log into timing quantities (holds, digraphs,
//! flights) and emits them in one of the keystroke layouts. The quantity
//! computation is shared; layouts differ only in how deep each quantity is
//! aggregated.
//!
//! All timings are in milliseconds. Typing speed is Down events per second.

use std::collections::HashMap;

use tracing::warn;

use crate::config::ExtractionConfig;
use crate::features::layout::{tracked_quantities, FeatureLayout, NamedQuantity, TRACKED_KEYS};
use crate::stats::{self, Summary};
use crate::types::{FeatureVector, KeyPhase, RawKeyEvent};

/// Key names counted as corrections for `error_rate`
const CORRECTION_KEYS: [&str; 2] = ["Backspace", "Delete"];

const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Map a logical key identity to the label used in feature names.
///
/// `"."` becomes `period`, digits become words, `"Enter"` becomes `Return`
/// and a shifted letter `"R"` becomes `Shift.r`. Named keys pass through.
pub fn canonical_key(key: &str) -> String {
    let mut chars = key.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return match key {
            "Enter" => "Return".to_string(),
            "Spacebar" => "space".to_string(),
            other => other.to_string(),
        };
    };

    match c {
        '.' => "period".to_string(),
        ',' => "comma".to_string(),
        ' ' => "space".to_string(),
        '0'..='9' => DIGIT_WORDS[c as usize - '0' as usize].to_string(),
        c if c.is_uppercase() => format!("Shift.{}", c.to_lowercase()),
        c => c.to_string(),
    }
}

/// Timing quantities computed from one window of key events
#[derive(Debug, Clone, Default)]
pub struct KeystrokeQuantities {
    /// Samples per named quantity, aligned with [`tracked_quantities`]
    pub named: Vec<Vec<f64>>,
    /// Hold samples for every key seen, by canonical label
    pub holds_by_key: HashMap<String, Vec<f64>>,
    /// Intervals between adjacent Downs
    pub digraphs: Vec<f64>,
    /// Intervals spanning three consecutive Downs
    pub trigraphs: Vec<f64>,
    /// Intervals between adjacent Ups, including Ups with no matching Down
    pub up_ups: Vec<f64>,
    pub down_count: usize,
    pub correction_count: usize,
    /// Last minus first event timestamp (ms)
    pub elapsed_ms: f64,
    pub typing_speed: f64,
    pub error_rate: f64,
}

impl KeystrokeQuantities {
    /// Scalars in layout order
    fn scalars(&self) -> [f64; 6] {
        [
            self.typing_speed,
            stats::mean(&self.digraphs),
            stats::variance(&self.digraphs),
            stats::mean(&self.trigraphs),
            stats::variance(&self.trigraphs),
            self.error_rate,
        ]
    }

    /// Flight scalars carried only by the extended layout
    fn flight_scalars(&self) -> [f64; 2] {
        [stats::mean(&self.up_ups), stats::variance(&self.up_ups)]
    }
}

/// Extracts keystroke feature vectors
#[derive(Debug, Clone, Default)]
pub struct KeystrokeFeatureExtractor {
    config: ExtractionConfig,
}

impl KeystrokeFeatureExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract a vector in the given keystroke layout
    pub fn extract(&self, events: &[RawKeyEvent], layout: FeatureLayout) -> FeatureVector {
        let quantities = self.quantities(events);
        let values = match layout {
            FeatureLayout::KeystrokeCompactV1 => emit_compact(&quantities),
            FeatureLayout::KeystrokeExtendedV1 => emit_extended(&quantities),
            FeatureLayout::PointerV1 => {
                warn!(%layout, "keystroke extraction requested with a pointer layout");
                return FeatureVector::zeros(layout);
            }
        };
        FeatureVector::new(layout, values)
    }

    /// Compute the timing quantities shared by all layouts
    pub fn quantities(&self, events: &[RawKeyEvent]) -> KeystrokeQuantities {
        let events = sorted_events(events);
        if events.is_empty() {
            return KeystrokeQuantities {
                named: vec![Vec::new(); tracked_quantities().len()],
                ..Default::default()
            };
        }

        let mut downs_by_key: HashMap<String, Vec<f64>> = HashMap::new();
        let mut ups_by_key: HashMap<String, Vec<f64>> = HashMap::new();
        let mut holds_by_key: HashMap<String, Vec<f64>> = HashMap::new();
        let mut pending: HashMap<String, f64> = HashMap::new();
        let mut all_downs = Vec::new();
        let mut all_ups = Vec::new();
        let mut correction_count = 0;

        for event in &events {
            let label = canonical_key(&event.key);
            match event.phase {
                KeyPhase::Down => {
                    all_downs.push(event.timestamp);
                    if CORRECTION_KEYS.contains(&event.key.as_str()) {
                        correction_count += 1;
                    }
                    downs_by_key
                        .entry(label.clone())
                        .or_default()
                        .push(event.timestamp);
                    // A repeated Down orphans the earlier one
                    pending.insert(label, event.timestamp);
                }
                KeyPhase::Up => {
                    all_ups.push(event.timestamp);
                    ups_by_key
                        .entry(label.clone())
                        .or_default()
                        .push(event.timestamp);
                    if let Some(&down) = pending.get(&label) {
                        if event.timestamp > down {
                            pending.remove(&label);
                            holds_by_key
                                .entry(label)
                                .or_default()
                                .push(event.timestamp - down);
                        }
                    }
                }
            }
        }

        let empty = Vec::new();
        let named = tracked_quantities()
            .iter()
            .map(|q| match *q {
                NamedQuantity::Hold(k) => holds_by_key
                    .get(TRACKED_KEYS[k])
                    .cloned()
                    .unwrap_or_default(),
                NamedQuantity::DownDown(a, b) => next_occurrence_gaps(
                    downs_by_key.get(TRACKED_KEYS[a]).unwrap_or(&empty),
                    downs_by_key.get(TRACKED_KEYS[b]).unwrap_or(&empty),
                ),
                NamedQuantity::UpDown(a, b) => next_occurrence_gaps(
                    ups_by_key.get(TRACKED_KEYS[a]).unwrap_or(&empty),
                    downs_by_key.get(TRACKED_KEYS[b]).unwrap_or(&empty),
                ),
            })
            .collect();

        let digraphs: Vec<f64> = all_downs.windows(2).map(|w| w[1] - w[0]).collect();
        let trigraphs: Vec<f64> = all_downs.windows(3).map(|w| w[2] - w[0]).collect();
        let up_ups: Vec<f64> = all_ups.windows(2).map(|w| w[1] - w[0]).collect();

        let elapsed_ms = events[events.len() - 1].timestamp - events[0].timestamp;
        let down_count = all_downs.len();
        let elapsed_secs = (elapsed_ms / 1000.0).max(self.config.min_elapsed_secs);
        let typing_speed = if down_count == 0 || elapsed_secs <= 0.0 {
            0.0
        } else {
            down_count as f64 / elapsed_secs
        };
        let error_rate = if down_count == 0 {
            0.0
        } else {
            correction_count as f64 / down_count as f64
        };

        KeystrokeQuantities {
            named,
            holds_by_key,
            digraphs,
            trigraphs,
            up_ups,
            down_count,
            correction_count,
            elapsed_ms,
            typing_speed,
            error_rate,
        }
    }
}

/// Extract with default thresholds
pub fn extract_keystroke_vector(events: &[RawKeyEvent], layout: FeatureLayout) -> FeatureVector {
    KeystrokeFeatureExtractor::default().extract(events, layout)
}

/// Drop non-finite timestamps and stable-sort chronologically
fn sorted_events(events: &[RawKeyEvent]) -> Vec<RawKeyEvent> {
    let mut sorted: Vec<RawKeyEvent> = events
        .iter()
        .filter(|e| e.timestamp.is_finite())
        .cloned()
        .collect();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    sorted
}

/// For each `from` timestamp, the gap to the first unconsumed `to` timestamp
/// strictly after it. Both slices must be sorted.
fn next_occurrence_gaps(from: &[f64], to: &[f64]) -> Vec<f64> {
    let mut gaps = Vec::new();
    let mut j = 0;
    for &start in from {
        while j < to.len() && to[j] <= start {
            j += 1;
        }
        if j == to.len() {
            break;
        }
        gaps.push(to[j] - start);
        j += 1;
    }
    gaps
}

fn emit_compact(q: &KeystrokeQuantities) -> Vec<f64> {
    let mut values: Vec<f64> = q.named.iter().map(|s| stats::mean(s)).collect();
    values.extend(q.scalars());
    values
}

fn emit_extended(q: &KeystrokeQuantities) -> Vec<f64> {
    let mut values = Vec::with_capacity(FeatureLayout::KeystrokeExtendedV1.len());
    for samples in &q.named {
        values.extend(Summary::of(samples).to_array());
    }
    values.extend(q.scalars());
    values.extend(q.flight_scalars());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_sequence(keys: &[&str], start: f64, hold: f64, gap: f64) -> Vec<RawKeyEvent> {
        let mut events = Vec::new();
        let mut t = start;
        for key in keys {
            events.push(RawKeyEvent::down(*key, t));
            events.push(RawKeyEvent::up(*key, t + hold));
            t += gap;
        }
        events
    }

    #[test]
    fn test_canonical_key_labels() {
        assert_eq!(canonical_key("."), "period");
        assert_eq!(canonical_key("5"), "five");
        assert_eq!(canonical_key("R"), "Shift.r");
        assert_eq!(canonical_key("t"), "t");
        assert_eq!(canonical_key("Enter"), "Return");
        assert_eq!(canonical_key("Backspace"), "Backspace");
        assert_eq!(canonical_key(""), "");
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        for layout in [
            FeatureLayout::KeystrokeCompactV1,
            FeatureLayout::KeystrokeExtendedV1,
        ] {
            let v = extract_keystroke_vector(&[], layout);
            assert_eq!(v.len(), layout.len());
            assert!(v.is_zero());
        }
    }

    #[test]
    fn test_single_hold() {
        let events = vec![RawKeyEvent::down("a", 0.0), RawKeyEvent::up("a", 100.0)];
        let extractor = KeystrokeFeatureExtractor::default();
        let q = extractor.quantities(&events);
        assert_eq!(q.holds_by_key.get("a"), Some(&vec![100.0]));
        // One Down over the 1 s elapsed floor
        assert_eq!(q.typing_speed, 1.0);

        let v = extractor.extract(&events, FeatureLayout::KeystrokeCompactV1);
        assert_eq!(v.get("H.a"), Some(100.0));
        assert_eq!(v.get("typing_speed"), Some(1.0));
    }

    #[test]
    fn test_double_down_yields_no_hold() {
        let events = vec![RawKeyEvent::down("a", 0.0), RawKeyEvent::down("a", 50.0)];
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert!(q.holds_by_key.is_empty());
        // Both Downs still count as digraph material
        assert_eq!(q.digraphs, vec![50.0]);
    }

    #[test]
    fn test_overwritten_down_matches_later_up() {
        let events = vec![
            RawKeyEvent::down("a", 0.0),
            RawKeyEvent::down("a", 50.0),
            RawKeyEvent::up("a", 120.0),
        ];
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert_eq!(q.holds_by_key.get("a"), Some(&vec![70.0]));
    }

    #[test]
    fn test_up_is_not_reused() {
        let events = vec![
            RawKeyEvent::down("a", 0.0),
            RawKeyEvent::up("a", 80.0),
            RawKeyEvent::down("a", 200.0),
        ];
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert_eq!(q.holds_by_key.get("a"), Some(&vec![80.0]));
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let events = vec![RawKeyEvent::up("a", 100.0), RawKeyEvent::down("a", 0.0)];
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert_eq!(q.holds_by_key.get("a"), Some(&vec![100.0]));
    }

    #[test]
    fn test_pair_specific_digraph_and_flight() {
        // "." held 100 ms, "t" pressed 150 ms after "."
        let events = type_sequence(&[".", "t"], 0.0, 100.0, 150.0);
        let v = extract_keystroke_vector(&events, FeatureLayout::KeystrokeCompactV1);
        assert_eq!(v.get("H.period"), Some(100.0));
        assert_eq!(v.get("DD.period.t"), Some(150.0));
        assert_eq!(v.get("UD.period.t"), Some(50.0));
        assert_eq!(v.get("H.t"), Some(100.0));
        // Unobserved pairs stay zero
        assert_eq!(v.get("DD.t.i"), Some(0.0));
    }

    #[test]
    fn test_digraph_and_trigraph_scalars() {
        let events = type_sequence(&["x", "y", "z", "w"], 0.0, 50.0, 100.0);
        let v = extract_keystroke_vector(&events, FeatureLayout::KeystrokeCompactV1);
        assert_eq!(v.get("digraph_mean"), Some(100.0));
        assert_eq!(v.get("digraph_variance"), Some(0.0));
        assert_eq!(v.get("trigraph_mean"), Some(200.0));
    }

    #[test]
    fn test_error_rate() {
        let events = type_sequence(&["a", "Backspace", "b", "Delete"], 0.0, 30.0, 100.0);
        let v = extract_keystroke_vector(&events, FeatureLayout::KeystrokeCompactV1);
        assert_eq!(v.get("error_rate"), Some(0.5));
    }

    #[test]
    fn test_orphan_up_feeds_up_up_flight() {
        // The first "a" Up has no Down before it
        let events = vec![
            RawKeyEvent::up("a", 0.0),
            RawKeyEvent::down("b", 50.0),
            RawKeyEvent::up("b", 120.0),
            RawKeyEvent::down("c", 200.0),
            RawKeyEvent::up("c", 280.0),
        ];
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert_eq!(q.holds_by_key.get("a"), None);
        assert_eq!(q.up_ups, vec![120.0, 160.0]);

        let v = extract_keystroke_vector(&events, FeatureLayout::KeystrokeExtendedV1);
        assert_eq!(v.get("up_up_mean"), Some(140.0));
        assert_eq!(v.get("up_up_variance"), Some(400.0));
        // The compact layout has no flight scalars
        let compact = extract_keystroke_vector(&events, FeatureLayout::KeystrokeCompactV1);
        assert_eq!(compact.get("up_up_mean"), None);
        assert_eq!(compact.len(), 37);
    }

    #[test]
    fn test_typing_speed_uses_elapsed_when_above_floor() {
        // 5 Downs, last Up at 4000 + 50 ms
        let events = type_sequence(&["a", "b", "c", "d", "e"], 0.0, 50.0, 1000.0);
        let q = KeystrokeFeatureExtractor::default().quantities(&events);
        assert!((q.typing_speed - 5.0 / 4.05).abs() < 1e-12);
    }

    #[test]
    fn test_extended_aggregates() {
        let events = vec![
            RawKeyEvent::down("t", 0.0),
            RawKeyEvent::up("t", 100.0),
            RawKeyEvent::down("t", 500.0),
            RawKeyEvent::up("t", 700.0),
        ];
        let v = extract_keystroke_vector(&events, FeatureLayout::KeystrokeExtendedV1);
        assert_eq!(v.len(), 256);
        assert_eq!(v.get("H.t_mean"), Some(150.0));
        assert_eq!(v.get("H.t_min"), Some(100.0));
        assert_eq!(v.get("H.t_max"), Some(200.0));
        assert_eq!(v.get("H.t_var"), Some(2500.0));
        assert_eq!(v.get("H.t_std"), Some(50.0));
        assert_eq!(v.get("H.t_median"), Some(150.0));
    }

    #[test]
    fn test_layouts_share_quantities() {
        let keys = [".", "t", "i", "e", "5", "R", "o", "a", "n", "l", "Enter"];
        let events = type_sequence(&keys, 0.0, 90.0, 180.0);
        let compact = extract_keystroke_vector(&events, FeatureLayout::KeystrokeCompactV1);
        let extended = extract_keystroke_vector(&events, FeatureLayout::KeystrokeExtendedV1);
        for (i, q) in tracked_quantities().iter().enumerate() {
            let mean_name = format!("{}_mean", q.name());
            assert_eq!(compact.values[i], extended.get(&mean_name).unwrap());
            assert!(compact.values[i] > 0.0, "{} not observed", q.name());
        }
    }

    #[test]
    fn test_next_occurrence_gaps_consumes() {
        assert_eq!(next_occurrence_gaps(&[0.0, 10.0], &[20.0]), vec![20.0]);
        assert_eq!(next_occurrence_gaps(&[0.0, 10.0], &[5.0, 30.0]), vec![5.0, 20.0]);
        assert!(next_occurrence_gaps(&[10.0], &[10.0]).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let events = type_sequence(&["a", "b", "a", "c"], 3.0, 77.0, 131.0);
        let a = extract_keystroke_vector(&events, FeatureLayout::KeystrokeExtendedV1);
        let b = extract_keystroke_vector(&events, FeatureLayout::KeystrokeExtendedV1);
        assert_eq!(a.values, b.values);
    }
}
