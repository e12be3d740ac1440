//! Pointer feature extraction
//!
//! Computes kinematic and geometric features from a window of pointer events.
//! Positional samples are grouped into chains; any non-positional event
//! (clipboard, focus change) breaks the chain so no distance is measured across it.

use crate::config::ExtractionConfig;
use crate::features::layout::FeatureLayout;
use crate::stats;
use crate::types::{FeatureVector, Point, PointerActivity, PointerKind, RawPointerEvent};

/// Positional sample with its timestamp
#[derive(Debug, Clone, Copy)]
struct Sample {
    point: Point,
    t: f64,
    hover: bool,
}

/// Pointer features for one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerMetrics {
    /// Total cursor travel (px)
    pub path_length: f64,
    /// Path length over moving time (px/s)
    pub avg_speed: f64,
    /// Sum of long inter-event gaps (s)
    pub idle_time: f64,
    /// Mean duration of rest runs (ms)
    pub dwell_time: f64,
    /// Mean duration of hover runs (ms)
    pub hover_time: f64,
    /// Clicks per second
    pub click_frequency: f64,
    /// Mean gap between clicks (ms)
    pub click_interval_mean: f64,
    /// Clicks over total events
    pub click_ratio_per_question: f64,
    /// Path length over per-chain straight-line distance
    pub trajectory_smoothness: f64,
    /// Sum of turning angles (rad)
    pub path_curvature: f64,
    /// Time until the cursor leaves its starting point (s)
    pub transition_time: f64,
}

impl PointerMetrics {
    /// Values in `pointer.v1` order
    pub fn to_array(&self) -> [f64; 11] {
        [
            self.path_length,
            self.avg_speed,
            self.idle_time,
            self.dwell_time,
            self.hover_time,
            self.click_frequency,
            self.click_interval_mean,
            self.click_ratio_per_question,
            self.trajectory_smoothness,
            self.path_curvature,
            self.transition_time,
        ]
    }

    pub fn to_vector(&self) -> FeatureVector {
        FeatureVector::new(FeatureLayout::PointerV1, self.to_array().to_vec())
    }
}

/// Extracts pointer feature vectors and activity counters
#[derive(Debug, Clone, Default)]
pub struct PointerFeatureExtractor {
    config: ExtractionConfig,
}

impl PointerFeatureExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, events: &[RawPointerEvent]) -> FeatureVector {
        self.metrics(events).to_vector()
    }

    /// Compute all pointer metrics. Fewer than two events yields all zeros.
    pub fn metrics(&self, events: &[RawPointerEvent]) -> PointerMetrics {
        let events = sorted_events(events);
        if events.len() < 2 {
            return PointerMetrics::default();
        }

        let chains = positional_chains(&events);
        let samples: Vec<Sample> = chains.iter().flatten().copied().collect();

        let path_length = compute_path_length(&chains);
        let avg_speed = compute_avg_speed(path_length, &chains);
        let idle_time = compute_idle_time(&events, self.config.idle_threshold_ms);
        let dwell_time = compute_dwell_time(
            &samples,
            self.config.dwell_radius_px,
            self.config.dwell_min_ms,
        );
        let hover_time = compute_hover_time(
            &samples,
            self.config.hover_radius_px,
            self.config.hover_min_ms,
        );

        let clicks: Vec<f64> = events
            .iter()
            .filter(|e| e.kind == PointerKind::Click)
            .map(|e| e.timestamp)
            .collect();
        let elapsed_secs = (events[events.len() - 1].timestamp - events[0].timestamp) / 1000.0;
        let click_frequency = if elapsed_secs > 0.0 {
            clicks.len() as f64 / elapsed_secs
        } else {
            0.0
        };
        let click_gaps: Vec<f64> = clicks.windows(2).map(|w| w[1] - w[0]).collect();
        let click_interval_mean = stats::mean(&click_gaps);
        let click_ratio_per_question = clicks.len() as f64 / events.len() as f64;

        let trajectory_smoothness = compute_smoothness(path_length, &chains);
        let path_curvature = compute_curvature(&chains);
        let transition_time =
            compute_transition_time(&samples, self.config.transition_threshold_px);

        PointerMetrics {
            path_length,
            avg_speed,
            idle_time,
            dwell_time,
            hover_time,
            click_frequency,
            click_interval_mean,
            click_ratio_per_question,
            trajectory_smoothness,
            path_curvature,
            transition_time,
        }
    }

    /// Clipboard, double-click and tab-visibility counters
    pub fn activity(&self, events: &[RawPointerEvent]) -> PointerActivity {
        let events = sorted_events(events);
        let mut activity = PointerActivity::default();
        let mut hidden_since: Option<f64> = None;

        for event in &events {
            match event.kind {
                PointerKind::Copy | PointerKind::Cut => activity.copy_cut += 1,
                PointerKind::Paste => activity.paste += 1,
                PointerKind::DoubleClick => activity.double_click += 1,
                _ => {}
            }

            let hides = event.kind == PointerKind::FocusChange && event.visible == Some(false);
            if hides {
                hidden_since.get_or_insert(event.timestamp);
            } else if let Some(start) = hidden_since.take() {
                activity.inactive_duration_secs += (event.timestamp - start).max(0.0) / 1000.0;
            }
        }

        activity
    }
}

/// Extract with default thresholds
pub fn extract_pointer_vector(events: &[RawPointerEvent]) -> FeatureVector {
    PointerFeatureExtractor::default().extract(events)
}

fn sorted_events(events: &[RawPointerEvent]) -> Vec<RawPointerEvent> {
    let mut sorted: Vec<RawPointerEvent> = events
        .iter()
        .filter(|e| e.timestamp.is_finite())
        .cloned()
        .collect();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    sorted
}

/// Split positional samples into chains at non-positional events.
///
/// Positional kinds with missing coordinates are skipped without breaking the chain.
fn positional_chains(events: &[RawPointerEvent]) -> Vec<Vec<Sample>> {
    let mut chains = Vec::new();
    let mut current = Vec::new();

    for event in events {
        if event.kind.is_positional() {
            if let Some(point) = event.position() {
                current.push(Sample {
                    point,
                    t: event.timestamp,
                    hover: event.kind == PointerKind::Hover,
                });
            }
        } else if !current.is_empty() {
            chains.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chains.push(current);
    }
    chains
}

/// Sum of Euclidean distances between consecutive samples within each chain
fn compute_path_length(chains: &[Vec<Sample>]) -> f64 {
    chains
        .iter()
        .flat_map(|chain| chain.windows(2))
        .map(|w| w[0].point.distance(&w[1].point))
        .sum()
}

/// Path length divided by the time spent between samples with positive delta
fn compute_avg_speed(path_length: f64, chains: &[Vec<Sample>]) -> f64 {
    let moving_secs: f64 = chains
        .iter()
        .flat_map(|chain| chain.windows(2))
        .map(|w| w[1].t - w[0].t)
        .filter(|dt| *dt > 0.0)
        .sum::<f64>()
        / 1000.0;
    if moving_secs <= 0.0 {
        return 0.0;
    }
    path_length / moving_secs
}

/// Sum of inter-event gaps above the threshold, in seconds
fn compute_idle_time(events: &[RawPointerEvent], threshold_ms: f64) -> f64 {
    events
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|gap| *gap > threshold_ms)
        .sum::<f64>()
        / 1000.0
}

/// Mean duration of maximal runs staying within `radius` of the run's first sample.
///
/// Runs are non-overlapping: a run ends at the last sample inside the radius
/// and the next run is anchored at the sample that left it.
fn compute_dwell_time(samples: &[Sample], radius: f64, min_ms: f64) -> f64 {
    let mut durations = Vec::new();
    let mut i = 0;
    while i < samples.len() {
        let end = run_end(samples, i, radius);
        let duration = samples[end].t - samples[i].t;
        if duration >= min_ms {
            durations.push(duration);
        }
        i = end + 1;
    }
    stats::mean(&durations)
}

/// Mean duration the cursor stays within `radius` of each hover point.
///
/// Every hover sample anchors its own run; runs may overlap.
fn compute_hover_time(samples: &[Sample], radius: f64, min_ms: f64) -> f64 {
    let durations: Vec<f64> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.hover)
        .map(|(i, s)| samples[run_end(samples, i, radius)].t - s.t)
        .filter(|duration| *duration >= min_ms)
        .collect();
    stats::mean(&durations)
}

/// Index of the last sample after `start` that stays within `radius` of it
fn run_end(samples: &[Sample], start: usize, radius: f64) -> usize {
    let anchor = samples[start].point;
    let mut end = start;
    while end + 1 < samples.len() && samples[end + 1].point.distance(&anchor) <= radius {
        end += 1;
    }
    end
}

/// Path length over the summed straight-line distance between the first and
/// last sample of each chain. Never below 1 when defined.
fn compute_smoothness(path_length: f64, chains: &[Vec<Sample>]) -> f64 {
    let straight: f64 = chains
        .iter()
        .filter_map(|chain| Some(chain.first()?.point.distance(&chain.last()?.point)))
        .sum();
    if straight <= 0.0 {
        return 0.0;
    }
    path_length / straight
}

/// Sum of turning angles between consecutive non-zero motion vectors per chain
fn compute_curvature(chains: &[Vec<Sample>]) -> f64 {
    let mut total = 0.0;
    for chain in chains {
        let vectors: Vec<(f64, f64)> = chain
            .windows(2)
            .map(|w| (w[1].point.x - w[0].point.x, w[1].point.y - w[0].point.y))
            .filter(|(dx, dy)| dx.hypot(*dy) > 0.0)
            .collect();
        for pair in vectors.windows(2) {
            let (ux, uy) = pair[0];
            let (vx, vy) = pair[1];
            let cos = (ux * vx + uy * vy) / (ux.hypot(uy) * vx.hypot(vy));
            total += cos.clamp(-1.0, 1.0).acos();
        }
    }
    stats::finite_or_zero(total)
}

/// Seconds from the first sample until a sample farther than `threshold` from it
fn compute_transition_time(samples: &[Sample], threshold: f64) -> f64 {
    let Some(start) = samples.first() else {
        return 0.0;
    };
    samples
        .iter()
        .find(|s| s.point.distance(&start.point) > threshold)
        .map(|s| (s.t - start.t) / 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(x: f64, y: f64, t: f64) -> RawPointerEvent {
        RawPointerEvent::at(PointerKind::Move, x, y, t)
    }

    fn click(x: f64, y: f64, t: f64) -> RawPointerEvent {
        RawPointerEvent::at(PointerKind::Click, x, y, t)
    }

    #[test]
    fn test_empty_and_single_event_are_zero() {
        let extractor = PointerFeatureExtractor::default();
        assert!(extractor.extract(&[]).is_zero());
        assert!(extractor.extract(&[click(1.0, 1.0, 0.0)]).is_zero());
        assert_eq!(extractor.extract(&[]).len(), 11);
    }

    #[test]
    fn test_straight_line() {
        let events = vec![mv(0.0, 0.0, 0.0), mv(100.0, 0.0, 1000.0)];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.path_length, 100.0);
        assert_eq!(m.trajectory_smoothness, 1.0);
        assert_eq!(m.path_curvature, 0.0);
        assert_eq!(m.avg_speed, 100.0);
        assert_eq!(m.transition_time, 1.0);
    }

    #[test]
    fn test_collinear_samples_have_no_curvature() {
        let events = vec![mv(0.0, 0.0, 0.0), mv(50.0, 0.0, 500.0), mv(100.0, 0.0, 1000.0)];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.path_curvature, 0.0);
        assert_eq!(m.trajectory_smoothness, 1.0);
    }

    #[test]
    fn test_right_angle_turn() {
        let events = vec![mv(0.0, 0.0, 0.0), mv(10.0, 0.0, 100.0), mv(10.0, 10.0, 200.0)];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert!((m.path_curvature - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((m.trajectory_smoothness - 20.0 / 200.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_non_positional_event_breaks_path() {
        let events = vec![
            mv(0.0, 0.0, 0.0),
            RawPointerEvent::new(PointerKind::Paste, None, None, 10.0),
            mv(100.0, 0.0, 20.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.path_length, 0.0);
    }

    #[test]
    fn test_smoothness_measured_per_chain() {
        let events = vec![
            mv(0.0, 0.0, 0.0),
            mv(10.0, 0.0, 10.0),
            RawPointerEvent::new(PointerKind::Paste, None, None, 20.0),
            mv(100.0, 0.0, 30.0),
            mv(110.0, 0.0, 40.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.path_length, 20.0);
        assert_eq!(m.trajectory_smoothness, 1.0);

        // A detour in one chain raises the ratio above 1
        let events = vec![
            mv(0.0, 0.0, 0.0),
            mv(5.0, 5.0, 10.0),
            mv(10.0, 0.0, 20.0),
            RawPointerEvent::focus_change(false, 30.0),
            mv(100.0, 0.0, 40.0),
            mv(110.0, 0.0, 50.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert!(m.trajectory_smoothness > 1.0);
    }

    #[test]
    fn test_missing_coordinates_are_not_origin() {
        let events = vec![
            mv(50.0, 50.0, 0.0),
            RawPointerEvent::new(PointerKind::Move, None, None, 10.0),
            mv(50.0, 60.0, 20.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.path_length, 10.0);
    }

    #[test]
    fn test_click_intervals() {
        let events = vec![click(0.0, 0.0, 0.0), click(0.0, 0.0, 1000.0), click(0.0, 0.0, 3000.0)];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.click_interval_mean, 1500.0);
        assert_eq!(m.click_frequency, 1.0);
        assert_eq!(m.click_ratio_per_question, 1.0);
    }

    #[test]
    fn test_idle_time() {
        let events = vec![mv(0.0, 0.0, 0.0), mv(1.0, 0.0, 1000.0), mv(2.0, 0.0, 6000.0)];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.idle_time, 5.0);
    }

    #[test]
    fn test_dwell_runs() {
        // Rest for 400 ms, jump, rest for 100 ms (too short)
        let events = vec![
            mv(0.0, 0.0, 0.0),
            mv(1.0, 1.0, 200.0),
            mv(2.0, 0.0, 400.0),
            mv(50.0, 50.0, 500.0),
            mv(51.0, 50.0, 600.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.dwell_time, 400.0);
    }

    #[test]
    fn test_hover_differs_from_dwell() {
        let events = vec![
            mv(0.0, 0.0, 0.0),
            RawPointerEvent::at(PointerKind::Hover, 1.0, 0.0, 100.0),
            mv(2.0, 0.0, 320.0),
            mv(100.0, 0.0, 400.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        // Hover anchored at t=100 lasts until t=320
        assert_eq!(m.hover_time, 220.0);
        // Dwell anchored at t=0 lasts until t=320
        assert_eq!(m.dwell_time, 320.0);
    }

    #[test]
    fn test_transition_time() {
        let events = vec![
            mv(0.0, 0.0, 0.0),
            mv(3.0, 0.0, 500.0),
            mv(10.0, 0.0, 1500.0),
        ];
        let m = PointerFeatureExtractor::default().metrics(&events);
        assert_eq!(m.transition_time, 1.5);
    }

    #[test]
    fn test_activity_counters() {
        let events = vec![
            RawPointerEvent::new(PointerKind::Copy, None, None, 0.0),
            RawPointerEvent::new(PointerKind::Cut, None, None, 10.0),
            RawPointerEvent::new(PointerKind::Paste, None, None, 20.0),
            RawPointerEvent::at(PointerKind::DoubleClick, 5.0, 5.0, 30.0),
            RawPointerEvent::focus_change(false, 1000.0),
            RawPointerEvent::focus_change(true, 4000.0),
        ];
        let activity = PointerFeatureExtractor::default().activity(&events);
        assert_eq!(activity.copy_cut, 2);
        assert_eq!(activity.paste, 1);
        assert_eq!(activity.double_click, 1);
        assert_eq!(activity.inactive_duration_secs, 3.0);
    }

    #[test]
    fn test_bursty_input_stays_finite() {
        // Many events at the same instant
        let events: Vec<RawPointerEvent> = (0..50)
            .map(|i| mv(i as f64, (i % 3) as f64, 42.0))
            .collect();
        let v = extract_pointer_vector(&events);
        assert!(v.values.iter().all(|x| x.is_finite()));
        assert_eq!(v.get("avg_speed"), Some(0.0));
        assert_eq!(v.get("click_frequency"), Some(0.0));
    }
}
