//! Adapter for feeding input records into a session aggregator
//!
//! Parses record batches and replays them through a [`SessionAggregator`],
//! closing windows on a fixed interval or at question boundaries.

use chrono::{DateTime, Duration, Utc};

use crate::config::ProctorConfig;
use crate::error::ProctorError;
use crate::schema::record::InputRecord;
use crate::session::SessionAggregator;
use crate::types::{WindowReport, WindowState};

/// How replayed records are split into measurement windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Windowing {
    /// One window over the whole batch
    Single,
    /// Close a window every `n` milliseconds of record time
    EveryMs(f64),
    /// Close a window whenever a `question` record arrives
    PerQuestion,
}

/// Adapter for converting input records into window reports
pub struct InputAdapter;

impl InputAdapter {
    /// Parse a JSON string containing an array of InputRecords
    pub fn parse_array(json: &str) -> Result<Vec<InputRecord>, ProctorError> {
        let records: Vec<InputRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing InputRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InputRecord>, ProctorError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<InputRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ProctorError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either a JSON array or NDJSON, depending on the first character
    pub fn parse(input: &str) -> Result<Vec<InputRecord>, ProctorError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Feed one record into an aggregator
    pub fn apply(aggregator: &mut SessionAggregator, record: &InputRecord) {
        match record {
            InputRecord::KeyDown { key, timestamp } => {
                aggregator.capture_key_down(key, *timestamp)
            }
            InputRecord::KeyUp { key, timestamp } => aggregator.capture_key_up(key, *timestamp),
            InputRecord::Question { index, .. } => aggregator.set_question_index(Some(*index)),
            other => {
                if let Some(event) = other.pointer_event() {
                    aggregator.capture_pointer(event);
                }
            }
        }
    }

    /// Replay a batch through a fresh aggregator and collect its windows.
    ///
    /// Record time is mapped onto wall time with the first record at `start`.
    /// Records are replayed in timestamp order; records with non-finite
    /// timestamps are skipped. With [`Windowing::EveryMs`], a run of empty
    /// windows before a record is reported as one window spanning the gap.
    pub fn replay(
        records: &[InputRecord],
        config: &ProctorConfig,
        start: DateTime<Utc>,
        windowing: Windowing,
    ) -> Result<Vec<WindowReport>, ProctorError> {
        if let Windowing::EveryMs(ms) = windowing {
            if !ms.is_finite() || ms <= 0.0 {
                return Err(ProctorError::ConfigError(format!(
                    "window length must be positive, got {ms}"
                )));
            }
        }

        let mut sorted: Vec<&InputRecord> = records
            .iter()
            .filter(|r| r.timestamp().is_finite())
            .collect();
        sorted.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let mut aggregator = SessionAggregator::starting_at(config, start);
        let mut reports = Vec::new();
        let Some(origin) = sorted.first().map(|r| r.timestamp()) else {
            return Ok(reports);
        };
        let wall = |t: f64| wall_time(start, t - origin);

        let mut next_boundary = match windowing {
            Windowing::EveryMs(ms) => Some(origin + ms),
            _ => None,
        };

        for record in &sorted {
            let t = record.timestamp();
            if let (Windowing::EveryMs(ms), Some(boundary)) = (windowing, next_boundary.as_mut()) {
                while t >= *boundary {
                    let end = if aggregator.state() == WindowState::Accumulating {
                        *boundary
                    } else {
                        *boundary + ((t - *boundary) / ms).floor() * ms
                    };
                    let next = end + ms;
                    if next <= end {
                        return Err(ProctorError::ParseError(format!(
                            "window length of {ms} ms is below timestamp precision at {t}"
                        )));
                    }
                    reports.push(aggregator.flush_at(wall(end)?));
                    *boundary = next;
                }
            }
            if windowing == Windowing::PerQuestion
                && matches!(record, InputRecord::Question { .. })
                && aggregator.state() == WindowState::Accumulating
            {
                reports.push(aggregator.flush_at(wall(t)?));
            }
            Self::apply(&mut aggregator, record);
        }

        if aggregator.state() == WindowState::Accumulating {
            let last = sorted.last().map_or(origin, |r| r.timestamp());
            reports.push(aggregator.flush_at(wall(last)?));
        }
        Ok(reports)
    }
}

/// `start` shifted by `offset_ms` of record time
fn wall_time(start: DateTime<Utc>, offset_ms: f64) -> Result<DateTime<Utc>, ProctorError> {
    let out_of_range = || {
        ProctorError::ParseError(format!(
            "record offset of {offset_ms} ms is outside the representable time range"
        ))
    };
    let ms = offset_ms.round();
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    Duration::try_milliseconds(ms as i64)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(out_of_range)
}
