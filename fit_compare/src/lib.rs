//! Core library for comparing heart-rate series from two FIT activity files.
//!
//! The pipeline is: decode a FIT byte buffer into a session/lap/record tree
//! (`decode_activity`), flatten each session into an ordered sample sequence
//! plus a display summary (`normalize_activity`), merge two sample sequences
//! into one chartable series (`align_series`), and translate the chart's
//! fractional zoom window to and from sample indices (`zoom`). All stages are
//! pure; `ComparisonState` is the thin stateful shell on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod align;
mod session;
mod zoom;

pub use align::{align_series, display_name, series_names, MATCH_TOLERANCE_MS};
pub use session::{ComparisonState, LoadedFile, Slot};
pub use zoom::{percent_to_zoom, zoom_to_percent, PercentRange, ZoomRange};

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("failed to decode FIT file: {0}")]
    Decode(String),
    #[error("unexpected activity shape: {0}")]
    Transform(String),
}

/// One timestamped record inside a lap. Absent heart rate stays absent here;
/// the normalizer is where it becomes `0.0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub heart_rate: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodedLap {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub records: Vec<DecodedRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodedSession {
    pub sport: Option<String>,
    pub sub_sport: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub laps: Vec<DecodedLap>,
}

/// Nested view of one activity file, assembled from fitparser's flat
/// message stream. Zero sessions means the file was valid but empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecodedActivity {
    pub sessions: Vec<DecodedSession>,
}

/// One normalized reading: the unit the aligner consumes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub heart_rate: f64,
}

/// Display-only session facts; never used for alignment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub sport: String,
    pub sub_sport: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedActivity {
    pub summary: ActivitySummary,
    pub samples: Vec<Sample>,
}

/// A point on the merged timeline. `a`/`b` carry the heart rate contributed
/// by the first and second compared file; at least one is always set.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CombinedPoint {
    pub timestamp: DateTime<Utc>,
    pub a: Option<f64>,
    pub b: Option<f64>,
}

/// The merged two-file series a chart consumes, non-decreasing by timestamp
/// and deduplicated by epoch-millisecond key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CombinedSeries {
    pub name_a: String,
    pub name_b: String,
    pub points: Vec<CombinedPoint>,
}

impl CombinedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

struct RawLap {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

struct RawSession {
    sport: Option<String>,
    sub_sport: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    avg_heart_rate: Option<f64>,
    max_heart_rate: Option<f64>,
}

/// Decode a FIT byte buffer into the nested session -> lap -> record tree.
///
/// FIT summary messages (lap, session) trail the data records they cover, so
/// the flat stream is re-nested with cursors: a lap owns the records up to
/// its end timestamp, a session owns the laps up to its end timestamp, and
/// trailing items attach to the last owner. A session without lap messages
/// gets one synthesized lap spanning the session.
pub fn decode_activity(input: &[u8]) -> Result<DecodedActivity, CompareError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let messages = from_bytes(input).map_err(|e| CompareError::Decode(e.to_string()))?;

    let mut raw_records: Vec<DecodedRecord> = Vec::new();
    let mut raw_laps: Vec<RawLap> = Vec::new();
    let mut raw_sessions: Vec<RawSession> = Vec::new();

    for message in messages.into_iter() {
        match message.kind() {
            MesgNum::Record => {
                let mut record = DecodedRecord {
                    timestamp: None,
                    heart_rate: None,
                };
                for field in message.fields() {
                    match field.name() {
                        "timestamp" => record.timestamp = fit_value_to_utc(field.value()),
                        "heart_rate" => record.heart_rate = fit_value_to_f64(field.value()),
                        _ => {}
                    }
                }
                raw_records.push(record);
            }
            MesgNum::Lap => {
                let mut lap = RawLap {
                    start_time: None,
                    end_time: None,
                };
                for field in message.fields() {
                    match field.name() {
                        "start_time" => lap.start_time = fit_value_to_utc(field.value()),
                        "timestamp" => lap.end_time = fit_value_to_utc(field.value()),
                        _ => {}
                    }
                }
                raw_laps.push(lap);
            }
            MesgNum::Session => {
                let mut session = RawSession {
                    sport: None,
                    sub_sport: None,
                    start_time: None,
                    end_time: None,
                    avg_heart_rate: None,
                    max_heart_rate: None,
                };
                for field in message.fields() {
                    match field.name() {
                        "sport" => session.sport = fit_value_to_string(field.value()),
                        "sub_sport" => session.sub_sport = fit_value_to_string(field.value()),
                        "start_time" => session.start_time = fit_value_to_utc(field.value()),
                        "timestamp" => session.end_time = fit_value_to_utc(field.value()),
                        "avg_heart_rate" => {
                            session.avg_heart_rate = fit_value_to_f64(field.value())
                        }
                        "max_heart_rate" => {
                            session.max_heart_rate = fit_value_to_f64(field.value())
                        }
                        _ => {}
                    }
                }
                raw_sessions.push(session);
            }
            _ => {}
        }
    }

    if raw_sessions.is_empty() {
        if raw_records.is_empty() {
            return Ok(DecodedActivity::default());
        }
        return Err(CompareError::Transform(format!(
            "file contains {} records but no session message",
            raw_records.len()
        )));
    }

    Ok(assemble_sessions(raw_sessions, raw_laps, raw_records))
}

fn assemble_sessions(
    raw_sessions: Vec<RawSession>,
    raw_laps: Vec<RawLap>,
    raw_records: Vec<DecodedRecord>,
) -> DecodedActivity {
    let session_count = raw_sessions.len();
    let mut lap_cursor = 0usize;
    let mut record_cursor = 0usize;
    let mut sessions = Vec::with_capacity(session_count);

    for (s, raw) in raw_sessions.into_iter().enumerate() {
        let last_session = s + 1 == session_count;

        let mut owned_laps: Vec<RawLap> = Vec::new();
        while lap_cursor < raw_laps.len() {
            let lap = &raw_laps[lap_cursor];
            let owned = last_session
                || match (lap.end_time.or(lap.start_time), raw.end_time) {
                    (Some(t), Some(end)) => t <= end,
                    _ => true,
                };
            if !owned {
                break;
            }
            owned_laps.push(RawLap {
                start_time: lap.start_time,
                end_time: lap.end_time,
            });
            lap_cursor += 1;
        }
        if owned_laps.is_empty() {
            owned_laps.push(RawLap {
                start_time: raw.start_time,
                end_time: raw.end_time,
            });
        }

        let lap_count = owned_laps.len();
        let mut laps = Vec::with_capacity(lap_count);
        for (l, lap) in owned_laps.into_iter().enumerate() {
            let last_lap = last_session && l + 1 == lap_count;
            let mut records = Vec::new();
            while record_cursor < raw_records.len() {
                let record = &raw_records[record_cursor];
                let owned = last_lap
                    || match (record.timestamp, lap.end_time) {
                        (Some(t), Some(end)) => t <= end,
                        _ => true,
                    };
                if !owned {
                    break;
                }
                records.push(record.clone());
                record_cursor += 1;
            }
            laps.push(DecodedLap {
                start_time: lap.start_time,
                end_time: lap.end_time,
                records,
            });
        }

        sessions.push(DecodedSession {
            sport: raw.sport,
            sub_sport: raw.sub_sport,
            start_time: raw.start_time,
            end_time: raw.end_time,
            avg_heart_rate: raw.avg_heart_rate,
            max_heart_rate: raw.max_heart_rate,
            laps,
        });
    }

    DecodedActivity { sessions }
}

/// Flatten a decoded activity into one normalized series plus summary per
/// session. Laps and records are walked in source order and never sorted
/// here; ordering is the aligner's job. A record's timestamp falls back to
/// its lap's start time, and a record with neither is skipped. Missing heart
/// rate normalizes to `0.0`.
pub fn normalize_activity(activity: &DecodedActivity) -> Vec<NormalizedActivity> {
    activity
        .sessions
        .iter()
        .map(|session| {
            let mut samples = Vec::new();
            for lap in &session.laps {
                for record in &lap.records {
                    let Some(timestamp) = record.timestamp.or(lap.start_time) else {
                        continue;
                    };
                    samples.push(Sample {
                        timestamp,
                        heart_rate: record.heart_rate.unwrap_or(0.0),
                    });
                }
            }
            NormalizedActivity {
                summary: ActivitySummary {
                    sport: session.sport.clone().unwrap_or_else(|| "unknown".into()),
                    sub_sport: session
                        .sub_sport
                        .clone()
                        .unwrap_or_else(|| "unknown".into()),
                    start_time: session.start_time,
                    end_time: session.end_time,
                    avg_heart_rate: session.avg_heart_rate.unwrap_or(0.0),
                    max_heart_rate: session.max_heart_rate.unwrap_or(0.0),
                },
                samples,
            }
        })
        .collect()
}

fn fit_value_to_utc(value: &fitparser::Value) -> Option<DateTime<Utc>> {
    match value {
        fitparser::Value::Timestamp(ts) => Some(ts.with_timezone(&Utc)),
        _ => None,
    }
}

fn fit_value_to_string(value: &fitparser::Value) -> Option<String> {
    match value {
        fitparser::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::SInt8(v) => Some(*v as f64),
        fitparser::Value::UInt8(v) => Some(*v as f64),
        fitparser::Value::UInt8z(v) => Some(*v as f64),
        fitparser::Value::SInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16z(v) => Some(*v as f64),
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32z(v) => Some(*v as f64),
        fitparser::Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn record(ts: Option<i64>, hr: Option<f64>) -> DecodedRecord {
        DecodedRecord {
            timestamp: ts.map(utc_ms),
            heart_rate: hr,
        }
    }

    #[test]
    fn normalize_defaults_missing_heart_rate_to_zero() {
        let activity = DecodedActivity {
            sessions: vec![DecodedSession {
                sport: None,
                sub_sport: None,
                start_time: None,
                end_time: None,
                avg_heart_rate: None,
                max_heart_rate: None,
                laps: vec![DecodedLap {
                    start_time: None,
                    end_time: None,
                    records: vec![record(Some(0), None), record(Some(1000), Some(88.0))],
                }],
            }],
        };
        let normalized = normalize_activity(&activity);
        assert_eq!(normalized.len(), 1);
        let samples = &normalized[0].samples;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].heart_rate, 0.0);
        assert_eq!(samples[1].heart_rate, 88.0);
        assert_eq!(normalized[0].summary.sport, "unknown");
        assert_eq!(normalized[0].summary.avg_heart_rate, 0.0);
    }

    #[test]
    fn normalize_falls_back_to_lap_start_time() {
        let activity = DecodedActivity {
            sessions: vec![DecodedSession {
                sport: Some("cycling".into()),
                sub_sport: Some("road".into()),
                start_time: Some(utc_ms(5000)),
                end_time: Some(utc_ms(9000)),
                avg_heart_rate: Some(140.0),
                max_heart_rate: Some(175.0),
                laps: vec![DecodedLap {
                    start_time: Some(utc_ms(5000)),
                    end_time: Some(utc_ms(9000)),
                    records: vec![record(None, Some(120.0)), record(Some(6000), Some(130.0))],
                }],
            }],
        };
        let normalized = normalize_activity(&activity);
        let samples = &normalized[0].samples;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, utc_ms(5000));
        assert_eq!(samples[1].timestamp, utc_ms(6000));
        assert_eq!(normalized[0].summary.sport, "cycling");
        assert_eq!(normalized[0].summary.max_heart_rate, 175.0);
    }

    #[test]
    fn normalize_skips_records_without_any_timestamp() {
        let activity = DecodedActivity {
            sessions: vec![DecodedSession {
                sport: None,
                sub_sport: None,
                start_time: None,
                end_time: None,
                avg_heart_rate: None,
                max_heart_rate: None,
                laps: vec![DecodedLap {
                    start_time: None,
                    end_time: None,
                    records: vec![record(None, Some(99.0)), record(Some(2000), Some(101.0))],
                }],
            }],
        };
        let normalized = normalize_activity(&activity);
        assert_eq!(normalized[0].samples.len(), 1);
        assert_eq!(normalized[0].samples[0].heart_rate, 101.0);
    }

    #[test]
    fn assemble_distributes_laps_and_records_by_end_time() {
        let raw_sessions = vec![RawSession {
            sport: Some("running".into()),
            sub_sport: None,
            start_time: Some(utc_ms(0)),
            end_time: Some(utc_ms(4000)),
            avg_heart_rate: None,
            max_heart_rate: None,
        }];
        let raw_laps = vec![
            RawLap {
                start_time: Some(utc_ms(0)),
                end_time: Some(utc_ms(2000)),
            },
            RawLap {
                start_time: Some(utc_ms(2000)),
                end_time: Some(utc_ms(4000)),
            },
        ];
        let raw_records = vec![
            record(Some(0), Some(100.0)),
            record(Some(1000), Some(105.0)),
            record(Some(3000), Some(110.0)),
            record(Some(4000), Some(112.0)),
        ];
        let activity = assemble_sessions(raw_sessions, raw_laps, raw_records);
        assert_eq!(activity.sessions.len(), 1);
        let session = &activity.sessions[0];
        assert_eq!(session.laps.len(), 2);
        assert_eq!(session.laps[0].records.len(), 2);
        assert_eq!(session.laps[1].records.len(), 2);
    }

    #[test]
    fn assemble_synthesizes_lap_for_lapless_session() {
        let raw_sessions = vec![RawSession {
            sport: None,
            sub_sport: None,
            start_time: Some(utc_ms(100)),
            end_time: Some(utc_ms(900)),
            avg_heart_rate: None,
            max_heart_rate: None,
        }];
        let raw_records = vec![record(Some(200), Some(90.0)), record(Some(800), Some(95.0))];
        let activity = assemble_sessions(raw_sessions, Vec::new(), raw_records);
        let session = &activity.sessions[0];
        assert_eq!(session.laps.len(), 1);
        assert_eq!(session.laps[0].start_time, Some(utc_ms(100)));
        assert_eq!(session.laps[0].records.len(), 2);
    }

    #[test]
    fn assemble_attaches_trailing_records_to_last_lap() {
        let raw_sessions = vec![RawSession {
            sport: None,
            sub_sport: None,
            start_time: Some(utc_ms(0)),
            end_time: Some(utc_ms(2000)),
            avg_heart_rate: None,
            max_heart_rate: None,
        }];
        let raw_laps = vec![RawLap {
            start_time: Some(utc_ms(0)),
            end_time: Some(utc_ms(2000)),
        }];
        // Last record lands after the lap's declared end.
        let raw_records = vec![record(Some(1000), Some(80.0)), record(Some(2500), Some(82.0))];
        let activity = assemble_sessions(raw_sessions, raw_laps, raw_records);
        assert_eq!(activity.sessions[0].laps[0].records.len(), 2);
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        let err = decode_activity(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, CompareError::Decode(_)));
    }
}
