//! Merging two normalized sample series into one chartable series.
//!
//! The merge is a single left-to-right sweep over series A with a one-shot
//! lookahead cursor into series B: a B sample within the tolerance of the
//! current A sample is folded into the same point and never reconsidered.
//! No global nearest-neighbor reassignment is attempted; two samples farther
//! apart than the tolerance are distinct instants even if they are the
//! closest available pair.

use std::collections::BTreeMap;

use crate::{CombinedPoint, CombinedSeries, Sample};

/// Two samples closer than this (strictly) are treated as the same instant.
pub const MATCH_TOLERANCE_MS: i64 = 1000;

/// Strip the final extension from an uploaded file name (`ride.fit` ->
/// `ride`, `archive.tar.gz` -> `archive.tar`, `ride.` stays as is).
pub fn display_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() && !file_name[idx + 1..].contains('/') => {
            &file_name[..idx]
        }
        _ => file_name,
    }
}

/// Disambiguate the two series names so neither silently overwrites the
/// other's slot in a combined point.
pub fn series_names(name_a: &str, name_b: &str) -> (String, String) {
    if name_a == name_b {
        (format!("{name_a} (1)"), format!("{name_b} (2)"))
    } else {
        (name_a.to_string(), name_b.to_string())
    }
}

/// Merge two sample series into one combined series.
///
/// Both inputs are copied and sorted by timestamp first; source order is not
/// trusted. Points are deduplicated through an ordered map keyed by epoch
/// milliseconds, so the output is non-decreasing by timestamp with one point
/// per distinct instant. Leftover B samples merge into an existing point
/// only on exact key equality.
pub fn align_series(a: &[Sample], name_a: &str, b: &[Sample], name_b: &str) -> CombinedSeries {
    let (name_a, name_b) = series_names(name_a, name_b);

    let mut sorted_a = a.to_vec();
    sorted_a.sort_by_key(|s| s.timestamp);
    let mut sorted_b = b.to_vec();
    sorted_b.sort_by_key(|s| s.timestamp);

    let mut points: BTreeMap<i64, CombinedPoint> = BTreeMap::new();
    let mut j = 0usize;

    for sample in &sorted_a {
        let mut point = CombinedPoint {
            timestamp: sample.timestamp,
            a: Some(sample.heart_rate),
            b: None,
        };
        if let Some(candidate) = sorted_b.get(j) {
            let delta = (sample.timestamp - candidate.timestamp)
                .num_milliseconds()
                .abs();
            if delta < MATCH_TOLERANCE_MS {
                point.b = Some(candidate.heart_rate);
                j += 1;
            }
        }
        points.insert(sample.timestamp.timestamp_millis(), point);
    }

    while let Some(sample) = sorted_b.get(j) {
        points
            .entry(sample.timestamp.timestamp_millis())
            .and_modify(|point| point.b = Some(sample.heart_rate))
            .or_insert(CombinedPoint {
                timestamp: sample.timestamp,
                a: None,
                b: Some(sample.heart_rate),
            });
        j += 1;
    }

    CombinedSeries {
        name_a,
        name_b,
        points: points.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn sample(ms: i64, hr: f64) -> Sample {
        Sample {
            timestamp: DateTime::from_timestamp_millis(ms).unwrap(),
            heart_rate: hr,
        }
    }

    fn ms_of(point: &CombinedPoint) -> i64 {
        point.timestamp.timestamp_millis()
    }

    #[test]
    fn output_is_sorted_for_unsorted_inputs() {
        let a = vec![sample(30_000, 60.0), sample(0, 61.0), sample(10_000, 62.0)];
        let b = vec![sample(25_000, 70.0), sample(5_000, 71.0)];
        let combined = align_series(&a, "A", &b, "B");
        let keys: Vec<i64> = combined.points.iter().map(ms_of).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn every_input_timestamp_is_covered() {
        let a = vec![sample(0, 60.0), sample(10_000, 61.0), sample(20_000, 62.0)];
        let b = vec![sample(5_000, 70.0), sample(15_000, 71.0)];
        let combined = align_series(&a, "A", &b, "B");
        let keys: Vec<i64> = combined.points.iter().map(ms_of).collect();
        for expected in [0, 10_000, 20_000, 5_000, 15_000] {
            assert!(keys.contains(&expected), "missing timestamp {expected}");
        }
        assert_eq!(combined.len(), 5);
    }

    #[test]
    fn tolerance_boundary_is_strict() {
        // 999 ms apart: same instant.
        let combined = align_series(
            &[sample(0, 60.0)],
            "A",
            &[sample(999, 70.0)],
            "B",
        );
        assert_eq!(combined.len(), 1);
        assert_eq!(combined.points[0].a, Some(60.0));
        assert_eq!(combined.points[0].b, Some(70.0));

        // Exactly 1000 ms apart: distinct instants.
        let combined = align_series(
            &[sample(0, 60.0)],
            "A",
            &[sample(1000, 70.0)],
            "B",
        );
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.points[0].b, None);
        assert_eq!(combined.points[1].a, None);
    }

    #[test]
    fn b_sample_is_consumed_at_most_once() {
        // The B sample at 500 ms is within tolerance of both A samples; only
        // the first A sample gets it.
        let a = vec![sample(0, 60.0), sample(900, 61.0)];
        let b = vec![sample(500, 70.0)];
        let combined = align_series(&a, "A", &b, "B");
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.points[0].b, Some(70.0));
        assert_eq!(combined.points[1].b, None);
    }

    #[test]
    fn identical_names_are_suffixed() {
        assert_eq!(
            series_names("ride", "ride"),
            ("ride (1)".to_string(), "ride (2)".to_string())
        );
        assert_eq!(
            series_names("ride", "run"),
            ("ride".to_string(), "run".to_string())
        );
        let combined = align_series(&[sample(0, 60.0)], "ride", &[sample(0, 70.0)], "ride");
        assert_eq!(combined.name_a, "ride (1)");
        assert_eq!(combined.name_b, "ride (2)");
    }

    #[test]
    fn empty_a_yields_b_unchanged() {
        let b = vec![sample(0, 70.0), sample(1000, 71.0), sample(2000, 72.0)];
        let combined = align_series(&[], "A", &b, "B");
        assert_eq!(combined.len(), b.len());
        for (point, source) in combined.points.iter().zip(&b) {
            assert_eq!(point.timestamp, source.timestamp);
            assert_eq!(point.a, None);
            assert_eq!(point.b, Some(source.heart_rate));
        }
    }

    #[test]
    fn both_empty_yields_empty() {
        let combined = align_series(&[], "A", &[], "B");
        assert!(combined.is_empty());
    }

    #[test]
    fn leftover_b_merges_on_exact_timestamp_only() {
        // A consumes B[0] (within tolerance of A[0]); B[1] shares A[1]'s
        // exact timestamp and must land on the existing point, while B[2]
        // gets its own point.
        let a = vec![sample(0, 60.0), sample(5_000, 61.0)];
        let b = vec![sample(100, 70.0), sample(5_000, 71.0), sample(9_000, 72.0)];
        let combined = align_series(&a, "A", &b, "B");
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.points[1].a, Some(61.0));
        assert_eq!(combined.points[1].b, Some(71.0));
        assert_eq!(combined.points[2].a, None);
        assert_eq!(combined.points[2].b, Some(72.0));
    }

    #[test]
    fn example_scenario_matches_expected_points() {
        let a = vec![sample(0, 60.0), sample(2000, 62.0)];
        let b = vec![sample(100, 70.0)];
        let combined = align_series(&a, "A", &b, "B");
        assert_eq!(combined.len(), 2);
        assert_eq!(ms_of(&combined.points[0]), 0);
        assert_eq!(combined.points[0].a, Some(60.0));
        assert_eq!(combined.points[0].b, Some(70.0));
        assert_eq!(ms_of(&combined.points[1]), 2000);
        assert_eq!(combined.points[1].a, Some(62.0));
        assert_eq!(combined.points[1].b, None);
    }

    #[test]
    fn display_name_strips_final_extension() {
        assert_eq!(display_name("ride.fit"), "ride");
        assert_eq!(display_name("archive.tar.gz"), "archive.tar");
        assert_eq!(display_name("ride"), "ride");
        assert_eq!(display_name("ride."), "ride.");
    }
}
