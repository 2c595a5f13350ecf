//! Translation between the chart control's fractional zoom window and
//! sample indices of the combined series.
//!
//! The core owns the canonical index-space range (`Option<ZoomRange>`, with
//! `None` meaning "no zoom"); the chart control is stateless and is re-driven
//! with the percent form on every render. Indices are only meaningful for
//! the combined series length they were captured against, so callers must
//! reset the range whenever the file set changes.

use serde::{Deserialize, Serialize};

/// Inclusive index bounds over the combined series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub start_index: usize,
    pub end_index: usize,
}

/// The 0-100 "percent of total" window a chart slider exchanges with us.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentRange {
    pub start: f64,
    pub end: f64,
}

impl PercentRange {
    pub const FULL: PercentRange = PercentRange {
        start: 0.0,
        end: 100.0,
    };
}

/// Forward map: index range -> percent window for the chart control.
/// `None` (no zoom) and an empty series both map to the full window.
pub fn zoom_to_percent(zoom: Option<ZoomRange>, len: usize) -> PercentRange {
    match zoom {
        Some(range) if len > 0 => PercentRange {
            start: range.start_index as f64 / len as f64 * 100.0,
            end: (range.end_index + 1) as f64 / len as f64 * 100.0,
        },
        _ => PercentRange::FULL,
    }
}

/// Backward map: percent window from a chart range-change event -> index
/// range. A window that covers the whole series collapses to `None`, keeping
/// "no zoom" canonical. Computed indices are clamped into `0..len`, so
/// degenerate percent inputs cannot escape the index space.
pub fn percent_to_zoom(range: PercentRange, len: usize) -> Option<ZoomRange> {
    if len == 0 {
        return None;
    }
    let n = len as f64;
    let last = len as i64 - 1;
    let start_index = ((range.start / 100.0 * n).floor() as i64).clamp(0, last);
    let end_index = ((range.end / 100.0 * n).floor() as i64 - 1).clamp(start_index, last);
    if start_index == 0 && end_index == last {
        return None;
    }
    Some(ZoomRange {
        start_index: start_index as usize,
        end_index: end_index as usize,
    })
}
