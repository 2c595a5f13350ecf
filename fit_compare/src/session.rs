//! Stateful shell around the pure stages: two file slots plus the canonical
//! zoom range. The combined series is derived on demand and recomputed in
//! full on every call; it is never patched incrementally, so the two decode
//! tasks may land in any order without coordination.

use serde::{Deserialize, Serialize};

use crate::{
    align_series, decode_activity, display_name, normalize_activity, percent_to_zoom,
    zoom_to_percent, ActivitySummary, CombinedSeries, CompareError, PercentRange, Sample,
    ZoomRange,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// One successfully decoded and normalized file, parked in its slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadedFile {
    pub name: String,
    pub summary: ActivitySummary,
    pub samples: Vec<Sample>,
}

#[derive(Clone, Debug, Default)]
pub struct ComparisonState {
    slots: [Option<LoadedFile>; 2],
    zoom: Option<ZoomRange>,
}

impl ComparisonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a file's byte buffer into the named slot.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when the file decoded
    /// cleanly but held no usable activity (the slot and zoom are left
    /// untouched). Errors also leave all state untouched; a failure on one
    /// slot never disturbs the other. Multi-session files contribute their
    /// first session.
    pub fn load_slot(
        &mut self,
        slot: Slot,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<bool, CompareError> {
        let activity = decode_activity(bytes)?;
        let mut activities = normalize_activity(&activity);
        if activities.is_empty() {
            return Ok(false);
        }
        let first = activities.remove(0);
        self.attach(
            slot,
            LoadedFile {
                name: display_name(file_name).to_string(),
                summary: first.summary,
                samples: first.samples,
            },
        );
        Ok(true)
    }

    /// Park an already-normalized file in a slot. Any captured zoom indices
    /// were relative to the previous combined series, so the zoom resets.
    pub fn attach(&mut self, slot: Slot, file: LoadedFile) {
        self.slots[slot.index()] = Some(file);
        self.zoom = None;
    }

    pub fn slot(&self, slot: Slot) -> Option<&LoadedFile> {
        self.slots[slot.index()].as_ref()
    }

    /// Derive the combined series from the two slots. `None` until both
    /// files are loaded.
    pub fn combined(&self) -> Option<CombinedSeries> {
        let a = self.slots[0].as_ref()?;
        let b = self.slots[1].as_ref()?;
        Some(align_series(&a.samples, &a.name, &b.samples, &b.name))
    }

    pub fn zoom(&self) -> Option<ZoomRange> {
        self.zoom
    }

    /// The percent window to hand the chart control on the next render.
    pub fn visual_range(&self) -> PercentRange {
        zoom_to_percent(self.zoom, self.combined_len())
    }

    /// Apply a range-change event emitted by the chart control.
    pub fn set_visual_range(&mut self, range: PercentRange) {
        self.zoom = percent_to_zoom(range, self.combined_len());
    }

    /// Explicit reset, unconditional regardless of the current window.
    pub fn reset_zoom(&mut self) {
        self.zoom = None;
    }

    fn combined_len(&self) -> usize {
        self.combined().map_or(0, |series| series.len())
    }
}
