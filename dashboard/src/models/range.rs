//! Numeric threshold bands and slider step sizing.
//!
//! Every slider-bearing control in the dashboard goes through these helpers so
//! that clamping, default bands and step sizes agree between controls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fallback bands used when the treatment column has no known range.
pub const DEFAULT_ACTIVE_RANGE: Range = Range { low: 0.0, high: 0.4 };
pub const DEFAULT_INACTIVE_RANGE: Range = Range { low: 0.6, high: 1.0 };

/// A closed interval `[low, high]`.
///
/// Serialized as a two-element array to match the backend contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Inclusive membership test, matching the backend's `>=`/`<=` masks.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl From<[f64; 2]> for Range {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Range> for [f64; 2] {
    fn from(range: Range) -> Self {
        [range.low, range.high]
    }
}

/// Observed `{min, max}` of a data column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Column name to observed range, as returned by `/column-ranges`.
pub type ColumnRanges = BTreeMap<String, ColumnRange>;

/// Default active/inactive bands for a treatment column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultRanges {
    pub active: Range,
    pub inactive: Range,
}

/// Order a pair of bounds and optionally clamp it into a column's range.
pub fn normalize_range(low: f64, high: f64, bounds: Option<ColumnRange>) -> Range {
    let (mut low, mut high) = if low > high { (high, low) } else { (low, high) };
    if let Some(bounds) = bounds {
        low = low.clamp(bounds.min, bounds.max);
        high = high.clamp(bounds.min, bounds.max);
    }
    Range::new(low, high)
}

/// True when the two closed intervals share at least one point.
pub fn ranges_overlap(a: &Range, b: &Range) -> bool {
    a.low.max(b.low) <= a.high.min(b.high)
}

/// Active band in the lower 40% of the column, inactive band in the upper 40%.
///
/// The 20% gap in between keeps the two bands disjoint on a fresh column.
pub fn derive_default_ranges(min: f64, max: f64) -> DefaultRanges {
    let span = max - min;
    DefaultRanges {
        active: Range::new(min, min + 0.4 * span),
        inactive: Range::new(min + 0.6 * span, max),
    }
}

/// Default bands for `column`, falling back to `[0,0.4]`/`[0.6,1]` when the
/// column range is unknown.
pub fn default_ranges_for(column: &str, ranges: &ColumnRanges) -> DefaultRanges {
    match ranges.get(column) {
        Some(range) => derive_default_ranges(range.min, range.max),
        None => DefaultRanges {
            active: DEFAULT_ACTIVE_RANGE,
            inactive: DEFAULT_INACTIVE_RANGE,
        },
    }
}

/// Slider step for a column spanning `[min, max]`.
pub fn step_size(min: f64, max: f64) -> f64 {
    if min == 0.0 && max == 1.0 {
        return 0.1;
    }

    let span = max - min;
    if span <= 5.0 {
        0.01
    } else if span <= 100.0 {
        0.1
    } else if span <= 1000.0 {
        1.0
    } else {
        10f64.powi(span.log10().floor() as i32 - 2)
    }
}
