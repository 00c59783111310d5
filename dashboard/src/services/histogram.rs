//! Histogram binning for the inactive/active outcome chart and the
//! per-feature histograms.

use serde::{Deserialize, Serialize};

use crate::models::ColumnHistogram;

/// Bins drawn by the outcome chart unless configured otherwise.
pub const DEFAULT_BIN_COUNT: usize = 40;

/// Smallest bar height for a non-zero count on a log-scaled chart.
const MIN_VISIBLE_LOG_HEIGHT: f64 = 0.2;

/// One equal-width bin of the outcome histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    /// `"{start:.2} - {end:.2}"`
    pub range: String,
    pub range_start: f64,
    pub range_end: f64,
    /// Negative when the chart mirrors inactive counts below the axis.
    pub law_inactive: i64,
    pub law_active: i64,
    pub is_highlighted_active: bool,
    pub is_highlighted_inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinnedHistogram {
    pub bins: Vec<HistogramBin>,
    pub min: f64,
    pub max: f64,
}

impl BinnedHistogram {
    pub fn total_inactive(&self) -> i64 {
        self.bins.iter().map(|b| b.law_inactive.abs()).sum()
    }

    pub fn total_active(&self) -> i64 {
        self.bins.iter().map(|b| b.law_active).sum()
    }
}

/// Options for [`bin_histogram`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinOptions {
    pub bin_count: usize,
    /// Count inactive values as -1 so the two series mirror each other.
    pub negative_inactive: bool,
    pub highlight_active: Option<f64>,
    pub highlight_inactive: Option<f64>,
}

impl Default for BinOptions {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_BIN_COUNT,
            negative_inactive: false,
            highlight_active: None,
            highlight_inactive: None,
        }
    }
}

impl BinOptions {
    pub fn with_bins(bin_count: usize) -> Self {
        Self {
            bin_count,
            ..Self::default()
        }
    }
}

/// Bin the inactive and active outcome values into equal-width bins over
/// `[min(all), max(all)]`.
///
/// A value lands in bin `floor((v - min) / width)`, clamped to the last bin,
/// so the maximum value is counted in the last bin. Non-finite values are
/// ignored. When every value is equal the range is widened by one so the
/// width is never zero.
pub fn bin_histogram(inactive: &[f64], active: &[f64], options: &BinOptions) -> BinnedHistogram {
    let bin_count = options.bin_count.max(1);

    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for value in inactive.iter().chain(active).copied().filter(|v| v.is_finite()) {
        min = min.min(value);
        max = max.max(value);
    }
    if min > max {
        return BinnedHistogram {
            bins: Vec::new(),
            min: 0.0,
            max: 0.0,
        };
    }

    let upper = if min == max { min + 1.0 } else { max };
    let bin_width = (upper - min) / bin_count as f64;

    let mut bins: Vec<HistogramBin> = (0..bin_count)
        .map(|i| {
            let range_start = min + i as f64 * bin_width;
            let range_end = min + (i + 1) as f64 * bin_width;
            HistogramBin {
                range: format!("{:.2} - {:.2}", range_start, range_end),
                range_start,
                range_end,
                law_inactive: 0,
                law_active: 0,
                is_highlighted_active: false,
                is_highlighted_inactive: false,
            }
        })
        .collect();

    let index = |value: f64| bin_index(value, min, bin_width, bin_count);
    let inactive_step = if options.negative_inactive { -1 } else { 1 };

    for value in inactive.iter().copied().filter(|v| v.is_finite()) {
        bins[index(value)].law_inactive += inactive_step;
    }
    for value in active.iter().copied().filter(|v| v.is_finite()) {
        bins[index(value)].law_active += 1;
    }

    if let Some(value) = options.highlight_active.filter(|v| v.is_finite()) {
        bins[index(value)].is_highlighted_active = true;
    }
    if let Some(value) = options.highlight_inactive.filter(|v| v.is_finite()) {
        bins[index(value)].is_highlighted_inactive = true;
    }

    BinnedHistogram { bins, min, max }
}

fn bin_index(value: f64, min: f64, bin_width: f64, bin_count: usize) -> usize {
    let raw = ((value - min) / bin_width).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(bin_count - 1)
    }
}

/// Log-scaled bar height: `0` for empty bins, otherwise
/// `max(log10(count + 1), 0.2)`.
pub fn apply_log_scale(count: f64) -> f64 {
    if count <= 0.0 {
        return 0.0;
    }
    (count + 1.0).log10().max(MIN_VISIBLE_LOG_HEIGHT)
}

/// One bin of a feature histogram, paired with the same bin over the full
/// dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureHistogramBin {
    /// `"{start:.2}-{end:.2}"`
    pub bin: String,
    pub frequency: f64,
    pub scaled_frequency: f64,
    pub full_frequency: f64,
    pub scaled_full_frequency: f64,
}

/// Pair a feature's filtered histogram with its full-dataset histogram bin by
/// bin. Both share bin edges; a missing full histogram counts as zero.
pub fn feature_histogram(
    filtered: &ColumnHistogram,
    full: Option<&ColumnHistogram>,
    log_scale: bool,
) -> Vec<FeatureHistogramBin> {
    let scale = |count: f64| if log_scale { apply_log_scale(count) } else { count };

    filtered
        .bin_edges
        .windows(2)
        .zip(&filtered.counts)
        .enumerate()
        .map(|(i, (edges, &frequency))| {
            let full_frequency = full.and_then(|h| h.counts.get(i)).copied().unwrap_or(0.0);
            FeatureHistogramBin {
                bin: format!("{:.2}-{:.2}", edges[0], edges[1]),
                frequency,
                scaled_frequency: scale(frequency),
                full_frequency,
                scaled_full_frequency: scale(full_frequency),
            }
        })
        .collect()
}
