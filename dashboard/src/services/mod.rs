//! Presentation adapters.
//!
//! Pure functions that turn the state machine's results into what a view
//! draws: histogram bins, the statistics panel, metric checks, map id sets
//! and the county table. Nothing here talks to the backend.

pub mod counties;
pub mod geomap;
pub mod histogram;
pub mod statistics;

pub use counties::{
    county_rows, county_table, CountyColumn, CountyPage, CountyRow, CountyTableQuery,
    COUNTY_PAGE_SIZE,
};
pub use geomap::{
    county_counts, find_county_by_values, map_view, CountyCounts, MapView, MapViewMode,
    TOTAL_COUNTIES,
};
pub use histogram::{
    apply_log_scale, bin_histogram, feature_histogram, BinOptions, BinnedHistogram,
    FeatureHistogramBin, HistogramBin, DEFAULT_BIN_COUNT,
};
pub use statistics::{
    compute_summary_statistics, describe, metric_checks, sorted_feature_importance,
    FeatureImportanceRow, MetricChecks, SummaryStatistics, ValueSummary,
};
