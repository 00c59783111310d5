//! Data model: ranges, constraints, the canonical query and its results.
//!
//! Everything here is plain data and pure functions; no I/O.

pub mod constraint;
pub mod files;
pub mod query;
pub mod range;

pub use constraint::{
    constraints_from_sliders, generate_sliders, slider_for_column, Bounds, Constraint,
    SliderConfig,
};
pub use files::{DataFileKind, DataFileSelection, DataFileUpload, UploadReceipt};
pub use query::{
    AnalysisResult, ColumnHistogram, CountyId, CrossValidation, FeatureImportance,
    GeomapSelection, HighlightedCounty, HistogramResult, PatternId, PresetPattern, Query,
    TestScores,
};
pub use range::{
    default_ranges_for, derive_default_ranges, normalize_range, ranges_overlap, step_size,
    ColumnRange, ColumnRanges, DefaultRanges, Range, DEFAULT_ACTIVE_RANGE,
    DEFAULT_INACTIVE_RANGE,
};
