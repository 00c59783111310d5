//! The county table under the map: one row per analyzed county, with
//! filtering, sorting and paging.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::models::{AnalysisResult, CountyId};

/// Rows per table page.
pub const COUNTY_PAGE_SIZE: usize = 8;

/// One analyzed county with both outcome estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyRow {
    pub county_id: CountyId,
    pub county: String,
    pub state: String,
    pub inactive: f64,
    pub active: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountyColumn {
    County,
    State,
    Inactive,
    Active,
}

impl CountyColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::County => "county",
            Self::State => "state",
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }

    fn compare(&self, a: &CountyRow, b: &CountyRow) -> Ordering {
        match self {
            Self::County => a.county.cmp(&b.county),
            Self::State => a.state.cmp(&b.state),
            Self::Inactive => a.inactive.total_cmp(&b.inactive),
            Self::Active => a.active.total_cmp(&b.active),
        }
    }
}

impl fmt::Display for CountyColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountyColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "county" => Ok(Self::County),
            "state" => Ok(Self::State),
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            other => Err(format!("unknown county column '{}'", other)),
        }
    }
}

/// Which slice of the table to return.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyTableQuery {
    /// Case-insensitive substring of the county or state name.
    pub filter: Option<String>,
    pub sort: Option<CountyColumn>,
    pub descending: bool,
    /// 1-based. Out-of-range pages are clamped.
    pub page: usize,
    pub page_size: usize,
}

impl Default for CountyTableQuery {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            descending: false,
            page: 1,
            page_size: COUNTY_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyPage {
    pub rows: Vec<CountyRow>,
    pub page: usize,
    pub page_count: usize,
    /// Rows matching the filter, across all pages.
    pub total: usize,
}

/// Rows in analysis order. Missing names come out empty.
pub fn county_rows(analysis: &AnalysisResult) -> Vec<CountyRow> {
    let geomap = &analysis.geomap;
    let histogram = &analysis.histogram;
    let name = |names: &[String], position: usize| names.get(position).cloned().unwrap_or_default();

    histogram
        .inactive_values
        .iter()
        .zip(&histogram.active_values)
        .zip(&geomap.all_indices)
        .enumerate()
        .map(|(position, ((&inactive, &active), &county_id))| CountyRow {
            county_id,
            county: name(&geomap.county_names, position),
            state: name(&geomap.state_names, position),
            inactive,
            active,
        })
        .collect()
}

/// Filter, then sort, then cut one page.
///
/// The sort is stable, so rows that compare equal keep analysis order.
pub fn county_table(rows: Vec<CountyRow>, query: &CountyTableQuery) -> CountyPage {
    let needle = query
        .filter
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase);

    let mut rows: Vec<CountyRow> = match needle {
        Some(needle) => rows
            .into_iter()
            .filter(|row| {
                row.county.to_lowercase().contains(&needle)
                    || row.state.to_lowercase().contains(&needle)
            })
            .collect(),
        None => rows,
    };

    if let Some(column) = query.sort {
        rows.sort_by(|a, b| {
            let ordering = column.compare(a, b);
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let page_size = query.page_size.max(1);
    let total = rows.len();
    let page_count = total.div_ceil(page_size).max(1);
    let page = query.page.clamp(1, page_count);
    let rows = rows
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    CountyPage {
        rows,
        page,
        page_count,
        total,
    }
}
