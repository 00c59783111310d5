//! Variable bounds and the sliders that edit them.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

use super::range::{normalize_range, step_size, ColumnRange, ColumnRanges, Range};

/// Stand-ins for unbounded constraint edges when building sliders.
const UNBOUNDED_LOW: f64 = -1000.0;
const UNBOUNDED_HIGH: f64 = 1000.0;

/// Lower/upper bound pair for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lb: f64,
    pub ub: f64,
}

impl Bounds {
    pub const fn new(lb: f64, ub: f64) -> Self {
        Self { lb, ub }
    }

    /// Returns the bounds with `lb <= ub`.
    pub fn normalized(self) -> Self {
        if self.lb > self.ub {
            Self::new(self.ub, self.lb)
        } else {
            self
        }
    }
}

/// Variable name to bounds: a rectangular region of variable space.
///
/// Edits always replace the whole map; constraints from different sources are
/// never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraint(BTreeMap<String, Bounds>);

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bounds: Bounds) {
        self.0.insert(name.into(), bounds.normalized());
    }

    pub fn with(mut self, name: impl Into<String>, lb: f64, ub: f64) -> Self {
        self.insert(name, Bounds::new(lb, ub));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Bounds> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Bounds> {
        self.0.iter()
    }

    /// True when every constrained variable present in `values` lies inside
    /// its bounds. Variables missing from `values` never match.
    pub fn matches(&self, values: &BTreeMap<String, f64>) -> bool {
        self.0.iter().all(|(name, bounds)| match values.get(name) {
            Some(value) => *value >= bounds.lb && *value <= bounds.ub,
            None => false,
        })
    }
}

impl FromIterator<(String, Bounds)> for Constraint {
    fn from_iter<I: IntoIterator<Item = (String, Bounds)>>(iter: I) -> Self {
        let mut constraint = Constraint::new();
        for (name, bounds) in iter {
            constraint.insert(name, bounds);
        }
        constraint
    }
}

impl<'a> IntoIterator for &'a Constraint {
    type Item = (&'a String, &'a Bounds);
    type IntoIter = btree_map::Iter<'a, String, Bounds>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One dual-handle slider over a data column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderConfig {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default_value: [f64; 2],
}

impl SliderConfig {
    /// Slider over `range` with handles at 10% and 60% of the span.
    pub fn for_column(name: impl Into<String>, range: ColumnRange) -> Self {
        let span = range.span();
        Self {
            name: name.into(),
            min: range.min,
            max: range.max,
            step: step_size(range.min, range.max),
            default_value: [range.min + span * 0.10, range.min + span * 0.60],
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.default_value[0], self.default_value[1])
    }

    /// Move both handles, ordering them and clamping to the slider's extent.
    pub fn set_value(&mut self, low: f64, high: f64) {
        let range: Range = normalize_range(low, high, Some(ColumnRange::new(self.min, self.max)));
        self.default_value = [range.low, range.high];
    }
}

/// Build sliders for a preset pattern.
///
/// The treatment column is not a filter and gets no slider. Slider extents
/// come from `constraint_bounds`; variables missing there fall back to the
/// constraint itself.
pub fn generate_sliders(
    constraints: &Constraint,
    constraint_bounds: &Constraint,
    treatment_column: &str,
) -> Vec<SliderConfig> {
    constraints
        .iter()
        .filter(|(name, _)| name.as_str() != treatment_column)
        .map(|(name, bounds)| {
            let lb = if bounds.lb == f64::NEG_INFINITY { UNBOUNDED_LOW } else { bounds.lb };
            let ub = if bounds.ub == f64::INFINITY { UNBOUNDED_HIGH } else { bounds.ub };
            let extent = constraint_bounds.get(name).copied().unwrap_or(Bounds::new(lb, ub));

            SliderConfig {
                name: name.clone(),
                min: extent.lb,
                max: extent.ub,
                step: step_size(extent.lb, extent.ub),
                default_value: [lb, ub],
            }
        })
        .collect()
}

/// Rebuild a constraint from the current slider positions.
pub fn constraints_from_sliders(sliders: &[SliderConfig]) -> Constraint {
    sliders
        .iter()
        .map(|slider| (slider.name.clone(), slider.bounds()))
        .collect()
}

/// Slider for `name` sized from the fetched column ranges, `[0,1]` if unknown.
pub fn slider_for_column(name: &str, ranges: &ColumnRanges) -> SliderConfig {
    let range = ranges
        .get(name)
        .copied()
        .unwrap_or(ColumnRange::new(0.0, 1.0));
    SliderConfig::for_column(name, range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_sliders_use_canonical_step() {
        let constraints = Constraint::new().with("X", 2.0, 8.0).with("lawA", 0.0, 1.0);
        let bounds = Constraint::new().with("X", 0.0, 10.0);

        let sliders = generate_sliders(&constraints, &bounds, "lawA");

        assert_eq!(
            sliders,
            vec![SliderConfig {
                name: "X".to_string(),
                min: 0.0,
                max: 10.0,
                step: 0.1,
                default_value: [2.0, 8.0],
            }]
        );
    }

    #[test]
    fn test_infinite_bounds_replaced() {
        let mut constraints = Constraint::new();
        constraints.insert("Y", Bounds::new(f64::NEG_INFINITY, f64::INFINITY));
        let bounds = Constraint::new().with("Y", -5.0, 5.0);

        let sliders = generate_sliders(&constraints, &bounds, "");
        assert_eq!(sliders[0].default_value, [-1000.0, 1000.0]);
    }

    #[test]
    fn test_constraints_round_trip_through_sliders() {
        let sliders = vec![
            SliderConfig::for_column("a", ColumnRange::new(0.0, 100.0)),
            SliderConfig::for_column("b", ColumnRange::new(10.0, 20.0)),
        ];
        let constraint = constraints_from_sliders(&sliders);
        assert_eq!(constraint.get("a"), Some(&Bounds::new(10.0, 60.0)));
        assert_eq!(constraint.get("b"), Some(&Bounds::new(11.0, 16.0)));
    }

    #[test]
    fn test_set_value_orders_and_clamps() {
        let mut slider = SliderConfig::for_column("a", ColumnRange::new(0.0, 10.0));
        slider.set_value(15.0, 4.0);
        assert_eq!(slider.default_value, [4.0, 10.0]);
    }

    #[test]
    fn test_constraint_matching_is_inclusive() {
        let constraint = Constraint::new().with("a", 1.0, 2.0);
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), 2.0);
        assert!(constraint.matches(&values));

        values.insert("a".to_string(), 2.5);
        assert!(!constraint.matches(&values));

        assert!(!constraint.matches(&BTreeMap::new()));
        assert!(Constraint::new().matches(&BTreeMap::new()));
    }

    #[test]
    fn test_constraint_wire_shape() {
        let constraint = Constraint::new().with("X", 2.0, 8.0);
        let json = serde_json::to_value(&constraint).unwrap();
        assert_eq!(json, serde_json::json!({"X": {"lb": 2.0, "ub": 8.0}}));
    }
}
