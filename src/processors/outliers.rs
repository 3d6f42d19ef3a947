use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::utils::constants::{DEFAULT_OUTLIER_RANGES, VARIABLE_ALIASES};

/// Valid value range `[low, high]` for one variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Outlier ranges per variable: built-in defaults overridden by user ranges
#[derive(Debug, Clone, Default)]
pub struct OutlierFilter {
    ranges: HashMap<String, ValueRange>,
}

impl OutlierFilter {
    pub fn new(user_ranges: &BTreeMap<String, ValueRange>) -> Self {
        let mut ranges: HashMap<String, ValueRange> = DEFAULT_OUTLIER_RANGES
            .iter()
            .map(|(var, low, high)| (var.to_string(), ValueRange::new(*low, *high)))
            .collect();
        for (var, range) in user_ranges {
            ranges.insert(var.clone(), *range);
        }
        Self { ranges }
    }

    /// Range for `var_name`, falling back to its canonical name if it is an alias
    pub fn range_for(&self, var_name: &str) -> Option<ValueRange> {
        self.ranges.get(var_name).copied().or_else(|| {
            VARIABLE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == var_name)
                .and_then(|(_, canonical)| self.ranges.get(*canonical).copied())
        })
    }

    /// Range to apply to a (requested, actual) variable pair. The requested
    /// name wins, so an alias's range covers both names.
    pub fn range_for_pair(&self, requested: &str, actual: &str) -> Option<ValueRange> {
        self.range_for(requested).or_else(|| self.range_for(actual))
    }

    /// NaN for values outside `range`, identity otherwise
    pub fn mask(value: f64, range: Option<ValueRange>) -> f64 {
        match range {
            Some(r) if !value.is_nan() && !r.contains(value) => f64::NAN,
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let filter = OutlierFilter::new(&BTreeMap::new());
        assert_eq!(filter.range_for("od550aer"), Some(ValueRange::new(-1.0, 10.0)));
        assert_eq!(filter.range_for("no_such_var"), None);

        let mut user = BTreeMap::new();
        user.insert("od550aer".to_string(), ValueRange::new(0.0, 5.0));
        let filter = OutlierFilter::new(&user);
        assert_eq!(filter.range_for("od550aer"), Some(ValueRange::new(0.0, 5.0)));
    }

    #[test]
    fn test_alias_shares_range() {
        let filter = OutlierFilter::new(&BTreeMap::new());
        assert_eq!(filter.range_for("od550csaer"), filter.range_for("od550aer"));
        assert_eq!(
            filter.range_for_pair("od550csaer", "something_else"),
            Some(ValueRange::new(-1.0, 10.0))
        );
    }

    #[test]
    fn test_mask() {
        let range = Some(ValueRange::new(0.0, 1.0));
        assert_eq!(OutlierFilter::mask(0.5, range), 0.5);
        assert!(OutlierFilter::mask(1.5, range).is_nan());
        assert_eq!(OutlierFilter::mask(7.0, None), 7.0);
    }
}
