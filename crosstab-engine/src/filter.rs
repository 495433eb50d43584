//! Filter evaluation - the first pipeline stage.
//!
//! A record survives iff it satisfies every FilterSpec (logical AND).
//! Missing fields read as Null: they pass the null-checks and fail every
//! numeric comparison.

use crate::config::{FilterCondition, FilterSpec};
use crate::value::{Record, Value};

/// Applies the filter conjunction and returns the surviving record
/// indices in their original order.
pub fn filter_records(records: &[Record], filters: &[FilterSpec]) -> Vec<usize> {
    for spec in filters {
        if spec.condition == FilterCondition::Unknown {
            log::warn!(
                "unrecognized filter operator on field '{}'; predicate passes all records",
                spec.field
            );
        }
    }

    (0..records.len())
        .filter(|&i| filters.iter().all(|spec| record_matches(&records[i], spec)))
        .collect()
}

/// Evaluates a single FilterSpec against a record.
pub fn record_matches(record: &Record, spec: &FilterSpec) -> bool {
    let value = record.value_or_null(&spec.field);
    condition_matches(&value, &spec.condition)
}

fn condition_matches(value: &Value, condition: &FilterCondition) -> bool {
    match condition {
        FilterCondition::Equals(target) => value == target,
        FilterCondition::NotEquals(target) => value != target,

        FilterCondition::Contains(needle) => {
            text_of(value).map_or(false, |s| s.contains(&needle.to_lowercase()))
        }
        FilterCondition::NotContains(needle) => {
            !text_of(value).map_or(false, |s| s.contains(&needle.to_lowercase()))
        }
        FilterCondition::StartsWith(prefix) => {
            text_of(value).map_or(false, |s| s.starts_with(&prefix.to_lowercase()))
        }
        FilterCondition::EndsWith(suffix) => {
            text_of(value).map_or(false, |s| s.ends_with(&suffix.to_lowercase()))
        }

        FilterCondition::GreaterThan(bound) => numeric(value).map_or(false, |n| n > *bound),
        FilterCondition::GreaterThanOrEqual(bound) => numeric(value).map_or(false, |n| n >= *bound),
        FilterCondition::LessThan(bound) => numeric(value).map_or(false, |n| n < *bound),
        FilterCondition::LessThanOrEqual(bound) => numeric(value).map_or(false, |n| n <= *bound),
        FilterCondition::Between(low, high) => {
            numeric(value).map_or(false, |n| n >= *low && n <= *high)
        }

        FilterCondition::In(set) => set.contains(value),
        FilterCondition::NotIn(set) => !set.contains(value),

        FilterCondition::IsNull => value.is_null(),
        FilterCondition::IsNotNull => !value.is_null(),

        // Fail-open: an operator we don't recognize filters nothing out.
        FilterCondition::Unknown => true,
    }
}

/// Lowercased text content for the case-insensitive string conditions.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.to_lowercase()),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    value.as_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_records() -> Vec<Record> {
        vec![
            Record::new().with("region", "East").with("sales", 100.0),
            Record::new().with("region", "West").with("sales", 200.0),
            Record::new().with("region", "North").with("sales", 50.0),
            Record::new().with("region", "East"), // sales missing
        ]
    }

    fn filter(field: &str, condition: FilterCondition) -> Vec<FilterSpec> {
        vec![FilterSpec::new(field, condition)]
    }

    #[test]
    fn equals_matches_exact_value() {
        let records = sales_records();
        let kept = filter_records(&records, &filter("region", FilterCondition::Equals(Value::text("East"))));
        assert_eq!(kept, vec![0, 3]);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let records = sales_records();
        let kept = filter_records(
            &records,
            &filter("region", FilterCondition::Contains("EAS".to_string())),
        );
        assert_eq!(kept, vec![0, 3]);
    }

    #[test]
    fn starts_and_ends_with_are_case_insensitive() {
        let records = sales_records();
        let starts = filter_records(
            &records,
            &filter("region", FilterCondition::StartsWith("we".to_string())),
        );
        assert_eq!(starts, vec![1]);

        let ends = filter_records(
            &records,
            &filter("region", FilterCondition::EndsWith("TH".to_string())),
        );
        assert_eq!(ends, vec![2]);
    }

    #[test]
    fn numeric_comparisons_fail_for_missing_field() {
        let records = sales_records();
        let kept = filter_records(&records, &filter("sales", FilterCondition::GreaterThan(0.0)));
        // Record 3 has no sales value and must not pass.
        assert_eq!(kept, vec![0, 1, 2]);
    }

    #[test]
    fn between_is_inclusive() {
        let records = sales_records();
        let kept = filter_records(
            &records,
            &filter("sales", FilterCondition::Between(50.0, 100.0)),
        );
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn membership_conditions() {
        let records = sales_records();
        let set = vec![Value::text("East"), Value::text("West")];
        let kept = filter_records(&records, &filter("region", FilterCondition::In(set.clone())));
        assert_eq!(kept, vec![0, 1, 3]);

        let excluded = filter_records(&records, &filter("region", FilterCondition::NotIn(set)));
        assert_eq!(excluded, vec![2]);
    }

    #[test]
    fn null_checks_treat_missing_as_null() {
        let records = sales_records();
        let nulls = filter_records(&records, &filter("sales", FilterCondition::IsNull));
        assert_eq!(nulls, vec![3]);

        let present = filter_records(&records, &filter("sales", FilterCondition::IsNotNull));
        assert_eq!(present, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_operator_is_fail_open() {
        let records = sales_records();
        let kept = filter_records(&records, &filter("region", FilterCondition::Unknown));
        assert_eq!(kept.len(), records.len());
    }

    #[test]
    fn filters_combine_as_conjunction() {
        let records = sales_records();
        let specs = vec![
            FilterSpec::new("region", FilterCondition::Equals(Value::text("East"))),
            FilterSpec::new("sales", FilterCondition::GreaterThan(50.0)),
        ];
        assert_eq!(filter_records(&records, &specs), vec![0]);
    }
}
