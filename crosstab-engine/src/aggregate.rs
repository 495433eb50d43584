//! Cell aggregation - the fourth pipeline stage.
//!
//! One accumulator per cell folds the member records' measure values in a
//! single streaming pass (variance via Welford's update), keeping the raw
//! numbers only for the order statistics that need them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::AggregationKind;
use crate::value::{Record, Value};

/// Streaming aggregate over one measure field within one cell.
#[derive(Debug, Clone, Default)]
pub struct AggregateAccumulator {
    /// Non-null values seen.
    count: u64,
    /// Numeric values seen.
    numeric_count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    /// Raw numbers, in arrival order, for median.
    numbers: Vec<f64>,
    distinct: FxHashSet<Value>,
    /// Occurrence counts plus first-seen rank, for mode tie-breaks.
    occurrences: FxHashMap<Value, (u64, usize)>,
    first: Option<Value>,
    last: Option<Value>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        AggregateAccumulator::default()
    }

    /// Folds one value in. Nulls are skipped entirely.
    pub fn push(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }

        self.count += 1;
        self.distinct.insert(value.clone());

        let rank = self.occurrences.len();
        self.occurrences
            .entry(value.clone())
            .and_modify(|(n, _)| *n += 1)
            .or_insert((1, rank));

        if self.first.is_none() {
            self.first = Some(value.clone());
        }
        self.last = Some(value.clone());

        if let Some(n) = value.as_number() {
            self.numeric_count += 1;
            self.sum += n;

            // Welford's online update.
            let delta = n - self.mean;
            self.mean += delta / self.numeric_count as f64;
            self.m2 += delta * (n - self.mean);

            if self.numeric_count == 1 {
                self.min = n;
                self.max = n;
            } else {
                self.min = self.min.min(n);
                self.max = self.max.max(n);
            }

            self.numbers.push(n);
        }
    }

    /// Resolves the accumulator under one aggregation kind. Numeric kinds
    /// over no qualifying input resolve to 0, never NaN; mode and
    /// first/last resolve to Null.
    pub fn finish(&self, kind: AggregationKind) -> Value {
        match kind {
            AggregationKind::Sum => Value::number(self.sum),
            AggregationKind::Count => Value::number(self.count as f64),
            AggregationKind::CountDistinct => Value::number(self.distinct.len() as f64),

            AggregationKind::Avg => self.numeric(self.mean),
            AggregationKind::Min => self.numeric(self.min),
            AggregationKind::Max => self.numeric(self.max),
            AggregationKind::Median => self.median(),
            AggregationKind::Variance => self.numeric(self.variance()),
            AggregationKind::StdDev => self.numeric(self.variance().sqrt()),

            AggregationKind::Mode => self.mode(),
            AggregationKind::First => self.first.clone().unwrap_or(Value::Null),
            AggregationKind::Last => self.last.clone().unwrap_or(Value::Null),

            // Formula measures are evaluated by the engine, not folded here;
            // unknown tags resolve to 0 after the engine's warning.
            AggregationKind::Custom | AggregationKind::Unknown => Value::number(0.0),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn numeric(&self, n: f64) -> Value {
        if self.numeric_count > 0 {
            Value::number(n)
        } else {
            Value::number(0.0)
        }
    }

    /// Population variance (m2 / n).
    fn variance(&self) -> f64 {
        if self.numeric_count > 0 {
            self.m2 / self.numeric_count as f64
        } else {
            0.0
        }
    }

    /// Middle value of the sorted numbers; the mean of the two middle
    /// values when the count is even. No numbers at all resolves to 0.
    fn median(&self) -> Value {
        if self.numbers.is_empty() {
            return Value::number(0.0);
        }
        let mut sorted = self.numbers.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        };
        Value::number(median)
    }

    /// Most frequent non-null value. Ties break toward the first-seen value.
    fn mode(&self) -> Value {
        self.occurrences
            .iter()
            .max_by(|(_, (na, ra)), (_, (nb, rb))| na.cmp(nb).then(rb.cmp(ra)))
            .map(|(value, _)| value.clone())
            .unwrap_or(Value::Null)
    }
}

/// Folds `field` over the member records and resolves `kind` in one call.
pub fn aggregate_field(
    records: &[Record],
    members: &[usize],
    field: &str,
    kind: AggregationKind,
) -> Value {
    let mut acc = AggregateAccumulator::new();
    for &idx in members {
        acc.push(&records[idx].value_or_null(field));
    }
    acc.finish(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records_with_sales(values: &[f64]) -> Vec<Record> {
        values
            .iter()
            .map(|&v| Record::new().with("sales", v))
            .collect()
    }

    fn agg(values: &[f64], kind: AggregationKind) -> Value {
        let records = records_with_sales(values);
        let members: Vec<usize> = (0..records.len()).collect();
        aggregate_field(&records, &members, "sales", kind)
    }

    #[test]
    fn sum_avg_min_max() {
        let values = [10.0, 20.0, 30.0];
        assert_eq!(agg(&values, AggregationKind::Sum), Value::number(60.0));
        assert_eq!(agg(&values, AggregationKind::Avg), Value::number(20.0));
        assert_eq!(agg(&values, AggregationKind::Min), Value::number(10.0));
        assert_eq!(agg(&values, AggregationKind::Max), Value::number(30.0));
    }

    #[test]
    fn median_odd_takes_middle() {
        assert_eq!(
            agg(&[30.0, 10.0, 20.0], AggregationKind::Median),
            Value::number(20.0)
        );
    }

    #[test]
    fn median_even_averages_middle_pair() {
        assert_eq!(
            agg(&[40.0, 10.0, 30.0, 20.0], AggregationKind::Median),
            Value::number(25.0)
        );
    }

    #[test]
    fn count_skips_nulls() {
        let records = vec![
            Record::new().with("sales", 1.0),
            Record::new(),
            Record::new().with("sales", 2.0),
        ];
        assert_eq!(
            aggregate_field(&records, &[0, 1, 2], "sales", AggregationKind::Count),
            Value::number(2.0)
        );
    }

    #[test]
    fn count_distinct_dedupes() {
        let records = vec![
            Record::new().with("region", "East"),
            Record::new().with("region", "West"),
            Record::new().with("region", "East"),
        ];
        assert_eq!(
            aggregate_field(&records, &[0, 1, 2], "region", AggregationKind::CountDistinct),
            Value::number(2.0)
        );
    }

    #[test]
    fn numeric_kinds_over_no_values_resolve_to_zero() {
        let records = vec![Record::new().with("note", "n/a")];
        for kind in [
            AggregationKind::Sum,
            AggregationKind::Avg,
            AggregationKind::Min,
            AggregationKind::Max,
            AggregationKind::Median,
            AggregationKind::StdDev,
            AggregationKind::Variance,
        ] {
            assert_eq!(
                aggregate_field(&records, &[0], "sales", kind),
                Value::number(0.0)
            );
        }
        assert_eq!(
            aggregate_field(&records, &[0], "sales", AggregationKind::Mode),
            Value::Null
        );
    }

    #[test]
    fn variance_and_stddev_are_population_form() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let variance = agg(&values, AggregationKind::Variance).as_number().unwrap();
        assert!((variance - 4.0).abs() < 1e-9);
        let stddev = agg(&values, AggregationKind::StdDev).as_number().unwrap();
        assert!((stddev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn mode_picks_most_frequent_then_first_seen() {
        assert_eq!(
            agg(&[3.0, 1.0, 3.0, 2.0], AggregationKind::Mode),
            Value::number(3.0)
        );
        // All counts equal: the first-seen value wins.
        assert_eq!(
            agg(&[5.0, 1.0, 2.0], AggregationKind::Mode),
            Value::number(5.0)
        );
    }

    #[test]
    fn first_and_last_take_the_outermost_non_null_values() {
        // Records missing the field are skipped, so leading and trailing
        // nulls never displace a real value.
        let records = vec![
            Record::new(),
            Record::new().with("sales", 7.0),
            Record::new().with("sales", 9.0),
            Record::new(),
        ];
        assert_eq!(
            aggregate_field(&records, &[0, 1, 2, 3], "sales", AggregationKind::First),
            Value::number(7.0)
        );
        assert_eq!(
            aggregate_field(&records, &[0, 1, 2, 3], "sales", AggregationKind::Last),
            Value::number(9.0)
        );
    }
}
