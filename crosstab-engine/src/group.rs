//! Dimension grouping - the third pipeline stage.
//!
//! Buckets dimension values (date -> quarter, number -> range, ...) and
//! partitions the filtered+sorted records into row-groups, column-groups
//! and cell member sets, all in a single pass. Group keys are structural
//! value tuples, never delimiter-joined strings.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use chrono::Datelike;

use crate::config::{DimensionGrouping, DimensionSpec};
use crate::format::format_value;
use crate::value::{Record, Value};

/// Bucket size used when a number-range dimension has a non-positive size.
const DEFAULT_RANGE_SIZE: f64 = 100.0;

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const MONTH_ABBREV: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun",
    "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ============================================================================
// GROUP KEY
// ============================================================================

/// An ordered tuple of bucketed dimension values. Two records share a
/// group iff their keys are structurally equal, value by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct GroupKey(pub SmallVec<[Value; 4]>);

impl GroupKey {
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        GroupKey(values.into_iter().collect())
    }

    /// The empty key of a dimensionless axis (one group holding all records).
    pub fn empty() -> Self {
        GroupKey(SmallVec::new())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The key of the parent group one level up the hierarchy.
    pub fn parent(&self) -> Option<GroupKey> {
        if self.0.len() > 1 {
            Some(GroupKey(self.0[..self.0.len() - 1].iter().cloned().collect()))
        } else {
            None
        }
    }
}

// ============================================================================
// BUCKETING
// ============================================================================

/// Maps a raw dimension value into its bucket. Unparseable dates and
/// non-numeric values under numeric bucketing collapse to Null, which
/// groups as "(blank)".
pub fn bucket_value(value: &Value, grouping: &DimensionGrouping) -> Value {
    match grouping {
        DimensionGrouping::None => value.clone(),

        DimensionGrouping::DateYear => match value.as_date() {
            Some(d) => Value::number(d.year() as f64),
            None => Value::Null,
        },

        DimensionGrouping::DateQuarter => match value.as_date() {
            Some(d) => {
                let quarter = (d.month() + 2) / 3;
                Value::text(format!("Q{} {}", quarter, d.year()))
            }
            None => Value::Null,
        },

        DimensionGrouping::DateMonth => match value.as_date() {
            Some(d) => Value::text(format!(
                "{} {}",
                MONTH_NAMES[(d.month() - 1) as usize],
                d.year()
            )),
            None => Value::Null,
        },

        DimensionGrouping::DateWeek => match value.as_date() {
            Some(d) => {
                // Day-of-month based week number, not ISO week.
                let week = (d.day() - 1) / 7 + 1;
                Value::text(format!(
                    "W{} {} {}",
                    week,
                    MONTH_ABBREV[(d.month() - 1) as usize],
                    d.year()
                ))
            }
            None => Value::Null,
        },

        DimensionGrouping::DateDay => match value.as_date() {
            Some(d) => Value::Date(d),
            None => Value::Null,
        },

        DimensionGrouping::NumberRange { size } => match value.as_number() {
            Some(n) => {
                let size = if *size > 0.0 { *size } else { DEFAULT_RANGE_SIZE };
                let start = (n / size).floor() * size;
                Value::text(range_label(start, size))
            }
            None => Value::Null,
        },
    }
}

/// "{start} - {start+size-1}" for integral buckets, decimal end bound
/// otherwise.
fn range_label(start: f64, size: f64) -> String {
    if start.fract() == 0.0 && size.fract() == 0.0 {
        format!("{} - {}", start as i64, (start + size - 1.0) as i64)
    } else {
        format!("{:.2} - {:.2}", start, start + size)
    }
}

// ============================================================================
// GROUP TABLES
// ============================================================================

/// Ordered table of groups along one axis. Groups keep first-seen order
/// over the filtered+sorted records.
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    /// Structural keys, one per group.
    pub keys: Vec<GroupKey>,

    /// Per-group display labels, one per dimension level.
    pub labels: Vec<Vec<String>>,

    /// Per-group member record indices, ascending.
    pub members: Vec<Vec<usize>>,

    index: FxHashMap<GroupKey, usize>,
}

impl GroupTable {
    fn intern(&mut self, key: GroupKey, labels: Vec<String>) -> usize {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.keys.len();
        self.index.insert(key.clone(), idx);
        self.keys.push(key);
        self.labels.push(labels);
        self.members.push(Vec::new());
        idx
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn truncate(&mut self, limit: usize) {
        if self.keys.len() <= limit {
            return;
        }
        for key in self.keys.drain(limit..) {
            self.index.remove(&key);
        }
        self.labels.truncate(limit);
        self.members.truncate(limit);
    }
}

/// Output of the grouping pass.
#[derive(Debug, Clone, Default)]
pub struct GroupedData {
    pub row_groups: GroupTable,
    pub column_groups: GroupTable,

    /// (row group, column group) -> member record indices, ascending.
    /// An entry exists only when at least one record hits the intersection.
    pub cells: FxHashMap<(usize, usize), Vec<usize>>,
}

/// Partitions `order` (filtered+sorted record indices) into row and
/// column groups, computing both keys per record in one pass. `limit`
/// truncates the row-group table; cell entries for dropped rows are
/// discarded with it.
pub fn group_records(
    records: &[Record],
    order: &[usize],
    rows: &[DimensionSpec],
    columns: &[DimensionSpec],
    limit: Option<usize>,
) -> GroupedData {
    let mut grouped = GroupedData::default();

    for &record_idx in order {
        let record = &records[record_idx];

        let (row_key, row_labels) = dimension_key(record, rows);
        let (col_key, col_labels) = dimension_key(record, columns);

        let row = grouped.row_groups.intern(row_key, row_labels);
        let col = grouped.column_groups.intern(col_key, col_labels);

        grouped.row_groups.members[row].push(record_idx);
        grouped.column_groups.members[col].push(record_idx);
        grouped.cells.entry((row, col)).or_default().push(record_idx);
    }

    if let Some(limit) = limit {
        let before = grouped.row_groups.len();
        grouped.row_groups.truncate(limit);
        if grouped.row_groups.len() < before {
            grouped.cells.retain(|&(row, _), _| row < limit);
        }
    }

    grouped
}

/// Bucketed key plus display labels for one record along one axis.
fn dimension_key(record: &Record, dimensions: &[DimensionSpec]) -> (GroupKey, Vec<String>) {
    let mut key = SmallVec::with_capacity(dimensions.len());
    let mut labels = Vec::with_capacity(dimensions.len());

    for dim in dimensions {
        let bucketed = bucket_value(&record.value_or_null(&dim.field), &dim.grouping);
        labels.push(match &dim.format {
            Some(spec) => format_value(&bucketed, spec),
            None => bucketed.label(),
        });
        key.push(bucketed);
    }

    (GroupKey(key), labels)
}
