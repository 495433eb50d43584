//! Serializable pivot output.
//!
//! The generated table is a rectangular grid: one header entry per
//! (column group, measure) pair, then data rows, optional subtotal rows
//! and an optional grand-total row. Every cell carries both the raw
//! value and its formatted display string.

use serde::{Deserialize, Serialize};

use crate::format::{format_value, FormatSpec};
use crate::value::Value;

/// What a result row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowKind {
    Data,
    SubTotal,
    GrandTotal,
}

/// One rendered cell: the aggregated value plus its display string.
/// Null values (empty intersections, blanked baselines) render empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellView {
    pub value: Value,
    pub formatted: String,
}

impl CellView {
    pub fn new(value: Value, format: Option<&FormatSpec>) -> Self {
        let formatted = if value.is_null() {
            String::new()
        } else {
            match format {
                Some(spec) => format_value(&value, spec),
                None => value.label(),
            }
        };
        CellView { value, formatted }
    }

    pub fn empty() -> Self {
        CellView {
            value: Value::Null,
            formatted: String::new(),
        }
    }
}

/// Header for one body column: the column group's labels (one per column
/// dimension, outer to inner) plus the measure label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub labels: Vec<String>,
    pub measure: String,
}

/// One output row. `cells` is column-major over (column group, measure)
/// pairs in header order; `totals` holds the row's per-measure totals and
/// is empty when grand totals are disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub labels: Vec<String>,
    pub kind: RowKind,
    pub cells: Vec<CellView>,
    pub totals: Vec<CellView>,
}

/// Informational counters and timings. Excluded from the idempotence
/// contract, which covers headers, rows and totals only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Records supplied to the generation.
    pub record_count: usize,
    /// Records that survived filtering.
    pub filtered_count: usize,
    pub row_group_count: usize,
    pub column_group_count: usize,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    pub query_time_ms: u64,
}

/// The complete generated cross-tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotResult {
    /// Header labels for the row-dimension columns, outer to inner.
    pub row_dimension_labels: Vec<String>,

    /// One entry per body column, in render order.
    pub column_headers: Vec<ColumnHeader>,

    /// Data and subtotal rows, in group order.
    pub rows: Vec<ResultRow>,

    /// The grand-total row, when enabled and the grid is non-empty.
    pub grand_total: Option<ResultRow>,

    pub metadata: ResultMetadata,
}

impl PivotResult {
    /// The empty grid produced by empty or fully filtered input.
    pub fn empty(row_dimension_labels: Vec<String>, metadata: ResultMetadata) -> Self {
        PivotResult {
            row_dimension_labels,
            column_headers: Vec::new(),
            rows: Vec::new(),
            grand_total: None,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cells_render_empty() {
        let cell = CellView::new(Value::Null, None);
        assert_eq!(cell.formatted, "");
    }

    #[test]
    fn unformatted_cells_use_the_value_label() {
        let cell = CellView::new(Value::number(1234.0), None);
        assert_eq!(cell.formatted, "1234");
    }

    #[test]
    fn formatted_cells_follow_the_format_spec() {
        let spec = FormatSpec::Number {
            decimal_places: 2,
            use_thousands_separator: true,
            prefix: None,
            suffix: None,
        };
        let cell = CellView::new(Value::number(1234.5), Some(&spec));
        assert_eq!(cell.formatted, "1,234.50");
    }

    #[test]
    fn row_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&RowKind::GrandTotal).unwrap();
        assert_eq!(json, "\"grand-total\"");
    }
}
