//! "Show values as" transforms - the fifth pipeline stage.
//!
//! Runs after cell aggregation over a snapshot of the finished measure
//! matrix, so every transform sees stable inputs regardless of cell
//! ordering. Percent results are percentages rounded to two decimals;
//! every ratio guards its denominator and yields 0 instead of infinity.

use crate::config::ShowAs;
use crate::group::GroupKey;
use crate::value::Value;

/// One measure's aggregated values across the whole grid, plus the totals
/// computed from member records. Null marks an empty intersection.
#[derive(Debug, Clone)]
pub struct MeasureMatrix {
    /// Body values, rows x columns.
    pub cells: Vec<Vec<Value>>,
    /// Per-row totals (aggregated over the row group's records).
    pub row_totals: Vec<Value>,
    /// Per-column totals.
    pub column_totals: Vec<Value>,
    /// Total over every filtered record.
    pub grand_total: Value,
}

/// Grid shape the transforms consult.
pub struct ShowAsContext<'a> {
    /// Structural row keys, used to find sibling rows under one parent.
    pub row_keys: &'a [GroupKey],
    /// Innermost column label per column group, used to match baselines.
    pub column_labels: &'a [String],
    /// False when the grid has no column dimensions, which redirects the
    /// column-wise transforms down the rows instead.
    pub has_column_dims: bool,
    /// Parent-scope values for percent-of-parent, re-aggregated over each
    /// parent group's member records. Row-aligned with the main matrix;
    /// rows with no parent carry the grand total.
    pub parents: Option<&'a MeasureMatrix>,
}

/// Applies one transform in place. The input matrix is the snapshot; no
/// transformed value feeds another transform.
pub fn apply_show_as(matrix: &mut MeasureMatrix, show_as: &ShowAs, ctx: &ShowAsContext) {
    match show_as {
        ShowAs::PercentOfTotal => percent_of_total(matrix),
        ShowAs::PercentOfRow => percent_of_row(matrix),
        ShowAs::PercentOfColumn => percent_of_column(matrix),
        ShowAs::PercentOfParent => percent_of_parent(matrix, ctx),
        ShowAs::DifferenceFrom(baseline) => difference_from(matrix, baseline, ctx, false),
        ShowAs::PercentDifferenceFrom(baseline) => difference_from(matrix, baseline, ctx, true),
        ShowAs::RunningTotal => running_total(matrix, ctx, false),
        ShowAs::PercentRunningTotal => running_total(matrix, ctx, true),
        ShowAs::Rank => rank(matrix),
        ShowAs::Index => index(matrix),
    }
}

/// Percentage of `numerator / denominator`, rounded to two decimals.
/// Zero denominators resolve to 0.
fn percent(numerator: f64, denominator: f64) -> Value {
    if denominator == 0.0 {
        Value::number(0.0)
    } else {
        Value::number(round2(numerator / denominator * 100.0))
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn numeric(value: &Value) -> Option<f64> {
    value.as_number()
}

// ============================================================================
// PERCENT-OF TRANSFORMS
// ============================================================================

fn percent_of_total(matrix: &mut MeasureMatrix) {
    let grand = numeric(&matrix.grand_total).unwrap_or(0.0);
    for row in &mut matrix.cells {
        for cell in row.iter_mut() {
            if let Some(n) = numeric(cell) {
                *cell = percent(n, grand);
            }
        }
    }
    for total in matrix.row_totals.iter_mut().chain(matrix.column_totals.iter_mut()) {
        if let Some(n) = numeric(total) {
            *total = percent(n, grand);
        }
    }
    if numeric(&matrix.grand_total).is_some() {
        matrix.grand_total = percent(grand, grand);
    }
}

fn percent_of_row(matrix: &mut MeasureMatrix) {
    let grand = numeric(&matrix.grand_total).unwrap_or(0.0);
    for (row, total) in matrix.cells.iter_mut().zip(&matrix.row_totals) {
        let denom = numeric(total).unwrap_or(0.0);
        for cell in row.iter_mut() {
            if let Some(n) = numeric(cell) {
                *cell = percent(n, denom);
            }
        }
    }
    for total in matrix.row_totals.iter_mut() {
        if let Some(n) = numeric(total) {
            *total = percent(n, n);
        }
    }
    for total in matrix.column_totals.iter_mut() {
        if let Some(n) = numeric(total) {
            *total = percent(n, grand);
        }
    }
    if numeric(&matrix.grand_total).is_some() {
        matrix.grand_total = percent(grand, grand);
    }
}

fn percent_of_column(matrix: &mut MeasureMatrix) {
    let grand = numeric(&matrix.grand_total).unwrap_or(0.0);
    let denominators: Vec<f64> = matrix
        .column_totals
        .iter()
        .map(|t| numeric(t).unwrap_or(0.0))
        .collect();
    for row in &mut matrix.cells {
        for (cell, denom) in row.iter_mut().zip(&denominators) {
            if let Some(n) = numeric(cell) {
                *cell = percent(n, *denom);
            }
        }
    }
    for total in matrix.column_totals.iter_mut() {
        if let Some(n) = numeric(total) {
            *total = percent(n, n);
        }
    }
    for total in matrix.row_totals.iter_mut() {
        if let Some(n) = numeric(total) {
            *total = percent(n, grand);
        }
    }
    if numeric(&matrix.grand_total).is_some() {
        matrix.grand_total = percent(grand, grand);
    }
}

/// Each cell as a percentage of its parent scope's value: the row group
/// one level up, re-aggregated over that scope's member records (never
/// summed from displayed cells, which would be wrong for avg and the
/// other non-additive kinds). Single-level rows have no parent and
/// measure against the grand total.
fn percent_of_parent(matrix: &mut MeasureMatrix, ctx: &ShowAsContext) {
    let grand = numeric(&matrix.grand_total).unwrap_or(0.0);
    let parent_at = |row_idx: usize, col_idx: usize| {
        ctx.parents
            .and_then(|p| p.cells.get(row_idx).and_then(|row| row.get(col_idx)))
            .and_then(numeric)
            .unwrap_or(grand)
    };

    for (row_idx, row) in matrix.cells.iter_mut().enumerate() {
        for (col_idx, cell) in row.iter_mut().enumerate() {
            if let Some(n) = numeric(cell) {
                *cell = percent(n, parent_at(row_idx, col_idx));
            }
        }
    }

    for (row_idx, total) in matrix.row_totals.iter_mut().enumerate() {
        let Some(n) = numeric(total) else { continue };
        let denom = ctx
            .parents
            .and_then(|p| p.row_totals.get(row_idx))
            .and_then(numeric)
            .unwrap_or(grand);
        *total = percent(n, denom);
    }

    // A collapsed column's parent scope is the whole dataset.
    for total in matrix.column_totals.iter_mut() {
        if let Some(n) = numeric(total) {
            *total = percent(n, grand);
        }
    }
    if numeric(&matrix.grand_total).is_some() {
        matrix.grand_total = percent(grand, grand);
    }
}

// ============================================================================
// DIFFERENCE TRANSFORMS
// ============================================================================

/// Difference (or percent difference) from the column whose innermost
/// label matches `baseline`. The baseline's own cells blank out; a row
/// with no baseline value compares against 0.
fn difference_from(matrix: &mut MeasureMatrix, baseline: &str, ctx: &ShowAsContext, as_percent: bool) {
    if ctx.has_column_dims {
        let Some(base_col) = ctx.column_labels.iter().position(|l| l == baseline) else {
            // No such sibling: every value compares against 0.
            log::warn!("show-as baseline '{}' matches no column group", baseline);
            difference_against_zero(matrix, as_percent);
            return;
        };

        for row in &mut matrix.cells {
            let base = row.get(base_col).and_then(numeric).unwrap_or(0.0);
            for (col_idx, cell) in row.iter_mut().enumerate() {
                if col_idx == base_col {
                    *cell = Value::Null;
                } else if let Some(n) = numeric(cell) {
                    *cell = diff_value(n, base, as_percent);
                }
            }
        }
        blank(&mut matrix.row_totals);
        blank(&mut matrix.column_totals);
        matrix.grand_total = Value::Null;
    } else {
        // No column axis: baselines are sibling rows instead.
        let base_row = ctx
            .row_keys
            .iter()
            .position(|k| k.values().last().map(|v| v.label()).as_deref() == Some(baseline));
        let Some(base_row) = base_row else {
            log::warn!("show-as baseline '{}' matches no row group", baseline);
            difference_against_zero(matrix, as_percent);
            return;
        };

        let columns = matrix.column_totals.len();
        for col_idx in 0..columns {
            let base = matrix.cells[base_row]
                .get(col_idx)
                .and_then(numeric)
                .unwrap_or(0.0);
            for (row_idx, row) in matrix.cells.iter_mut().enumerate() {
                if row_idx == base_row {
                    row[col_idx] = Value::Null;
                } else if let Some(n) = numeric(&row[col_idx]) {
                    row[col_idx] = diff_value(n, base, as_percent);
                }
            }
        }
        blank(&mut matrix.row_totals);
        blank(&mut matrix.column_totals);
        matrix.grand_total = Value::Null;
    }
}

fn difference_against_zero(matrix: &mut MeasureMatrix, as_percent: bool) {
    for row in &mut matrix.cells {
        for cell in row.iter_mut() {
            if let Some(n) = numeric(cell) {
                *cell = diff_value(n, 0.0, as_percent);
            }
        }
    }
    blank(&mut matrix.row_totals);
    blank(&mut matrix.column_totals);
    matrix.grand_total = Value::Null;
}

fn diff_value(n: f64, base: f64, as_percent: bool) -> Value {
    if as_percent {
        percent(n - base, base)
    } else {
        Value::number(n - base)
    }
}

// ============================================================================
// RUNNING TOTALS, RANK, INDEX
// ============================================================================

/// Cumulative sum across the columns of each row; down the rows when the
/// grid has no column dimensions. The percent form divides each partial
/// sum by the final one.
fn running_total(matrix: &mut MeasureMatrix, ctx: &ShowAsContext, as_percent: bool) {
    if ctx.has_column_dims {
        for row in &mut matrix.cells {
            accumulate(row, as_percent);
        }
    } else {
        let columns = matrix.column_totals.len();
        for col_idx in 0..columns {
            let mut lane: Vec<Value> = matrix
                .cells
                .iter()
                .map(|row| row[col_idx].clone())
                .collect();
            accumulate(&mut lane, as_percent);
            for (row, value) in matrix.cells.iter_mut().zip(lane) {
                row[col_idx] = value;
            }
        }
    }
    blank(&mut matrix.row_totals);
    blank(&mut matrix.column_totals);
    matrix.grand_total = Value::Null;
}

fn accumulate(lane: &mut [Value], as_percent: bool) {
    let mut running = 0.0;
    let mut partials: Vec<Option<f64>> = Vec::with_capacity(lane.len());
    for value in lane.iter() {
        match numeric(value) {
            Some(n) => {
                running += n;
                partials.push(Some(running));
            }
            None => partials.push(None),
        }
    }
    let last = running;
    for (value, partial) in lane.iter_mut().zip(partials) {
        if let Some(p) = partial {
            *value = if as_percent {
                percent(p, last)
            } else {
                Value::number(p)
            };
        }
    }
}

/// Competition rank (1 = largest) of each cell among every cell of this
/// measure. Ties share a rank and skip the next.
fn rank(matrix: &mut MeasureMatrix) {
    let all: Vec<f64> = matrix.cells.iter().flatten().filter_map(numeric).collect();
    for row in &mut matrix.cells {
        for cell in row.iter_mut() {
            let Some(n) = numeric(cell) else { continue };
            let larger = all.iter().filter(|&&other| other > n).count();
            *cell = Value::number((larger + 1) as f64);
        }
    }
    blank(&mut matrix.row_totals);
    blank(&mut matrix.column_totals);
    matrix.grand_total = Value::Null;
}

/// Each cell as a percentage of the mean over every present cell of this
/// measure (100 = exactly average).
fn index(matrix: &mut MeasureMatrix) {
    let all: Vec<f64> = matrix.cells.iter().flatten().filter_map(numeric).collect();
    let mean = if all.is_empty() {
        0.0
    } else {
        all.iter().sum::<f64>() / all.len() as f64
    };

    for row in &mut matrix.cells {
        for cell in row.iter_mut() {
            if let Some(n) = numeric(cell) {
                *cell = percent(n, mean);
            }
        }
    }
    blank(&mut matrix.row_totals);
    blank(&mut matrix.column_totals);
    matrix.grand_total = Value::Null;
}

fn blank(totals: &mut [Value]) {
    for total in totals.iter_mut() {
        *total = Value::Null;
    }
}
