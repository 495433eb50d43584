//! Pivot generation - the pipeline driver.
//!
//! `generate` runs the full pass over immutable input: filter, sort,
//! group, aggregate each cell, apply show-as transforms over the
//! finished matrix, then assemble the rectangular result with subtotal
//! and grand-total rows. Nothing here mutates the source records.

use std::time::Instant;

use chrono::Utc;
use formula_parser::Expression;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::aggregate::aggregate_field;
use crate::config::{AggregationKind, MeasureSpec, PivotConfig, ShowAs};
use crate::filter::filter_records;
use crate::formula::{evaluate, validate, CellContext};
use crate::group::{group_records, GroupKey, GroupedData};
use crate::result::{CellView, ColumnHeader, PivotResult, ResultMetadata, ResultRow, RowKind};
use crate::show_as::{apply_show_as, MeasureMatrix, ShowAsContext};
use crate::sort::sort_records;
use crate::value::{Record, Value};

/// Generates a pivot table from `records` under `config`. Never errors:
/// bad data groups as blank and a broken measure resolves to 0 with a
/// logged warning, so a dashboard keeps rendering around one bad tile.
pub fn generate(records: &[Record], config: &PivotConfig) -> PivotResult {
    let started = Instant::now();
    let kept = filter_records(records, &config.filters);
    let order = sort_records(records, kept, &config.sort);

    log::debug!(
        "pivot generate: {} of {} records after filters",
        order.len(),
        records.len()
    );

    let row_dimension_labels: Vec<String> =
        config.rows.iter().map(|d| d.display_label()).collect();

    let grouped = group_records(records, &order, &config.rows, &config.columns, config.limit);
    if grouped.row_groups.is_empty() {
        let metadata = make_metadata(records.len(), order.len(), &grouped, started);
        return PivotResult::empty(row_dimension_labels, metadata);
    }

    let plans = build_measure_plans(&config.measures);

    // Group truncation under `limit` can leave column and grand member
    // lists referencing dropped rows; totals only count visible records.
    let visible: Option<FxHashSet<usize>> = config
        .limit
        .map(|_| grouped.row_groups.members.iter().flatten().copied().collect());
    let keep = |idx: usize| visible.as_ref().map_or(true, |v| v.contains(&idx));

    let column_members: Vec<Vec<usize>> = grouped
        .column_groups
        .members
        .iter()
        .map(|members| members.iter().copied().filter(|&i| keep(i)).collect())
        .collect();
    let all_members: Vec<usize> = order.iter().copied().filter(|&i| keep(i)).collect();

    let mut matrices = Vec::with_capacity(plans.len());
    for (measure, plan) in config.measures.iter().zip(&plans) {
        matrices.push(build_matrix(
            records,
            &grouped,
            &column_members,
            &all_members,
            measure,
            plan,
        ));
    }

    let innermost_labels: Vec<String> = grouped
        .column_groups
        .labels
        .iter()
        .map(|labels| labels.last().cloned().unwrap_or_default())
        .collect();
    for ((measure, plan), matrix) in config.measures.iter().zip(&plans).zip(&mut matrices) {
        let Some(show_as) = &measure.show_as else { continue };

        // Percent-of-parent divides by the parent scope re-aggregated
        // over its member records, which only the engine can compute.
        let parents = matches!(show_as, ShowAs::PercentOfParent).then(|| {
            build_parent_matrix(records, &grouped, &column_members, &all_members, measure, plan)
        });
        let ctx = ShowAsContext {
            row_keys: &grouped.row_groups.keys,
            column_labels: &innermost_labels,
            has_column_dims: !config.columns.is_empty(),
            parents: parents.as_ref(),
        };
        apply_show_as(matrix, show_as, &ctx);
    }

    let metadata = make_metadata(records.len(), order.len(), &grouped, started);
    assemble(
        records,
        config,
        &plans,
        &grouped,
        &column_members,
        &matrices,
        row_dimension_labels,
        metadata,
    )
}

fn make_metadata(
    record_count: usize,
    filtered_count: usize,
    grouped: &GroupedData,
    started: Instant,
) -> ResultMetadata {
    ResultMetadata {
        record_count,
        filtered_count,
        row_group_count: grouped.row_groups.len(),
        column_group_count: grouped.column_groups.len(),
        generated_at: Utc::now().to_rfc3339(),
        query_time_ms: started.elapsed().as_millis() as u64,
    }
}

// ============================================================================
// MEASURE PLANS
// ============================================================================

/// Resolved evaluation strategy for one measure. Formulas parse once per
/// generation, never per cell.
enum MeasurePlan {
    Aggregate(AggregationKind),
    Formula(Expression),
}

fn build_measure_plans(measures: &[MeasureSpec]) -> Vec<MeasurePlan> {
    measures
        .iter()
        .map(|measure| match measure.aggregation {
            AggregationKind::Custom => custom_plan(measure),
            AggregationKind::Unknown => {
                log::warn!(
                    "measure '{}' uses an unrecognized aggregation, values resolve to 0",
                    measure.field
                );
                MeasurePlan::Aggregate(AggregationKind::Unknown)
            }
            AggregationKind::Count if measure.distinct => {
                MeasurePlan::Aggregate(AggregationKind::CountDistinct)
            }
            kind => MeasurePlan::Aggregate(kind),
        })
        .collect()
}

/// Parses and validates a custom formula. Any failure warns and falls
/// back to a constant 0, so one broken measure never sinks the grid.
fn custom_plan(measure: &MeasureSpec) -> MeasurePlan {
    let Some(formula) = measure.formula.as_deref() else {
        log::warn!(
            "measure '{}' uses the custom aggregation but carries no formula, values resolve to 0",
            measure.field
        );
        return MeasurePlan::Aggregate(AggregationKind::Unknown);
    };
    let expr = match formula_parser::parse(formula) {
        Ok(expr) => expr,
        Err(err) => {
            log::warn!(
                "measure '{}' formula does not parse ({}), values resolve to 0",
                measure.field,
                err
            );
            return MeasurePlan::Aggregate(AggregationKind::Unknown);
        }
    };
    if let Err(err) = validate(&expr) {
        log::warn!(
            "measure '{}' formula is not evaluable ({}), values resolve to 0",
            measure.field,
            err
        );
        return MeasurePlan::Aggregate(AggregationKind::Unknown);
    }
    MeasurePlan::Formula(expr)
}

fn evaluate_members(
    records: &[Record],
    members: &[usize],
    measure: &MeasureSpec,
    plan: &MeasurePlan,
) -> Value {
    match plan {
        MeasurePlan::Aggregate(kind) => aggregate_field(records, members, &measure.field, *kind),
        // Plans are validated up front; an evaluation error cannot occur.
        MeasurePlan::Formula(expr) => Value::number(
            evaluate(expr, &CellContext::new(records, members)).unwrap_or(0.0),
        ),
    }
}

// ============================================================================
// MATRIX CONSTRUCTION
// ============================================================================

/// Aggregates one measure over every cell and total. Totals re-aggregate
/// from member records rather than combining cell values, so they stay
/// correct under avg, median and the other non-additive kinds.
fn build_matrix(
    records: &[Record],
    grouped: &GroupedData,
    column_members: &[Vec<usize>],
    all_members: &[usize],
    measure: &MeasureSpec,
    plan: &MeasurePlan,
) -> MeasureMatrix {
    let n_rows = grouped.row_groups.len();
    let n_cols = grouped.column_groups.len();

    let mut cells = Vec::with_capacity(n_rows);
    for r in 0..n_rows {
        let mut row = Vec::with_capacity(n_cols);
        for c in 0..n_cols {
            row.push(match grouped.cells.get(&(r, c)) {
                Some(members) => evaluate_members(records, members, measure, plan),
                None => Value::Null,
            });
        }
        cells.push(row);
    }

    let mut row_totals = Vec::with_capacity(n_rows);
    for members in &grouped.row_groups.members {
        row_totals.push(evaluate_members(records, members, measure, plan));
    }

    let mut column_totals = Vec::with_capacity(n_cols);
    for members in column_members {
        column_totals.push(evaluate_members(records, members, measure, plan));
    }

    let grand_total = evaluate_members(records, all_members, measure, plan);

    MeasureMatrix {
        cells,
        row_totals,
        column_totals,
        grand_total,
    }
}

/// Parent-scope denominators for percent-of-parent, row-aligned with the
/// measure's matrix. Each parent group (the rows one key level up) is
/// re-aggregated over its member records, per column and overall, so
/// non-additive kinds divide by a real aggregate rather than a sum of
/// displayed cells. Rows with no parent carry the grand total.
fn build_parent_matrix(
    records: &[Record],
    grouped: &GroupedData,
    column_members: &[Vec<usize>],
    all_members: &[usize],
    measure: &MeasureSpec,
    plan: &MeasurePlan,
) -> MeasureMatrix {
    let n_cols = grouped.column_groups.len();
    let grand = evaluate_members(records, all_members, measure, plan);

    let mut parent_members: FxHashMap<GroupKey, Vec<usize>> = FxHashMap::default();
    for (key, members) in grouped.row_groups.keys.iter().zip(&grouped.row_groups.members) {
        if let Some(parent) = key.parent() {
            parent_members
                .entry(parent)
                .or_default()
                .extend(members.iter().copied());
        }
    }

    let column_sets: Vec<FxHashSet<usize>> = column_members
        .iter()
        .map(|members| members.iter().copied().collect())
        .collect();

    // One evaluation per (parent, column), shared by all sibling rows.
    let mut by_parent: FxHashMap<GroupKey, (Vec<Value>, Value)> = FxHashMap::default();
    for (parent, members) in &mut parent_members {
        members.sort_unstable();
        let row: Vec<Value> = column_sets
            .iter()
            .map(|set| {
                let scoped: Vec<usize> =
                    members.iter().copied().filter(|i| set.contains(i)).collect();
                evaluate_members(records, &scoped, measure, plan)
            })
            .collect();
        let total = evaluate_members(records, members, measure, plan);
        by_parent.insert(parent.clone(), (row, total));
    }

    let mut cells = Vec::with_capacity(grouped.row_groups.len());
    let mut row_totals = Vec::with_capacity(grouped.row_groups.len());
    for key in &grouped.row_groups.keys {
        match key.parent().and_then(|p| by_parent.get(&p)) {
            Some((row, total)) => {
                cells.push(row.clone());
                row_totals.push(total.clone());
            }
            None => {
                cells.push(vec![grand.clone(); n_cols]);
                row_totals.push(grand.clone());
            }
        }
    }

    MeasureMatrix {
        cells,
        row_totals,
        column_totals: vec![grand.clone(); n_cols],
        grand_total: grand,
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn assemble(
    records: &[Record],
    config: &PivotConfig,
    plans: &[MeasurePlan],
    grouped: &GroupedData,
    column_members: &[Vec<usize>],
    matrices: &[MeasureMatrix],
    row_dimension_labels: Vec<String>,
    metadata: ResultMetadata,
) -> PivotResult {
    let n_rows = grouped.row_groups.len();
    let n_cols = grouped.column_groups.len();
    let show_totals = config.layout.show_grand_totals;

    let mut column_headers = Vec::with_capacity(n_cols * config.measures.len());
    for c in 0..n_cols {
        for measure in &config.measures {
            column_headers.push(ColumnHeader {
                labels: grouped.column_groups.labels[c].clone(),
                measure: measure.display_label(),
            });
        }
    }

    let mut rows = Vec::with_capacity(n_rows);
    for r in 0..n_rows {
        let mut cells = Vec::with_capacity(n_cols * config.measures.len());
        for c in 0..n_cols {
            for (measure, matrix) in config.measures.iter().zip(matrices) {
                cells.push(CellView::new(
                    matrix.cells[r][c].clone(),
                    measure.format.as_ref(),
                ));
            }
        }
        let totals = if show_totals {
            config
                .measures
                .iter()
                .zip(matrices)
                .map(|(m, matrix)| CellView::new(matrix.row_totals[r].clone(), m.format.as_ref()))
                .collect()
        } else {
            Vec::new()
        };
        rows.push(ResultRow {
            labels: grouped.row_groups.labels[r].clone(),
            kind: RowKind::Data,
            cells,
            totals,
        });

        if config.rows.len() > 1 && config.layout.show_sub_totals {
            if let Some(subtotal) = subtotal_after(
                records, config, plans, grouped, column_members, r, show_totals,
            ) {
                rows.push(subtotal);
            }
        }
    }

    let grand_total = if show_totals {
        let cells = (0..n_cols)
            .flat_map(|c| {
                config.measures.iter().zip(matrices).map(move |(m, matrix)| {
                    CellView::new(matrix.column_totals[c].clone(), m.format.as_ref())
                })
            })
            .collect();
        let totals = config
            .measures
            .iter()
            .zip(matrices)
            .map(|(m, matrix)| CellView::new(matrix.grand_total.clone(), m.format.as_ref()))
            .collect();
        Some(ResultRow {
            labels: vec!["Grand Total".to_string()],
            kind: RowKind::GrandTotal,
            cells,
            totals,
        })
    } else {
        None
    };

    PivotResult {
        row_dimension_labels,
        column_headers,
        rows,
        grand_total,
        metadata,
    }
}

/// Builds the subtotal row for the outermost group ending at row `r`, or
/// None when later rows still belong to the same group. Subtotal cells
/// re-aggregate the group's member records; measures under a show-as
/// transform render blank since their subtotal has no defined meaning.
fn subtotal_after(
    records: &[Record],
    config: &PivotConfig,
    plans: &[MeasurePlan],
    grouped: &GroupedData,
    column_members: &[Vec<usize>],
    r: usize,
    show_totals: bool,
) -> Option<ResultRow> {
    let outer = |idx: usize| grouped.row_groups.keys[idx].values().first().cloned();
    let current = outer(r);

    let is_last = !(r + 1..grouped.row_groups.len()).any(|later| outer(later) == current);
    if !is_last {
        return None;
    }

    let group_rows: Vec<usize> = (0..=r).filter(|&idx| outer(idx) == current).collect();

    let member_set: FxHashSet<usize> = group_rows
        .iter()
        .flat_map(|&idx| grouped.row_groups.members[idx].iter().copied())
        .collect();

    let mut cells = Vec::with_capacity(column_members.len() * config.measures.len());
    for members in column_members {
        let cell_members: Vec<usize> = members
            .iter()
            .filter(|i| member_set.contains(i))
            .copied()
            .collect();
        for (measure, plan) in config.measures.iter().zip(plans) {
            if measure.show_as.is_some() {
                cells.push(CellView::empty());
            } else {
                cells.push(CellView::new(
                    evaluate_members(records, &cell_members, measure, plan),
                    measure.format.as_ref(),
                ));
            }
        }
    }

    let totals = if show_totals {
        let mut group_members: Vec<usize> = member_set.iter().copied().collect();
        group_members.sort_unstable();
        let mut totals = Vec::with_capacity(config.measures.len());
        for (measure, plan) in config.measures.iter().zip(plans) {
            if measure.show_as.is_some() {
                totals.push(CellView::empty());
            } else {
                totals.push(CellView::new(
                    evaluate_members(records, &group_members, measure, plan),
                    measure.format.as_ref(),
                ));
            }
        }
        totals
    } else {
        Vec::new()
    };

    let label = current.map(|v| v.label()).unwrap_or_default();
    Some(ResultRow {
        labels: vec![format!("{} Total", label)],
        kind: RowKind::SubTotal,
        cells,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DimensionSpec, FilterCondition, FilterSpec, SortDirection, SortSpec};

    fn sales_records() -> Vec<Record> {
        vec![
            Record::new().with("region", "East").with("product", "A").with("sales", 100.0),
            Record::new().with("region", "East").with("product", "B").with("sales", 200.0),
            Record::new().with("region", "West").with("product", "A").with("sales", 150.0),
            Record::new().with("region", "West").with("product", "B").with("sales", 250.0),
        ]
    }

    fn sum_of_sales() -> MeasureSpec {
        MeasureSpec::new("sales", AggregationKind::Sum)
    }

    fn base_config() -> PivotConfig {
        let mut config = PivotConfig::new();
        config.rows = vec![DimensionSpec::new("region")];
        config.columns = vec![DimensionSpec::new("product")];
        config.measures = vec![sum_of_sales()];
        config
    }

    fn numbers(row: &ResultRow) -> Vec<Option<f64>> {
        row.cells.iter().map(|c| c.value.as_number()).collect()
    }

    #[test]
    fn two_by_two_grid_with_totals() {
        let result = generate(&sales_records(), &base_config());

        assert_eq!(result.column_headers.len(), 2);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].labels, vec!["East".to_string()]);
        assert_eq!(numbers(&result.rows[0]), vec![Some(100.0), Some(200.0)]);
        assert_eq!(result.rows[0].totals[0].value, Value::number(300.0));

        let grand = result.grand_total.unwrap();
        assert_eq!(numbers(&grand), vec![Some(250.0), Some(450.0)]);
        assert_eq!(grand.totals[0].value, Value::number(700.0));
        assert_eq!(result.metadata.record_count, 4);
        assert_eq!(result.metadata.filtered_count, 4);
    }

    #[test]
    fn empty_intersections_render_blank() {
        let records = vec![
            Record::new().with("region", "East").with("product", "A").with("sales", 1.0),
            Record::new().with("region", "West").with("product", "B").with("sales", 2.0),
        ];
        let result = generate(&records, &base_config());
        assert_eq!(numbers(&result.rows[0]), vec![Some(1.0), None]);
        assert_eq!(result.rows[0].cells[1].formatted, "");
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = generate(&[], &base_config());
        assert!(result.rows.is_empty());
        assert!(result.grand_total.is_none());
        assert_eq!(result.metadata.filtered_count, 0);
    }

    #[test]
    fn generation_is_idempotent() {
        let records = sales_records();
        let config = base_config();
        let first = generate(&records, &config);
        let second = generate(&records, &config);
        // Timing metadata differs between runs; the table itself must not.
        let table = |r: &PivotResult| {
            serde_json::to_value((&r.column_headers, &r.rows, &r.grand_total)).unwrap()
        };
        assert_eq!(table(&first), table(&second));
    }

    #[test]
    fn filters_flow_into_totals() {
        let mut config = base_config();
        config.filters = vec![FilterSpec::new(
            "region",
            FilterCondition::Equals(Value::text("East")),
        )];
        let result = generate(&sales_records(), &config);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.metadata.filtered_count, 2);
        assert_eq!(result.grand_total.unwrap().totals[0].value, Value::number(300.0));
    }

    #[test]
    fn limit_truncates_rows_and_their_totals() {
        let mut config = base_config();
        config.sort = vec![SortSpec::new("region", SortDirection::Ascending)];
        config.limit = Some(1);
        let result = generate(&sales_records(), &config);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].labels, vec!["East".to_string()]);
        // Grand totals cover only the surviving rows.
        assert_eq!(result.grand_total.unwrap().totals[0].value, Value::number(300.0));
    }

    #[test]
    fn subtotals_appear_after_each_outer_group() {
        let mut config = base_config();
        config.rows = vec![DimensionSpec::new("region"), DimensionSpec::new("product")];
        config.columns = Vec::new();
        let result = generate(&sales_records(), &config);

        let kinds: Vec<RowKind> = result.rows.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RowKind::Data,
                RowKind::Data,
                RowKind::SubTotal,
                RowKind::Data,
                RowKind::Data,
                RowKind::SubTotal,
            ]
        );
        let east_total = &result.rows[2];
        assert_eq!(east_total.labels, vec!["East Total".to_string()]);
        assert_eq!(east_total.cells[0].value, Value::number(300.0));
    }

    #[test]
    fn custom_formula_measures_evaluate_per_cell() {
        let records = vec![
            Record::new().with("region", "East").with("revenue", 100.0).with("cost", 40.0),
            Record::new().with("region", "East").with("revenue", 50.0).with("cost", 30.0),
            Record::new().with("region", "West").with("revenue", 80.0).with("cost", 20.0),
        ];
        let mut config = PivotConfig::new();
        config.rows = vec![DimensionSpec::new("region")];
        let mut measure = MeasureSpec::new("margin", AggregationKind::Custom);
        measure.formula = Some("revenue - cost".to_string());
        config.measures = vec![measure];

        let result = generate(&records, &config);
        assert_eq!(result.rows[0].cells[0].value, Value::number(80.0));
        assert_eq!(result.rows[1].cells[0].value, Value::number(60.0));
    }

    #[test]
    fn custom_measure_without_formula_falls_back_to_zero() {
        let mut config = base_config();
        config.measures = vec![MeasureSpec::new("margin", AggregationKind::Custom)];
        let result = generate(&sales_records(), &config);
        assert_eq!(result.rows[0].cells[0].value, Value::number(0.0));
        assert_eq!(result.grand_total.unwrap().totals[0].value, Value::number(0.0));
    }

    #[test]
    fn malformed_formula_falls_back_to_zero() {
        let mut config = base_config();
        let mut measure = MeasureSpec::new("margin", AggregationKind::Custom);
        measure.formula = Some("revenue - ".to_string());
        config.measures = vec![measure];
        let result = generate(&sales_records(), &config);
        assert_eq!(result.rows[0].cells[0].value, Value::number(0.0));
    }
}
