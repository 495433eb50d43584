//! Pivot configuration - the serializable declaration of what to compute.
//!
//! These types describe a cross-tab: which fields partition rows and
//! columns, which measures to aggregate, plus filters, sort order and
//! layout flags. They are immutable snapshots of caller intent; the pure
//! transform helpers at the bottom return edited copies for re-running
//! `generate`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::format::FormatSpec;
use crate::value::Value;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AggregationKind {
    #[default]
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
    Median,
    Mode,
    StdDev,
    Variance,
    First,
    Last,
    Custom,
    /// An aggregation tag this build does not know. Resolves to 0 at
    /// aggregation time with a logged warning.
    Unknown,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Count => "count",
            AggregationKind::CountDistinct => "count-distinct",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Median => "median",
            AggregationKind::Mode => "mode",
            AggregationKind::StdDev => "stddev",
            AggregationKind::Variance => "variance",
            AggregationKind::First => "first",
            AggregationKind::Last => "last",
            AggregationKind::Custom => "custom",
            AggregationKind::Unknown => "unknown",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "sum" => AggregationKind::Sum,
            "avg" => AggregationKind::Avg,
            "count" => AggregationKind::Count,
            "count-distinct" => AggregationKind::CountDistinct,
            "min" => AggregationKind::Min,
            "max" => AggregationKind::Max,
            "median" => AggregationKind::Median,
            "mode" => AggregationKind::Mode,
            "stddev" => AggregationKind::StdDev,
            "variance" => AggregationKind::Variance,
            "first" => AggregationKind::First,
            "last" => AggregationKind::Last,
            "custom" => AggregationKind::Custom,
            _ => AggregationKind::Unknown,
        }
    }

    /// Label component for default measure names ("Sum of sales").
    pub fn display_name(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "Sum",
            AggregationKind::Avg => "Avg",
            AggregationKind::Count => "Count",
            AggregationKind::CountDistinct => "Distinct Count",
            AggregationKind::Min => "Min",
            AggregationKind::Max => "Max",
            AggregationKind::Median => "Median",
            AggregationKind::Mode => "Mode",
            AggregationKind::StdDev => "StdDev",
            AggregationKind::Variance => "Variance",
            AggregationKind::First => "First",
            AggregationKind::Last => "Last",
            AggregationKind::Custom => "Formula",
            AggregationKind::Unknown => "Unknown",
        }
    }
}

impl Serialize for AggregationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Hand-written so an unrecognized tag becomes Unknown instead of a hard
// deserialization error (#[serde(other)] is unavailable on externally
// tagged unit enums).
impl<'de> Deserialize<'de> for AggregationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(AggregationKind::from_tag(&tag))
    }
}

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Bucketing rule applied to a dimension's raw values before grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DimensionGrouping {
    /// No bucketing - raw values group as-is.
    #[default]
    None,
    /// Calendar year integer.
    DateYear,
    /// "Q{n} {year}".
    DateQuarter,
    /// "{MonthName} {year}".
    DateMonth,
    /// Day-of-month based week number.
    DateWeek,
    /// Full calendar date.
    DateDay,
    /// Equal-width numeric buckets of the given size.
    NumberRange { size: f64 },
}

/// A field used to partition records into row or column groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    /// Source field name.
    pub field: String,

    /// Bucketing rule for this dimension.
    #[serde(default)]
    pub grouping: DimensionGrouping,

    /// Display formatting for the bucketed labels.
    #[serde(default)]
    pub format: Option<FormatSpec>,

    /// Header label override (defaults to the field name).
    #[serde(default)]
    pub label: Option<String>,
}

impl DimensionSpec {
    pub fn new(field: impl Into<String>) -> Self {
        DimensionSpec {
            field: field.into(),
            grouping: DimensionGrouping::None,
            format: None,
            label: None,
        }
    }

    pub fn with_grouping(mut self, grouping: DimensionGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.field.clone())
    }
}

// ============================================================================
// MEASURES
// ============================================================================

/// Derived, relative transformation of an aggregated cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "baseline", rename_all = "kebab-case")]
pub enum ShowAs {
    PercentOfTotal,
    PercentOfColumn,
    PercentOfRow,
    PercentOfParent,
    /// Difference from the named sibling group along the column axis
    /// (row axis when no column dimensions are configured).
    DifferenceFrom(String),
    PercentDifferenceFrom(String),
    RunningTotal,
    PercentRunningTotal,
    Rank,
    Index,
}

/// A measure: a field with an aggregation function and display options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    /// Source field name (also the default label stem).
    pub field: String,

    /// The aggregation function to apply.
    #[serde(default)]
    pub aggregation: AggregationKind,

    /// For `count`: count distinct non-null values instead of all non-null.
    #[serde(default)]
    pub distinct: bool,

    /// For `custom`: the arithmetic formula over named fields.
    #[serde(default)]
    pub formula: Option<String>,

    /// Optional derived transformation applied after cell aggregation.
    #[serde(default)]
    pub show_as: Option<ShowAs>,

    /// Display formatting for cell values.
    #[serde(default)]
    pub format: Option<FormatSpec>,

    /// Header label override (defaults to "{Kind} of {field}").
    #[serde(default)]
    pub label: Option<String>,
}

impl MeasureSpec {
    pub fn new(field: impl Into<String>, aggregation: AggregationKind) -> Self {
        MeasureSpec {
            field: field.into(),
            aggregation,
            distinct: false,
            formula: None,
            show_as: None,
            format: None,
            label: None,
        }
    }

    pub fn with_show_as(mut self, show_as: ShowAs) -> Self {
        self.show_as = Some(show_as);
        self
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{} of {}", self.aggregation.display_name(), self.field))
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Filter condition; a record passes a FilterSpec iff its field value
/// satisfies the condition. Text matching conditions are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "kebab-case")]
pub enum FilterCondition {
    Equals(Value),
    NotEquals(Value),
    Contains(String),
    NotContains(String),
    StartsWith(String),
    EndsWith(String),
    GreaterThan(f64),
    GreaterThanOrEqual(f64),
    LessThan(f64),
    LessThanOrEqual(f64),
    /// Inclusive on both bounds.
    Between(f64, f64),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    IsNull,
    IsNotNull,
    /// An operator tag this build does not know. Evaluates true with a
    /// logged warning, so a newer client's filter never hides data.
    Unknown,
}

// Hand-written for the same reason as AggregationKind: #[serde(other)] on an
// adjacently tagged enum only matches an unknown tag whose content is null or
// absent, so an unrecognized operator carrying a value would fail closed.
impl<'de> Deserialize<'de> for FilterCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::value::StrDeserializer;
        use serde::de::{Error, IgnoredAny};

        /// The shapes a `value` payload can take across the known operators.
        /// Strings are kept raw so scalar tags can replay `Value`'s own
        /// untagged deserialization on them.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Payload {
            Bool(bool),
            Num(f64),
            Str(String),
            NumPair(f64, f64),
            List(Vec<Value>),
            Other(IgnoredAny),
        }

        enum Content {
            Missing,
            Null,
            Present(Payload),
        }

        fn non_missing<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Option<Payload>>, D::Error> {
            Deserialize::deserialize(d).map(Some)
        }

        #[derive(Deserialize)]
        struct Tagged {
            op: String,
            #[serde(default, deserialize_with = "non_missing")]
            value: Option<Option<Payload>>,
        }

        fn scalar<E: Error>(content: Content) -> Result<Value, E> {
            match content {
                Content::Missing => Err(E::missing_field("value")),
                Content::Null => Ok(Value::Null),
                Content::Present(Payload::Bool(b)) => Ok(Value::Boolean(b)),
                Content::Present(Payload::Num(n)) => Ok(Value::number(n)),
                Content::Present(Payload::Str(s)) => Value::deserialize(StrDeserializer::new(&s)),
                Content::Present(_) => Err(E::custom("expected a scalar filter value")),
            }
        }

        fn text<E: Error>(content: Content) -> Result<String, E> {
            match content {
                Content::Missing => Err(E::missing_field("value")),
                Content::Present(Payload::Str(s)) => Ok(s),
                _ => Err(E::custom("expected a string filter value")),
            }
        }

        fn number<E: Error>(content: Content) -> Result<f64, E> {
            match content {
                Content::Missing => Err(E::missing_field("value")),
                Content::Present(Payload::Num(n)) => Ok(n),
                _ => Err(E::custom("expected a numeric filter value")),
            }
        }

        fn pair<E: Error>(content: Content) -> Result<(f64, f64), E> {
            match content {
                Content::Missing => Err(E::missing_field("value")),
                Content::Present(Payload::NumPair(lo, hi)) => Ok((lo, hi)),
                _ => Err(E::custom("expected a two-number filter value")),
            }
        }

        fn list<E: Error>(content: Content) -> Result<Vec<Value>, E> {
            match content {
                Content::Missing => Err(E::missing_field("value")),
                Content::Present(Payload::List(values)) => Ok(values),
                Content::Present(Payload::NumPair(lo, hi)) => {
                    Ok(vec![Value::number(lo), Value::number(hi)])
                }
                _ => Err(E::custom("expected a list filter value")),
            }
        }

        fn unit<E: Error>(content: Content) -> Result<(), E> {
            match content {
                Content::Missing | Content::Null => Ok(()),
                Content::Present(_) => Err(E::custom("expected no filter value")),
            }
        }

        let Tagged { op, value } = Tagged::deserialize(deserializer)?;
        let content = match value {
            None => Content::Missing,
            Some(None) => Content::Null,
            Some(Some(payload)) => Content::Present(payload),
        };

        Ok(match op.as_str() {
            "equals" => FilterCondition::Equals(scalar(content)?),
            "not-equals" => FilterCondition::NotEquals(scalar(content)?),
            "contains" => FilterCondition::Contains(text(content)?),
            "not-contains" => FilterCondition::NotContains(text(content)?),
            "starts-with" => FilterCondition::StartsWith(text(content)?),
            "ends-with" => FilterCondition::EndsWith(text(content)?),
            "greater-than" => FilterCondition::GreaterThan(number(content)?),
            "greater-than-or-equal" => FilterCondition::GreaterThanOrEqual(number(content)?),
            "less-than" => FilterCondition::LessThan(number(content)?),
            "less-than-or-equal" => FilterCondition::LessThanOrEqual(number(content)?),
            "between" => {
                let (lo, hi) = pair(content)?;
                FilterCondition::Between(lo, hi)
            }
            "in" => FilterCondition::In(list(content)?),
            "not-in" => FilterCondition::NotIn(list(content)?),
            "is-null" => {
                unit(content)?;
                FilterCondition::IsNull
            }
            "is-not-null" => {
                unit(content)?;
                FilterCondition::IsNotNull
            }
            _ => FilterCondition::Unknown,
        })
    }
}

/// A filter applied to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    #[serde(flatten)]
    pub condition: FilterCondition,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, condition: FilterCondition) -> Self {
        FilterSpec {
            field: field.into(),
            condition,
        }
    }
}

// ============================================================================
// SORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One key of the stable multi-key record sort. Lower priority sorts
/// first; equal priorities keep list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub priority: u32,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec {
            field: field.into(),
            direction,
            priority: 0,
        }
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Controls which totals the assembler emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    #[serde(default = "default_true")]
    pub show_grand_totals: bool,

    #[serde(default = "default_true")]
    pub show_sub_totals: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            show_grand_totals: true,
            show_sub_totals: true,
        }
    }
}

// ============================================================================
// MAIN CONFIG STRUCT
// ============================================================================

/// Which axis a dimension belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    Rows,
    Columns,
}

/// The complete, serializable cross-tab configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PivotConfig {
    /// Dimensions partitioning rows (ordered from outer to inner).
    #[serde(default)]
    pub rows: Vec<DimensionSpec>,

    /// Dimensions partitioning columns (ordered from outer to inner).
    #[serde(default)]
    pub columns: Vec<DimensionSpec>,

    /// Measures aggregated per cell.
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,

    /// Conjunction of record-level predicates.
    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    /// Stable multi-key record sort applied before grouping.
    #[serde(default)]
    pub sort: Vec<SortSpec>,

    /// Truncates the row-group table to the first N groups in axis order.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Totals layout flags.
    #[serde(default)]
    pub layout: LayoutOptions,
}

impl PivotConfig {
    pub fn new() -> Self {
        PivotConfig::default()
    }

    // ------------------------------------------------------------------
    // Pure transforms: each returns an edited copy for re-generation.
    // ------------------------------------------------------------------

    /// Appends a filter.
    pub fn with_filter(&self, filter: FilterSpec) -> PivotConfig {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    /// Removes all filters on the given field.
    pub fn without_filter(&self, field: &str) -> PivotConfig {
        let mut next = self.clone();
        next.filters.retain(|f| f.field != field);
        next
    }

    /// Appends a dimension to the given axis.
    pub fn add_dimension(&self, axis: Axis, spec: DimensionSpec) -> PivotConfig {
        let mut next = self.clone();
        match axis {
            Axis::Rows => next.rows.push(spec),
            Axis::Columns => next.columns.push(spec),
        }
        next
    }

    /// Removes all dimensions on the given axis that reference the field.
    pub fn remove_dimension(&self, axis: Axis, field: &str) -> PivotConfig {
        let mut next = self.clone();
        match axis {
            Axis::Rows => next.rows.retain(|d| d.field != field),
            Axis::Columns => next.columns.retain(|d| d.field != field),
        }
        next
    }

    /// Appends a measure.
    pub fn add_measure(&self, spec: MeasureSpec) -> PivotConfig {
        let mut next = self.clone();
        next.measures.push(spec);
        next
    }

    /// Replaces the first measure on the same field; appends when absent.
    pub fn update_measure(&self, spec: MeasureSpec) -> PivotConfig {
        let mut next = self.clone();
        match next.measures.iter_mut().find(|m| m.field == spec.field) {
            Some(slot) => *slot = spec,
            None => next.measures.push(spec),
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_aggregation_tag_deserializes_to_unknown() {
        let kind: AggregationKind = serde_json::from_str("\"geometric-mean\"").unwrap();
        assert_eq!(kind, AggregationKind::Unknown);
    }

    #[test]
    fn aggregation_kind_round_trips() {
        let json = serde_json::to_string(&AggregationKind::CountDistinct).unwrap();
        assert_eq!(json, "\"count-distinct\"");
        let back: AggregationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AggregationKind::CountDistinct);
    }

    #[test]
    fn unknown_filter_operator_deserializes_to_unknown() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"field":"region","op":"sounds-like","value":null}"#).unwrap();
        assert_eq!(spec.condition, FilterCondition::Unknown);
    }

    #[test]
    fn filter_spec_uses_spec_wire_names() {
        let spec = FilterSpec::new("sales", FilterCondition::GreaterThanOrEqual(10.0));
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(
            json,
            r#"{"field":"sales","op":"greater-than-or-equal","value":10.0}"#
        );
    }

    #[test]
    fn show_as_baseline_round_trips() {
        let show_as = ShowAs::DifferenceFrom("East".to_string());
        let json = serde_json::to_string(&show_as).unwrap();
        assert_eq!(json, r#"{"kind":"difference-from","baseline":"East"}"#);
        let back: ShowAs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, show_as);
    }

    #[test]
    fn transforms_do_not_mutate_the_original() {
        let base = PivotConfig::new().add_dimension(Axis::Rows, DimensionSpec::new("region"));

        let filtered = base.with_filter(FilterSpec::new(
            "region",
            FilterCondition::Equals(Value::text("East")),
        ));
        assert!(base.filters.is_empty());
        assert_eq!(filtered.filters.len(), 1);

        let narrowed = filtered.without_filter("region");
        assert!(narrowed.filters.is_empty());
        assert_eq!(filtered.filters.len(), 1);
    }

    #[test]
    fn update_measure_replaces_by_field() {
        let config = PivotConfig::new()
            .add_measure(MeasureSpec::new("sales", AggregationKind::Sum))
            .update_measure(MeasureSpec::new("sales", AggregationKind::Avg));
        assert_eq!(config.measures.len(), 1);
        assert_eq!(config.measures[0].aggregation, AggregationKind::Avg);
    }

    #[test]
    fn default_measure_label_names_the_aggregation() {
        let spec = MeasureSpec::new("sales", AggregationKind::Sum);
        assert_eq!(spec.display_label(), "Sum of sales");
    }
}
