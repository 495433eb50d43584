//! Cross-tabulation engine.
//!
//! Generates pivot tables from flat records under a declarative
//! configuration. A generation is one pure pass:
//!
//! ```text
//! records --> filter --> sort --> group --> aggregate --> show-as --> assemble
//! ```
//!
//! Source records are never mutated and generation never fails: broken
//! measures resolve to 0 with a logged warning. Datasets can be parked
//! in a [`DatasetCache`] keyed by configuration id and regenerated
//! against as the configuration evolves.
//!
//! # Example
//!
//! ```
//! use crosstab_engine::{
//!     generate, AggregationKind, DimensionSpec, MeasureSpec, PivotConfig, Record,
//! };
//!
//! let records = vec![
//!     Record::new().with("region", "East").with("sales", 300.0),
//!     Record::new().with("region", "West").with("sales", 400.0),
//! ];
//!
//! let mut config = PivotConfig::new();
//! config.rows = vec![DimensionSpec::new("region")];
//! config.measures = vec![MeasureSpec::new("sales", AggregationKind::Sum)];
//!
//! let result = generate(&records, &config);
//! assert_eq!(result.rows.len(), 2);
//! ```

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod format;
pub mod formula;
pub mod group;
pub mod result;
pub mod show_as;
pub mod sort;
pub mod value;

pub use cache::DatasetCache;
pub use config::{
    AggregationKind, Axis, DimensionGrouping, DimensionSpec, FilterCondition, FilterSpec,
    LayoutOptions, MeasureSpec, PivotConfig, ShowAs, SortDirection, SortSpec,
};
pub use engine::generate;
pub use error::PivotError;
pub use format::{format_value, CurrencyPosition, FormatSpec};
pub use result::{CellView, ColumnHeader, PivotResult, ResultMetadata, ResultRow, RowKind};
pub use value::{compare_values, OrderedFloat, Record, Value};
