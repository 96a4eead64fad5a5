//! Tabular data — records, schema inference, delimited input, splitting.

pub mod dataset;
pub mod schema;
pub mod source;
pub mod split;

pub use dataset::{Dataset, Record, RecordId, Value};
pub use schema::{ColumnStats, ColumnType, NumericSummary, SchemaDefinition};
pub use source::{DelimitedSource, load_delimited, parse_delimited};
pub use split::{Split, SplitIndices, bootstrap, split, split_stratified, vfold};
