//! Feed table, parameter sets and the structured query engine.
//!
//! Data is loaded once at startup by `loader::load_dataset` and shared
//! read-only afterwards.

pub mod dataset;
pub mod error;
pub mod loader;
pub mod params;
pub mod query;
pub mod schema;
pub mod table;

pub use dataset::{Dataset, DatasetSummary};
pub use error::ValidationError;
pub use loader::load_dataset;
pub use params::ParameterSet;
pub use query::{execute, FilterOp, Predicate, QueryResult, QuerySpec, SortDirection, SortSpec};
pub use schema::{FieldSpec, FieldType, Schema};
pub use table::{Cell, Column, FeedRecord, FeedTable};
