//! Startup loading of the feed table and parameter sets.
//!
//! Everything here runs once before the server starts. Any failure is a
//! `LookoutError::Config` and is fatal.

use std::fs;
use std::path::Path;

use lookout_core::config::DataConfig;
use lookout_core::error::{LookoutError, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::ValidationError;
use crate::params::ParameterSet;
use crate::schema::{FieldType, Schema};
use crate::table::{parse_bool, parse_finite, Cell, Column, FeedTable};

/// Load feeds, encoder and decoder parameters as described by `config`.
pub fn load_dataset(config: &DataConfig) -> Result<Dataset> {
    let feeds_schema = match config.feeds_schema_file {
        Some(ref file) => Some(load_schema(&config.resolve(file))?),
        None => None,
    };

    let feeds = load_feeds(
        &config.resolve(&config.feeds_file),
        &config.feed_id_column,
        feeds_schema.as_ref(),
    )?;
    info!(
        "Loaded {} camera feeds ({} columns)",
        feeds.len(),
        feeds.columns().len()
    );

    let encoder = load_parameters(
        &config.resolve(&config.encoder_params_file),
        &config.resolve(&config.encoder_schema_file),
    )
    .map_err(|e| context("encoder parameters", e))?;
    info!("Encoder parameters validated ({} entries)", encoder.len());

    let decoder = load_parameters(
        &config.resolve(&config.decoder_params_file),
        &config.resolve(&config.decoder_schema_file),
    )
    .map_err(|e| context("decoder parameters", e))?;
    info!("Decoder parameters validated ({} entries)", decoder.len());

    Ok(Dataset::new(feeds, encoder, decoder))
}

/// Read a CSV feed table.
///
/// Column types come from `schema` when it declares the column, otherwise
/// they are inferred from the column's non-empty cells.
pub fn load_feeds(path: &Path, id_column: &str, schema: Option<&Schema>) -> Result<FeedTable> {
    require_file(path, "feeds table")?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut raw_rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw_rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    debug!("Read {} rows from {}", raw_rows.len(), path.display());

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let declared = schema
                .and_then(|s| s.get(name))
                .map(|spec| spec.field_type)
                .filter(|t| *t != FieldType::Any);
            let field_type = declared
                .unwrap_or_else(|| infer_type(raw_rows.iter().filter_map(|r| r.get(i).map(String::as_str))));
            Column::new(name.clone(), field_type)
        })
        .collect();

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (line, raw) in raw_rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(raw.len());
        for (col, value) in columns.iter().zip(raw) {
            let cell = Cell::parse(value, col.field_type).ok_or_else(|| {
                ValidationError::TypeMismatch {
                    field: format!("{} (row {})", col.name, line + 1),
                    expected: col.field_type.to_string(),
                    found: format!("'{}'", value),
                }
            })?;
            cells.push(cell);
        }
        rows.push(cells);
    }

    let table = FeedTable::new(columns, rows, id_column, schema)
        .map_err(|e| LookoutError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(table)
}

/// Read a parameter file and validate it against its schema file.
pub fn load_parameters(params_path: &Path, schema_path: &Path) -> Result<ParameterSet> {
    let schema = load_schema(schema_path)?;
    let values = read_json(params_path)?;
    Ok(ParameterSet::validated(values, &schema)?)
}

pub fn load_schema(path: &Path) -> Result<Schema> {
    let raw = read_json(path)?;
    Schema::from_json_schema(&raw)
        .map_err(|e| LookoutError::Config(format!("{}: {}", path.display(), e)))
}

fn read_json(path: &Path) -> Result<Value> {
    require_file(path, "JSON file")?;
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| LookoutError::Config(format!("{}: invalid JSON: {}", path.display(), e)))
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LookoutError::Config(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

fn context(what: &str, err: LookoutError) -> LookoutError {
    match err {
        LookoutError::Config(msg) => LookoutError::Config(format!("{}: {}", what, msg)),
        other => other,
    }
}

/// Narrowest type that accepts every non-empty value. All-empty columns are text.
fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> FieldType {
    let mut non_empty = values.map(str::trim).filter(|v| !v.is_empty()).peekable();
    if non_empty.peek().is_none() {
        return FieldType::String;
    }
    let non_empty: Vec<&str> = non_empty.collect();

    if non_empty.iter().all(|v| v.parse::<i64>().is_ok()) {
        FieldType::Integer
    } else if non_empty.iter().all(|v| parse_finite(v).is_some()) {
        FieldType::Number
    } else if non_empty.iter().all(|v| parse_bool(v).is_some()) {
        FieldType::Boolean
    } else {
        FieldType::String
    }
}
