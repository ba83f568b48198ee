//! In-memory feed table.
//!
//! Rows are stored as typed cells aligned with the column list. The table is
//! built once at startup and never mutated afterwards.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ValidationError;
use crate::schema::{FieldType, Schema};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl Cell {
    /// Parse a raw text cell according to the column type. Empty text is null.
    pub fn parse(raw: &str, field_type: FieldType) -> Option<Cell> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(Cell::Null);
        }
        match field_type {
            FieldType::Integer => raw.parse::<i64>().ok().map(Cell::Integer),
            FieldType::Number => parse_finite(raw).map(Cell::Number),
            FieldType::Boolean => parse_bool(raw).map(Cell::Boolean),
            _ => Some(Cell::Text(raw.to_string())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(i) => Some(*i as f64),
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Integer(i) => json!(i),
            Cell::Number(n) => json!(n),
            Cell::Text(s) => json!(s),
            Cell::Boolean(b) => json!(b),
        }
    }

    /// Ordering between two non-null cells of compatible types.
    ///
    /// Integers compare exactly; mixed numerics compare as `f64` with a total
    /// order. Returns `None` for null or incompatible cells.
    pub fn compare(&self, other: &Cell) -> Option<Ordering> {
        match (self, other) {
            (Cell::Integer(a), Cell::Integer(b)) => Some(a.cmp(b)),
            (Cell::Text(a), Cell::Text(b)) => Some(a.cmp(b)),
            (Cell::Boolean(a), Cell::Boolean(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                _ => None,
            },
        }
    }
}

/// Decimal number that JSON can carry; `NaN` and `inf` are rejected.
pub(crate) fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Column name and type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One feed row, cells aligned with the owning table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    cells: Vec<Cell>,
}

impl FeedRecord {
    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Ordered, read-only collection of feed records.
#[derive(Debug, Clone)]
pub struct FeedTable {
    columns: Vec<Column>,
    rows: Vec<FeedRecord>,
    id_column: usize,
}

impl FeedTable {
    /// Build a table, checking row width, cell types and identifier uniqueness.
    ///
    /// When `schema` is given every row is also validated against it, so
    /// range and enum constraints declared for the feed columns hold for the
    /// whole table.
    pub fn new(
        columns: Vec<Column>,
        rows: Vec<Vec<Cell>>,
        id_column: &str,
        schema: Option<&Schema>,
    ) -> Result<Self, ValidationError> {
        let mut seen_names = HashSet::new();
        for col in &columns {
            if !seen_names.insert(col.name.as_str()) {
                return Err(ValidationError::DuplicateColumn(col.name.clone()));
            }
        }

        let id_index = columns
            .iter()
            .position(|c| c.name == id_column)
            .ok_or_else(|| ValidationError::UnknownColumn(id_column.to_string()))?;

        let mut ids = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        for (line, cells) in rows.into_iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(ValidationError::Malformed(format!(
                    "row {} has {} cells, expected {}",
                    line + 1,
                    cells.len(),
                    columns.len()
                )));
            }

            for (col, cell) in columns.iter().zip(&cells) {
                check_cell_type(col, cell)?;
            }

            let record = FeedRecord { cells };

            if let Some(schema) = schema {
                schema.validate(&record_to_map(&columns, &record))?;
            }

            let id = record.cell(id_index);
            if id.is_null() {
                return Err(ValidationError::MissingRequired(format!(
                    "{} (row {})",
                    id_column,
                    line + 1
                )));
            }
            if !ids.insert(id.to_json().to_string()) {
                return Err(ValidationError::Malformed(format!(
                    "duplicate feed identifier {} in column '{}'",
                    id.to_json(),
                    id_column
                )));
            }

            records.push(record);
        }

        Ok(Self {
            columns,
            rows: records,
            id_column: id_index,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &[FeedRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn id_column(&self) -> &str {
        &self.columns[self.id_column].name
    }

}

fn check_cell_type(col: &Column, cell: &Cell) -> Result<(), ValidationError> {
    let ok = match (col.field_type, cell) {
        (_, Cell::Null) => true,
        (FieldType::Integer, Cell::Integer(_)) => true,
        (FieldType::Number, Cell::Integer(_) | Cell::Number(_)) => true,
        (FieldType::String, Cell::Text(_)) => true,
        (FieldType::Boolean, Cell::Boolean(_)) => true,
        (FieldType::Any, _) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::TypeMismatch {
            field: col.name.clone(),
            expected: col.field_type.to_string(),
            found: crate::schema::json_type_name(&cell.to_json()).to_string(),
        })
    }
}

fn record_to_map(columns: &[Column], record: &FeedRecord) -> serde_json::Map<String, Value> {
    columns
        .iter()
        .zip(record.cells())
        .map(|(c, v)| (c.name.clone(), v.to_json()))
        .collect()
}
