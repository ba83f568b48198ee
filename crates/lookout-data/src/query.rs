//! Query engine: filter, sort, limit and project over a `FeedTable`.
//!
//! `execute` is a pure read. Every predicate and column name is validated
//! before any row is touched, so a bad query never yields partial output.
//!
//! Contract details:
//! - Predicates are conjunctive.
//! - Text equality (`eq`, `ne`, `in`) and `contains` ignore case; ordering
//!   comparisons on text are plain lexicographic.
//! - A numeric column accepts a numeric string operand (`"1920"`), which is
//!   parsed explicitly. No other coercion happens: a string for a boolean
//!   column or a number for a text column is a `TypeMismatch`.
//! - Null cells satisfy only `ne`.
//! - Sorting is stable on a single key; nulls sort last in both directions.
//! - The row limit is applied after filtering and sorting.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::schema::{json_type_name, FieldType};
use crate::table::{Cell, FeedTable};

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    In,
}

impl FilterOp {
    pub const ALL: [FilterOp; 8] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Gt,
        FilterOp::Lt,
        FilterOp::Ge,
        FilterOp::Le,
        FilterOp::Contains,
        FilterOp::In,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Lt => "lt",
            FilterOp::Ge => "ge",
            FilterOp::Le => "le",
            FilterOp::Contains => "contains",
            FilterOp::In => "in",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Lt | FilterOp::Ge | FilterOp::Le)
    }
}

impl FromStr for FilterOp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => Ok(FilterOp::Eq),
            "ne" | "!=" | "<>" => Ok(FilterOp::Ne),
            "gt" | ">" => Ok(FilterOp::Gt),
            "lt" | "<" => Ok(FilterOp::Lt),
            "ge" | "gte" | ">=" => Ok(FilterOp::Ge),
            "le" | "lte" | "<=" => Ok(FilterOp::Le),
            "contains" => Ok(FilterOp::Contains),
            "in" => Ok(FilterOp::In),
            _ => Err(ValidationError::UnknownOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for FilterOp {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for FilterOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `field op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    #[serde(default, alias = "dir")]
    pub direction: SortDirection,
}

/// Structured filter/sort/projection request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default, alias = "filter")]
    pub filters: Vec<Predicate>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Columns to return, in order. `None` returns every column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Predicate {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn sort_by(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            key: key.into(),
            direction,
        });
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Rows produced by `execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Projected rows in output order.
    pub rows: Vec<Map<String, Value>>,
    /// Rows that satisfied the filters, before the limit.
    pub matched: usize,
    /// Rows in the table.
    pub total: usize,
}

enum Operand {
    One(Cell),
    Many(Vec<Cell>),
    Needle(String),
}

struct CompiledPredicate {
    column: usize,
    op: FilterOp,
    operand: Operand,
}

/// Run `spec` against `table`.
pub fn execute(table: &FeedTable, spec: &QuerySpec) -> Result<QueryResult, ValidationError> {
    let predicates = spec
        .filters
        .iter()
        .map(|p| compile(table, p))
        .collect::<Result<Vec<_>, _>>()?;

    let sort = match spec.sort {
        Some(ref s) => {
            let column = table
                .column_index(&s.key)
                .ok_or_else(|| ValidationError::UnknownField(s.key.clone()))?;
            Some((column, s.direction))
        }
        None => None,
    };

    let projection = projection(table, spec.columns.as_deref())?;

    let rows = table.rows();
    let mut selected: Vec<usize> = (0..rows.len())
        .filter(|&i| {
            predicates
                .iter()
                .all(|p| matches(rows[i].cell(p.column), p))
        })
        .collect();

    if let Some((column, direction)) = sort {
        // slice::sort_by is stable, so equal keys keep load order.
        selected.sort_by(|&a, &b| sort_order(rows[a].cell(column), rows[b].cell(column), direction));
    }

    let matched = selected.len();
    if let Some(limit) = spec.limit {
        selected.truncate(limit);
    }

    let columns = table.columns();
    let out = selected
        .into_iter()
        .map(|i| {
            projection
                .iter()
                .map(|&c| (columns[c].name.clone(), rows[i].cell(c).to_json()))
                .collect::<Map<String, Value>>()
        })
        .collect();

    Ok(QueryResult {
        rows: out,
        matched,
        total: table.len(),
    })
}

fn projection(table: &FeedTable, columns: Option<&[String]>) -> Result<Vec<usize>, ValidationError> {
    let Some(columns) = columns else {
        return Ok((0..table.columns().len()).collect());
    };

    let mut seen = HashSet::new();
    columns
        .iter()
        .map(|name| {
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateColumn(name.clone()));
            }
            table
                .column_index(name)
                .ok_or_else(|| ValidationError::UnknownColumn(name.clone()))
        })
        .collect()
}

fn compile(table: &FeedTable, predicate: &Predicate) -> Result<CompiledPredicate, ValidationError> {
    let column = table
        .column_index(&predicate.field)
        .ok_or_else(|| ValidationError::UnknownField(predicate.field.clone()))?;
    let field_type = table.columns()[column].field_type;
    let field = predicate.field.as_str();

    let unsupported = || ValidationError::UnsupportedOperator {
        field: field.to_string(),
        op: predicate.op.to_string(),
        field_type,
    };

    let operand = match predicate.op {
        FilterOp::Contains => {
            if field_type != FieldType::String {
                return Err(unsupported());
            }
            match &predicate.value {
                Value::String(s) => Operand::Needle(s.to_lowercase()),
                other => return Err(mismatch(field, "string", other)),
            }
        }
        FilterOp::In => match &predicate.value {
            Value::Array(values) => Operand::Many(
                values
                    .iter()
                    .map(|v| coerce(field, field_type, v).map(fold_case))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(mismatch(field, "array", other)),
        },
        op => {
            if op.is_ordering() && field_type == FieldType::Boolean {
                return Err(unsupported());
            }
            let cell = coerce(field, field_type, &predicate.value)?;
            if op.is_ordering() {
                Operand::One(cell)
            } else {
                Operand::One(fold_case(cell))
            }
        }
    };

    Ok(CompiledPredicate {
        column,
        op: predicate.op,
        operand,
    })
}

/// Convert a JSON operand to a cell of the column's type.
fn coerce(field: &str, field_type: FieldType, value: &Value) -> Result<Cell, ValidationError> {
    match (field_type, value) {
        (FieldType::Integer | FieldType::Number, Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Cell::Integer(i)),
            None => n
                .as_f64()
                .map(Cell::Number)
                .ok_or_else(|| mismatch(field, field_type.as_str(), value)),
        },
        // Numeric strings are the one permitted coercion.
        (FieldType::Integer | FieldType::Number, Value::String(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Ok(Cell::Integer(i))
            } else {
                match s.parse::<f64>() {
                    Ok(f) if f.is_finite() => Ok(Cell::Number(f)),
                    _ => Err(ValidationError::TypeMismatch {
                        field: field.to_string(),
                        expected: field_type.to_string(),
                        found: "non-numeric string".to_string(),
                    }),
                }
            }
        }
        (FieldType::String, Value::String(s)) => Ok(Cell::Text(s.clone())),
        (FieldType::Boolean, Value::Bool(b)) => Ok(Cell::Boolean(*b)),
        (FieldType::Any, Value::String(s)) => Ok(Cell::Text(s.clone())),
        (FieldType::Any, Value::Bool(b)) => Ok(Cell::Boolean(*b)),
        (FieldType::Any, Value::Number(_)) => coerce(field, FieldType::Number, value),
        _ => Err(mismatch(field, field_type.as_str(), value)),
    }
}

fn mismatch(field: &str, expected: &str, found: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found: json_type_name(found).to_string(),
    }
}

fn fold_case(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s) => Cell::Text(s.to_lowercase()),
        other => other,
    }
}

/// Equality against a case-folded operand.
fn equals(cell: &Cell, operand: &Cell) -> bool {
    match (cell, operand) {
        (Cell::Text(a), Cell::Text(b)) => a.to_lowercase() == *b,
        _ => cell.compare(operand) == Some(Ordering::Equal),
    }
}

fn matches(cell: &Cell, predicate: &CompiledPredicate) -> bool {
    if cell.is_null() {
        return predicate.op == FilterOp::Ne;
    }
    match (predicate.op, &predicate.operand) {
        (FilterOp::Eq, Operand::One(v)) => equals(cell, v),
        (FilterOp::Ne, Operand::One(v)) => !equals(cell, v),
        (FilterOp::Gt, Operand::One(v)) => cell.compare(v) == Some(Ordering::Greater),
        (FilterOp::Lt, Operand::One(v)) => cell.compare(v) == Some(Ordering::Less),
        (FilterOp::Ge, Operand::One(v)) => {
            matches!(cell.compare(v), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterOp::Le, Operand::One(v)) => {
            matches!(cell.compare(v), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::Contains, Operand::Needle(needle)) => match cell {
            Cell::Text(s) => s.to_lowercase().contains(needle.as_str()),
            _ => false,
        },
        (FilterOp::In, Operand::Many(values)) => values.iter().any(|v| equals(cell, v)),
        _ => false,
    }
}

fn sort_order(a: &Cell, b: &Cell, direction: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}
