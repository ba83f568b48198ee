//! Declarative field schemas.
//!
//! A `Schema` maps field names to a `FieldSpec` (type, required flag, numeric
//! range, allowed values). The same `Schema::validate` routine checks encoder
//! and decoder parameter files at load time, feed rows when a feed schema is
//! supplied, and tool arguments before a tool runs. Schemas can be read from
//! and rendered back to the JSON-Schema subset the LLM tool API understands.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ValidationError;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// No type constraint.
    Any,
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    /// Parse a JSON-Schema type keyword.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "integer" => Some(FieldType::Integer),
            "number" => Some(FieldType::Number),
            "string" => Some(FieldType::String),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }

    /// Whether a JSON value has this type. Integral floats count as integers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            FieldType::Number => value.is_number(),
            FieldType::String => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type name of a value, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Constraints for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
    /// Inclusive lower bound for numeric values.
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric values.
    pub maximum: Option<f64>,
    /// Enumerated allowed values.
    pub allowed: Option<Vec<Value>>,
    /// Element spec for arrays.
    pub items: Option<Box<FieldSpec>>,
    /// Nested schema for objects.
    pub properties: Option<Box<Schema>>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            description: None,
            minimum: None,
            maximum: None,
            allowed: None,
            items: None,
            properties: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn items(mut self, item: FieldSpec) -> Self {
        self.items = Some(Box::new(item));
        self
    }

    pub fn properties(mut self, schema: Schema) -> Self {
        self.properties = Some(Box::new(schema));
        self
    }

    /// Check one present value against this spec.
    pub fn check(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        if !self.field_type.accepts(value) {
            return Err(ValidationError::TypeMismatch {
                field: field.to_string(),
                expected: self.field_type.to_string(),
                found: json_type_name(value).to_string(),
            });
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(ValidationError::OutOfRange {
                        field: field.to_string(),
                        detail: format!("{} is below minimum {}", n, min),
                    });
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(ValidationError::OutOfRange {
                        field: field.to_string(),
                        detail: format!("{} is above maximum {}", n, max),
                    });
                }
            }
        }

        if let Some(ref allowed) = self.allowed {
            if !allowed.contains(value) {
                return Err(ValidationError::NotAllowed {
                    field: field.to_string(),
                    value: value.to_string(),
                    allowed: allowed
                        .iter()
                        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }

        if let (Some(item_spec), Value::Array(items)) = (&self.items, value) {
            for (i, item) in items.iter().enumerate() {
                item_spec.check(&format!("{}[{}]", field, i), item)?;
            }
        }

        if let (Some(nested), Value::Object(obj)) = (&self.properties, value) {
            nested.validate_with_prefix(obj, Some(field))?;
        }

        Ok(())
    }

    fn from_json(name: &str, prop: &Value) -> Result<Self, ValidationError> {
        let obj = prop.as_object().ok_or_else(|| {
            ValidationError::Malformed(format!("schema for '{}' must be an object", name))
        })?;

        let field_type = match obj.get("type") {
            None => FieldType::Any,
            Some(Value::String(t)) => FieldType::parse(t).ok_or_else(|| {
                ValidationError::Malformed(format!("unsupported type '{}' for '{}'", t, name))
            })?,
            Some(other) => {
                return Err(ValidationError::Malformed(format!(
                    "type of '{}' must be a string, got {}",
                    name, other
                )))
            }
        };

        let mut spec = FieldSpec::new(field_type);
        spec.description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        spec.minimum = obj.get("minimum").and_then(Value::as_f64);
        spec.maximum = obj.get("maximum").and_then(Value::as_f64);
        spec.allowed = obj.get("enum").and_then(Value::as_array).cloned();
        if let Some(items) = obj.get("items") {
            spec.items = Some(Box::new(FieldSpec::from_json(&format!("{}[]", name), items)?));
        }

        if field_type == FieldType::Object && obj.contains_key("properties") {
            spec.properties = Some(Box::new(Schema::from_json_schema(prop)?));
        }

        Ok(spec)
    }

    fn to_json(&self) -> Value {
        let mut out = Map::new();
        if self.field_type != FieldType::Any {
            out.insert("type".into(), json!(self.field_type.as_str()));
        }
        if let Some(ref d) = self.description {
            out.insert("description".into(), json!(d));
        }
        if let Some(min) = self.minimum {
            out.insert("minimum".into(), number_json(min));
        }
        if let Some(max) = self.maximum {
            out.insert("maximum".into(), number_json(max));
        }
        if let Some(ref allowed) = self.allowed {
            out.insert("enum".into(), Value::Array(allowed.clone()));
        }
        if let Some(ref item) = self.items {
            out.insert("items".into(), item.to_json());
        }
        if let Some(ref nested) = self.properties {
            if let Value::Object(nested_obj) = nested.to_json_schema() {
                for (k, v) in nested_obj {
                    if k != "type" {
                        out.insert(k, v);
                    }
                }
            }
        }
        Value::Object(out)
    }
}

fn number_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Ordered mapping from field name to `FieldSpec`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
    additional_properties: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// An empty schema that tolerates undeclared fields.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            additional_properties: true,
        }
    }

    /// Add or replace a field.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = spec;
        } else {
            self.fields.push((name, spec));
        }
        self
    }

    /// Reject fields that are not declared.
    pub fn deny_additional(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    pub fn allows_additional(&self) -> bool {
        self.additional_properties
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a JSON value that must be an object conforming to this schema.
    pub fn validate_value(&self, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::Object(obj) => self.validate(obj),
            other => Err(ValidationError::TypeMismatch {
                field: "<root>".to_string(),
                expected: "object".to_string(),
                found: json_type_name(other).to_string(),
            }),
        }
    }

    /// Validate an object against this schema.
    ///
    /// An explicit `null` is treated the same as an absent field.
    pub fn validate(&self, obj: &Map<String, Value>) -> Result<(), ValidationError> {
        self.validate_with_prefix(obj, None)
    }

    fn validate_with_prefix(
        &self,
        obj: &Map<String, Value>,
        prefix: Option<&str>,
    ) -> Result<(), ValidationError> {
        let qualify = |name: &str| match prefix {
            Some(p) => format!("{}.{}", p, name),
            None => name.to_string(),
        };

        for (name, spec) in &self.fields {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(ValidationError::MissingRequired(qualify(name)));
                    }
                }
                Some(value) => spec.check(&qualify(name), value)?,
            }
        }

        if !self.additional_properties {
            if let Some(extra) = obj.keys().find(|k| self.get(k).is_none()) {
                return Err(ValidationError::UnexpectedField(qualify(extra)));
            }
        }

        Ok(())
    }

    /// Parse the JSON-Schema subset used by the encoder/decoder schema files:
    /// `type`, `properties`, `required`, `minimum`, `maximum`, `enum`,
    /// `items`, `additionalProperties`, `description`.
    pub fn from_json_schema(value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::Malformed("schema must be a JSON object".into()))?;

        if let Some(t) = obj.get("type") {
            if t != "object" {
                return Err(ValidationError::Malformed(format!(
                    "top-level schema type must be 'object', got {}",
                    t
                )));
            }
        }

        let mut schema = Schema::new();
        if let Some(props) = obj.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| ValidationError::Malformed("'properties' must be an object".into()))?;
            for (name, prop) in props {
                schema = schema.field(name.clone(), FieldSpec::from_json(name, prop)?);
            }
        }

        if let Some(required) = obj.get("required") {
            let required = required
                .as_array()
                .ok_or_else(|| ValidationError::Malformed("'required' must be an array".into()))?;
            for name in required {
                let name = name.as_str().ok_or_else(|| {
                    ValidationError::Malformed("'required' entries must be strings".into())
                })?;
                match schema.fields.iter_mut().find(|(n, _)| n == name) {
                    Some((_, spec)) => spec.required = true,
                    None => schema = schema.field(name, FieldSpec::new(FieldType::Any).required()),
                }
            }
        }

        if obj.get("additionalProperties") == Some(&Value::Bool(false)) {
            schema.additional_properties = false;
        }

        Ok(schema)
    }

    /// Render as a JSON-Schema object suitable for an LLM tool definition.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            properties.insert(name.clone(), spec.to_json());
            if spec.required {
                required.push(json!(name));
            }
        }

        let mut out = Map::new();
        out.insert("type".into(), json!("object"));
        out.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            out.insert("required".into(), Value::Array(required));
        }
        out.insert(
            "additionalProperties".into(),
            Value::Bool(self.additional_properties),
        );
        Value::Object(out)
    }
}
