//! Encoder and decoder parameter sets.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::schema::{json_type_name, Schema};

/// A validated mapping from parameter name to value.
///
/// Construction goes through `ParameterSet::validated`, so every instance
/// satisfies the schema it was loaded with.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    values: Map<String, Value>,
}

impl ParameterSet {
    /// Validate `values` against `schema` and wrap them.
    pub fn validated(values: Value, schema: &Schema) -> Result<Self, ValidationError> {
        schema.validate_value(&values)?;
        match values {
            Value::Object(values) => Ok(Self { values }),
            other => Err(ValidationError::TypeMismatch {
                field: "<root>".to_string(),
                expected: "object".to_string(),
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Return only the named parameters, in the requested order.
    pub fn project(&self, names: &[String]) -> Result<Map<String, Value>, ValidationError> {
        let mut out = Map::new();
        for name in names {
            let value = self
                .values
                .get(name)
                .ok_or_else(|| ValidationError::UnknownField(name.clone()))?;
            out.insert(name.clone(), value.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field("codec", FieldSpec::new(FieldType::String).required())
            .field("bitrate_kbps", FieldSpec::new(FieldType::Integer).minimum(1.0))
    }

    #[test]
    fn test_validated_ok() {
        let set = ParameterSet::validated(json!({"codec": "H265", "bitrate_kbps": 8000}), &schema())
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("codec"), Some(&json!("H265")));
    }

    #[test]
    fn test_validated_rejects_schema_violation() {
        let err = ParameterSet::validated(json!({"bitrate_kbps": 8000}), &schema()).unwrap_err();
        assert_eq!(err, ValidationError::MissingRequired("codec".into()));
    }

    #[test]
    fn test_validated_rejects_non_object() {
        assert!(ParameterSet::validated(json!("H265"), &schema()).is_err());
    }

    #[test]
    fn test_project_preserves_requested_order() {
        let set = ParameterSet::validated(json!({"codec": "H265", "bitrate_kbps": 8000}), &schema())
            .unwrap();
        let projected = set
            .project(&["bitrate_kbps".to_string(), "codec".to_string()])
            .unwrap();
        let keys: Vec<&String> = projected.keys().collect();
        assert_eq!(keys, vec!["bitrate_kbps", "codec"]);
    }

    #[test]
    fn test_project_unknown_name() {
        let set = ParameterSet::validated(json!({"codec": "H265"}), &schema()).unwrap();
        let err = set.project(&["gop".to_string()]).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("gop".into()));
    }
}
