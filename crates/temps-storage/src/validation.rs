//! Validation of backend properties against a property schema.
//!
//! Schemas use the JSON Schema subset emitted by `schemars`: `type`,
//! `properties`, `required`, `additionalProperties`, `items`, `$ref` into
//! `definitions`, `anyOf`, `allOf`, `enum` and `minimum`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StorageError};
use crate::record::json_type_name;

/// Outcome of validating a set of properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate `props` against `schema`.
///
/// Returns `Err` only when the schema itself cannot be interpreted.
pub fn validate(props: &Value, schema: &Value) -> Result<ValidationResult> {
    let validator = Validator { root: schema };
    let mut errors = Vec::new();
    validator.check("", props, schema, &mut errors)?;

    Ok(ValidationResult {
        valid: errors.is_empty(),
        errors,
    })
}

struct Validator<'a> {
    root: &'a Value,
}

impl<'a> Validator<'a> {
    fn resolve(&self, reference: &str) -> Result<&'a Value> {
        let pointer = reference.strip_prefix('#').ok_or_else(|| {
            StorageError::invalid_input(format!("unsupported schema reference: {}", reference))
        })?;

        self.root.pointer(pointer).ok_or_else(|| {
            StorageError::invalid_input(format!("unresolvable schema reference: {}", reference))
        })
    }

    fn check(
        &self,
        path: &str,
        value: &Value,
        schema: &'a Value,
        errors: &mut Vec<String>,
    ) -> Result<()> {
        let schema = match schema {
            Value::Bool(true) => return Ok(()),
            Value::Bool(false) => {
                errors.push(format!("{} is not allowed", display_path(path)));
                return Ok(());
            }
            Value::Object(schema) => schema,
            other => {
                return Err(StorageError::invalid_input(format!(
                    "schema for {} must be an object, got {}",
                    display_path(path),
                    json_type_name(other)
                )))
            }
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let target = self.resolve(reference)?;
            self.check(path, value, target, errors)?;
        }

        if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
            for sub in all_of {
                self.check(path, value, sub, errors)?;
            }
        }

        if let Some(any_of) = schema.get("anyOf").and_then(Value::as_array) {
            let mut matched = false;
            for sub in any_of {
                let mut branch_errors = Vec::new();
                self.check(path, value, sub, &mut branch_errors)?;
                if branch_errors.is_empty() {
                    matched = true;
                    break;
                }
            }
            if !matched {
                errors.push(format!(
                    "{} does not match any allowed schema",
                    display_path(path)
                ));
            }
        }

        if let Some(expected) = schema.get("type") {
            if !self.check_type(path, value, expected, errors)? {
                return Ok(());
            }
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                errors.push(format!(
                    "{} must be one of {}",
                    display_path(path),
                    Value::Array(allowed.clone())
                ));
            }
        }

        if let (Some(minimum), Some(number)) =
            (schema.get("minimum").and_then(Value::as_f64), value.as_f64())
        {
            if number < minimum {
                errors.push(format!(
                    "{} must be at least {}, got {}",
                    display_path(path),
                    minimum,
                    number
                ));
            }
        }

        match value {
            Value::Object(object) => self.check_object(path, object, schema, errors)?,
            Value::Array(items) => {
                if let Some(item_schema) = schema.get("items") {
                    for (i, item) in items.iter().enumerate() {
                        self.check(&format!("{}[{}]", path, i), item, item_schema, errors)?;
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns whether the value has an acceptable type
    fn check_type(
        &self,
        path: &str,
        value: &Value,
        expected: &Value,
        errors: &mut Vec<String>,
    ) -> Result<bool> {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            other => {
                return Err(StorageError::invalid_input(format!(
                    "invalid type declaration for {}: {}",
                    display_path(path),
                    other
                )))
            }
        };

        for t in &allowed {
            if !matches!(
                *t,
                "null" | "boolean" | "integer" | "number" | "string" | "array" | "object"
            ) {
                return Err(StorageError::invalid_input(format!(
                    "{} was expected to be of type {}, which cannot be validated",
                    display_path(path),
                    t
                )));
            }
        }

        let actual = json_type_name(value);
        let ok = allowed.iter().any(|t| {
            *t == actual
                || (*t == "number" && actual == "integer")
                || (*t == "integer" && value.as_f64().map_or(false, |n| n.fract() == 0.0))
        });

        if !ok {
            errors.push(format!(
                "{} should be {}, but instead is {}",
                display_path(path),
                allowed.join(" or "),
                actual
            ));
        }

        Ok(ok)
    }

    fn check_object(
        &self,
        path: &str,
        object: &Map<String, Value>,
        schema: &'a Map<String, Value>,
        errors: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    errors.push(format!("{} required", join_path(path, name)));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let additional = schema.get("additionalProperties");

        for (name, value) in object {
            let child_path = join_path(path, name);
            match properties.and_then(|p| p.get(name)) {
                Some(property_schema) => self.check(&child_path, value, property_schema, errors)?,
                None => {
                    if let Some(additional) = additional {
                        self.check(&child_path, value, additional, errors)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "value"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbInfo;
    use serde_json::json;

    fn backend_schema() -> Value {
        json!({
            "type": "object",
            "required": ["type", "host", "database", "credentials"],
            "properties": {
                "type": {"type": "string"},
                "host": {"type": "string"},
                "database": {"type": "string"},
                "credentials": {
                    "type": "object",
                    "required": ["username", "password"],
                    "properties": {
                        "username": {"type": "string"},
                        "password": {"type": "string"}
                    }
                },
                "collections": {
                    "type": "object",
                    "additionalProperties": {"$ref": "#/definitions/Collection"}
                }
            },
            "definitions": {
                "Collection": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "indexes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["columns", "unique"],
                                "properties": {
                                    "columns": {"type": "array", "items": {"type": "string"}},
                                    "unique": {"type": "boolean"}
                                }
                            }
                        },
                        "enable_ttl": {"type": "boolean"},
                        "ttl": {"type": ["integer", "null"], "minimum": 0},
                        "ttl_attribute": {"type": "string"}
                    }
                }
            }
        })
    }

    #[test]
    fn test_validate_vanilla() {
        let result = validate(
            &json!({
                "host": "192.168.1.90:89-9",
                "database": "users",
                "type": "mongodb",
                "credentials": {"username": "test", "password": "pass"},
                "collections": {
                    "users": {
                        "name": "users",
                        "indexes": [
                            {"columns": ["id"], "unique": true},
                            {"columns": ["email"], "unique": true}
                        ]
                    },
                    "tokens": {
                        "name": "tokens",
                        "indexes": [{"columns": ["token"], "unique": true}],
                        "enable_ttl": true,
                        "ttl": 3600000,
                        "ttl_attribute": "created_at"
                    }
                }
            }),
            &backend_schema(),
        )
        .unwrap();

        assert!(result.valid, "validation errors: {:?}", result.errors);
    }

    #[test]
    fn test_validate_reports_every_error() {
        let result = validate(
            &json!({
                "host": 42,
                "type": "mongodb",
                "credentials": {"username": "test"},
                "collections": {
                    "tokens": {
                        "indexes": [{"columns": ["token"], "unique": "yes"}],
                        "ttl": -5
                    }
                }
            }),
            &backend_schema(),
        )
        .unwrap();

        assert!(!result.valid);
        assert!(result.errors.contains(&"database required".to_string()));
        assert!(result
            .errors
            .contains(&"credentials.password required".to_string()));
        assert!(result
            .errors
            .contains(&"host should be string, but instead is integer".to_string()));
        assert!(result
            .errors
            .contains(&"collections.tokens.name required".to_string()));
        assert!(result.errors.contains(
            &"collections.tokens.indexes[0].unique should be boolean, but instead is string"
                .to_string()
        ));
        assert!(result
            .errors
            .iter()
            .any(|e| e.starts_with("collections.tokens.ttl must be at least")));
    }

    #[test]
    fn test_unresolvable_reference_is_schema_error() {
        let schema = json!({"$ref": "#/definitions/Missing"});
        assert!(validate(&json!({}), &schema).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_unknown_type_is_schema_error() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "date"}}});
        assert!(validate(&json!({"a": "x"}), &schema)
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn test_generated_schema_accepts_serialized_config() {
        let schema = serde_json::to_value(schemars::schema_for!(DbInfo)).unwrap();
        let props = serde_json::to_value(
            DbInfo::new("localhost:27017", "users")
                .with_credentials("root", "secret")
                .with_collection(crate::RepositoryDefinition::new("users").with_ttl("expires_at", 60)),
        )
        .unwrap();

        let result = validate(&props, &schema).unwrap();
        assert!(result.valid, "validation errors: {:?}", result.errors);
    }
}
