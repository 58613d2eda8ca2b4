//! Backend-neutral filter model.

use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};

use crate::error::{Result, StorageError};

/// Key of the pattern directive in the JSON filter form: `{"$pattern": "ab%"}`
pub const PATTERN_DIRECTIVE: &str = "$pattern";

/// Match applied to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Exact equality with a literal value
    Equals(Value),
    /// SQL-LIKE wildcard match, see [`crate::pattern`]
    Pattern(String),
}

/// Mapping of field name to a match.
///
/// Every field carries exactly one match. An empty filter selects every
/// record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: BTreeMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`, replacing any previous match on it
    pub fn match_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.into(), FilterValue::Equals(value.into()));
        self
    }

    /// Require `field` to match the wildcard `pattern`, replacing any
    /// previous match on it
    pub fn match_pattern(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FilterValue::Pattern(pattern.into()));
        self
    }

    /// Parse the JSON filter form.
    ///
    /// Plain values are equality matches; an object whose only key is
    /// `$pattern` is a pattern directive. Any other `$`-prefixed directive is
    /// rejected.
    pub fn from_json(value: Value) -> Result<Self> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            other => {
                return Err(StorageError::invalid_input(format!(
                    "filter must be an object, got {}",
                    other
                )))
            }
        };

        let mut filter = Self::new();
        for (field, value) in object {
            let entry = match value {
                Value::Object(spec) if spec.keys().any(|k| k.starts_with('$')) => {
                    match (spec.len(), spec.get(PATTERN_DIRECTIVE)) {
                        (1, Some(Value::String(pattern))) => FilterValue::Pattern(pattern.clone()),
                        (1, Some(other)) => {
                            return Err(StorageError::invalid_input(format!(
                                "pattern for field '{}' must be a string, got {}",
                                field, other
                            )))
                        }
                        _ => {
                            return Err(StorageError::invalid_input(format!(
                                "unknown filter specification for field '{}' - supported type is $pattern",
                                field
                            )))
                        }
                    }
                }
                other => FilterValue::Equals(other),
            };
            filter.fields.insert(field, entry);
        }

        Ok(filter)
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.fields.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.fields.remove(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FilterValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FilterValue> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a Filter {
    type Item = (&'a String, &'a FilterValue);
    type IntoIter = btree_map::Iter<'a, String, FilterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl IntoIterator for Filter {
    type Item = (String, FilterValue);
    type IntoIter = btree_map::IntoIter<String, FilterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
