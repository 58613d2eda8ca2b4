//! Filter expression assembly for scans.
//!
//! Field names and values are always bound through `#n` / `:v` placeholders,
//! so reserved words and arbitrary characters in field names are safe.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use temps_storage::pattern::to_conditions;
use temps_storage::{ConditionOp, Filter, FilterValue};

use crate::attribute::json_to_attribute;

/// A compiled filter expression with its placeholder bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    clauses: Vec<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    /// Compile a filter. Pattern fields become one clause per condition,
    /// all joined with `AND`.
    pub fn from_filter(filter: &Filter) -> Self {
        let mut expression = Self::default();

        for (field, value) in filter {
            match value {
                FilterValue::Equals(v) => {
                    expression.push(ConditionOp::Equals, field, json_to_attribute(v));
                }
                FilterValue::Pattern(p) => {
                    for condition in to_conditions(p) {
                        expression.push(condition.op, field, AttributeValue::S(condition.value));
                    }
                }
            }
        }

        expression
    }

    /// Only keep items whose TTL attribute lies after `now` (epoch seconds)
    pub fn with_ttl(mut self, attribute: &str, now: i64) -> Self {
        let name = self.name(attribute);
        let value = self.value(AttributeValue::N(now.to_string()));
        self.clauses.push(format!("{} > {}", name, value));
        self
    }

    fn name(&mut self, field: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, f)| f.as_str() == field) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), field.to_string());
        placeholder
    }

    fn value(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    fn push(&mut self, op: ConditionOp, field: &str, value: AttributeValue) {
        let name = self.name(field);
        let value = self.value(value);
        let clause = match op {
            ConditionOp::Equals => format!("{} = {}", name, value),
            ConditionOp::BeginsWith => format!("begins_with({}, {})", name, value),
            ConditionOp::Contains => format!("contains({}, {})", name, value),
        };
        self.clauses.push(clause);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Expression text, `None` when every item matches
    pub fn expression(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" AND "))
        }
    }

    pub fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    pub fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let expression = FilterExpression::from_filter(&Filter::new());

        assert!(expression.is_empty());
        assert_eq!(expression.expression(), None);
        assert_eq!(expression.names(), None);
        assert_eq!(expression.values(), None);
    }

    #[test]
    fn test_equality() {
        let expression = FilterExpression::from_filter(&Filter::new().match_value("email", "a@b.c"));

        assert_eq!(expression.expression().unwrap(), "#n0 = :v0");
        assert_eq!(expression.names().unwrap()["#n0"], "email");
        assert_eq!(expression.values().unwrap()[":v0"], s("a@b.c"));
    }

    #[test]
    fn test_patterns() {
        let expression =
            FilterExpression::from_filter(&Filter::new().match_pattern("name", "ab%cd%ef"));

        assert_eq!(
            expression.expression().unwrap(),
            "begins_with(#n0, :v0) AND contains(#n0, :v1) AND contains(#n0, :v2)"
        );
        let values = expression.values().unwrap();
        assert_eq!(values[":v0"], s("ab"));
        assert_eq!(values[":v1"], s("cd"));
        assert_eq!(values[":v2"], s("ef"));
    }

    #[test]
    fn test_escaped_pattern_is_equality() {
        let expression =
            FilterExpression::from_filter(&Filter::new().match_pattern("code", "%%abcd"));

        assert_eq!(expression.expression().unwrap(), "#n0 = :v0");
        assert_eq!(expression.values().unwrap()[":v0"], s("%abcd"));
    }

    #[test]
    fn test_wildcard_only_pattern_matches_everything() {
        let expression = FilterExpression::from_filter(&Filter::new().match_pattern("name", "%"));
        assert!(expression.is_empty());
    }

    #[test]
    fn test_ttl_clause() {
        let expression = FilterExpression::from_filter(&Filter::new().match_value("token", "t"))
            .with_ttl("expires_at", 1_700_000_000);

        assert_eq!(expression.expression().unwrap(), "#n0 = :v0 AND #n1 > :v1");
        assert_eq!(expression.names().unwrap()["#n1"], "expires_at");
        assert_eq!(
            expression.values().unwrap()[":v1"],
            AttributeValue::N("1700000000".to_string())
        );
    }
}
