use crate::payload::{FlatValue, FlattenedPayload};
use serde::{Deserialize, Serialize};

/// A declarative payload filter.
///
/// Wire format:
///
/// ```json
/// { "should": [ { "key": "granularity", "match": { "integer": 4 } } ] }
/// ```
///
/// `should` clauses combine with OR, `must` clauses with AND; when both are
/// present a point has to satisfy each group. A filter with no clauses
/// matches every point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must: Option<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Field(FieldCondition),
    Nested(Filter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldCondition {
    /// Flattened field path, e.g. `granularity` or `inner__float`.
    pub key: String,
    pub r#match: Match,
}

/// Leaf match over a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Match {
    Keyword(String),
    Integer(i64),
}

impl Match {
    fn check_value(&self, value: &FlatValue) -> bool {
        match (self, value) {
            (Match::Keyword(expected), FlatValue::Keyword(actual)) => expected == actual,
            (Match::Integer(expected), FlatValue::Integer(actual)) => expected == actual,
            // floats with zero fraction still satisfy integer matches
            (Match::Integer(expected), FlatValue::Float(actual)) => *actual == *expected as f64,
            _ => false,
        }
    }
}

impl Filter {
    #[must_use]
    pub fn new_should(conditions: Vec<Condition>) -> Self {
        Self {
            should: Some(conditions),
            must: None,
        }
    }

    #[must_use]
    pub fn new_must(conditions: Vec<Condition>) -> Self {
        Self {
            should: None,
            must: Some(conditions),
        }
    }

    /// True when the filter carries no clauses at all.
    pub fn is_empty(&self) -> bool {
        self.should.as_ref().map_or(true, Vec::is_empty)
            && self.must.as_ref().map_or(true, Vec::is_empty)
    }

    /// Authoritative predicate: does a point with this flattened payload
    /// satisfy the filter?
    pub fn check(&self, payload: &FlattenedPayload) -> bool {
        let should_ok = match self.should.as_deref() {
            None | Some([]) => true,
            Some(clauses) => clauses.iter().any(|c| c.check(payload)),
        };
        let must_ok = match self.must.as_deref() {
            None | Some([]) => true,
            Some(clauses) => clauses.iter().all(|c| c.check(payload)),
        };
        should_ok && must_ok
    }
}

impl Condition {
    pub fn check(&self, payload: &FlattenedPayload) -> bool {
        match self {
            Condition::Field(field) => payload
                .get(&field.key)
                .is_some_and(|values| values.iter().any(|v| field.r#match.check_value(v))),
            Condition::Nested(filter) => filter.check(payload),
        }
    }
}

/// Shorthand for a keyword equality clause.
pub fn match_keyword(key: impl Into<String>, value: impl Into<String>) -> Condition {
    Condition::Field(FieldCondition {
        key: key.into(),
        r#match: Match::Keyword(value.into()),
    })
}

/// Shorthand for an integer equality clause.
pub fn match_integer(key: impl Into<String>, value: i64) -> Condition {
    Condition::Field(FieldCondition {
        key: key.into(),
        r#match: Match::Integer(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{flatten_payload, payload_from_json};

    fn flat(json: serde_json::Value) -> FlattenedPayload {
        flatten_payload(&payload_from_json(json).unwrap())
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{ "should": [ { "key": "hello", "match": { "keyword": "world" } },
                                    { "key": "granularity", "match": { "integer": 4 } } ] }"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            Filter::new_should(vec![
                match_keyword("hello", "world"),
                match_integer("granularity", 4),
            ])
        );

        // round-trips through serde_json
        let encoded = serde_json::to_string(&filter).unwrap();
        let decoded: Filter = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn test_unknown_clause_shape_rejected() {
        let json = r#"{ "should": [ { "keys": "hello" } ] }"#;
        assert!(serde_json::from_str::<Filter>(json).is_err());
    }

    #[test]
    fn test_should_is_or() {
        let filter = Filter::new_should(vec![
            match_keyword("hello", "world"),
            match_integer("inner__float", 2005),
        ]);

        assert!(filter.check(&flat(serde_json::json!({"hello": "world"}))));
        assert!(filter.check(&flat(serde_json::json!({"inner": {"float": 2005}}))));
        assert!(filter.check(&flat(
            serde_json::json!({"hello": "world", "inner": {"float": 2005}})
        )));
        assert!(!filter.check(&flat(serde_json::json!({"hello": "mars"}))));
    }

    #[test]
    fn test_must_is_and() {
        let filter = Filter::new_must(vec![
            match_keyword("hello", "world"),
            match_integer("inner__float", 2005),
        ]);

        assert!(!filter.check(&flat(serde_json::json!({"hello": "world"}))));
        assert!(filter.check(&flat(
            serde_json::json!({"hello": "world", "inner": {"float": 2005}})
        )));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.is_empty());
        assert!(filter.check(&flat(serde_json::json!({"any": "thing"}))));
        assert!(filter.check(&FlattenedPayload::default()));

        // explicit empty clause lists behave the same
        let filter = Filter {
            should: Some(vec![]),
            must: Some(vec![]),
        };
        assert!(filter.is_empty());
        assert!(filter.check(&FlattenedPayload::default()));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let filter = Filter::new_should(vec![match_keyword("absent", "x")]);
        assert!(!filter.check(&flat(serde_json::json!({"present": "x"}))));
    }

    #[test]
    fn test_integer_match_accepts_integral_float() {
        let filter = Filter::new_should(vec![match_integer("score", 42)]);
        assert!(filter.check(&flat(serde_json::json!({"score": 42.0}))));
        assert!(!filter.check(&flat(serde_json::json!({"score": 42.5}))));
    }

    #[test]
    fn test_nested_filter_condition() {
        // (a=1) AND (b="x" OR b="y")
        let filter = Filter {
            must: Some(vec![
                match_integer("a", 1),
                Condition::Nested(Filter::new_should(vec![
                    match_keyword("b", "x"),
                    match_keyword("b", "y"),
                ])),
            ]),
            should: None,
        };

        assert!(filter.check(&flat(serde_json::json!({"a": 1, "b": "y"}))));
        assert!(!filter.check(&flat(serde_json::json!({"a": 1, "b": "z"}))));
        assert!(!filter.check(&flat(serde_json::json!({"a": 2, "b": "x"}))));
    }
}
