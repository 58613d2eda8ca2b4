//! Compiler for SQL-LIKE wildcard patterns.
//!
//! `%` matches zero or more characters and `%%` is a literal `%`. A pattern
//! is compiled either to an anchored regular expression (document stores)
//! or to an ordered list of [`PatternCondition`]s (wide-column stores, which
//! only understand equality, prefix and substring conditions).

use serde::{Deserialize, Serialize};
use std::fmt;

const WILDCARD: char = '%';

#[derive(Debug, Clone, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// Split a pattern into literal runs and wildcard boundaries, unescaping `%%`.
fn segments(pattern: &str) -> Vec<Segment> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != WILDCARD {
            current.push(c);
            continue;
        }
        if chars.peek() == Some(&WILDCARD) {
            chars.next();
            current.push(WILDCARD);
            continue;
        }
        if !current.is_empty() {
            result.push(Segment::Literal(std::mem::take(&mut current)));
        }
        result.push(Segment::Wildcard);
    }

    if !current.is_empty() {
        result.push(Segment::Literal(current));
    }

    result
}

/// Split a pattern into its literal tokens.
///
/// A pattern without wildcards yields exactly one token (the unescaped
/// input, possibly empty); leading and trailing wildcards never produce
/// empty tokens.
pub fn tokenize(pattern: &str) -> Vec<String> {
    let segments = segments(pattern);
    if !segments.contains(&Segment::Wildcard) {
        return vec![unescape(pattern)];
    }

    segments
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Literal(token) => Some(token),
            Segment::Wildcard => None,
        })
        .collect()
}

/// Whether the pattern contains at least one unescaped wildcard
pub fn has_wildcard(pattern: &str) -> bool {
    segments(pattern).contains(&Segment::Wildcard)
}

/// Collapse every `%%` into a literal `%`
pub fn unescape(pattern: &str) -> String {
    pattern.replace("%%", "%")
}

/// Compile a pattern into a regular expression matching the whole value.
///
/// Each wildcard becomes `.*`; the expression is anchored with `^` and `$`
/// unless the pattern starts (respectively ends) with a wildcard. Literal
/// characters are passed through unchanged.
pub fn to_regex(pattern: &str) -> String {
    let segments = segments(pattern);
    let mut regex = String::with_capacity(pattern.len() + 4);

    if segments.first() != Some(&Segment::Wildcard) {
        regex.push('^');
    }
    for segment in &segments {
        match segment {
            Segment::Literal(token) => regex.push_str(token),
            Segment::Wildcard => regex.push_str(".*"),
        }
    }
    if segments.last() != Some(&Segment::Wildcard) {
        regex.push('$');
    }

    regex
}

/// Condition primitive understood by wide-column filter expressions
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOp {
    Equals,
    BeginsWith,
    Contains,
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionOp::Equals => write!(f, "EQUALS"),
            ConditionOp::BeginsWith => write!(f, "BEGINS_WITH"),
            ConditionOp::Contains => write!(f, "CONTAINS"),
        }
    }
}

/// One condition of a compiled pattern; all conditions are combined with AND
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PatternCondition {
    pub op: ConditionOp,
    pub value: String,
}

impl PatternCondition {
    pub fn new(op: ConditionOp, value: impl Into<String>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for PatternCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.op, self.value)
    }
}

/// Reduce a pattern to the ordered condition list used by wide-column stores.
///
/// - no wildcard: a single `EQUALS` on the unescaped literal
/// - first token not preceded by a wildcard: `BEGINS_WITH`
/// - every other token: `CONTAINS`, left to right
///
/// The condition chosen for a token position is never revisited, so a
/// trailing literal after an interior wildcard is approximated by
/// `CONTAINS`. A pattern made only of wildcards yields no conditions.
pub fn to_conditions(pattern: &str) -> Vec<PatternCondition> {
    let segments = segments(pattern);
    if !segments.contains(&Segment::Wildcard) {
        return vec![PatternCondition::new(ConditionOp::Equals, unescape(pattern))];
    }

    let leading_wildcard = segments.first() == Some(&Segment::Wildcard);

    segments
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Literal(token) => Some(token),
            Segment::Wildcard => None,
        })
        .enumerate()
        .map(|(position, token)| {
            if position == 0 && !leading_wildcard {
                PatternCondition::new(ConditionOp::BeginsWith, token)
            } else {
                PatternCondition::new(ConditionOp::Contains, token)
            }
        })
        .collect()
}
