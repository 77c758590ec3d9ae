//! Filter expressions.
//!
//! A [`Predicate`] is either a single comparison against one property or a
//! group of child predicates joined by `and`/`or`. Predicates evaluate
//! locally against JSON records and serialize to the URL filter grammar
//! (`$filter=age ge 21 and startswith(name,'A')`).

use std::cmp::Ordering;

use serde_json::Value;

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Contains,
    StartsWith,
    EndsWith,
}

impl ComparisonOp {
    /// The infix keyword, for the six operators that have one.
    pub(crate) fn keyword(self) -> Option<&'static str> {
        match self {
            ComparisonOp::EqualTo => Some("eq"),
            ComparisonOp::NotEqualTo => Some("ne"),
            ComparisonOp::GreaterThan => Some("gt"),
            ComparisonOp::GreaterThanOrEqualTo => Some("ge"),
            ComparisonOp::LessThan => Some("lt"),
            ComparisonOp::LessThanOrEqualTo => Some("le"),
            _ => None,
        }
    }

    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "eq" => Some(ComparisonOp::EqualTo),
            "ne" => Some(ComparisonOp::NotEqualTo),
            "gt" => Some(ComparisonOp::GreaterThan),
            "ge" => Some(ComparisonOp::GreaterThanOrEqualTo),
            "lt" => Some(ComparisonOp::LessThan),
            "le" => Some(ComparisonOp::LessThanOrEqualTo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    And,
    Or,
}

impl GroupOp {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            GroupOp::And => "and",
            GroupOp::Or => "or",
        }
    }
}

// ============================================================================
// Predicate
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        property: String,
        op: ComparisonOp,
        value: Value,
    },
    Group {
        op: GroupOp,
        children: Vec<Predicate>,
    },
}

/// Entry point of the chainable constructor:
/// `Predicate::new("age").greater_than(21)`.
pub struct PredicateBuilder {
    property: String,
}

impl PredicateBuilder {
    fn comparison(self, op: ComparisonOp, value: impl Into<Value>) -> Predicate {
        Predicate::Comparison {
            property: self.property,
            op,
            value: value.into(),
        }
    }

    pub fn equals(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::EqualTo, value)
    }

    pub fn not_equal_to(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::NotEqualTo, value)
    }

    pub fn greater_than(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::GreaterThan, value)
    }

    pub fn greater_than_or_equal_to(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::GreaterThanOrEqualTo, value)
    }

    pub fn less_than(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::LessThan, value)
    }

    pub fn less_than_or_equal_to(self, value: impl Into<Value>) -> Predicate {
        self.comparison(ComparisonOp::LessThanOrEqualTo, value)
    }

    pub fn contains(self, value: impl Into<String>) -> Predicate {
        self.comparison(ComparisonOp::Contains, Value::String(value.into()))
    }

    pub fn starts_with(self, value: impl Into<String>) -> Predicate {
        self.comparison(ComparisonOp::StartsWith, Value::String(value.into()))
    }

    pub fn ends_with(self, value: impl Into<String>) -> Predicate {
        self.comparison(ComparisonOp::EndsWith, Value::String(value.into()))
    }
}

impl Predicate {
    pub fn new(property: impl Into<String>) -> PredicateBuilder {
        PredicateBuilder {
            property: property.into(),
        }
    }

    /// Joins predicates into a group. A single-child group is collapsed to
    /// its child.
    pub fn join(mut children: Vec<Predicate>, op: GroupOp) -> Predicate {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Predicate::Group { op, children }
        }
    }

    /// Folds `other` into an `and` group. When `self` is already an `and`
    /// group the child list is extended in place.
    pub fn and(self, other: Predicate) -> Predicate {
        self.fold(other, GroupOp::And)
    }

    /// Folds `other` into an `or` group.
    pub fn or(self, other: Predicate) -> Predicate {
        self.fold(other, GroupOp::Or)
    }

    fn fold(self, other: Predicate, op: GroupOp) -> Predicate {
        match self {
            Predicate::Group {
                op: existing,
                mut children,
            } if existing == op => {
                children.push(other);
                Predicate::Group { op, children }
            }
            first => Predicate::Group {
                op,
                children: vec![first, other],
            },
        }
    }

    /// Parses the URL filter grammar. Returns `None` on malformed input,
    /// stray trailing tokens, or a group mixing `and` with `or` at one
    /// nesting level.
    pub fn from_string(input: &str) -> Option<Predicate> {
        super::parser::parse(input)
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Tests the predicate against a record. Property paths whose segments
    /// are missing fail the test.
    pub fn test(&self, record: &Value) -> bool {
        self.test_with(record, true)
    }

    /// Like [`test`](Self::test), but with explicit missing-path handling:
    /// when `fail_on_missing_association` is false, a comparison whose
    /// property path cannot be resolved counts as a match instead of a miss.
    pub fn test_with(&self, record: &Value, fail_on_missing_association: bool) -> bool {
        match self {
            Predicate::Comparison {
                property,
                op,
                value,
            } => match get_path(record, property) {
                Some(stored) => test_comparison(stored, *op, value),
                None => !fail_on_missing_association,
            },
            Predicate::Group { op, children } => match op {
                GroupOp::And => children
                    .iter()
                    .all(|c| c.test_with(record, fail_on_missing_association)),
                GroupOp::Or => children
                    .iter()
                    .any(|c| c.test_with(record, fail_on_missing_association)),
            },
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Renders the URL filter grammar. `from_string` on the result yields an
    /// equivalent predicate.
    pub fn to_query_string(&self) -> String {
        match self {
            Predicate::Comparison {
                property,
                op,
                value,
            } => match op {
                ComparisonOp::Contains => {
                    format!("substringof({},{})", render_literal(value), property)
                }
                ComparisonOp::StartsWith => {
                    format!("startswith({},{})", property, render_literal(value))
                }
                ComparisonOp::EndsWith => {
                    format!("endswith({},{})", property, render_literal(value))
                }
                infix => format!(
                    "{} {} {}",
                    property,
                    infix.keyword().unwrap_or("eq"),
                    render_literal(value)
                ),
            },
            Predicate::Group { op, children } => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| match c {
                        Predicate::Group { .. } => format!("({})", c.to_query_string()),
                        _ => c.to_query_string(),
                    })
                    .collect();
                parts.join(&format!(" {} ", op.keyword()))
            }
        }
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Navigates a dotted property path through nested objects. `None` when any
/// segment is absent or a non-terminal segment is not an object.
pub(crate) fn get_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn as_date_millis(value: &Value) -> Option<i64> {
    let s = value.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.timestamp_millis())
}

/// Loose cross-type equality: strings that both parse as dates compare by
/// instant, numbers and numeric strings compare numerically, everything else
/// compares strictly.
fn loose_eq(stored: &Value, literal: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_date_millis(stored), as_date_millis(literal)) {
        return a == b;
    }
    match (stored, literal) {
        (Value::Number(a), Value::String(b)) => {
            matches!((a.as_f64(), b.parse::<f64>()), (Some(x), Ok(y)) if x == y)
        }
        (Value::String(a), Value::Number(b)) => {
            matches!((a.parse::<f64>(), b.as_f64()), (Ok(x), Some(y)) if x == y)
        }
        (a, b) => a == b,
    }
}

/// Three-way compare for the ordered operators and for `$orderby`. Strings
/// that both parse as dates compare by instant; mixed number/string pairs
/// compare numerically when the string is numeric; incomparable pairs yield
/// `None` and fail the test.
pub(crate) fn loose_cmp(stored: &Value, literal: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_date_millis(stored), as_date_millis(literal)) {
        return Some(a.cmp(&b));
    }
    match (stored, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        (Value::String(a), Value::Number(b)) => {
            a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?)
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn test_comparison(stored: &Value, op: ComparisonOp, literal: &Value) -> bool {
    match op {
        ComparisonOp::EqualTo => loose_eq(stored, literal),
        ComparisonOp::NotEqualTo => !loose_eq(stored, literal),
        ComparisonOp::GreaterThan => loose_cmp(stored, literal) == Some(Ordering::Greater),
        ComparisonOp::GreaterThanOrEqualTo => {
            matches!(loose_cmp(stored, literal), Some(Ordering::Greater | Ordering::Equal))
        }
        ComparisonOp::LessThan => loose_cmp(stored, literal) == Some(Ordering::Less),
        ComparisonOp::LessThanOrEqualTo => {
            matches!(loose_cmp(stored, literal), Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOp::Contains => match stored.as_str() {
            Some(s) => s.contains(&literal_text(literal)),
            None => false,
        },
        ComparisonOp::StartsWith => match stored.as_str() {
            Some(s) => s.starts_with(&literal_text(literal)),
            None => false,
        },
        ComparisonOp::EndsWith => match stored.as_str() {
            Some(s) => s.ends_with(&literal_text(literal)),
            None => false,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equals_is_loose_across_number_and_string() {
        let p = Predicate::new("age").equals(3);
        assert!(p.test(&json!({"age": 3})));
        assert!(p.test(&json!({"age": "3"})));
        assert!(!p.test(&json!({"age": 4})));
    }

    #[test]
    fn ordered_comparisons() {
        assert!(Predicate::new("age").greater_than(20).test(&json!({"age": 21})));
        assert!(!Predicate::new("age").greater_than(21).test(&json!({"age": 21})));
        assert!(Predicate::new("age")
            .greater_than_or_equal_to(21)
            .test(&json!({"age": 21})));
        assert!(Predicate::new("name").less_than("m").test(&json!({"name": "alice"})));
    }

    #[test]
    fn date_strings_compare_by_instant() {
        // Differing zone renderings of the same instant.
        let p = Predicate::new("lastModified").equals("2024-01-01T00:00:00.000Z");
        assert!(p.test(&json!({"lastModified": "2024-01-01T01:00:00.000+01:00"})));

        let p = Predicate::new("lastModified").less_than("2024-06-01T00:00:00.000Z");
        assert!(p.test(&json!({"lastModified": "2024-01-01T00:00:00.000Z"})));
        assert!(!p.test(&json!({"lastModified": "2024-07-01T00:00:00.000Z"})));
    }

    #[test]
    fn string_functions() {
        let row = json!({"name": "alice"});
        assert!(Predicate::new("name").contains("lic").test(&row));
        assert!(Predicate::new("name").starts_with("al").test(&row));
        assert!(Predicate::new("name").ends_with("ce").test(&row));
        assert!(!Predicate::new("name").contains("bob").test(&row));
    }

    #[test]
    fn dotted_paths_navigate_nested_objects() {
        let row = json!({"home": {"city": "Oslo"}});
        assert!(Predicate::new("home.city").equals("Oslo").test(&row));
        assert!(!Predicate::new("home.country").equals("NO").test(&row));
    }

    #[test]
    fn missing_path_honors_fail_flag() {
        let p = Predicate::new("home.city").equals("Oslo");
        let row = json!({"name": "alice"});
        assert!(!p.test_with(&row, true));
        assert!(p.test_with(&row, false));
    }

    #[test]
    fn and_folds_into_existing_group() {
        let p = Predicate::new("a")
            .equals(1)
            .and(Predicate::new("b").equals(2))
            .and(Predicate::new("c").equals(3));
        match &p {
            Predicate::Group { op, children } => {
                assert_eq!(*op, GroupOp::And);
                assert_eq!(children.len(), 3);
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert!(p.test(&json!({"a": 1, "b": 2, "c": 3})));
        assert!(!p.test(&json!({"a": 1, "b": 2, "c": 4})));
    }

    #[test]
    fn or_group_matches_any_child() {
        let p = Predicate::new("a")
            .equals(1)
            .or(Predicate::new("b").equals(2));
        assert!(p.test(&json!({"a": 9, "b": 2})));
        assert!(!p.test(&json!({"a": 9, "b": 9})));
    }

    #[test]
    fn to_query_string_renders_grammar() {
        assert_eq!(
            Predicate::new("age").greater_than_or_equal_to(21).to_query_string(),
            "age ge 21"
        );
        assert_eq!(
            Predicate::new("name").equals("alice").to_query_string(),
            "name eq 'alice'"
        );
        assert_eq!(
            Predicate::new("name").contains("li").to_query_string(),
            "substringof('li',name)"
        );
        assert_eq!(
            Predicate::new("name").starts_with("al").to_query_string(),
            "startswith(name,'al')"
        );
        assert_eq!(
            Predicate::new("name").ends_with("ce").to_query_string(),
            "endswith(name,'ce')"
        );
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let inner = Predicate::new("b")
            .equals(2)
            .or(Predicate::new("c").equals(3));
        let p = Predicate::new("a").equals(1).and(inner);
        assert_eq!(p.to_query_string(), "a eq 1 and (b eq 2 or c eq 3)");
    }

    #[test]
    fn join_collapses_single_child() {
        let p = Predicate::join(vec![Predicate::new("a").equals(1)], GroupOp::Or);
        assert!(matches!(p, Predicate::Comparison { .. }));
    }
}
