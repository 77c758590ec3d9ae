//! Prepared query options.
//!
//! [`QueryOptions`] collects the standard options (`$top`, `$skip`,
//! `$orderby`, `$expand`, `$select`, `$inlinecount`, `$filter`), free-form
//! custom pairs, and the local `prefer_master` routing flag. Instances are
//! value objects: build with the chainable `with_*` setters, read with plain
//! getters, and serialize with [`to_query_string`](QueryOptions::to_query_string).

use std::collections::BTreeMap;

use serde_json::Value;

use super::predicate::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    top: Option<usize>,
    skip: Option<usize>,
    order_by: Option<OrderBy>,
    expand: Option<Vec<String>>,
    select: Option<Vec<String>>,
    inline_count: bool,
    filter: Option<Predicate>,
    custom: BTreeMap<String, String>,
    prefer_master: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn top(&self) -> Option<usize> {
        self.top
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn expand(&self) -> Option<&[String]> {
        self.expand.as_deref()
    }

    pub fn select(&self) -> Option<&[String]> {
        self.select.as_deref()
    }

    pub fn inline_count(&self) -> bool {
        self.inline_count
    }

    pub fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    pub fn custom(&self) -> &BTreeMap<String, String> {
        &self.custom
    }

    pub fn prefer_master(&self) -> bool {
        self.prefer_master
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_order_by(
        mut self,
        property: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        self.order_by = Some(OrderBy {
            property: property.into(),
            direction,
        });
        self
    }

    /// Appends one dotted expansion path.
    pub fn with_expand(mut self, path: impl Into<String>) -> Self {
        self.expand.get_or_insert_with(Vec::new).push(path.into());
        self
    }

    pub fn with_expand_paths(mut self, paths: Vec<String>) -> Self {
        self.expand = Some(paths);
        self
    }

    pub fn with_select(mut self, paths: Vec<String>) -> Self {
        self.select = Some(paths);
        self
    }

    pub fn with_inline_count(mut self) -> Self {
        self.inline_count = true;
        self
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Parses and sets a filter from the URL grammar. Unparseable input
    /// leaves the filter unset.
    pub fn with_filter_str(mut self, filter: &str) -> Self {
        match Predicate::from_string(filter) {
            Some(p) => self.filter = Some(p),
            None => {
                tracing::warn!(filter, "ignoring unparseable filter expression");
            }
        }
        self
    }

    /// Adds a custom query pair. Keys starting with `$` collide with the
    /// standard options and are rejected.
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.starts_with('$') {
            tracing::warn!(%key, "ignoring custom option with reserved '$' prefix");
        } else {
            self.custom.insert(key, value.into());
        }
        self
    }

    pub fn with_prefer_master(mut self, prefer_master: bool) -> Self {
        self.prefer_master = prefer_master;
        self
    }

    // ------------------------------------------------------------------
    // Clearers
    // ------------------------------------------------------------------

    pub fn clear_top(&mut self) {
        self.top = None;
    }

    pub fn clear_skip(&mut self) {
        self.skip = None;
    }

    pub fn clear_order_by(&mut self) {
        self.order_by = None;
    }

    pub fn clear_expand(&mut self) {
        self.expand = None;
    }

    pub fn clear_select(&mut self) {
        self.select = None;
    }

    pub fn clear_inline_count(&mut self) {
        self.inline_count = false;
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn clear_custom(&mut self) {
        self.custom.clear();
    }

    // ------------------------------------------------------------------
    // Combination + serialization
    // ------------------------------------------------------------------

    /// Overlays every option set on `other` onto `self`. Options unset on
    /// `other` are left untouched.
    pub fn extend(&mut self, other: &QueryOptions) {
        if let Some(top) = other.top {
            self.top = Some(top);
        }
        if let Some(skip) = other.skip {
            self.skip = Some(skip);
        }
        if let Some(order_by) = &other.order_by {
            self.order_by = Some(order_by.clone());
        }
        if let Some(expand) = &other.expand {
            self.expand = Some(expand.clone());
        }
        if let Some(select) = &other.select {
            self.select = Some(select.clone());
        }
        if other.inline_count {
            self.inline_count = true;
        }
        if let Some(filter) = &other.filter {
            self.filter = Some(filter.clone());
        }
        for (k, v) in &other.custom {
            self.custom.insert(k.clone(), v.clone());
        }
        if other.prefer_master {
            self.prefer_master = true;
        }
    }

    /// Renders the `?`-prefixed query string. Empty when no serializable
    /// option is set; `prefer_master` is a local routing flag and is never
    /// serialized.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(top) = self.top {
            parts.push(format!("$top={top}"));
        }
        if let Some(skip) = self.skip {
            parts.push(format!("$skip={skip}"));
        }
        if let Some(order_by) = &self.order_by {
            match order_by.direction {
                SortDirection::Ascending => parts.push(format!("$orderby={}", order_by.property)),
                SortDirection::Descending => {
                    parts.push(format!("$orderby={} desc", order_by.property))
                }
            }
        }
        if let Some(expand) = &self.expand {
            parts.push(format!("$expand={}", expand.join(",")));
        }
        if let Some(select) = &self.select {
            parts.push(format!("$select={}", select.join(",")));
        }
        if self.inline_count {
            parts.push("$inlinecount=allpages".to_string());
        }
        if let Some(filter) = &self.filter {
            parts.push(format!("$filter={}", filter.to_query_string()));
        }
        for (k, v) in &self.custom {
            parts.push(format!("{k}={v}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }

    /// Builds options from a JSON map, dispatching on recognized keys and
    /// silently ignoring everything else.
    pub fn from_object(object: &Value) -> Self {
        let mut options = QueryOptions::new();
        let Some(map) = object.as_object() else {
            return options;
        };
        for (key, value) in map {
            match key.as_str() {
                "$top" => {
                    if let Some(n) = value_as_usize(value) {
                        options.top = Some(n);
                    }
                }
                "$skip" => {
                    if let Some(n) = value_as_usize(value) {
                        options.skip = Some(n);
                    }
                }
                "$orderby" => {
                    if let Some(s) = value.as_str() {
                        options.order_by = parse_order_by(s);
                    }
                }
                "$expand" => {
                    if let Some(paths) = value_as_paths(value) {
                        options.expand = Some(paths);
                    }
                }
                "$select" => {
                    if let Some(paths) = value_as_paths(value) {
                        options.select = Some(paths);
                    }
                }
                "$inlinecount" => {
                    options.inline_count = value.as_str() == Some("allpages");
                }
                "$filter" => {
                    if let Some(p) = value.as_str().and_then(Predicate::from_string) {
                        options.filter = Some(p);
                    }
                }
                "preferMaster" => {
                    options.prefer_master = value.as_bool().unwrap_or(false);
                }
                _ => {}
            }
        }
        options
    }
}

fn value_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_paths(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(s.split(',').map(|p| p.trim().to_string()).collect()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn parse_order_by(spec: &str) -> Option<OrderBy> {
    let mut parts = spec.split_whitespace();
    let property = parts.next()?.to_string();
    let direction = match parts.next() {
        Some("desc") => SortDirection::Descending,
        _ => SortDirection::Ascending,
    };
    Some(OrderBy {
        property,
        direction,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_query_string_orders_standard_options() {
        let options = QueryOptions::new()
            .with_top(10)
            .with_skip(20)
            .with_order_by("name", SortDirection::Descending)
            .with_expand("home")
            .with_select(vec!["name".to_string(), "age".to_string()])
            .with_inline_count()
            .with_filter(Predicate::new("age").greater_than_or_equal_to(21));
        assert_eq!(
            options.to_query_string(),
            "?$top=10&$skip=20&$orderby=name desc&$expand=home&$select=name,age&\
             $inlinecount=allpages&$filter=age ge 21"
        );
    }

    #[test]
    fn empty_options_serialize_to_empty_string() {
        assert_eq!(QueryOptions::new().to_query_string(), "");
        // prefer_master alone is local-only.
        assert_eq!(
            QueryOptions::new().with_prefer_master(true).to_query_string(),
            ""
        );
    }

    #[test]
    fn custom_pairs_reject_reserved_prefix() {
        let options = QueryOptions::new()
            .with_custom("apiKey", "abc")
            .with_custom("$hack", "nope");
        assert_eq!(options.custom().get("apiKey").map(String::as_str), Some("abc"));
        assert!(!options.custom().contains_key("$hack"));
        assert_eq!(options.to_query_string(), "?apiKey=abc");
    }

    #[test]
    fn extend_overlays_set_options_only() {
        let mut base = QueryOptions::new().with_top(10).with_skip(5);
        let overlay = QueryOptions::new()
            .with_top(3)
            .with_filter_str("age ge 21");
        base.extend(&overlay);
        assert_eq!(base.top(), Some(3));
        assert_eq!(base.skip(), Some(5));
        assert!(base.filter().is_some());
    }

    #[test]
    fn from_object_dispatches_recognized_keys() {
        let options = QueryOptions::from_object(&json!({
            "$top": 5,
            "$skip": "10",
            "$orderby": "name desc",
            "$expand": "home,employer.boss",
            "$inlinecount": "allpages",
            "$filter": "age ge 21",
            "preferMaster": true,
            "unrelated": "ignored"
        }));
        assert_eq!(options.top(), Some(5));
        assert_eq!(options.skip(), Some(10));
        let order_by = options.order_by().unwrap();
        assert_eq!(order_by.property, "name");
        assert_eq!(order_by.direction, SortDirection::Descending);
        assert_eq!(
            options.expand(),
            Some(&["home".to_string(), "employer.boss".to_string()][..])
        );
        assert!(options.inline_count());
        assert!(options.filter().is_some());
        assert!(options.prefer_master());
    }

    #[test]
    fn clearers_reset_to_unset() {
        let mut options = QueryOptions::new().with_top(10).with_inline_count();
        options.clear_top();
        options.clear_inline_count();
        assert_eq!(options, QueryOptions::new());
    }
}
