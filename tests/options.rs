//! QueryOptions behavior through the public API: accessors, extension,
//! serialization, and construction from JSON objects.

use serde_json::json;
use tether_db::{Predicate, QueryOptions, SortDirection};

#[test]
fn accessors_round_trip() {
    let options = QueryOptions::new()
        .with_top(25)
        .with_skip(50)
        .with_order_by("lastModified", SortDirection::Descending)
        .with_expand("home")
        .with_expand("employer.boss")
        .with_select(vec!["name".to_string()])
        .with_inline_count()
        .with_filter(Predicate::new("age").greater_than_or_equal_to(21))
        .with_custom("apiVersion", "2")
        .with_prefer_master(true);

    assert_eq!(options.top(), Some(25));
    assert_eq!(options.skip(), Some(50));
    assert_eq!(options.order_by().map(|o| o.property.as_str()), Some("lastModified"));
    assert_eq!(
        options.expand(),
        Some(&["home".to_string(), "employer.boss".to_string()][..])
    );
    assert_eq!(options.select(), Some(&["name".to_string()][..]));
    assert!(options.inline_count());
    assert!(options.filter().is_some());
    assert_eq!(options.custom().get("apiVersion").map(String::as_str), Some("2"));
    assert!(options.prefer_master());
}

#[test]
fn query_string_includes_every_set_option() {
    let options = QueryOptions::new()
        .with_top(5)
        .with_order_by("name", SortDirection::Ascending)
        .with_filter_str("substringof('li',name)")
        .with_custom("apiKey", "k1");
    assert_eq!(
        options.to_query_string(),
        "?$top=5&$orderby=name&$filter=substringof('li',name)&apiKey=k1"
    );
}

#[test]
fn filter_accepts_grammar_strings() {
    let options = QueryOptions::new().with_filter_str("age ge 21");
    let filter = options.filter().expect("parsed filter");
    assert!(filter.test(&json!({"age": 30})));
    assert!(!filter.test(&json!({"age": 20})));

    // Unparseable input leaves the filter unset.
    let options = QueryOptions::new().with_filter_str("age !!");
    assert!(options.filter().is_none());
}

#[test]
fn extend_overlays_without_clearing() {
    let mut base = QueryOptions::new()
        .with_top(10)
        .with_order_by("name", SortDirection::Ascending)
        .with_custom("a", "1");
    let overlay = QueryOptions::new()
        .with_skip(4)
        .with_custom("b", "2")
        .with_prefer_master(true);
    base.extend(&overlay);

    assert_eq!(base.top(), Some(10));
    assert_eq!(base.skip(), Some(4));
    assert!(base.order_by().is_some());
    assert_eq!(base.custom().len(), 2);
    assert!(base.prefer_master());
}

#[test]
fn from_object_matches_explicit_construction() {
    let from_object = QueryOptions::from_object(&json!({
        "$top": 5,
        "$skip": 2,
        "$orderby": "age desc",
        "$filter": "age ge 21",
        "$inlinecount": "allpages",
    }));
    let explicit = QueryOptions::new()
        .with_top(5)
        .with_skip(2)
        .with_order_by("age", SortDirection::Descending)
        .with_filter(Predicate::new("age").greater_than_or_equal_to(21))
        .with_inline_count();
    assert_eq!(from_object, explicit);
}

#[test]
fn from_object_ignores_unrecognized_keys() {
    let options = QueryOptions::from_object(&json!({
        "$top": 3,
        "$bogus": true,
        "anything": "else"
    }));
    assert_eq!(options, QueryOptions::new().with_top(3));
}
