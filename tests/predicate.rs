//! Filter-language behavior through the public API: building, parsing,
//! serializing, and evaluating predicates against records.

use serde_json::json;
use tether_db::query::GroupOp;
use tether_db::Predicate;

fn people() -> Vec<serde_json::Value> {
    vec![
        json!({"id": "1", "name": "alice", "age": 30, "city": "Oslo"}),
        json!({"id": "2", "name": "bob", "age": 17, "city": "Bergen"}),
        json!({"id": "3", "name": "carol", "age": 44, "city": "Oslo"}),
        json!({"id": "4", "name": "alfred", "age": 30}),
    ]
}

fn matching_ids(predicate: &Predicate) -> Vec<String> {
    people()
        .iter()
        .filter(|p| predicate.test(p))
        .map(|p| p["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn comparison_operators_select_expected_records() {
    assert_eq!(matching_ids(&Predicate::new("age").equals(30)), ["1", "4"]);
    assert_eq!(
        matching_ids(&Predicate::new("age").not_equal_to(30)),
        ["2", "3"]
    );
    assert_eq!(matching_ids(&Predicate::new("age").greater_than(30)), ["3"]);
    assert_eq!(
        matching_ids(&Predicate::new("age").less_than_or_equal_to(17)),
        ["2"]
    );
}

#[test]
fn string_functions_select_expected_records() {
    assert_eq!(
        matching_ids(&Predicate::new("name").starts_with("al")),
        ["1", "4"]
    );
    assert_eq!(matching_ids(&Predicate::new("name").ends_with("ob")), ["2"]);
    assert_eq!(matching_ids(&Predicate::new("name").contains("aro")), ["3"]);
}

#[test]
fn missing_property_fails_by_default() {
    // Record 4 has no city.
    assert_eq!(
        matching_ids(&Predicate::new("city").equals("Oslo")),
        ["1", "3"]
    );
    let p = Predicate::new("city").equals("Oslo");
    assert!(p.test_with(&json!({"id": "4"}), false));
}

#[test]
fn groups_combine_and_nest() {
    let grown_up_in_oslo = Predicate::new("age")
        .greater_than_or_equal_to(18)
        .and(Predicate::new("city").equals("Oslo"));
    assert_eq!(matching_ids(&grown_up_in_oslo), ["1", "3"]);

    let either = Predicate::new("name")
        .equals("bob")
        .or(grown_up_in_oslo.clone());
    assert_eq!(matching_ids(&either), ["1", "2", "3"]);

    let joined = Predicate::join(
        vec![
            Predicate::new("age").equals(30),
            Predicate::new("age").equals(44),
        ],
        GroupOp::Or,
    );
    assert_eq!(matching_ids(&joined), ["1", "3", "4"]);
}

#[test]
fn serializes_and_reparses_equivalently() {
    let original = Predicate::new("age")
        .greater_than_or_equal_to(18)
        .and(
            Predicate::new("city")
                .equals("Oslo")
                .or(Predicate::new("name").starts_with("al")),
        );
    let text = original.to_query_string();
    assert_eq!(text, "age ge 18 and (city eq 'Oslo' or startswith(name,'al'))");
    let reparsed = Predicate::from_string(&text).expect("grammar round trip");
    for person in people() {
        assert_eq!(original.test(&person), reparsed.test(&person), "{person}");
    }
}

#[test]
fn parses_typed_literals() {
    let by_age = Predicate::from_string("age eq 30").expect("numeric literal");
    assert_eq!(matching_ids(&by_age), ["1", "4"]);

    let by_flag = Predicate::from_string("active eq true").expect("boolean literal");
    assert!(by_flag.test(&json!({"active": true})));
    assert!(!by_flag.test(&json!({"active": "yes"})));

    let by_name = Predicate::from_string("name eq 'alice'").expect("quoted literal");
    assert_eq!(matching_ids(&by_name), ["1"]);
}

#[test]
fn malformed_filters_do_not_parse() {
    for input in [
        "",
        "age",
        "age eq",
        "age between 1 2",
        "(age eq 1",
        "age eq 1 and name eq 'a' or city eq 'b'",
        "substringof('a' name)",
    ] {
        assert!(Predicate::from_string(input).is_none(), "parsed: {input}");
    }
}

#[test]
fn date_literals_compare_as_instants() {
    let cutoff = Predicate::new("lastModified").greater_than("2024-03-01T00:00:00.000Z");
    assert!(cutoff.test(&json!({"lastModified": "2024-03-01T05:00:00.000Z"})));
    // Same instant expressed in another zone is not strictly greater.
    assert!(!cutoff.test(&json!({"lastModified": "2024-03-01T02:00:00.000+02:00"})));
    assert!(!cutoff.test(&json!({"lastModified": "2024-02-29T23:59:59.999Z"})));
}
