use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn recursive_test_json() -> Value {
    serde_json::from_str(
        r#"{
        "departments": [
            {
                "team": [
                    {
                        "name": "Alice Johnson",
                        "info": {
                            "position": "Software Engineer",
                            "age": 29,
                            "email": "alice.johnson@example.com"
                        }
                    },
                    {
                        "name": "Bob Smith",
                        "info": {
                            "position": "UI/UX Designer",
                            "age": 34,
                            "email": "bob.smith@example.com"
                        }
                    }
                ]
            },
            {
                "team": [
                    {
                        "name": "Carol Lee",
                        "info": {
                            "position": "Project Manager",
                            "age": 41,
                            "email": "carol.lee@example.com"
                        }
                    },
                    {
                        "name": "David Kim",
                        "info": {
                            "position": "QA Engineer",
                            "age": 27,
                            "email": "david.kim@example.com"
                        }
                    }
                ]
            }
        ]
    }"#,
    )
    .unwrap()
}

fn names() -> Vec<Value> {
    vec![
        json!("Alice Johnson"),
        json!("Bob Smith"),
        json!("Carol Lee"),
        json!("David Kim"),
    ]
}

#[test]
fn test_recursive_descent_all_names() {
    let result = zpath::query("$..name", &recursive_test_json()).unwrap();
    assert_eq!(result, names());
}

#[test]
fn test_recursive_descent_departments() {
    let doc = recursive_test_json();
    let result = zpath::query("$.departments", &doc).unwrap();
    assert_eq!(result, vec![doc["departments"].clone()]);
}

#[test]
fn test_recursive_descent_specific_name() {
    let result = zpath::query("$.departments[0].team[0].name", &recursive_test_json()).unwrap();
    assert_eq!(result, vec![json!("Alice Johnson")]);
}

#[test]
fn nested_recursion_finds_each_node_once() {
    let doc = recursive_test_json();
    assert_eq!(zpath::query("$..team..name", &doc).unwrap(), names());
    assert_eq!(zpath::query("$..*..name", &doc).unwrap(), names());
    assert_eq!(zpath::query("$..name.count()", &doc).unwrap(), vec![json!(4)]);
    assert_eq!(zpath::query("$..team.count()", &doc).unwrap(), vec![json!(2)]);
}

#[test]
fn recursive_bracket_selectors() {
    let doc = recursive_test_json();
    assert_eq!(
        zpath::query("$..[0].name", &doc).unwrap(),
        vec![json!("Alice Johnson"), json!("Carol Lee")]
    );
    assert_eq!(
        zpath::query("$..info.age", &doc).unwrap(),
        vec![json!(29), json!(34), json!(41), json!(27)]
    );
}

#[test]
fn recursive_descent_with_filter() {
    let doc = recursive_test_json();
    assert_eq!(
        zpath::query("$..team[?(@.info.age > 30)].name", &doc).unwrap(),
        vec![json!("Bob Smith"), json!("Carol Lee")]
    );
}

#[test]
fn recursive_wildcard_visits_in_document_order() {
    let doc = json!({"a": {"b": 1}, "c": [2, {"d": 3}]});
    assert_eq!(
        zpath::query("$..*", &doc).unwrap(),
        vec![
            json!({"b": 1}),
            json!(1),
            json!([2, {"d": 3}]),
            json!(2),
            json!({"d": 3}),
            json!(3),
        ]
    );
}

#[test]
fn equal_values_at_different_places_are_all_kept() {
    let doc = json!({"a": 1, "b": 1, "xs": [{"v": 1}, {"v": 1}]});
    assert_eq!(
        zpath::query("$.a, $.b", &doc).unwrap(),
        vec![json!(1), json!(1)]
    );
    assert_eq!(
        zpath::query("$..v", &doc).unwrap(),
        vec![json!(1), json!(1)]
    );
    let flat = json!({"a": 1, "b": 1});
    assert_eq!(zpath::query("$..*", &flat).unwrap(), vec![json!(1), json!(1)]);
}

#[test]
fn filter_on_a_missing_member_selects_nothing() {
    let doc = json!({"xs": [{"v": 1}, {"v": 2}]});
    assert_eq!(zpath::query("$.xs[?(@.missing == 1)]", &doc).unwrap(), Vec::<Value>::new());
    assert_eq!(zpath::query("$..[?(@.missing == 1)]", &doc).unwrap(), Vec::<Value>::new());
}
