//! Tests for destroyclaim-core: claim documents, condition expressions, reference graph, errors

use destroyclaim_core::*;
use serde_json::json;
use std::collections::BTreeMap;

fn claim_json() -> serde_json::Value {
    json!({
        "id": "claim-1",
        "isActive": true,
        "strictMode": false,
        "simulationMode": true,
        "optInMode": false,
        "notificationMode": false,
        "modelVersion": "0.0.1",
        "destroyReasons": ["dataSubjectRequest"],
        "destroySubjects": [
            {
                "id": "subject-a",
                "name": "std:sha256",
                "payload": { "hash": "abc" },
                "action": "action-1",
                "conditions": { "var": "condition-1" }
            },
            {
                "id": "subject-b",
                "name": "std:sha256",
                "payload": { "hash": "def" }
            }
        ],
        "destroyContacts": [
            { "id": "contact-1", "name": "std:agent", "payload": {}, "refs": ["subject-a"] }
        ],
        "destroyConditions": [
            { "id": "condition-1", "name": "std:fromPointInTime", "payload": { "from": "2020-01-01T00:00:00Z" } }
        ],
        "destroyActions": [
            { "id": "action-1", "name": "std:destructionLevel", "payload": { "destructionLevel": "deleted" } }
        ]
    })
}

// ===========================================================================
// ClaimDocument
// ===========================================================================

#[test]
fn claim_document_parses_camel_case() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    assert_eq!(doc.id, "claim-1");
    assert!(doc.is_active);
    assert!(doc.is_simulation_mode());
    assert!(!doc.is_strict_mode());
    assert_eq!(doc.model_version.as_deref(), Some("0.0.1"));
    assert_eq!(doc.destroy_reasons(), ["dataSubjectRequest".to_string()]);
    assert_eq!(doc.destroy_subjects.len(), 2);
    assert_eq!(doc.destroy_subjects[0].action.as_deref(), Some("action-1"));
    assert_eq!(
        doc.destroy_contacts[0].refs,
        Some(vec!["subject-a".to_string()])
    );
}

#[test]
fn opt_in_mode_is_an_alias_for_manual_mode() {
    let mut value = claim_json();
    value["optInMode"] = json!(true);
    let doc = ClaimDocument::from_value(&value).unwrap();
    assert!(doc.is_manual_mode());

    let doc = ClaimDocument::from_value(&json!({
        "id": "c", "manualMode": true, "destroySubjects": []
    }))
    .unwrap();
    assert_eq!(doc.manual_mode, Some(true));
}

#[test]
fn missing_mode_flags_stay_unset() {
    let doc = ClaimDocument::from_value(&json!({ "id": "c" })).unwrap();
    assert_eq!(doc.strict_mode, None);
    assert_eq!(doc.simulation_mode, None);
    assert!(!doc.is_active);
    assert!(doc.destroy_subjects.is_empty());
    assert!(doc.destroy_reasons().is_empty());
}

#[test]
fn non_object_claim_is_invalid_argument() {
    let err = ClaimDocument::from_value(&json!([1, 2])).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn malformed_claim_is_schema_error() {
    let err = ClaimDocument::from_value(&json!({ "id": 42 })).unwrap_err();
    match err {
        Error::SchemaValidation { errors, .. } => assert_eq!(errors.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn bad_condition_operator_rejects_document() {
    let mut value = claim_json();
    value["conditions"] = json!({ "frobnicate": [1] });
    assert!(ClaimDocument::from_value(&value).is_err());
}

#[test]
fn expiry_is_compared_against_now() {
    let mut value = claim_json();
    value["expires"] = json!("2021-06-01T00:00:00Z");
    let doc = ClaimDocument::from_value(&value).unwrap();
    let before = "2021-01-01T00:00:00Z".parse().unwrap();
    let after = "2022-01-01T00:00:00Z".parse().unwrap();
    assert!(!doc.is_expired_at(before));
    assert!(doc.is_expired_at(after));
    assert!(doc.is_expired());
}

#[test]
fn claim_document_serializes_back_to_wire_shape() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    let value = doc.to_value().unwrap();
    assert_eq!(value["destroySubjects"][0]["conditions"], json!({ "var": "condition-1" }));
    assert_eq!(value["destroyContacts"][0]["refs"], json!(["subject-a"]));
    assert!(value.get("signature").is_none());
    assert_eq!(ClaimDocument::from_value(&value).unwrap(), doc);
}

#[test]
fn element_kind_display() {
    assert_eq!(ElementKind::DestroySubject.to_string(), "destroySubject");
    assert_eq!(ElementKind::DestroyAction.to_string(), "destroyAction");
}

// ===========================================================================
// Condition expressions
// ===========================================================================

#[test]
fn nested_references_are_collected() {
    let expr = Expr::parse(&json!({
        "and": [
            { "var": "a" },
            { "or": [ { "var": "b" }, { "!": { "var": "a" } } ] },
            { "==": [ { "var": "c" }, true ] }
        ]
    }))
    .unwrap();
    let ids: Vec<_> = referenced_ids(&expr).into_iter().collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn evaluation_against_id_context() {
    let expr = Expr::parse(&json!({ "or": [ { "var": "a" }, { "var": "b" } ] })).unwrap();
    let mut ctx = BTreeMap::new();
    ctx.insert("a".to_string(), false);
    ctx.insert("b".to_string(), true);
    assert!(expr.evaluate_bool(&ctx));
    ctx.insert("b".to_string(), false);
    assert!(!expr.evaluate_bool(&ctx));
}

#[test]
fn missing_variable_is_falsy() {
    let expr = Expr::var("nowhere");
    let ctx: BTreeMap<String, bool> = BTreeMap::new();
    assert!(!expr.evaluate_bool(&ctx));
}

// ===========================================================================
// Reference graph
// ===========================================================================

#[test]
fn flat_index_orders_by_kind() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    let ids: Vec<_> = flat_index(&doc)
        .iter()
        .map(|e| (e.kind, e.element.id.as_str()))
        .collect();
    assert_eq!(
        ids,
        vec![
            (ElementKind::DestroySubject, "subject-a"),
            (ElementKind::DestroySubject, "subject-b"),
            (ElementKind::DestroyContact, "contact-1"),
            (ElementKind::DestroyCondition, "condition-1"),
            (ElementKind::DestroyAction, "action-1"),
        ]
    );
}

#[test]
fn unknown_keys_are_recorded_with_paths() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    assert!(doc.unknown_fields.is_empty());

    let mut value = claim_json();
    value["extra"] = json!(true);
    value["destroySubjects"][1]["refs"] = json!([]);
    value["destroyContacts"][0]["action"] = json!("x");
    let doc = ClaimDocument::from_value(&value).unwrap();
    let mut unknown = doc.unknown_fields.clone();
    unknown.sort();
    assert_eq!(
        unknown,
        vec![
            "destroyContacts[0].action".to_string(),
            "destroySubjects[1].refs".to_string(),
            "extra".to_string(),
        ]
    );
}

#[test]
fn id_universe_by_selector() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    let all = id_universe(&doc, IdSelector::All);
    assert_eq!(all.len(), 6);
    assert!(all.contains("claim-1"));
    let subjects = id_universe(&doc, IdSelector::Subjects);
    assert_eq!(subjects.len(), 2);
    assert!(!subjects.contains("claim-1"));
    assert_eq!(id_universe(&doc, IdSelector::Actions).len(), 1);
    assert_eq!(id_universe(&doc, IdSelector::Contacts).len(), 1);
    assert_eq!(id_universe(&doc, IdSelector::Conditions).len(), 1);
}

#[test]
fn no_cycles_in_well_formed_claim() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    assert!(detect_cycles(&doc).is_empty());
}

#[test]
fn root_only_joins_graph_with_conditions() {
    let doc = ClaimDocument::from_value(&claim_json()).unwrap();
    assert!(!condition_graph(&doc).contains_key("claim-1"));

    let mut value = claim_json();
    value["conditions"] = json!({ "var": "subject-b" });
    let doc = ClaimDocument::from_value(&value).unwrap();
    let graph = condition_graph(&doc);
    assert!(graph["claim-1"].contains("subject-b"));
}

#[test]
fn cycle_through_root_is_detected() {
    let mut value = claim_json();
    value["conditions"] = json!({ "var": "subject-b" });
    value["destroySubjects"][1]["conditions"] = json!({ "var": "claim-1" });
    let doc = ClaimDocument::from_value(&value).unwrap();
    let cycles = detect_cycles(&doc);
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].contains(&"claim-1".to_string()));
    assert!(cycles[0].contains(&"subject-b".to_string()));
}

#[test]
fn self_reference_is_not_a_cycle() {
    let mut value = claim_json();
    value["destroySubjects"][1]["conditions"] = json!({ "var": "subject-b" });
    let doc = ClaimDocument::from_value(&value).unwrap();
    assert!(detect_cycles(&doc).is_empty());
}

#[test]
fn three_element_cycle_is_detected() {
    let mut value = claim_json();
    value["destroyConditions"][0]["conditions"] = json!({ "var": "action-1" });
    value["destroyActions"][0]["conditions"] = json!({ "var": "subject-a" });
    let doc = ClaimDocument::from_value(&value).unwrap();
    let cycles = detect_cycles(&doc);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 3);
}

fn ladder(n: usize) -> BTreeMap<String, std::collections::BTreeSet<String>> {
    (0..n)
        .map(|i| {
            let next = (i + 1..n.min(i + 3)).map(|j| format!("c{j:03}")).collect();
            (format!("c{i:03}"), next)
        })
        .collect()
}

#[test]
fn long_acyclic_ladder_has_no_cycles() {
    let conditions: Vec<serde_json::Value> = (0..300)
        .map(|i| {
            let refs: Vec<serde_json::Value> = (i + 1..300usize.min(i + 3))
                .map(|j| json!({ "var": format!("c{j:03}") }))
                .collect();
            let mut element = json!({
                "id": format!("c{i:03}"),
                "name": "std:fromPointInTime",
                "payload": {}
            });
            if !refs.is_empty() {
                element["conditions"] = json!({ "and": refs });
            }
            element
        })
        .collect();
    let mut value = claim_json();
    value["destroyConditions"] = json!(conditions);
    value["destroySubjects"][0]["conditions"] = json!({ "var": "c000" });
    let doc = ClaimDocument::from_value(&value).unwrap();
    assert!(detect_cycles(&doc).is_empty());
}

#[test]
fn back_edge_on_ladder_yields_only_its_cycles() {
    let mut graph = ladder(200);
    graph.get_mut("c199").unwrap().insert("c197".to_string());
    let cycles = find_cycles(&graph);
    assert_eq!(
        cycles,
        vec![
            vec!["c197".to_string(), "c198".to_string(), "c199".to_string()],
            vec!["c197".to_string(), "c199".to_string()],
        ]
    );
}

#[test]
fn dense_component_cycles_are_counted_exactly() {
    // complete digraph on 4 nodes: 6 two-cycles, 8 three-cycles, 6 four-cycles
    let names = ["a", "b", "c", "d"];
    let graph: BTreeMap<String, std::collections::BTreeSet<String>> = names
        .iter()
        .map(|n| {
            let others = names.iter().filter(|m| *m != n).map(|m| m.to_string()).collect();
            (n.to_string(), others)
        })
        .collect();
    let cycles = find_cycles(&graph);
    assert_eq!(cycles.len(), 20);
    let mut unique = cycles.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 20);
    assert!(cycles.iter().all(|c| c[0] == *c.iter().min().unwrap()));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display_messages() {
    let err = Error::reference_missing("destroy action references missing", vec!["x".into(), "y".into()]);
    assert_eq!(err.to_string(), "destroy action references missing: x, y");

    let err = Error::DeadlockDetected {
        cycles: vec![vec!["a".into(), "b".into()]],
    };
    assert_eq!(err.to_string(), "deadlocks in destroy claim found: a -> b");

    let err = Error::ClaimValidation {
        errors: vec![Error::invalid_argument("one"), Error::claim("two")],
    };
    assert_eq!(err.to_string(), "destroy claim validation failed (2 errors)");
    assert_eq!(err.validation_errors().len(), 2);
    assert!(Error::claim("x").validation_errors().is_empty());
}

#[test]
fn callback_errors_are_transparent() {
    let err: Error = anyhow::anyhow!("connector offline").into();
    assert_eq!(err.to_string(), "connector offline");
}
