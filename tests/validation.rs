//! End-to-end tests exercising `validate_document` against literal rule
//! documents and XML, the way a caller of this crate actually would.

use validex::{validate_document, EngineConfig, Status, Value};

fn run(rule_document: &str, xml: &str) -> validex::Report {
    validate_document(
        "doc.xml",
        rule_document,
        xml,
        "2026-07-26T00:00:00Z",
        EngineConfig::default(),
    )
    .unwrap()
}

#[test]
fn aggregation_with_map_scenario() {
    let rule_document = r#"{"validationSettings":[{"id":"total","description":"total>500","type":"computedComparison","severity":"error","comparison":{"operator":">","leftExpression":{"op":"sum","args":[{"op":"map","xpath":"//Item","inner_expression":{"op":"multiply","args":[{"op":"value","xpath":"@quantity","data_type":"decimal"},{"op":"value","xpath":"@price","data_type":"decimal"}]}}]},"rightExpression":{"op":"literal","literal_value":500}}}]}"#;
    let xml = r#"<root><Item quantity="3" price="100"/><Item quantity="2" price="150"/></root>"#;

    let report = run(rule_document, xml);

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[0].returned_value, Value::Decimal(600.0));
}

#[test]
fn dynamic_xpath_scenario() {
    let rule_document = r#"{
        "validationSettings": [
            {
                "id": "category-a-count",
                "type": "comparison",
                "expression": {
                    "op": "count",
                    "xpath_expression": {
                        "op": "concat",
                        "args": [
                            { "op": "literal", "literal_value": "//Item[@type='" },
                            { "op": "value", "xpath": "/root/@category" },
                            { "op": "literal", "literal_value": "']" }
                        ]
                    }
                },
                "operator": "==",
                "value": 2
            }
        ]
    }"#;
    let xml = r#"<root category="A"><Item type="A"/><Item type="A"/><Item type="B"/></root>"#;

    let report = run(rule_document, xml);

    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[0].returned_value, Value::Integer(2));
}

#[test]
fn per_node_validation_scenario() {
    let rule_document = r#"{
        "validationSettings": [
            {
                "id": "n-non-negative",
                "type": "nodeValidation",
                "nodesXpath": "//Record",
                "nodeValueExpression": { "op": "value", "xpath": "@n", "data_type": "integer" },
                "operator": ">=",
                "value": 0
            }
        ]
    }"#;
    let xml = r#"<root><Record n="0"/><Record n="-1"/><Record n="5"/></root>"#;

    let report = run(rule_document, xml);

    let outcome = &report.results[0];
    assert_eq!(outcome.status, Status::Fail);
    let statuses: Vec<Status> = outcome.node_results.iter().map(|n| n.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Pass]);
    let indices: Vec<usize> = outcome.node_results.iter().map(|n| n.node_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn determinism_same_inputs_yield_byte_identical_reports() {
    let rule_document = r#"{"validationSettings":[{"id":"has-items","type":"existence","expression":{"op":"value","xpath":"//Item"}}]}"#;
    let xml = r#"<root><Item/></root>"#;

    let a = run(rule_document, xml);
    let b = run(rule_document, xml);

    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn counting_law_total_equals_sum_of_buckets() {
    let rule_document = r#"{
        "validationSettings": [
            { "id": "has-items", "type": "existence", "expression": { "op": "value", "xpath": "//Item" } },
            { "id": "has-widgets", "type": "existence", "expression": { "op": "value", "xpath": "//Widget" } },
            { "id": "average-of-missing", "type": "existence", "expression": { "op": "average", "xpath": "//Missing" } }
        ]
    }"#;
    let xml = r#"<root><Item/></root>"#;

    let report = run(rule_document, xml);

    assert_eq!(report.summary.total, 3);
    assert_eq!(
        report.summary.total,
        report.summary.passed + report.summary.failed + report.summary.missing
    );
    assert_eq!(
        report.results.iter().map(|o| o.rule_id.as_str()).collect::<Vec<_>>(),
        vec!["has-items", "has-widgets", "average-of-missing"]
    );
}

#[test]
fn independence_removing_a_rule_only_removes_its_outcome() {
    let with_both = r#"{
        "validationSettings": [
            { "id": "has-items", "type": "existence", "expression": { "op": "value", "xpath": "//Item" } },
            { "id": "has-widgets", "type": "existence", "expression": { "op": "value", "xpath": "//Widget" } }
        ]
    }"#;
    let without_widgets = r#"{
        "validationSettings": [
            { "id": "has-items", "type": "existence", "expression": { "op": "value", "xpath": "//Item" } }
        ]
    }"#;
    let xml = r#"<root><Item/></root>"#;

    let full_report = run(with_both, xml);
    let trimmed_report = run(without_widgets, xml);

    assert_eq!(full_report.results.len(), 2);
    assert_eq!(trimmed_report.results.len(), 1);
    assert_eq!(trimmed_report.results[0].rule_id, "has-items");
    assert_eq!(trimmed_report.results[0].status, full_report.results[0].status);
}

#[test]
fn empty_node_set_boundaries() {
    let rule_document = r#"{
        "validationSettings": [
            { "id": "count-of-missing", "type": "comparison", "expression": { "op": "count", "xpath": "//Missing" }, "operator": "==", "value": 0 },
            { "id": "sum-of-missing", "type": "comparison", "expression": { "op": "sum", "xpath": "//Missing" }, "operator": "==", "value": 0.0 },
            { "id": "average-of-missing", "type": "existence", "expression": { "op": "average", "xpath": "//Missing" } },
            { "id": "value-of-missing", "type": "pattern", "expression": { "op": "value", "xpath": "//Missing" }, "pattern": ".*" }
        ]
    }"#;
    let xml = "<root/>";

    let report = run(rule_document, xml);

    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[1].status, Status::Pass);
    assert_eq!(report.results[2].status, Status::Fail);
    assert_eq!(report.results[3].status, Status::Missing);
}

#[test]
fn division_by_zero_fails_the_rule_not_the_run() {
    let rule_document = r#"{
        "validationSettings": [
            { "id": "zero-division", "type": "existence", "expression": { "op": "divide", "args": [{ "op": "literal", "literal_value": 1 }, { "op": "literal", "literal_value": 0 }] } }
        ]
    }"#;
    let report = run(rule_document, "<root/>");

    assert_eq!(report.results[0].status, Status::Fail);
    assert!(report.results[0].message.as_ref().unwrap().contains("division by zero"));
}

#[test]
fn regex_anchoring() {
    let rule_document = r#"{
        "validationSettings": [
            { "id": "unanchored", "type": "pattern", "expression": { "op": "literal", "literal_value": "hello world" }, "pattern": "ell" },
            { "id": "anchored", "type": "pattern", "expression": { "op": "literal", "literal_value": "hello world" }, "pattern": "^hello$" }
        ]
    }"#;
    let report = run(rule_document, "<root/>");

    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[1].status, Status::Fail);
}
