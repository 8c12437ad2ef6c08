//! A tree-walking rule engine for validating XML documents against a
//! declarative, XPath-driven rule language.
//!
//! An [`xpath::XPathService`] resolves node-sets and scalar values out of a
//! parsed document; an [`expression::Expression`] tree — the compiled form
//! of a rule document's condition/value expressions — is walked by
//! [`evaluator::evaluate`]; [`rules::engine::RuleEngine`] drives that walk
//! once per [`rules::Rule`] and folds the per-node results into a
//! [`report::Report`] via [`report::ReportAssembler`].

#![deny(unreachable_pub)]
#![deny(unused_extern_crates)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

pub mod evaluator;
pub mod expression;
pub mod report;
pub mod rules;
pub mod value;
pub mod xpath;

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

pub use evaluator::{EvalError, EvaluationContext};
pub use expression::Expression;
pub use report::{NodeOutcome, Outcome, Report, ReportAssembler, Status};
pub use rules::engine::{EngineConfig, RuleEngine};
pub use rules::loader::{load_rules, LoadError};
pub use rules::{Rule, RuleKind, Severity};
pub use value::{CoercionError, DataType, Value};
pub use xpath::{sxd::SxdXPathService, NodeRef, XPathError, XPathService, XPathValue};

/// The top-level failure modes a caller driving a full validation run can
/// see (spec §7): a malformed rule document aborts before any rule runs, a
/// malformed input document aborts that one file before any rule runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("failed to load rule document: {0}")]
    Rules(#[from] LoadError),

    #[error("failed to parse input document: {0}")]
    Document(#[from] XPathError),
}

/// Parse `rule_document_json` and `xml`, run every rule, and assemble a
/// finished [`Report`]. Convenience entry point wiring together
/// [`load_rules`], [`SxdXPathService`], and [`RuleEngine`] for the common
/// single-file case; callers validating many files should load the rule
/// document once and reuse it across [`RuleEngine::run_file`] calls.
#[instrument(skip(rule_document_json, xml))]
pub fn validate_document(
    file_path: impl Into<String>,
    rule_document_json: &str,
    xml: &str,
    timestamp: impl Into<String>,
    config: EngineConfig,
) -> Result<Report, ValidationError> {
    let rules = load_rules(rule_document_json)?;
    let service = SxdXPathService::new();
    let document = Arc::new(service.load(xml)?);
    let file_path = file_path.into();

    let engine = RuleEngine::new(&service, config);
    let outcomes = engine.run_file(&document, &rules, &file_path);

    Ok(ReportAssembler::assemble(
        timestamp.into(),
        vec![file_path],
        Vec::new(),
        outcomes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_existence_and_node_validation_rules() {
        let rule_document = r#"{
            "validationSettings": [
                {
                    "id": "has-items",
                    "type": "existence",
                    "expression": { "op": "value", "xpath": "//Item" }
                },
                {
                    "id": "quantity-non-negative",
                    "type": "nodeValidation",
                    "nodesXpath": "//Item",
                    "nodeValueExpression": { "op": "value", "xpath": "@quantity", "data_type": "integer" },
                    "operator": ">=",
                    "value": 0
                }
            ]
        }"#;

        let xml = r#"<root><Item quantity="3"/><Item quantity="-1"/></root>"#;

        let report = validate_document(
            "order.xml",
            rule_document,
            xml,
            "2026-07-26T00:00:00Z",
            EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);

        let node_outcome = report
            .results
            .iter()
            .find(|o| o.rule_id == "quantity-non-negative")
            .unwrap();
        assert_eq!(node_outcome.status, Status::Fail);
        assert_eq!(node_outcome.node_results.len(), 2);
        assert_eq!(node_outcome.node_results[0].status, Status::Pass);
        assert_eq!(node_outcome.node_results[1].status, Status::Fail);
    }

    #[test]
    fn malformed_rule_document_aborts_before_any_rule_runs() {
        let err = validate_document(
            "order.xml",
            "{ not json",
            "<root/>",
            "2026-07-26T00:00:00Z",
            EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Rules(_)));
    }

    #[test]
    fn condition_gated_rule_is_skipped_when_condition_is_false() {
        let rule_document = r#"{
            "validationSettings": [
                {
                    "id": "only-if-present",
                    "type": "existence",
                    "expression": { "op": "value", "xpath": "//Missing" },
                    "conditions": [
                        { "type": "exists", "xpath": "//Missing" }
                    ]
                }
            ]
        }"#;
        let report = validate_document(
            "order.xml",
            rule_document,
            "<root/>",
            "2026-07-26T00:00:00Z",
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.summary.total, 0);
    }
}
