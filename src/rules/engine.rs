//! The rule engine (spec §4.E / §5).
//!
//! Runs every [`Rule`] against a parsed document and produces one
//! [`Outcome`] per rule — except `nodeValidation`, which loops the
//! evaluator over a selected node-set with context rebound per node and
//! still contributes exactly one [`Outcome`] (with one [`NodeOutcome`] per
//! node) to the result. `run_files` fans out across documents with
//! `rayon` when the `parallel` feature is enabled; within one document,
//! rules always run sequentially — they share no state that would benefit
//! from further splitting (spec §5).

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::evaluator::{evaluate, EvalError, EvaluationContext};
use crate::expression::{CompareOp, Expression, XPathSource};
use crate::report::{NodeOutcome, Outcome, Status};
use crate::rules::{ComputedComparison, Condition, NodeExpected, Rule, RuleKind};
use crate::value::Value;
use crate::xpath::{XPathService, XPathValue};

/// Engine-wide knobs that don't belong to any one rule (spec §9 Open
/// Question). Grounded on the teacher's `CompileConfig` — a small,
/// `Default`-derivable settings struct threaded into the evaluation path
/// rather than scattered as free function parameters.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Run independent files concurrently. Only takes effect when this
    /// crate is built with the `parallel` feature.
    pub parallel: bool,
}

pub struct RuleEngine<'a, S> {
    service: &'a S,
    config: EngineConfig,
}

impl<'a, S: XPathService> RuleEngine<'a, S> {
    #[must_use]
    pub fn new(service: &'a S, config: EngineConfig) -> Self {
        Self { service, config }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every rule against a single parsed document (spec §4.E). The
    /// document is `Arc`-wrapped by the caller once per file and shared
    /// cheaply across every rule and every node context. A rule whose
    /// conditions don't all hold is skipped and produces no outcome at all
    /// (spec §3 "Condition").
    #[instrument(skip(self, document, rules))]
    pub fn run_file(
        &self,
        document: &Arc<S::Document>,
        rules: &[Rule],
        file_path: &str,
    ) -> Vec<Outcome> {
        rules
            .iter()
            .filter_map(|rule| self.run_rule(document, rule, file_path))
            .collect()
    }

    fn run_rule(&self, document: &Arc<S::Document>, rule: &Rule, file_path: &str) -> Option<Outcome> {
        let root_ctx = EvaluationContext::new(Arc::clone(document));

        for condition in &rule.conditions {
            if !self.condition_holds(&root_ctx, condition) {
                debug!(rule = %rule.id, "condition not satisfied, skipping rule");
                return None;
            }
        }

        Some(self.evaluate_kind(file_path, rule, &root_ctx))
    }

    /// Conditions are evaluated with root context; an evaluation error is
    /// treated as "not satisfied" (spec §7), never propagated.
    fn condition_holds(
        &self,
        root_ctx: &EvaluationContext<S::Document>,
        condition: &Condition,
    ) -> bool {
        match condition {
            Condition::Exists { xpath } => matches!(
                self.service.evaluate(root_ctx.document(), root_ctx.context_node(), xpath),
                Ok(XPathValue::NodeSet(nodes)) if !nodes.is_empty()
            ),
            Condition::AttributeEquals {
                xpath,
                attribute,
                value,
            } => {
                let Ok(XPathValue::NodeSet(nodes)) =
                    self.service.evaluate(root_ctx.document(), root_ctx.context_node(), xpath)
                else {
                    return false;
                };
                nodes.iter().any(|node| {
                    self.service
                        .evaluate(root_ctx.document(), node, &format!("@{attribute}"))
                        .map(|v| v.string_value() == *value)
                        .unwrap_or(false)
                })
            }
        }
    }

    fn evaluate_kind(
        &self,
        file_path: &str,
        rule: &Rule,
        root_ctx: &EvaluationContext<S::Document>,
    ) -> Outcome {
        match &rule.kind {
            RuleKind::Existence { expression } => {
                match evaluate(expression, root_ctx, self.service) {
                    Ok(value) => {
                        let status = if value.truthiness() { Status::Pass } else { Status::Fail };
                        self.outcome(file_path, rule, status, value, Some(Value::Boolean(true)), None)
                    }
                    Err(err) => self.outcome_error(file_path, rule, &err),
                }
            }

            RuleKind::Pattern { expression, pattern } => {
                match evaluate(expression, root_ctx, self.service) {
                    Ok(value) => match value.coerce_string() {
                        Ok(text) => {
                            let status = if pattern.is_match(&text) { Status::Pass } else { Status::Fail };
                            self.outcome(
                                file_path,
                                rule,
                                status,
                                value,
                                Some(Value::String(pattern.as_str().to_owned())),
                                None,
                            )
                        }
                        Err(err) => self.outcome_error(file_path, rule, &EvalError::from(err)),
                    },
                    Err(err) => self.outcome_error(file_path, rule, &err),
                }
            }

            RuleKind::Range {
                expression,
                data_type,
                min,
                max,
            } => match evaluate(expression, root_ctx, self.service) {
                Ok(value) => match value.coerce_to(*data_type) {
                    Ok(coerced) => {
                        let above_min = min
                            .as_ref()
                            .map_or(true, |m| is_ge(&coerced, m));
                        let below_max = max
                            .as_ref()
                            .map_or(true, |m| is_le(&coerced, m));
                        let status = if above_min && below_max { Status::Pass } else { Status::Fail };
                        let expected = Some(Value::Array(
                            [min.clone(), max.clone()].into_iter().flatten().collect(),
                        ));
                        self.outcome(file_path, rule, status, coerced, expected, None)
                    }
                    Err(err) => self.outcome_error(file_path, rule, &EvalError::from(err)),
                },
                Err(err) => self.outcome_error(file_path, rule, &err),
            },

            RuleKind::Comparison { expression, op, value } => {
                match evaluate(expression, root_ctx, self.service) {
                    Ok(result) => match compare(*op, &result, value) {
                        Ok(passed) => {
                            let status = if passed { Status::Pass } else { Status::Fail };
                            self.outcome(file_path, rule, status, result, Some(value.clone()), None)
                        }
                        Err(err) => self.outcome_error(file_path, rule, &err),
                    },
                    Err(err) => self.outcome_error(file_path, rule, &err),
                }
            }

            RuleKind::ComputedComparison(comparison) => {
                self.evaluate_computed_comparison(file_path, rule, root_ctx, comparison)
            }

            RuleKind::NodeValidation {
                nodes_xpath,
                node_value_expression,
                operator,
                expected,
            } => self.evaluate_node_validation(
                file_path,
                rule,
                root_ctx,
                nodes_xpath,
                node_value_expression,
                *operator,
                expected,
            ),
        }
    }

    fn evaluate_computed_comparison(
        &self,
        file_path: &str,
        rule: &Rule,
        root_ctx: &EvaluationContext<S::Document>,
        comparison: &ComputedComparison,
    ) -> Outcome {
        match comparison {
            ComputedComparison::Binary { op, left, right } => {
                match (
                    evaluate(left, root_ctx, self.service),
                    evaluate(right, root_ctx, self.service),
                ) {
                    (Ok(left_value), Ok(right_value)) => match compare(*op, &left_value, &right_value) {
                        Ok(passed) => {
                            let status = if passed { Status::Pass } else { Status::Fail };
                            self.outcome(
                                file_path,
                                rule,
                                status,
                                left_value,
                                Some(right_value),
                                None,
                            )
                        }
                        Err(err) => self.outcome_error(file_path, rule, &err),
                    },
                    (Err(err), _) | (_, Err(err)) => self.outcome_error(file_path, rule, &err),
                }
            }
            ComputedComparison::Between { left, lower, upper } => {
                match (
                    evaluate(left, root_ctx, self.service),
                    evaluate(lower, root_ctx, self.service),
                    evaluate(upper, root_ctx, self.service),
                ) {
                    (Ok(left_value), Ok(lower_value), Ok(upper_value)) => {
                        match (left_value.cmp_typed(&lower_value), left_value.cmp_typed(&upper_value)) {
                            (Some(lo), Some(hi)) => {
                                let passed = lo.is_ge() && hi.is_le();
                                let status = if passed { Status::Pass } else { Status::Fail };
                                let expected = Some(Value::Array(vec![lower_value, upper_value]));
                                self.outcome(file_path, rule, status, left_value, expected, None)
                            }
                            _ => self.outcome_error(
                                file_path,
                                rule,
                                &EvalError::NotOrderable {
                                    op: "between",
                                    left: left_value.type_name(),
                                    right: lower_value.type_name(),
                                },
                            ),
                        }
                    }
                    (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => {
                        self.outcome_error(file_path, rule, &err)
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_node_validation(
        &self,
        file_path: &str,
        rule: &Rule,
        root_ctx: &EvaluationContext<S::Document>,
        nodes_xpath: &XPathSource,
        node_value_expression: &Expression,
        operator: CompareOp,
        expected: &NodeExpected,
    ) -> Outcome {
        let xpath_string = match resolve_xpath(nodes_xpath, root_ctx, self.service) {
            Ok(s) => s,
            Err(err) => return self.outcome_error(file_path, rule, &err),
        };

        let nodes = match self
            .service
            .evaluate(root_ctx.document(), root_ctx.context_node(), &xpath_string)
        {
            Ok(XPathValue::NodeSet(nodes)) => nodes,
            Ok(_) => Vec::new(),
            Err(err) => return self.outcome_error(file_path, rule, &EvalError::from(err)),
        };

        let mut node_results = Vec::with_capacity(nodes.len());
        let mut actual_values = Vec::with_capacity(nodes.len());

        for (index, node) in nodes.iter().enumerate() {
            let node_ctx = root_ctx.with_node(node.clone());
            let node_path = self.service.absolute_path(root_ctx.document(), node);

            let (status, actual, expected_value, message) =
                match evaluate(node_value_expression, &node_ctx, self.service) {
                    Ok(actual) => {
                        let expected_value = match expected {
                            NodeExpected::Literal(v) => Ok(v.clone()),
                            NodeExpected::Expression(expr) => evaluate(expr, &node_ctx, self.service),
                        };
                        match expected_value {
                            Ok(expected_value) => match compare(operator, &actual, &expected_value) {
                                Ok(true) => (Status::Pass, actual, expected_value, None),
                                Ok(false) => (Status::Fail, actual, expected_value, None),
                                Err(err) => (
                                    Status::Fail,
                                    actual,
                                    expected_value,
                                    Some(err.to_string()),
                                ),
                            },
                            Err(err) => {
                                let status = if err.is_missing_data() { Status::Missing } else { Status::Fail };
                                (status, actual, Value::Null, Some(err.to_string()))
                            }
                        }
                    }
                    Err(err) => {
                        let status = if err.is_missing_data() { Status::Missing } else { Status::Fail };
                        (status, Value::Null, Value::Null, Some(err.to_string()))
                    }
                };

            actual_values.push(actual.clone());
            node_results.push(NodeOutcome {
                node_index: index,
                node_xpath: node_path,
                actual_value: actual,
                expected_value,
                status,
                message,
            });
        }

        let overall_status = if node_results.iter().all(|n| n.status == Status::Pass) {
            Status::Pass
        } else if node_results.iter().any(|n| n.status == Status::Fail) {
            Status::Fail
        } else {
            Status::Missing
        };

        Outcome {
            rule_id: rule.id.clone(),
            file_path: file_path.to_owned(),
            status: overall_status,
            returned_value: Value::Array(actual_values),
            expected_value: None,
            message: None,
            severity: rule.severity,
            node_results,
        }
    }

    fn outcome(
        &self,
        file_path: &str,
        rule: &Rule,
        status: Status,
        returned_value: Value,
        expected_value: Option<Value>,
        message: Option<String>,
    ) -> Outcome {
        Outcome {
            rule_id: rule.id.clone(),
            file_path: file_path.to_owned(),
            status,
            returned_value,
            expected_value,
            message,
            severity: rule.severity,
            node_results: Vec::new(),
        }
    }

    fn outcome_error(&self, file_path: &str, rule: &Rule, err: &EvalError) -> Outcome {
        warn!(rule = %rule.id, error = %err, "rule evaluation failed");
        let status = if err.is_missing_data() { Status::Missing } else { Status::Fail };
        self.outcome(file_path, rule, status, Value::Null, None, Some(err.to_string()))
    }
}

fn resolve_xpath<S: XPathService>(
    xpath: &XPathSource,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<String, EvalError> {
    match xpath {
        XPathSource::Static(s) => Ok(s.clone()),
        XPathSource::Dynamic(expr) => evaluate(expr, ctx, service)?
            .coerce_string()
            .map_err(EvalError::from),
    }
}

fn is_ge(value: &Value, bound: &Value) -> bool {
    matches!(value.cmp_typed(bound), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
}

fn is_le(value: &Value, bound: &Value) -> bool {
    matches!(value.cmp_typed(bound), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    Ok(match op {
        CompareOp::Eq => left.eq_typed(right),
        CompareOp::Ne => !left.eq_typed(right),
        CompareOp::Gt | CompareOp::Lt | CompareOp::Ge | CompareOp::Le => {
            let ordering = left.cmp_typed(right).ok_or_else(|| EvalError::NotOrderable {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            })?;
            match op {
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }
        }
    })
}

/// Fan out `run_file` across independently-loaded documents (spec §5).
/// Each file is `Arc`-wrapped once by the caller; with the `parallel`
/// feature on and [`EngineConfig::parallel`] set, files run concurrently
/// via `rayon` while each file's own rules still run sequentially.
#[cfg(feature = "parallel")]
pub fn run_files<S: XPathService + Sync>(
    service: &S,
    config: &EngineConfig,
    files: &[(String, Arc<S::Document>)],
    rules: &[Rule],
) -> Vec<Outcome>
where
    S::Document: Sync,
{
    use rayon::prelude::*;

    let engine = RuleEngine::new(service, config.clone());
    if config.parallel {
        files
            .par_iter()
            .flat_map(|(path, doc)| engine.run_file(doc, rules, path))
            .collect()
    } else {
        files
            .iter()
            .flat_map(|(path, doc)| engine.run_file(doc, rules, path))
            .collect()
    }
}

/// Sequential fallback used when the `parallel` feature is not compiled in.
#[cfg(not(feature = "parallel"))]
pub fn run_files<S: XPathService>(
    service: &S,
    config: &EngineConfig,
    files: &[(String, Arc<S::Document>)],
    rules: &[Rule],
) -> Vec<Outcome> {
    let engine = RuleEngine::new(service, config.clone());
    files
        .iter()
        .flat_map(|(path, doc)| engine.run_file(doc, rules, path))
        .collect()
}
