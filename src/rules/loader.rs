//! The rule-document loader (spec §4.F / §6).
//!
//! Deserializes the external `{"validationSettings": [...]}` document into
//! `Raw*` structs (kept deliberately looser than the internal
//! [`Rule`]/[`Expression`] trees), then validates and compiles them into
//! [`Rule`]s. A [`LoadError`] aborts before any rule runs; nothing here
//! ever reaches the engine half-built.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::expression::{AggregateSource, CompareOp, Expression, XPathSource};
use crate::rules::{ComputedComparison, Condition, NodeExpected, Rule, RuleKind, Severity};
use crate::value::{DataType, Value};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed rule document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("duplicate rule id {id:?}")]
    DuplicateId { id: String },

    #[error("rule {id:?}: unknown type {kind:?}")]
    UnknownRuleType { id: String, kind: String },

    #[error("rule {id:?}: unknown operator {op:?}")]
    UnknownOperator { id: String, op: String },

    #[error("rule {id:?}: requires exactly one of `xpath` or `xpath_expression`, found {found}")]
    AmbiguousXPathSource { id: String, found: &'static str },

    #[error("rule {id:?}: requires exactly one of `value` or `expectedValueExpression`, found {found}")]
    AmbiguousNodeExpected { id: String, found: &'static str },

    #[error("rule {id:?}: {kind} requires field `{field}`")]
    MissingField {
        id: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("rule {id:?}: invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        id: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("rule {id:?}: unknown comparison operator {op:?}")]
    UnknownComparisonOperator { id: String, op: String },

    #[error("rule {id:?}: unknown severity {severity:?}")]
    UnknownSeverity { id: String, severity: String },

    #[error("rule {id:?}: unknown dataType {data_type:?}")]
    UnknownDataType { id: String, data_type: String },

    #[error("condition on rule {id:?}: unknown type {kind:?}")]
    UnknownConditionType { id: String, kind: String },

    #[error("rule {id:?}: field `{field}` is not allowed on {kind}")]
    DisallowedField {
        id: String,
        kind: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(rename = "validationSettings")]
    validation_settings: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    xpath: Option<String>,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComputedComparison {
    operator: String,
    #[serde(rename = "leftExpression")]
    left_expression: Option<RawExpression>,
    #[serde(rename = "rightExpression")]
    right_expression: Option<RawExpression>,
    #[serde(rename = "lowerExpression")]
    lower_expression: Option<RawExpression>,
    #[serde(rename = "upperExpression")]
    upper_expression: Option<RawExpression>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_severity")]
    severity: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    conditions: Vec<RawCondition>,

    // existence / pattern / range / comparison
    #[serde(default)]
    expression: Option<RawExpression>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default, rename = "minValue")]
    min_value: Option<serde_json::Value>,
    #[serde(default, rename = "maxValue")]
    max_value: Option<serde_json::Value>,
    #[serde(default, rename = "dataType")]
    data_type: Option<String>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,

    // computedComparison
    #[serde(default)]
    comparison: Option<RawComputedComparison>,

    // nodeValidation
    #[serde(default, rename = "nodesXpath")]
    nodes_xpath: Option<String>,
    #[serde(default, rename = "nodeValueExpression")]
    node_value_expression: Option<RawExpression>,
    #[serde(default, rename = "expectedValueExpression")]
    expected_value_expression: Option<RawExpression>,
}

fn default_severity() -> String {
    "error".to_owned()
}

/// The raw, externally-facing expression shape (spec §3 "Expression").
/// Looser than [`Expression`] — every field is optional, and it's the
/// loader's job (not serde's) to reject a combination that doesn't fit
/// `op`.
#[derive(Debug, Deserialize)]
struct RawExpression {
    op: String,
    #[serde(default)]
    args: Option<Vec<RawExpression>>,
    #[serde(default)]
    xpath: Option<String>,
    #[serde(default, rename = "xpath_expression")]
    xpath_expression: Option<Box<RawExpression>>,
    #[serde(default, rename = "inner_expression")]
    inner_expression: Option<Box<RawExpression>>,
    #[serde(default, rename = "literal_value")]
    literal_value: Option<serde_json::Value>,
    #[serde(default, rename = "data_type")]
    data_type: Option<String>,
}

/// Parse and validate a rule document's JSON text into compiled [`Rule`]s.
pub fn load_rules(json: &str) -> Result<Vec<Rule>, LoadError> {
    let raw: RawDocument = serde_json::from_str(json)?;
    let mut seen_ids = HashSet::with_capacity(raw.validation_settings.len());
    let mut rules = Vec::with_capacity(raw.validation_settings.len());

    for raw_rule in raw.validation_settings {
        if !seen_ids.insert(raw_rule.id.clone()) {
            return Err(LoadError::DuplicateId { id: raw_rule.id });
        }
        rules.push(compile_rule(raw_rule)?);
    }

    Ok(rules)
}

fn compile_rule(raw: RawRule) -> Result<Rule, LoadError> {
    let id = raw.id;
    let severity = compile_severity(&id, &raw.severity)?;
    let conditions = raw
        .conditions
        .into_iter()
        .map(|c| compile_condition(&id, c))
        .collect::<Result<Vec<_>, _>>()?;

    check_rule_fields(&id, &raw)?;

    let kind = match raw.kind.as_str() {
        "existence" => RuleKind::Existence {
            expression: require_expression(&id, "existence", raw.expression)?,
        },
        "pattern" => {
            let expression = require_expression(&id, "pattern", raw.expression)?;
            let pattern_str = raw.pattern.ok_or_else(|| LoadError::MissingField {
                id: id.clone(),
                kind: "pattern",
                field: "pattern",
            })?;
            let pattern =
                Regex::new(&pattern_str).map_err(|source| LoadError::InvalidPattern {
                    id: id.clone(),
                    pattern: pattern_str,
                    source,
                })?;
            RuleKind::Pattern { expression, pattern }
        }
        "range" => {
            let expression = require_expression(&id, "range", raw.expression)?;
            let data_type = compile_data_type(
                &id,
                raw.data_type.as_deref().ok_or_else(|| LoadError::MissingField {
                    id: id.clone(),
                    kind: "range",
                    field: "dataType",
                })?,
            )?;
            let min = raw.min_value.map(json_to_value);
            let max = raw.max_value.map(json_to_value);
            RuleKind::Range {
                expression,
                data_type,
                min,
                max,
            }
        }
        "comparison" => {
            let expression = require_expression(&id, "comparison", raw.expression)?;
            let op = compile_operator(&id, "comparison", &raw.operator)?;
            let value = raw.value.map(json_to_value).ok_or_else(|| LoadError::MissingField {
                id: id.clone(),
                kind: "comparison",
                field: "value",
            })?;
            RuleKind::Comparison { expression, op, value }
        }
        "computedComparison" => {
            let comparison = raw.comparison.ok_or_else(|| LoadError::MissingField {
                id: id.clone(),
                kind: "computedComparison",
                field: "comparison",
            })?;
            RuleKind::ComputedComparison(compile_computed_comparison(&id, comparison)?)
        }
        "nodeValidation" => {
            let nodes_xpath = XPathSource::Static(raw.nodes_xpath.ok_or_else(|| {
                LoadError::MissingField {
                    id: id.clone(),
                    kind: "nodeValidation",
                    field: "nodesXpath",
                }
            })?);
            let node_value_expression = require_expression(
                &id,
                "nodeValidation",
                raw.node_value_expression,
            )?;
            let operator = match raw.operator {
                Some(ref op) => CompareOp::from_symbol(op).ok_or_else(|| {
                    LoadError::UnknownComparisonOperator {
                        id: id.clone(),
                        op: op.clone(),
                    }
                })?,
                None => CompareOp::Eq,
            };
            let expected = match (raw.value, raw.expected_value_expression) {
                (Some(v), None) => NodeExpected::Literal(json_to_value(v)),
                (None, Some(expr)) => NodeExpected::Expression(compile_expression(&id, expr)?),
                (None, None) => {
                    return Err(LoadError::AmbiguousNodeExpected {
                        id,
                        found: "neither",
                    })
                }
                (Some(_), Some(_)) => {
                    return Err(LoadError::AmbiguousNodeExpected { id, found: "both" })
                }
            };
            RuleKind::NodeValidation {
                nodes_xpath,
                node_value_expression,
                operator,
                expected,
            }
        }
        other => {
            return Err(LoadError::UnknownRuleType {
                id,
                kind: other.to_owned(),
            })
        }
    };

    Ok(Rule {
        id,
        description: raw.description,
        severity,
        kind,
        conditions,
    })
}

/// The rule-level fields besides `id`/`description`/`severity`/`type`/
/// `conditions`, which every kind may carry. Returns the names of those
/// present on `raw`.
fn rule_fields_present(raw: &RawRule) -> Vec<&'static str> {
    let mut present = Vec::new();
    if raw.expression.is_some() {
        present.push("expression");
    }
    if raw.pattern.is_some() {
        present.push("pattern");
    }
    if raw.min_value.is_some() {
        present.push("minValue");
    }
    if raw.max_value.is_some() {
        present.push("maxValue");
    }
    if raw.data_type.is_some() {
        present.push("dataType");
    }
    if raw.operator.is_some() {
        present.push("operator");
    }
    if raw.value.is_some() {
        present.push("value");
    }
    if raw.comparison.is_some() {
        present.push("comparison");
    }
    if raw.nodes_xpath.is_some() {
        present.push("nodesXpath");
    }
    if raw.node_value_expression.is_some() {
        present.push("nodeValueExpression");
    }
    if raw.expected_value_expression.is_some() {
        present.push("expectedValueExpression");
    }
    present
}

/// Reject fields that don't belong to `raw.kind` (spec §4.F). Unknown rule
/// types are left for [`compile_rule`]'s own match to report as
/// [`LoadError::UnknownRuleType`].
fn check_rule_fields(id: &str, raw: &RawRule) -> Result<(), LoadError> {
    let allowed: &[&str] = match raw.kind.as_str() {
        "existence" => &["expression"],
        "pattern" => &["expression", "pattern"],
        "range" => &["expression", "dataType", "minValue", "maxValue"],
        "comparison" => &["expression", "operator", "value"],
        "computedComparison" => &["comparison"],
        "nodeValidation" => &[
            "nodesXpath",
            "nodeValueExpression",
            "operator",
            "value",
            "expectedValueExpression",
        ],
        _ => return Ok(()),
    };

    for field in rule_fields_present(raw) {
        if !allowed.contains(&field) {
            return Err(LoadError::DisallowedField {
                id: id.to_owned(),
                kind: leak_rule_kind(&raw.kind),
                field,
            });
        }
    }
    Ok(())
}

fn leak_rule_kind(kind: &str) -> &'static str {
    match kind {
        "existence" => "existence",
        "pattern" => "pattern",
        "range" => "range",
        "comparison" => "comparison",
        "computedComparison" => "computedComparison",
        "nodeValidation" => "nodeValidation",
        _ => "rule",
    }
}

fn compile_condition(id: &str, raw: RawCondition) -> Result<Condition, LoadError> {
    match raw.kind.as_str() {
        "exists" => Ok(Condition::Exists {
            xpath: raw.xpath.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "exists",
                field: "xpath",
            })?,
        }),
        "attributeEquals" => Ok(Condition::AttributeEquals {
            xpath: raw.xpath.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "attributeEquals",
                field: "xpath",
            })?,
            attribute: raw.attribute.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "attributeEquals",
                field: "attribute",
            })?,
            value: raw.value.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "attributeEquals",
                field: "value",
            })?,
        }),
        other => Err(LoadError::UnknownConditionType {
            id: id.to_owned(),
            kind: other.to_owned(),
        }),
    }
}

fn compile_computed_comparison(
    id: &str,
    raw: RawComputedComparison,
) -> Result<ComputedComparison, LoadError> {
    if raw.operator == "between" {
        if raw.right_expression.is_some() {
            return Err(LoadError::DisallowedField {
                id: id.to_owned(),
                kind: "computedComparison.between",
                field: "rightExpression",
            });
        }
        let left = require_expression(id, "computedComparison", raw.left_expression)?;
        let lower = require_expression(id, "computedComparison", raw.lower_expression)?;
        let upper = require_expression(id, "computedComparison", raw.upper_expression)?;
        Ok(ComputedComparison::Between { left, lower, upper })
    } else {
        if raw.lower_expression.is_some() || raw.upper_expression.is_some() {
            return Err(LoadError::DisallowedField {
                id: id.to_owned(),
                kind: "computedComparison",
                field: "lowerExpression",
            });
        }
        let op = CompareOp::from_symbol(&raw.operator).ok_or_else(|| {
            LoadError::UnknownComparisonOperator {
                id: id.to_owned(),
                op: raw.operator.clone(),
            }
        })?;
        let left = require_expression(id, "computedComparison", raw.left_expression)?;
        let right = require_expression(id, "computedComparison", raw.right_expression)?;
        Ok(ComputedComparison::Binary { op, left, right })
    }
}

fn require_expression(
    id: &str,
    kind: &'static str,
    raw: Option<RawExpression>,
) -> Result<Expression, LoadError> {
    match raw {
        Some(expr) => compile_expression(id, expr),
        None => Err(LoadError::MissingField {
            id: id.to_owned(),
            kind,
            field: "expression",
        }),
    }
}

/// Resolve a rule-level `xpath`/`xpath_expression` pair into a single
/// [`XPathSource`] — the two are mutually exclusive (spec §9 Open Question
/// a).
fn compile_xpath_source(
    id: &str,
    xpath: Option<String>,
    xpath_expression: Option<Box<RawExpression>>,
) -> Result<XPathSource, LoadError> {
    match (xpath, xpath_expression) {
        (Some(x), None) => Ok(XPathSource::Static(x)),
        (None, Some(expr)) => Ok(XPathSource::Dynamic(Box::new(compile_expression(
            id, *expr,
        )?))),
        (None, None) => Err(LoadError::AmbiguousXPathSource {
            id: id.to_owned(),
            found: "neither",
        }),
        (Some(_), Some(_)) => Err(LoadError::AmbiguousXPathSource {
            id: id.to_owned(),
            found: "both",
        }),
    }
}

fn compile_expression(id: &str, raw: RawExpression) -> Result<Expression, LoadError> {
    match raw.op.as_str() {
        "literal" => {
            check_expression_fields(id, "literal", &raw, &["literal_value"])?;
            let json_value = raw.literal_value.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "literal",
                field: "literal_value",
            })?;
            Ok(Expression::Literal(json_to_value(json_value)))
        }
        "value" => {
            check_expression_fields(id, "value", &raw, &["xpath", "xpath_expression", "data_type"])?;
            let xpath = compile_xpath_source(id, raw.xpath, raw.xpath_expression)?;
            let data_type = raw
                .data_type
                .map(|dt| compile_data_type(id, &dt))
                .transpose()?;
            Ok(Expression::Value { xpath, data_type })
        }
        "count" => {
            check_expression_fields(id, "count", &raw, &["xpath", "xpath_expression"])?;
            Ok(Expression::Count {
                xpath: compile_xpath_source(id, raw.xpath, raw.xpath_expression)?,
            })
        }
        "sum" | "average" => {
            let kind = if raw.op == "sum" { "sum" } else { "average" };
            check_expression_fields(id, kind, &raw, &["xpath", "xpath_expression", "args"])?;
            compile_aggregate(id, raw)
        }
        "add" | "subtract" | "multiply" | "divide" => {
            check_expression_fields(id, leak_op(&raw.op), &raw, &["args"])?;
            let (left, right) = two_args(id, &raw.op, raw.args.unwrap_or_default())?;
            Ok(match raw.op.as_str() {
                "add" => Expression::Add(Box::new(left), Box::new(right)),
                "subtract" => Expression::Subtract(Box::new(left), Box::new(right)),
                "multiply" => Expression::Multiply(Box::new(left), Box::new(right)),
                _ => Expression::Divide(Box::new(left), Box::new(right)),
            })
        }
        "concat" => {
            check_expression_fields(id, "concat", &raw, &["args"])?;
            Ok(Expression::Concat(compile_args(id, raw.args)?))
        }
        "and" => {
            check_expression_fields(id, "and", &raw, &["args"])?;
            Ok(Expression::And(compile_args(id, raw.args)?))
        }
        "or" => {
            check_expression_fields(id, "or", &raw, &["args"])?;
            Ok(Expression::Or(compile_args(id, raw.args)?))
        }
        "not" => {
            check_expression_fields(id, "not", &raw, &["args"])?;
            let mut args = compile_args(id, raw.args)?.into_iter();
            let inner = args.next().ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "not",
                field: "args",
            })?;
            Ok(Expression::Not(Box::new(inner)))
        }
        "if" => {
            check_expression_fields(id, "if", &raw, &["args"])?;
            let mut args = compile_args(id, raw.args)?.into_iter();
            let condition = args.next().ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "if",
                field: "args[0]",
            })?;
            let then_branch = args.next().ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "if",
                field: "args[1]",
            })?;
            let else_branch = args.next().ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "if",
                field: "args[2]",
            })?;
            Ok(Expression::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            })
        }
        "map" => {
            check_expression_fields(id, "map", &raw, &["xpath", "xpath_expression", "inner_expression"])?;
            let xpath = compile_xpath_source(id, raw.xpath, raw.xpath_expression)?;
            let inner_raw = raw.inner_expression.ok_or_else(|| LoadError::MissingField {
                id: id.to_owned(),
                kind: "map",
                field: "inner_expression",
            })?;
            let inner = compile_expression(id, *inner_raw)?;
            Ok(Expression::Map {
                source: xpath,
                inner: Box::new(inner),
            })
        }
        symbol @ ("==" | "!=" | ">" | "<" | ">=" | "<=") => {
            check_expression_fields(id, leak_op(symbol), &raw, &["args"])?;
            let op = CompareOp::from_symbol(symbol).expect("matched symbol");
            let (left, right) = two_args(id, symbol, raw.args.unwrap_or_default())?;
            Ok(Expression::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
        other => Err(LoadError::UnknownOperator {
            id: id.to_owned(),
            op: other.to_owned(),
        }),
    }
}

/// The fields besides `op` an expression may carry. Returns the names of
/// those present on `raw`.
fn expression_fields_present(raw: &RawExpression) -> Vec<&'static str> {
    let mut present = Vec::new();
    if raw.args.is_some() {
        present.push("args");
    }
    if raw.xpath.is_some() {
        present.push("xpath");
    }
    if raw.xpath_expression.is_some() {
        present.push("xpath_expression");
    }
    if raw.inner_expression.is_some() {
        present.push("inner_expression");
    }
    if raw.literal_value.is_some() {
        present.push("literal_value");
    }
    if raw.data_type.is_some() {
        present.push("data_type");
    }
    present
}

/// Reject fields `op` doesn't use (spec §3: "each op permits exactly the
/// fields listed in §4.D").
fn check_expression_fields(
    id: &str,
    op: &'static str,
    raw: &RawExpression,
    allowed: &[&str],
) -> Result<(), LoadError> {
    for field in expression_fields_present(raw) {
        if !allowed.contains(&field) {
            return Err(LoadError::DisallowedField {
                id: id.to_owned(),
                kind: op,
                field,
            });
        }
    }
    Ok(())
}

/// `sum`/`average` accept either `xpath` (sum/average the string values of
/// matched nodes) or `args=[single array-producing expr]` (spec §4.D).
fn compile_aggregate(id: &str, raw: RawExpression) -> Result<Expression, LoadError> {
    let is_sum = raw.op == "sum";
    let source = if raw.xpath.is_some() || raw.xpath_expression.is_some() {
        AggregateSource::Xpath(compile_xpath_source(id, raw.xpath, raw.xpath_expression)?)
    } else {
        let mut args = raw.args.unwrap_or_default();
        let inner = args.pop().ok_or_else(|| LoadError::MissingField {
            id: id.to_owned(),
            kind: if is_sum { "sum" } else { "average" },
            field: "args",
        })?;
        AggregateSource::Array(Box::new(compile_expression(id, inner)?))
    };

    Ok(if is_sum {
        Expression::Sum { source }
    } else {
        Expression::Average { source }
    })
}

fn two_args(
    id: &str,
    op: &str,
    args: Vec<RawExpression>,
) -> Result<(Expression, Expression), LoadError> {
    let mut iter = args.into_iter();
    let left = iter.next().ok_or_else(|| LoadError::MissingField {
        id: id.to_owned(),
        kind: leak_op(op),
        field: "args[0]",
    })?;
    let right = iter.next().ok_or_else(|| LoadError::MissingField {
        id: id.to_owned(),
        kind: leak_op(op),
        field: "args[1]",
    })?;
    Ok((compile_expression(id, left)?, compile_expression(id, right)?))
}

/// Error variants carry `&'static str` op names for cheap `Clone`/`Display`;
/// loader-time failures are rare enough that leaking the tiny fixed set of
/// operator names is preferable to threading a lifetime through `LoadError`.
fn leak_op(op: &str) -> &'static str {
    match op {
        "add" => "add",
        "subtract" => "subtract",
        "multiply" => "multiply",
        "divide" => "divide",
        "==" => "==",
        "!=" => "!=",
        ">" => ">",
        "<" => "<",
        ">=" => ">=",
        "<=" => "<=",
        _ => "operator",
    }
}

fn compile_args(id: &str, args: Option<Vec<RawExpression>>) -> Result<Vec<Expression>, LoadError> {
    args.unwrap_or_default()
        .into_iter()
        .map(|raw| compile_expression(id, raw))
        .collect()
}

fn compile_operator(
    id: &str,
    kind: &'static str,
    operator: &Option<String>,
) -> Result<CompareOp, LoadError> {
    let symbol = operator.as_deref().ok_or_else(|| LoadError::MissingField {
        id: id.to_owned(),
        kind,
        field: "operator",
    })?;
    CompareOp::from_symbol(symbol).ok_or_else(|| LoadError::UnknownComparisonOperator {
        id: id.to_owned(),
        op: symbol.to_owned(),
    })
}

fn compile_severity(id: &str, severity: &str) -> Result<Severity, LoadError> {
    match severity {
        "error" => Ok(Severity::Error),
        "warning" => Ok(Severity::Warning),
        "info" => Ok(Severity::Info),
        other => Err(LoadError::UnknownSeverity {
            id: id.to_owned(),
            severity: other.to_owned(),
        }),
    }
}

fn compile_data_type(id: &str, data_type: &str) -> Result<DataType, LoadError> {
    match data_type {
        "string" => Ok(DataType::String),
        "integer" => Ok(DataType::Integer),
        "decimal" => Ok(DataType::Decimal),
        "date" => Ok(DataType::Date),
        other => Err(LoadError::UnknownDataType {
            id: id.to_owned(),
            data_type: other.to_owned(),
        }),
    }
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Decimal(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_existence_rule() {
        let json = r#"{
            "validationSettings": [
                { "id": "r1", "type": "existence", "expression": { "op": "value", "xpath": "//Item" } }
            ]
        }"#;
        let rules = load_rules(json).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(matches!(rules[0].kind, RuleKind::Existence { .. }));
        assert_eq!(rules[0].severity, Severity::Error);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"{
            "validationSettings": [
                { "id": "r1", "type": "existence", "expression": { "op": "value", "xpath": "//Item" } },
                { "id": "r1", "type": "existence", "expression": { "op": "value", "xpath": "//Other" } }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateId { .. }));
    }

    #[test]
    fn rejects_unknown_rule_type() {
        let json = r#"{
            "validationSettings": [
                { "id": "r1", "type": "bogusKind", "expression": { "op": "value", "xpath": "//Item" } }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::UnknownRuleType { .. }));
    }

    #[test]
    fn rejects_invalid_regex_pattern() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "pattern",
                    "expression": { "op": "value", "xpath": "//Item/@id" },
                    "pattern": "("
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::InvalidPattern { .. }));
    }

    #[test]
    fn rejects_both_xpath_and_xpath_expression() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "existence",
                    "expression": {
                        "op": "value",
                        "xpath": "//Item",
                        "xpath_expression": { "op": "literal", "literal_value": "//Item" }
                    }
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::AmbiguousXPathSource { .. }));
    }

    #[test]
    fn compiles_computed_comparison_with_aggregate_expressions() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "total",
                    "type": "computedComparison",
                    "comparison": {
                        "operator": ">",
                        "leftExpression": { "op": "count", "xpath": "//Item" },
                        "rightExpression": { "op": "literal", "literal_value": 100 }
                    }
                }
            ]
        }"#;
        let rules = load_rules(json).unwrap();
        assert!(matches!(rules[0].kind, RuleKind::ComputedComparison(_)));
    }

    #[test]
    fn compiles_between_computed_comparison() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "total",
                    "type": "computedComparison",
                    "comparison": {
                        "operator": "between",
                        "leftExpression": { "op": "count", "xpath": "//Item" },
                        "lowerExpression": { "op": "literal", "literal_value": 1 },
                        "upperExpression": { "op": "literal", "literal_value": 10 }
                    }
                }
            ]
        }"#;
        let rules = load_rules(json).unwrap();
        assert!(matches!(
            rules[0].kind,
            RuleKind::ComputedComparison(ComputedComparison::Between { .. })
        ));
    }

    #[test]
    fn rejects_between_comparison_carrying_a_right_expression() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "total",
                    "type": "computedComparison",
                    "comparison": {
                        "operator": "between",
                        "leftExpression": { "op": "count", "xpath": "//Item" },
                        "lowerExpression": { "op": "literal", "literal_value": 1 },
                        "upperExpression": { "op": "literal", "literal_value": 10 },
                        "rightExpression": { "op": "literal", "literal_value": 5 }
                    }
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::DisallowedField { field: "rightExpression", .. }));
    }

    #[test]
    fn rejects_node_validation_with_both_value_and_expected_expression() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "nodeValidation",
                    "nodesXpath": "//Record",
                    "nodeValueExpression": { "op": "value", "xpath": "@n", "data_type": "integer" },
                    "value": 0,
                    "expectedValueExpression": { "op": "literal", "literal_value": 0 }
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::AmbiguousNodeExpected { .. }));
    }

    #[test]
    fn rejects_literal_carrying_an_xpath() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "existence",
                    "expression": { "op": "literal", "literal_value": 1, "xpath": "//Item" }
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(err, LoadError::DisallowedField { field: "xpath", .. }));
    }

    #[test]
    fn rejects_count_carrying_an_inner_expression() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "existence",
                    "expression": {
                        "op": "count",
                        "xpath": "//Item",
                        "inner_expression": { "op": "literal", "literal_value": 1 }
                    }
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(
            err,
            LoadError::DisallowedField { field: "inner_expression", .. }
        ));
    }

    #[test]
    fn rejects_rule_level_field_disallowed_for_its_kind() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "existence",
                    "expression": { "op": "value", "xpath": "//Item" },
                    "pattern": "foo"
                }
            ]
        }"#;
        let err = load_rules(json).unwrap_err();
        assert!(matches!(
            err,
            LoadError::DisallowedField { kind: "existence", field: "pattern", .. }
        ));
    }

    #[test]
    fn compiles_node_validation_with_literal_expected_value() {
        let json = r#"{
            "validationSettings": [
                {
                    "id": "r1",
                    "type": "nodeValidation",
                    "nodesXpath": "//Record",
                    "nodeValueExpression": { "op": "value", "xpath": "@n", "data_type": "integer" },
                    "operator": ">=",
                    "value": 0
                }
            ]
        }"#;
        let rules = load_rules(json).unwrap();
        assert!(matches!(rules[0].kind, RuleKind::NodeValidation { .. }));
    }
}
