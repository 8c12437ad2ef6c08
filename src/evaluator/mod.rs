//! The recursive evaluator (spec §4.D).
//!
//! A single-threaded, context-threaded walk over [`Expression`]. Holds no
//! state of its own beyond the [`EvaluationContext`] it threads by value,
//! per spec §9's design note — nothing here mutates a global, and the
//! current context node never lives anywhere but the argument list.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::expression::{AggregateSource, CompareOp, Expression, XPathSource};
use crate::value::{CoercionError, DataType, Value};
use crate::xpath::{NodeRef, XPathError, XPathService, XPathValue};

/// Threaded through every recursive call: the parsed document plus the
/// node relative XPaths resolve against. Cheap to clone (an `Arc` and a
/// small string handle), and `map` is the only operator that ever rebinds
/// `context_node` — spec §3 EvaluationContext.
#[derive(Clone)]
pub struct EvaluationContext<D> {
    document: Arc<D>,
    context_node: NodeRef,
}

impl<D> EvaluationContext<D> {
    #[must_use]
    pub fn new(document: Arc<D>) -> Self {
        Self {
            document,
            context_node: NodeRef::root(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &D {
        &self.document
    }

    #[must_use]
    pub fn context_node(&self) -> &NodeRef {
        &self.context_node
    }

    /// A new context sharing the same document but rebound to `node` —
    /// used by `map` and by the rule engine's per-node iteration.
    #[must_use]
    pub fn with_node(&self, node: NodeRef) -> Self {
        Self {
            document: Arc::clone(&self.document),
            context_node: node,
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("division by zero in `{op}`")]
    DivideByZero { op: &'static str },

    #[error("`average` over an empty node-set has no value")]
    AverageOfEmpty,

    #[error("`{op}` requires operands of orderable, matching type (found {left} and {right})")]
    NotOrderable {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("xpathExpression for {context} did not resolve to a string: {reason}")]
    DynamicXPathNotString { context: &'static str, reason: String },
}

impl EvalError {
    /// Whether this failure should be reported as rule status `missing`
    /// rather than `fail` (spec §7): a value that was required but absent,
    /// as opposed to data that was present but the wrong shape.
    #[must_use]
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::Coercion(CoercionError::MissingValue { .. }))
    }
}

pub type EvalResult = Result<Value, EvalError>;

/// Resolve a static-or-dynamic XPath string (spec §4.D "Dynamic XPath").
fn resolve_xpath_string<S: XPathService>(
    source: &XPathSource,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<String, EvalError> {
    match source {
        XPathSource::Static(xpath) => Ok(xpath.clone()),
        XPathSource::Dynamic(expr) => {
            let resolved = evaluate(expr, ctx, service)?;
            resolved.coerce_string().map_err(|err| {
                EvalError::DynamicXPathNotString {
                    context: "xpathExpression",
                    reason: err.to_string(),
                }
            })
        }
    }
}

fn select_nodes<S: XPathService>(
    xpath: &str,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<Vec<NodeRef>, EvalError> {
    match service.evaluate(ctx.document(), ctx.context_node(), xpath)? {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        other => Ok(other_as_single_string_nodeset(other)),
    }
}

/// XPath expressions that don't actually select nodes (e.g. `string(...)`)
/// never reach `count`/`map`/aggregation in well-formed rule documents, but
/// returning an empty set instead of panicking keeps this a total function.
fn other_as_single_string_nodeset(_value: XPathValue) -> Vec<NodeRef> {
    Vec::new()
}

/// Evaluate `xpath` and return the string value of the first node in
/// document order, or `None` if nothing matched (spec §4.D `value`).
fn first_node_string<S: XPathService>(
    xpath: &str,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<Option<String>, EvalError> {
    match service.evaluate(ctx.document(), ctx.context_node(), xpath)? {
        XPathValue::NodeSet(nodes) => match nodes.first() {
            Some(node) => {
                let value = service.evaluate(ctx.document(), node, ".")?;
                Ok(Some(value.string_value()))
            }
            None => Ok(None),
        },
        other => Ok(Some(other.string_value())),
    }
}

fn numeric_strings_from_xpath<S: XPathService>(
    xpath: &str,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<Vec<f64>, EvalError> {
    let nodes = select_nodes(xpath, ctx, service)?;
    nodes
        .iter()
        .map(|node| {
            let text = service.evaluate(ctx.document(), node, ".")?.string_value();
            Value::String(text).coerce_decimal().map_err(EvalError::from)
        })
        .collect()
}

fn aggregate_inputs<S: XPathService>(
    source: &AggregateSource,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> Result<Vec<f64>, EvalError> {
    match source {
        AggregateSource::Xpath(xpath_source) => {
            let xpath = resolve_xpath_string::<S>(xpath_source, ctx, service)?;
            numeric_strings_from_xpath(&xpath, ctx, service)
        }
        AggregateSource::Array(expr) => {
            let value = evaluate(expr, ctx, service)?;
            let Value::Array(items) = value else {
                return Err(EvalError::Coercion(CoercionError::invalid(
                    "non-array",
                    DataType::Decimal,
                    "sum/average over `args` requires an array-producing expression",
                )));
            };
            items
                .iter()
                .map(|item| item.coerce_decimal().map_err(EvalError::from))
                .collect()
        }
    }
}

/// Recursively evaluate `expr` against `ctx`, invoking `service` for every
/// `xpath`/`xpathExpression` occurrence (spec §4.D).
pub fn evaluate<S: XPathService>(
    expr: &Expression,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
) -> EvalResult {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),

        Expression::Value { xpath, data_type } => {
            let xpath = resolve_xpath_string::<S>(xpath, ctx, service)?;
            let text = first_node_string(&xpath, ctx, service)?;
            match text {
                None => Ok(Value::Null),
                Some(text) => match data_type {
                    Some(dt) => Value::String(text).coerce_to(*dt).map_err(EvalError::from),
                    None => Ok(Value::String(text)),
                },
            }
        }

        Expression::Count { xpath } => {
            let xpath = resolve_xpath_string::<S>(xpath, ctx, service)?;
            let nodes = select_nodes(&xpath, ctx, service)?;
            Ok(Value::Integer(nodes.len() as i64))
        }

        Expression::Sum { source } => {
            let values = aggregate_inputs::<S>(source, ctx, service)?;
            Ok(Value::Decimal(values.iter().sum()))
        }

        Expression::Average { source } => {
            let values = aggregate_inputs::<S>(source, ctx, service)?;
            if values.is_empty() {
                return Err(EvalError::AverageOfEmpty);
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Ok(Value::Decimal(mean))
        }

        Expression::Add(a, b) => {
            binary_arith::<S>(a, b, ctx, service, i64::checked_add, |x, y| x + y)
        }
        Expression::Subtract(a, b) => {
            binary_arith::<S>(a, b, ctx, service, i64::checked_sub, |x, y| x - y)
        }
        Expression::Multiply(a, b) => {
            binary_arith::<S>(a, b, ctx, service, i64::checked_mul, |x, y| x * y)
        }
        Expression::Divide(a, b) => binary_numeric::<S>(a, b, ctx, service, "divide", |x, y| {
            if y == 0.0 {
                Err(EvalError::DivideByZero { op: "divide" })
            } else {
                Ok(x / y)
            }
        }),

        Expression::Concat(args) => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&evaluate(arg, ctx, service)?.concat_string());
            }
            Ok(Value::String(out))
        }

        Expression::And(args) => {
            for arg in args {
                if !evaluate(arg, ctx, service)?.truthiness() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }

        Expression::Or(args) => {
            for arg in args {
                if evaluate(arg, ctx, service)?.truthiness() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }

        Expression::Not(inner) => Ok(Value::Boolean(!evaluate(inner, ctx, service)?.truthiness())),

        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, ctx, service)?.truthiness() {
                evaluate(then_branch, ctx, service)
            } else {
                evaluate(else_branch, ctx, service)
            }
        }

        Expression::Compare { op, left, right } => {
            let left = evaluate(left, ctx, service)?;
            let right = evaluate(right, ctx, service)?;
            compare(*op, &left, &right)
        }

        Expression::Map { source, inner } => {
            let xpath = resolve_xpath_string::<S>(source, ctx, service)?;
            let nodes = select_nodes(&xpath, ctx, service)?;
            let mut out = Vec::with_capacity(nodes.len());
            for node in nodes {
                let node_ctx = ctx.with_node(node);
                out.push(evaluate(inner, &node_ctx, service)?);
            }
            Ok(Value::Array(out))
        }
    }
}

fn binary_numeric<S: XPathService>(
    a: &Expression,
    b: &Expression,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
    op: &'static str,
    f: impl FnOnce(f64, f64) -> Result<f64, EvalError>,
) -> EvalResult {
    let left = evaluate(a, ctx, service)?.coerce_decimal()?;
    let right = evaluate(b, ctx, service)?.coerce_decimal()?;
    f(left, right).map(Value::Decimal)
}

/// `add`/`subtract`/`multiply` close over Integer when both operands are
/// Integer and the operation doesn't overflow (spec §4.D: "Decimal unless
/// both inputs Integer and the operation is closed over Integer"); any
/// other combination, or an overflowing Integer op, promotes to Decimal.
fn binary_arith<S: XPathService>(
    a: &Expression,
    b: &Expression,
    ctx: &EvaluationContext<S::Document>,
    service: &S,
    int_op: impl FnOnce(i64, i64) -> Option<i64>,
    float_op: impl FnOnce(f64, f64) -> f64,
) -> EvalResult {
    let left = evaluate(a, ctx, service)?;
    let right = evaluate(b, ctx, service)?;

    if let (Value::Integer(x), Value::Integer(y)) = (&left, &right) {
        if let Some(result) = int_op(*x, *y) {
            return Ok(Value::Integer(result));
        }
    }

    let left = left.coerce_decimal()?;
    let right = right.coerce_decimal()?;
    Ok(Value::Decimal(float_op(left, right)))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> EvalResult {
    let result = match op {
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
    };
    Ok(Value::Boolean(result))
}

impl<D> fmt::Debug for EvaluationContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("context_node", &self.context_node)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::sxd::SxdXPathService;

    fn eval(xml: &str, expr: &Expression) -> EvalResult {
        let service = SxdXPathService::new();
        let document = Arc::new(service.load(xml).unwrap());
        let ctx = EvaluationContext::new(document);
        evaluate(expr, &ctx, &service)
    }

    #[test]
    fn aggregation_with_map_scenario() {
        let expr = Expression::Sum {
            source: AggregateSource::Array(Box::new(Expression::Map {
                source: XPathSource::Static("//Item".into()),
                inner: Box::new(Expression::Multiply(
                    Box::new(Expression::Value {
                        xpath: XPathSource::Static("@quantity".into()),
                        data_type: Some(DataType::Decimal),
                    }),
                    Box::new(Expression::Value {
                        xpath: XPathSource::Static("@price".into()),
                        data_type: Some(DataType::Decimal),
                    }),
                )),
            })),
        };

        let xml = r#"<root><Item quantity="3" price="100"/><Item quantity="2" price="150"/></root>"#;
        let result = eval(xml, &expr).unwrap();
        assert_eq!(result, Value::Decimal(600.0));
    }

    #[test]
    fn dynamic_xpath_scenario() {
        let expr = Expression::Count {
            xpath: XPathSource::Dynamic(Box::new(Expression::Concat(vec![
                Expression::literal("//Item[@type='"),
                Expression::Value {
                    xpath: XPathSource::Static("/root/@category".into()),
                    data_type: None,
                },
                Expression::literal("']"),
            ]))),
        };

        let xml = r#"<root category="A"><Item type="A"/><Item type="A"/><Item type="B"/></root>"#;
        let result = eval(xml, &expr).unwrap();
        assert_eq!(result, Value::Integer(2));
    }

    #[test]
    fn map_preserves_document_order_and_length() {
        let expr = Expression::Map {
            source: XPathSource::Static("//Item".into()),
            inner: Box::new(Expression::Value {
                xpath: XPathSource::Static("@id".into()),
                data_type: None,
            }),
        };

        let xml = r#"<root><Item id="a"/><Item id="b"/><Item id="c"/></root>"#;
        let result = eval(xml, &expr).unwrap();
        assert_eq!(
            result,
            Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String("c".into()),
            ])
        );
    }

    #[test]
    fn value_with_no_match_is_null() {
        let expr = Expression::Value {
            xpath: XPathSource::Static("//Missing".into()),
            data_type: None,
        };
        let result = eval("<root/>", &expr).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn divide_by_zero_fails_cleanly() {
        let expr = Expression::Divide(
            Box::new(Expression::literal(1_i64)),
            Box::new(Expression::literal(0_i64)),
        );
        let err = eval("<root/>", &expr).unwrap_err();
        assert!(matches!(err, EvalError::DivideByZero { .. }));
    }

    #[test]
    fn average_of_empty_nodeset_fails() {
        let expr = Expression::Average {
            source: AggregateSource::Xpath(XPathSource::Static("//Missing".into())),
        };
        let err = eval("<root/>", &expr).unwrap_err();
        assert!(matches!(err, EvalError::AverageOfEmpty));
    }

    #[test]
    fn sum_of_empty_nodeset_is_zero() {
        let expr = Expression::Sum {
            source: AggregateSource::Xpath(XPathSource::Static("//Missing".into())),
        };
        let result = eval("<root/>", &expr).unwrap();
        assert_eq!(result, Value::Decimal(0.0));
    }

    #[test]
    fn if_follows_truthiness_law() {
        let expr = Expression::If {
            condition: Box::new(Expression::literal(true)),
            then_branch: Box::new(Expression::literal(1_i64)),
            else_branch: Box::new(Expression::literal(2_i64)),
        };
        assert_eq!(eval("<root/>", &expr).unwrap(), Value::Integer(1));
    }

    #[test]
    fn arithmetic_stays_integer_when_both_operands_are_integer() {
        let add = Expression::Add(
            Box::new(Expression::literal(2_i64)),
            Box::new(Expression::literal(3_i64)),
        );
        assert_eq!(eval("<root/>", &add).unwrap(), Value::Integer(5));

        let subtract = Expression::Subtract(
            Box::new(Expression::literal(5_i64)),
            Box::new(Expression::literal(3_i64)),
        );
        assert_eq!(eval("<root/>", &subtract).unwrap(), Value::Integer(2));

        let multiply = Expression::Multiply(
            Box::new(Expression::literal(4_i64)),
            Box::new(Expression::literal(6_i64)),
        );
        assert_eq!(eval("<root/>", &multiply).unwrap(), Value::Integer(24));
    }

    #[test]
    fn arithmetic_promotes_to_decimal_when_either_operand_is_not_integer() {
        let expr = Expression::Add(
            Box::new(Expression::literal(2_i64)),
            Box::new(Expression::literal(0.5)),
        );
        assert_eq!(eval("<root/>", &expr).unwrap(), Value::Decimal(2.5));
    }

    #[test]
    fn integer_multiply_overflow_promotes_to_decimal() {
        let expr = Expression::Multiply(
            Box::new(Expression::literal(i64::MAX)),
            Box::new(Expression::literal(2_i64)),
        );
        assert_eq!(
            eval("<root/>", &expr).unwrap(),
            Value::Decimal(i64::MAX as f64 * 2.0)
        );
    }

    #[test]
    fn divide_always_yields_decimal_even_for_integer_operands() {
        let expr = Expression::Divide(
            Box::new(Expression::literal(6_i64)),
            Box::new(Expression::literal(3_i64)),
        );
        assert_eq!(eval("<root/>", &expr).unwrap(), Value::Decimal(2.0));
    }
}
