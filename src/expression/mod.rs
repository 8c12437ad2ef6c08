//! The expression AST (spec §3 / §4.C).
//!
//! A closed tagged sum over the DSL's operators. The evaluator (in
//! [`crate::evaluator`]) is a single recursive match over this enum — per
//! spec §9's design note, expressions are not modeled as a trait-object
//! hierarchy, because the op set is closed and will never grow at runtime.

use std::fmt;

use crate::value::{DataType, Value};

/// Either a static XPath string, or an expression that must resolve to a
/// string at evaluation time (spec §4.D, "dynamic XPath").
#[derive(Debug, Clone, PartialEq)]
pub enum XPathSource {
    Static(String),
    Dynamic(Box<Expression>),
}

impl fmt::Display for XPathSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(xpath) => write!(f, "{xpath:?}"),
            Self::Dynamic(expr) => write!(f, "xpathExpression({expr})"),
        }
    }
}

/// `sum`/`average` accept either an XPath selecting nodes whose string
/// values are summed, or a single argument expression that must resolve to
/// an [`Array`](Value::Array).
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateSource {
    Xpath(XPathSource),
    Array(Box<Expression>),
}

/// The six comparison operators shared by `==`/`!=`/`>`/`<`/`>=`/`<=`,
/// `comparison` rules, and `computedComparison` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            _ => return None,
        })
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A node in the expression tree (spec §3 "Expression"). Each variant here
/// carries exactly the fields its op permits, so malformed field
/// combinations (e.g. `xpath` and `xpathExpression` both set) simply
/// cannot be constructed — the loader (§4.F) is where the raw document's
/// looser shape gets funneled down to this one.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Value {
        xpath: XPathSource,
        data_type: Option<DataType>,
    },
    Count {
        xpath: XPathSource,
    },
    Sum {
        source: AggregateSource,
    },
    Average {
        source: AggregateSource,
    },
    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Concat(Vec<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    If {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Map {
        source: XPathSource,
        inner: Box<Expression>,
    },
}

impl Expression {
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// The op tag as it appears in the external rule-document schema.
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Value { .. } => "value",
            Self::Count { .. } => "count",
            Self::Sum { .. } => "sum",
            Self::Average { .. } => "average",
            Self::Add(..) => "add",
            Self::Subtract(..) => "subtract",
            Self::Multiply(..) => "multiply",
            Self::Divide(..) => "divide",
            Self::Concat(_) => "concat",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
            Self::If { .. } => "if",
            Self::Compare { op, .. } => op.symbol(),
            Self::Map { .. } => "map",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "literal({value:?})"),
            Self::Value { xpath, data_type } => {
                write!(f, "value({xpath}")?;
                if let Some(dt) = data_type {
                    write!(f, ", {dt}")?;
                }
                write!(f, ")")
            }
            Self::Count { xpath } => write!(f, "count({xpath})"),
            Self::Sum { .. } => write!(f, "sum(..)"),
            Self::Average { .. } => write!(f, "average(..)"),
            Self::Add(a, b) => write!(f, "({a} + {b})"),
            Self::Subtract(a, b) => write!(f, "({a} - {b})"),
            Self::Multiply(a, b) => write!(f, "({a} * {b})"),
            Self::Divide(a, b) => write!(f, "({a} / {b})"),
            Self::Concat(args) => write!(f, "concat({})", join_display(args)),
            Self::And(args) => write!(f, "and({})", join_display(args)),
            Self::Or(args) => write!(f, "or({})", join_display(args)),
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::If {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "if({condition}, {then_branch}, {else_branch})"),
            Self::Compare { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Map { source, inner } => write!(f, "map({source}, {inner})"),
        }
    }
}

fn join_display(exprs: &[Expression]) -> String {
    exprs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
