//! The DSL value model (spec §3 / §4.B).
//!
//! A tagged sum of the scalar and array shapes the expression language can
//! produce, plus the deterministic coercion and truthiness rules the
//! evaluator and rule engine lean on. Mirrors the shape of VRL's own
//! `Value`, but scoped to exactly the variants this DSL needs — no
//! `Object`, `Bytes`, or `Regex` variant, since nothing in this language
//! produces one.

pub mod error;

use std::fmt;

use chrono::NaiveDate;

pub use error::CoercionError;

/// The declared type a `dataType` hint or `range`/`nodeValidation` rule
/// coerces a result into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
        };
        f.write_str(name)
    }
}

/// A runtime value produced by evaluating an [`Expression`](crate::expression::Expression).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    Null,
    Array(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Null => "null",
            Self::Array(_) => "array",
        }
    }

    /// The boolean projection used by `existence`, `if`, `and`, `or`, `not`.
    #[must_use]
    pub fn truthiness(&self) -> bool {
        match self {
            Self::Null => false,
            Self::String(s) => !s.is_empty(),
            Self::Integer(n) => *n != 0,
            Self::Decimal(n) => *n != 0.0,
            Self::Boolean(b) => *b,
            Self::Date(_) => true,
            Self::Array(items) => !items.is_empty(),
        }
    }

    #[must_use]
    pub const fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Decimal(n) => Some(*n),
            _ => None,
        }
    }

    /// Typed equality: numeric cross-type promotes to decimal, arrays
    /// compare elementwise, everything else requires matching tags.
    #[must_use]
    pub fn eq_typed(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_typed(y))
            }
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Ordering used by `>`, `<`, `>=`, `<=`. `None` means the pair is not
    /// orderable (mixed types that aren't both numeric).
    #[must_use]
    pub fn cmp_typed(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self.as_numeric(), other.as_numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (self, other) {
                (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
                (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }

    /// String coercion used inside `concat`, where `Null` is explicitly
    /// allowed to become the empty string (spec §3).
    #[must_use]
    pub fn concat_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            other => other.display_string(),
        }
    }

    /// The structural string representation (numbers without trailing
    /// zeros, booleans as `true`/`false`). Does not special-case `Null` —
    /// use [`Self::coerce_string`] when `Null` should fail instead.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Decimal(n) => format_decimal(*n),
            Self::Boolean(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Null => String::new(),
            Self::Array(items) => {
                let rendered: Vec<_> = items.iter().map(Self::display_string).collect();
                format!("[{}]", rendered.join(", "))
            }
        }
    }

    /// Coerce to the requested [`DataType`], per spec §3's explicit rules.
    pub fn coerce_to(&self, target: DataType) -> Result<Self, CoercionError> {
        match target {
            DataType::String => self.coerce_string().map(Self::String),
            DataType::Integer => self.coerce_integer().map(Self::Integer),
            DataType::Decimal => self.coerce_decimal().map(Self::Decimal),
            DataType::Date => self.coerce_date().map(Self::Date),
        }
    }

    pub fn coerce_string(&self) -> Result<String, CoercionError> {
        match self {
            Self::Null => Err(CoercionError::MissingValue {
                expected: DataType::String,
            }),
            Self::Array(_) => Err(CoercionError::invalid(
                self.type_name(),
                DataType::String,
                "arrays never coerce to scalars",
            )),
            other => Ok(other.display_string()),
        }
    }

    pub fn coerce_integer(&self) -> Result<i64, CoercionError> {
        match self {
            Self::Integer(n) => Ok(*n),
            Self::Decimal(n) => {
                if n.fract() == 0.0 {
                    Ok(*n as i64)
                } else {
                    Err(CoercionError::invalid(
                        "decimal",
                        DataType::Integer,
                        format!("{n} has a fractional part"),
                    ))
                }
            }
            Self::String(s) => s.parse::<i64>().map_err(|_| {
                CoercionError::invalid(
                    "string",
                    DataType::Integer,
                    format!("{s:?} is not a base-10 integer"),
                )
            }),
            Self::Null => Err(CoercionError::MissingValue {
                expected: DataType::Integer,
            }),
            other => Err(CoercionError::invalid(
                other.type_name(),
                DataType::Integer,
                "no coercion rule applies",
            )),
        }
    }

    pub fn coerce_decimal(&self) -> Result<f64, CoercionError> {
        match self {
            Self::Decimal(n) => Ok(*n),
            Self::Integer(n) => Ok(*n as f64),
            Self::String(s) => s.trim().parse::<f64>().map_err(|_| {
                CoercionError::invalid(
                    "string",
                    DataType::Decimal,
                    format!("{s:?} is not a number"),
                )
            }),
            Self::Null => Err(CoercionError::MissingValue {
                expected: DataType::Decimal,
            }),
            other => Err(CoercionError::invalid(
                other.type_name(),
                DataType::Decimal,
                "booleans do not coerce to decimal",
            )),
        }
    }

    pub fn coerce_boolean(&self) -> Result<bool, CoercionError> {
        match self {
            Self::Boolean(b) => Ok(*b),
            Self::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(CoercionError::invalid(
                    "string",
                    DataType::String,
                    format!("{s:?} is not true/false/1/0"),
                )),
            },
            Self::Integer(n) => Ok(*n != 0),
            Self::Decimal(n) => Ok(*n != 0.0),
            Self::Null => Err(CoercionError::MissingValue {
                expected: DataType::String,
            }),
            other => Err(CoercionError::invalid(
                other.type_name(),
                DataType::String,
                "no boolean coercion rule applies",
            )),
        }
    }

    pub fn coerce_date(&self) -> Result<NaiveDate, CoercionError> {
        match self {
            Self::Date(d) => Ok(*d),
            Self::String(s) => {
                let parsed = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    CoercionError::invalid(
                        "string",
                        DataType::Date,
                        format!("{s:?} is not a strict ISO-8601 YYYY-MM-DD date"),
                    )
                })?;
                // Reject non-canonical input such as "2024-1-1" or "2024-01-1"
                // that `chrono` would still parse with the same format string.
                if parsed.format("%Y-%m-%d").to_string() != *s {
                    return Err(CoercionError::invalid(
                        "string",
                        DataType::Date,
                        format!("{s:?} is not in canonical YYYY-MM-DD form"),
                    ));
                }
                Ok(parsed)
            }
            Self::Null => Err(CoercionError::MissingValue {
                expected: DataType::Date,
            }),
            other => Err(CoercionError::invalid(
                other.type_name(),
                DataType::Date,
                "no date coercion rule applies",
            )),
        }
    }
}

fn format_decimal(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        let mut s = format!("{n}");
        if let Some(stripped) = s.strip_suffix(".0") {
            s = stripped.to_owned();
        }
        s
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Serializes to the natural JSON shape for each variant (numbers as JSON
/// numbers, `Date` as its ISO-8601 string) rather than the uniform string
/// form [`Self::display_string`] produces — report consumers expect typed
/// JSON, not a stringly-typed one.
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Decimal(n) => serializer.serialize_f64(*n),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Self::Null => serializer.serialize_none(),
            Self::Array(items) => items.serialize(serializer),
        }
    }
}
