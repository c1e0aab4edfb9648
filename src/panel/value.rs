//! Cell values and missing-value normalization
//!
//! Survey extracts encode "no answer" in several ways depending on the era
//! the wave was collected in: `-9`, `-9.0`, `"-9"`, `"-9.0"`, blanks. Every
//! one of those collapses to [`Value::Missing`] before any correction logic
//! sees the cell. The specific [`MissingCode`] is kept so that predicates
//! such as "job sector is not applicable" still work after normalization.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Token used on disk for the structurally-missing marker
pub const STRUCTURAL_TOKEN: &str = "inapplicable";

/// Closed set of survey missing-value codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCode {
    /// Respondent did not know (-1)
    Unknown,
    /// Respondent refused (-2)
    Refusal,
    /// Answered by proxy, question not asked (-7)
    Proxy,
    /// Question not applicable (-8)
    NotApplicable,
    /// Missing for any other reason (-9)
    Missing,
    /// Placeholder left behind by an upstream synthetic fill (-10)
    SyntheticFill,
}

impl MissingCode {
    pub const ALL: [MissingCode; 6] = [
        MissingCode::Unknown,
        MissingCode::Refusal,
        MissingCode::Proxy,
        MissingCode::NotApplicable,
        MissingCode::Missing,
        MissingCode::SyntheticFill,
    ];

    /// Numeric code as stored in the survey files
    pub fn code(self) -> i64 {
        match self {
            MissingCode::Unknown => -1,
            MissingCode::Refusal => -2,
            MissingCode::Proxy => -7,
            MissingCode::NotApplicable => -8,
            MissingCode::Missing => -9,
            MissingCode::SyntheticFill => -10,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(MissingCode::Unknown),
            -2 => Some(MissingCode::Refusal),
            -7 => Some(MissingCode::Proxy),
            -8 => Some(MissingCode::NotApplicable),
            -9 => Some(MissingCode::Missing),
            -10 => Some(MissingCode::SyntheticFill),
            _ => None,
        }
    }

    fn from_float(value: f64) -> Option<Self> {
        if value.fract() == 0.0 && value >= -10.0 && value <= -1.0 {
            Self::from_code(value as i64)
        } else {
            None
        }
    }
}

/// Canonical storage type of one column, fixed at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    /// Pick the narrowest kind that holds every non-missing value
    ///
    /// A column with no observed values at all is treated as `Float`.
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut kind = None;
        for value in values {
            let seen = match value {
                Value::Missing(_) | Value::Structural => continue,
                Value::Int(_) => ColumnKind::Int,
                Value::Float(f) if f.fract() == 0.0 => ColumnKind::Int,
                Value::Float(_) => ColumnKind::Float,
                Value::Text(s) => {
                    let s = s.trim();
                    if s.parse::<i64>().is_ok() {
                        ColumnKind::Int
                    } else if let Ok(f) = s.parse::<f64>() {
                        if f.fract() == 0.0 {
                            ColumnKind::Int
                        } else {
                            ColumnKind::Float
                        }
                    } else {
                        return ColumnKind::Text;
                    }
                }
            };
            kind = Some(match (kind, seen) {
                (None, k) => k,
                (Some(ColumnKind::Int), ColumnKind::Int) => ColumnKind::Int,
                _ => ColumnKind::Float,
            });
        }
        kind.unwrap_or(ColumnKind::Float)
    }

    /// Convert a normalized value into this kind
    ///
    /// Returns `None` when the value cannot be represented, e.g. `"3.5"` in
    /// an `Int` column or `"abc"` in a `Float` column.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match value {
            Value::Missing(_) | Value::Structural => Some(value),
            Value::Int(i) => Some(match self {
                ColumnKind::Int => Value::Int(i),
                ColumnKind::Float => Value::Float(i as f64),
                ColumnKind::Text => Value::Text(i.to_string()),
            }),
            Value::Float(f) => match self {
                ColumnKind::Int if f.fract() == 0.0 => Some(Value::Int(f as i64)),
                ColumnKind::Int => None,
                ColumnKind::Float => Some(Value::Float(f)),
                ColumnKind::Text => Some(Value::Text(f.to_string())),
            },
            Value::Text(s) => match self {
                ColumnKind::Text => Some(Value::Text(s)),
                ColumnKind::Int => {
                    let t = s.trim();
                    t.parse::<i64>().ok().map(Value::Int).or_else(|| {
                        t.parse::<f64>()
                            .ok()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| Value::Int(f as i64))
                    })
                }
                ColumnKind::Float => s.trim().parse::<f64>().ok().map(Value::Float),
            },
        }
    }

    /// Additive zero for this kind
    pub fn zero(self) -> Value {
        match self {
            ColumnKind::Int => Value::Int(0),
            ColumnKind::Float => Value::Float(0.0),
            ColumnKind::Text => Value::Text("0".to_string()),
        }
    }
}

/// A single panel cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawScalar", into = "RawScalar")]
pub enum Value {
    /// Canonical missing marker
    Missing(MissingCode),
    /// Known to be inapplicable; not missing, never filled or dropped
    Structural,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing(_))
    }

    pub fn missing_code(&self) -> Option<MissingCode> {
        match self {
            Value::Missing(code) => Some(*code),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Order two present values of the same family (numeric or text)
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Parse one raw CSV cell
    pub fn parse(raw: &str) -> Value {
        normalize(Value::Text(raw.to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing(code) => write!(f, "{}", code.code()),
            Value::Structural => f.write_str(STRUCTURAL_TOKEN),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Map any physical missing-value encoding to [`Value::Missing`]
///
/// Total and idempotent: values outside the sentinel set come back
/// unchanged, and normalizing an already-normalized value is a no-op.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Int(i) => match MissingCode::from_code(i) {
            Some(code) => Value::Missing(code),
            None => Value::Int(i),
        },
        Value::Float(f) if f.is_nan() => Value::Missing(MissingCode::Missing),
        Value::Float(f) => match MissingCode::from_float(f) {
            Some(code) => Value::Missing(code),
            None => Value::Float(f),
        },
        Value::Text(s) => normalize_text(s),
        other => other,
    }
}

fn normalize_text(s: String) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("nan")
    {
        return Value::Missing(MissingCode::Missing);
    }
    if trimmed == STRUCTURAL_TOKEN {
        return Value::Structural;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        if let Some(code) = MissingCode::from_code(i) {
            return Value::Missing(code);
        }
    } else if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(code) = MissingCode::from_float(f) {
            return Value::Missing(code);
        }
    }
    Value::Text(s)
}

/// Plain JSON scalar used when values appear in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawScalar> for Value {
    fn from(raw: RawScalar) -> Self {
        normalize(match raw {
            RawScalar::Int(i) => Value::Int(i),
            RawScalar::Float(f) => Value::Float(f),
            RawScalar::Text(s) => Value::Text(s),
        })
    }
}

impl From<Value> for RawScalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Missing(code) => RawScalar::Int(code.code()),
            Value::Structural => RawScalar::Text(STRUCTURAL_TOKEN.to_string()),
            Value::Int(i) => RawScalar::Int(i),
            Value::Float(f) => RawScalar::Float(f),
            Value::Text(s) => RawScalar::Text(s),
        }
    }
}
