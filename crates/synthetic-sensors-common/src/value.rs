//! `Value`: the dynamically-typed scalar domain the expression engine
//! operates on (§9 "Dynamic typing" design note). Every scalar kind is a
//! tagged variant; coercions happen at operator application sites in the
//! interpreter, never here.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::{self, Display};

use crate::EngineError;

/// A duration value. Kept distinct from `chrono::Duration` so that
/// fractional-day durations produced by `months(n) = n * 30.44 days`
/// (see spec §9 open question) round-trip without loss; internally this
/// is still seconds, stored as an `f64` rather than `chrono::Duration`'s
/// integer-nanosecond representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duration {
    pub seconds: f64,
}

impl Duration {
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    pub fn total_seconds(&self) -> f64 {
        self.seconds
    }
}

impl std::ops::Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_seconds(self.seconds + rhs.seconds)
    }
}

impl std::ops::Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_seconds(self.seconds - rhs.seconds)
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.seconds)
    }
}

/// The three alternate-state sentinels plus ordinary absence of value.
/// Kept as part of `Value` itself (rather than wrapped in `Option`) so a
/// `ReferenceValue`'s `value` field can represent "no backing state",
/// "host says unavailable", and "host says unknown" as distinct,
/// inspectable states — exactly the sentinels named in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlternateState {
    Unavailable,
    Unknown,
}

impl Display for AlternateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlternateState::Unavailable => "unavailable",
            AlternateState::Unknown => "unknown",
        })
    }
}

/// The restricted expression language's runtime value type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Duration(Duration),
    /// The materialized member values of an expanded collection pattern
    /// (§4.5) or the result of `map`/collection aggregate helpers.
    List(Vec<Value>),
    /// Absence of a value (Python `None`); `is None` / `is not None`
    /// checks target this variant specifically — never truthiness.
    None,
    /// Host-reported sentinel state, distinct from `None`.
    Alternate(AlternateState),
}

impl Value {
    pub fn unavailable() -> Self {
        Value::Alternate(AlternateState::Unavailable)
    }

    pub fn unknown() -> Self {
        Value::Alternate(AlternateState::Unknown)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_alternate(&self) -> bool {
        matches!(self, Value::Alternate(_)) || matches!(self, Value::None)
    }

    /// HA-style truthy/falsey parsing: booleans first, then numeric,
    /// then a small set of recognized truthy/falsey strings, with
    /// `unknown`/`unavailable` tokens preserved as sentinels rather than
    /// coerced to booleans (§4.8 "Handler value semantics").
    pub fn parse_literal(raw: &str) -> Value {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" => return Value::Boolean(true),
            "false" | "off" | "no" => return Value::Boolean(false),
            "unavailable" => return Value::unavailable(),
            "unknown" => return Value::unknown(),
            "none" | "null" | "" => return Value::None,
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Value::Number(n);
        }
        Value::Text(raw.to_string())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) | Value::DateTime(_) | Value::Duration(_) => true,
            Value::List(items) => !items.is_empty(),
            Value::None | Value::Alternate(_) => false,
        }
    }

    pub fn as_f64(&self) -> Result<f64, EngineError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Duration(d) => Ok(d.total_seconds()),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                EngineError::new(crate::EngineErrorKind::Type)
                    .with_message(format!("cannot convert '{s}' to a number"))
            }),
            other => Err(EngineError::new(crate::EngineErrorKind::Type)
                .with_message(format!("cannot convert {other:?} to a number"))),
        }
    }

    /// Publication normalization (§4.6 Phase 4 / §4.8 last-good): durations
    /// become `total_seconds()`, dates/datetimes become ISO-8601 strings,
    /// everything else passes through unchanged.
    pub fn to_published(&self) -> Value {
        match self {
            Value::Duration(d) => Value::Number(d.total_seconds()),
            Value::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Value::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            other => other.clone(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::Duration(d) => write!(f, "{d}"),
            Value::List(items) => write!(
                f,
                "[{}]",
                items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
            ),
            Value::None => write!(f, ""),
            Value::Alternate(a) => write!(f, "{a}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_and_zero_are_not_none() {
        assert!(!Value::Boolean(false).is_none());
        assert!(!Value::Int(0).is_none());
        assert!(!Value::Number(0.0).is_none());
        assert!(!Value::Text(String::new()).is_none());
    }

    #[test]
    fn truthy_string_parses_to_bool() {
        assert_eq!(Value::parse_literal("true"), Value::Boolean(true));
        assert_eq!(Value::parse_literal("off"), Value::Boolean(false));
    }

    #[test]
    fn unknown_token_is_preserved_as_sentinel() {
        assert_eq!(Value::parse_literal("unavailable"), Value::unavailable());
        assert_eq!(Value::parse_literal("unknown"), Value::unknown());
    }

    #[test]
    fn publication_normalizes_duration_and_date() {
        assert_eq!(
            Value::Duration(Duration::from_seconds(90.0)).to_published(),
            Value::Number(90.0)
        );
        let d = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(Value::Date(d).to_published(), Value::Text("2025-01-31".into()));
    }
}
