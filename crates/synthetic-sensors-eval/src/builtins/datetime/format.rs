//! Display-oriented formatting helpers (spec §4.1 "Helpers").

use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

/// `format_date(value, pattern)` — `pattern` is a `strftime`-style string.
pub struct FormatDateFn;
impl Function for FormatDateFn {
    fn name(&self) -> &'static str {
        "format_date"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let Value::Text(pattern) = &args[1] else {
            return Err(EngineError::new(EngineErrorKind::Type).with_message("format_date() pattern must be a string"));
        };
        let formatted = match &args[0] {
            Value::Date(d) => d.format(pattern).to_string(),
            Value::DateTime(dt) => dt.format(pattern).to_string(),
            other => {
                return Err(EngineError::new(EngineErrorKind::Type)
                    .with_message(format!("format_date() expects a date/datetime, found {other:?}")))
            }
        };
        Ok(Value::Text(formatted))
    }
}

/// `format_friendly(seconds_duration)` — renders a duration as `"2h 15m"`
/// style text, largest unit first, dropping zero components.
pub struct FormatFriendlyFn;
impl Function for FormatFriendlyFn {
    fn name(&self) -> &'static str {
        "format_friendly"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let total = match &args[0] {
            Value::Duration(d) => d.total_seconds(),
            other => other.as_f64()?,
        };
        Ok(Value::Text(format_friendly(total)))
    }
}

fn format_friendly(total_seconds: f64) -> String {
    let mut remaining = total_seconds.abs().round() as i64;
    let sign = if total_seconds < 0.0 { "-" } else { "" };
    let days = remaining / 86_400;
    remaining %= 86_400;
    let hours = remaining / 3_600;
    remaining %= 3_600;
    let minutes = remaining / 60;
    let seconds = remaining % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    format!("{sign}{}", parts.join(" "))
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(FormatDateFn));
    registry_register(std::sync::Arc::new(FormatFriendlyFn));
}

pub(crate) fn load_all() {
    load(register_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use synthetic_sensors_common::Duration;

    struct Ctx(FixedClock);
    impl FunctionContext for Ctx {
        fn clock(&self) -> &dyn crate::clock::Clock {
            &self.0
        }
    }
    fn ctx() -> Ctx {
        Ctx(FixedClock::at(NaiveDateTime::default()))
    }

    #[test]
    fn format_date_uses_strftime_pattern() {
        let f = FormatDateFn;
        let d = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(
            f.eval(&[Value::Date(d), Value::Text("%d/%m/%Y".into())], &ctx()).unwrap(),
            Value::Text("15/06/2025".into())
        );
    }

    #[test]
    fn format_friendly_drops_zero_components() {
        let f = FormatFriendlyFn;
        let d = Value::Duration(Duration::from_seconds(3_661.0));
        assert_eq!(f.eval(&[d], &ctx()).unwrap(), Value::Text("1h 1m 1s".into()));
    }

    #[test]
    fn format_friendly_zero_is_zero_seconds() {
        let f = FormatFriendlyFn;
        assert_eq!(
            f.eval(&[Value::Duration(Duration::from_seconds(0.0))], &ctx()).unwrap(),
            Value::Text("0s".into())
        );
    }
}
