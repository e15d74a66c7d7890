//! `date(...)`, `datetime(...)`, `timedelta(...)` constructors.

use chrono::{NaiveDate, NaiveDateTime};
use synthetic_sensors_common::{Duration, EngineError, EngineErrorKind, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

fn to_i(v: &Value) -> Result<i32, EngineError> {
    Ok(v.as_f64()? as i32)
}

/// `date(y, m, d)` or `date("2025-06-15")`.
pub struct DateFn;
impl Function for DateFn {
    fn name(&self) -> &'static str {
        "date"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        if args.len() == 1 {
            let Value::Text(iso) = &args[0] else {
                return Err(EngineError::new(EngineErrorKind::Type)
                    .with_message("date() with one argument expects an ISO string"));
            };
            let d = NaiveDate::parse_from_str(iso, "%Y-%m-%d")
                .map_err(|_| EngineError::new(EngineErrorKind::Type).with_message(format!("invalid ISO date '{iso}'")))?;
            return Ok(Value::Date(d));
        }
        let y = to_i(&args[0])?;
        let m = to_i(&args[1])?;
        let d = to_i(&args[2])?;
        let date = NaiveDate::from_ymd_opt(y, m as u32, d as u32)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Num).with_message(format!("invalid date {y}-{m}-{d}")))?;
        Ok(Value::Date(date))
    }
}

/// `datetime(y, m, d, h=0, mi=0, s=0)` or `datetime("2025-06-15T08:00:00")`.
pub struct DateTimeFn;
impl Function for DateTimeFn {
    fn name(&self) -> &'static str {
        "datetime"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(6)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        if args.len() == 1 {
            let Value::Text(iso) = &args[0] else {
                return Err(EngineError::new(EngineErrorKind::Type)
                    .with_message("datetime() with one argument expects an ISO string"));
            };
            let dt = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%d %H:%M:%S"))
                .map_err(|_| EngineError::new(EngineErrorKind::Type).with_message(format!("invalid ISO datetime '{iso}'")))?;
            return Ok(Value::DateTime(dt));
        }
        let y = to_i(&args[0])?;
        let m = to_i(&args[1])?;
        let d = to_i(&args[2])?;
        let h = args.get(3).map(to_i).transpose()?.unwrap_or(0);
        let mi = args.get(4).map(to_i).transpose()?.unwrap_or(0);
        let s = args.get(5).map(to_i).transpose()?.unwrap_or(0);
        let date = NaiveDate::from_ymd_opt(y, m as u32, d as u32)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Num).with_message(format!("invalid date {y}-{m}-{d}")))?;
        let dt = date
            .and_hms_opt(h as u32, mi as u32, s as u32)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Num).with_message("invalid time of day"))?;
        Ok(Value::DateTime(dt))
    }
}

/// `timedelta(days=0, hours=0, minutes=0, seconds=0)`, positional.
pub struct TimedeltaFn;
impl Function for TimedeltaFn {
    fn name(&self) -> &'static str {
        "timedelta"
    }
    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let days = args.first().map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
        let hours = args.get(1).map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
        let minutes = args.get(2).map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
        let seconds = args.get(3).map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
        let total = days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds;
        Ok(Value::Duration(Duration::from_seconds(total)))
    }
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(DateFn));
    registry_register(std::sync::Arc::new(DateTimeFn));
    registry_register(std::sync::Arc::new(TimedeltaFn));
}

pub(crate) fn load_all() {
    load(register_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

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
    fn date_from_parts_and_iso_agree() {
        let f = DateFn;
        let from_parts = f
            .eval(&[Value::Int(2025), Value::Int(6), Value::Int(15)], &ctx())
            .unwrap();
        let from_iso = f.eval(&[Value::Text("2025-06-15".into())], &ctx()).unwrap();
        assert_eq!(from_parts, from_iso);
    }

    #[test]
    fn timedelta_sums_components() {
        let f = TimedeltaFn;
        let d = f.eval(&[Value::Number(1.0), Value::Number(2.0)], &ctx()).unwrap();
        assert_eq!(d, Value::Duration(Duration::from_seconds(86_400.0 + 7_200.0)));
    }
}
