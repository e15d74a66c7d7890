//! Business-day helpers (spec §4.1 "business-day helpers"). Weekends
//! only — no holiday calendar, since none is named in the configured
//! data model.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

fn as_date(v: &Value) -> Result<NaiveDate, EngineError> {
    match v {
        Value::Date(d) => Ok(*d),
        Value::DateTime(dt) => Ok(dt.date()),
        other => Err(EngineError::new(EngineErrorKind::Type)
            .with_message(format!("expected a date, found {other:?}"))),
    }
}

pub fn is_business_day(d: NaiveDate) -> bool {
    !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
}

fn step(d: NaiveDate, forward: bool) -> NaiveDate {
    if forward {
        d.checked_add_days(Days::new(1)).expect("date arithmetic in range")
    } else {
        d.checked_sub_days(Days::new(1)).expect("date arithmetic in range")
    }
}

pub struct IsBusinessDayFn;
impl Function for IsBusinessDayFn {
    fn name(&self) -> &'static str {
        "is_business_day"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Boolean(is_business_day(as_date(&args[0])?)))
    }
}

pub struct NextBusinessDayFn;
impl Function for NextBusinessDayFn {
    fn name(&self) -> &'static str {
        "next_business_day"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let mut d = step(as_date(&args[0])?, true);
        while !is_business_day(d) {
            d = step(d, true);
        }
        Ok(Value::Date(d))
    }
}

pub struct PreviousBusinessDayFn;
impl Function for PreviousBusinessDayFn {
    fn name(&self) -> &'static str {
        "previous_business_day"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let mut d = step(as_date(&args[0])?, false);
        while !is_business_day(d) {
            d = step(d, false);
        }
        Ok(Value::Date(d))
    }
}

pub struct AddBusinessDaysFn;
impl Function for AddBusinessDaysFn {
    fn name(&self) -> &'static str {
        "add_business_days"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let mut d = as_date(&args[0])?;
        let n = args[1].as_f64()? as i64;
        let forward = n >= 0;
        let mut remaining = n.unsigned_abs();
        while remaining > 0 {
            d = step(d, forward);
            if is_business_day(d) {
                remaining -= 1;
            }
        }
        Ok(Value::Date(d))
    }
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(IsBusinessDayFn));
    registry_register(std::sync::Arc::new(NextBusinessDayFn));
    registry_register(std::sync::Arc::new(PreviousBusinessDayFn));
    registry_register(std::sync::Arc::new(AddBusinessDaysFn));
}

pub(crate) fn load_all() {
    load(register_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDateTime;

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
    fn next_business_day_skips_weekend() {
        // Friday, 2025-06-13
        let friday = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
        let f = NextBusinessDayFn;
        assert_eq!(
            f.eval(&[Value::Date(friday)], &ctx()).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap())
        );
    }

    #[test]
    fn add_business_days_skips_weekends() {
        let friday = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
        let f = AddBusinessDaysFn;
        assert_eq!(
            f.eval(&[Value::Date(friday), Value::Int(1)], &ctx()).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap())
        );
    }
}
