//! `*_between` helpers (spec §4.1 "Helpers") — plain numeric deltas
//! between two date/datetime values, distinct from the duration-typed
//! arithmetic overloads in the interpreter.

use chrono::NaiveDateTime;
use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

fn as_datetime(v: &Value) -> Result<NaiveDateTime, EngineError> {
    match v {
        Value::DateTime(dt) => Ok(*dt),
        Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0).expect("midnight is always valid")),
        other => Err(EngineError::new(EngineErrorKind::Type)
            .with_message(format!("expected a date or datetime, found {other:?}"))),
    }
}

macro_rules! between_fn {
    ($struct_name:ident, $fn_name:literal, $divisor:expr) => {
        pub struct $struct_name;
        impl Function for $struct_name {
            fn name(&self) -> &'static str {
                $fn_name
            }
            fn min_args(&self) -> usize {
                2
            }
            fn max_args(&self) -> Option<usize> {
                Some(2)
            }
            fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
                let from = as_datetime(&args[0])?;
                let to = as_datetime(&args[1])?;
                let seconds = (to - from).num_seconds() as f64;
                Ok(Value::Number(seconds / $divisor))
            }
        }
    };
}

between_fn!(SecondsBetweenFn, "seconds_between", 1.0);
between_fn!(MinutesBetweenFn, "minutes_between", 60.0);
between_fn!(HoursBetweenFn, "hours_between", 3_600.0);
between_fn!(DaysBetweenFn, "days_between", 86_400.0);

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(SecondsBetweenFn));
    registry_register(std::sync::Arc::new(MinutesBetweenFn));
    registry_register(std::sync::Arc::new(HoursBetweenFn));
    registry_register(std::sync::Arc::new(DaysBetweenFn));
}

pub(crate) fn load_all() {
    load(register_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;

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
    fn minutes_between_two_datetimes() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(8, 30, 0).unwrap();
        let f = MinutesBetweenFn;
        assert_eq!(
            f.eval(&[Value::DateTime(a), Value::DateTime(b)], &ctx()).unwrap(),
            Value::Number(30.0)
        );
    }

    #[test]
    fn days_between_two_dates() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 11).unwrap();
        let f = DaysBetweenFn;
        assert_eq!(f.eval(&[Value::Date(a), Value::Date(b)], &ctx()).unwrap(), Value::Number(10.0));
    }
}
