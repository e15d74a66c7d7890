//! Duration constructors (spec §4.1 "Duration") — each takes a count
//! and returns a `Value::Duration`, semantically equivalent to
//! Python's `timedelta`. `months(n)` is kept as the documented
//! approximation rather than a calendar-aware shift.

use synthetic_sensors_common::{Duration, EngineError, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

const MONTH_DAYS: f64 = 30.44;

macro_rules! duration_ctor {
    ($struct_name:ident, $fn_name:literal, $seconds_per_unit:expr) => {
        pub struct $struct_name;
        impl Function for $struct_name {
            fn name(&self) -> &'static str {
                $fn_name
            }
            fn min_args(&self) -> usize {
                1
            }
            fn max_args(&self) -> Option<usize> {
                Some(1)
            }
            fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
                let n = args[0].as_f64()?;
                Ok(Value::Duration(Duration::from_seconds(n * $seconds_per_unit)))
            }
        }
    };
}

duration_ctor!(SecondsFn, "seconds", 1.0);
duration_ctor!(MinutesFn, "minutes", 60.0);
duration_ctor!(HoursFn, "hours", 3_600.0);
duration_ctor!(DaysFn, "days", 86_400.0);
duration_ctor!(WeeksFn, "weeks", 604_800.0);
duration_ctor!(MonthsFn, "months", MONTH_DAYS * 86_400.0);

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(SecondsFn));
    registry_register(std::sync::Arc::new(MinutesFn));
    registry_register(std::sync::Arc::new(HoursFn));
    registry_register(std::sync::Arc::new(DaysFn));
    registry_register(std::sync::Arc::new(WeeksFn));
    registry_register(std::sync::Arc::new(MonthsFn));
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
        Ctx(FixedClock::at(chrono::NaiveDateTime::default()))
    }

    #[test]
    fn minutes_converts_to_seconds() {
        let f = MinutesFn;
        assert_eq!(
            f.eval(&[Value::Number(5.0)], &ctx()).unwrap(),
            Value::Duration(Duration::from_seconds(300.0))
        );
    }

    #[test]
    fn months_uses_approximation() {
        let f = MonthsFn;
        match f.eval(&[Value::Number(1.0)], &ctx()).unwrap() {
            Value::Duration(d) => assert!((d.total_seconds() - MONTH_DAYS * 86_400.0).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }
}
