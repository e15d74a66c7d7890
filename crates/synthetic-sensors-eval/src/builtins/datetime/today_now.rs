//! Ambient "now" family (spec §4.1 "local unless `utc_` prefix").

use synthetic_sensors_common::{EngineError, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

pub struct NowFn;
impl Function for NowFn {
    fn name(&self) -> &'static str {
        "now"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::DateTime(ctx.clock().local_now()))
    }
}

pub struct LocalNowFn;
impl Function for LocalNowFn {
    fn name(&self) -> &'static str {
        "local_now"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::DateTime(ctx.clock().local_now()))
    }
}

pub struct UtcNowFn;
impl Function for UtcNowFn {
    fn name(&self) -> &'static str {
        "utc_now"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::DateTime(ctx.clock().utc_now()))
    }
}

pub struct TodayFn;
impl Function for TodayFn {
    fn name(&self) -> &'static str {
        "today"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Date(ctx.clock().local_now().date()))
    }
}

pub struct YesterdayFn;
impl Function for YesterdayFn {
    fn name(&self) -> &'static str {
        "yesterday"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Date(ctx.clock().local_now().date() - chrono::Duration::days(1)))
    }
}

pub struct TomorrowFn;
impl Function for TomorrowFn {
    fn name(&self) -> &'static str {
        "tomorrow"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Date(ctx.clock().local_now().date() + chrono::Duration::days(1)))
    }
}

pub struct UtcTodayFn;
impl Function for UtcTodayFn {
    fn name(&self) -> &'static str {
        "utc_today"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Date(ctx.clock().utc_now().date()))
    }
}

pub struct UtcYesterdayFn;
impl Function for UtcYesterdayFn {
    fn name(&self) -> &'static str {
        "utc_yesterday"
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
    fn eval(&self, _args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Date(ctx.clock().utc_now().date() - chrono::Duration::days(1)))
    }
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(NowFn));
    registry_register(std::sync::Arc::new(LocalNowFn));
    registry_register(std::sync::Arc::new(UtcNowFn));
    registry_register(std::sync::Arc::new(TodayFn));
    registry_register(std::sync::Arc::new(YesterdayFn));
    registry_register(std::sync::Arc::new(TomorrowFn));
    registry_register(std::sync::Arc::new(UtcTodayFn));
    registry_register(std::sync::Arc::new(UtcYesterdayFn));
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

    #[test]
    fn today_reads_the_injected_clock() {
        let fixed = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let ctx = Ctx(FixedClock::at(fixed));
        let f = TodayFn;
        assert_eq!(f.eval(&[], &ctx).unwrap(), Value::Date(fixed.date()));
    }

    #[test]
    fn yesterday_and_tomorrow_bracket_today() {
        let fixed = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let ctx = Ctx(FixedClock::at(fixed));
        assert_eq!(
            YesterdayFn.eval(&[], &ctx).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap())
        );
        assert_eq!(
            TomorrowFn.eval(&[], &ctx).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap())
        );
    }
}
