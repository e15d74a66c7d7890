//! Math built-ins (spec §4.1 "Math" list). Each also accepts a single
//! `List` argument wherever an aggregate makes sense, so the same
//! functions serve both plain scalar formulas and collection-pattern
//! results (§4.1 "Collection aggregates when arguments are iterables").

use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

/// Flattens a single `List` argument into scalars, or treats the whole
/// argument slice as already-scalar (variadic call style).
fn collect_numbers(args: &[Value]) -> Result<Vec<f64>, EngineError> {
    if let [Value::List(items)] = args {
        items.iter().map(|v| v.as_f64()).collect()
    } else {
        args.iter().map(|v| v.as_f64()).collect()
    }
}

macro_rules! unary_math_fn {
    ($struct_name:ident, $fn_name:literal, $op:expr) => {
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
                let x = args[0].as_f64()?;
                Ok(Value::Number(($op)(x)))
            }
        }
    };
}

unary_math_fn!(SqrtFn, "sqrt", |x: f64| x.sqrt());
unary_math_fn!(SinFn, "sin", |x: f64| x.sin());
unary_math_fn!(CosFn, "cos", |x: f64| x.cos());
unary_math_fn!(TanFn, "tan", |x: f64| x.tan());
unary_math_fn!(ExpFn, "exp", |x: f64| x.exp());
unary_math_fn!(FloorFn, "floor", |x: f64| x.floor());
unary_math_fn!(CeilFn, "ceil", |x: f64| x.ceil());

pub struct AbsFn;
impl Function for AbsFn {
    fn name(&self) -> &'static str {
        "abs"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(args[0].as_f64()?.abs()))
    }
}

pub struct RoundFn;
impl Function for RoundFn {
    fn name(&self) -> &'static str {
        "round"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let x = args[0].as_f64()?;
        let digits = match args.get(1) {
            Some(v) => v.as_f64()? as i32,
            None => 0,
        };
        let factor = 10f64.powi(digits);
        Ok(Value::Number((x * factor).round() / factor))
    }
}

pub struct LogFn;
impl Function for LogFn {
    fn name(&self) -> &'static str {
        "log"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let x = args[0].as_f64()?;
        if x <= 0.0 {
            return Err(EngineError::new(EngineErrorKind::Num).with_message("log of non-positive value"));
        }
        match args.get(1) {
            Some(base) => {
                let b = base.as_f64()?;
                Ok(Value::Number(x.log(b)))
            }
            None => Ok(Value::Number(x.ln())),
        }
    }
}

pub struct PowFn;
impl Function for PowFn {
    fn name(&self) -> &'static str {
        "pow"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(args[0].as_f64()?.powf(args[1].as_f64()?)))
    }
}

pub struct ClampFn;
impl Function for ClampFn {
    fn name(&self) -> &'static str {
        "clamp"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let x = args[0].as_f64()?;
        let lo = args[1].as_f64()?;
        let hi = args[2].as_f64()?;
        Ok(Value::Number(x.max(lo).min(hi)))
    }
}

/// Arduino-style linear range mapping: `map(x, in_min, in_max, out_min, out_max)`.
pub struct MapFn;
impl Function for MapFn {
    fn name(&self) -> &'static str {
        "map"
    }
    fn min_args(&self) -> usize {
        5
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let x = args[0].as_f64()?;
        let in_min = args[1].as_f64()?;
        let in_max = args[2].as_f64()?;
        let out_min = args[3].as_f64()?;
        let out_max = args[4].as_f64()?;
        let span = in_max - in_min;
        if span == 0.0 {
            return Err(EngineError::new(EngineErrorKind::ZeroDivision));
        }
        Ok(Value::Number(out_min + (x - in_min) * (out_max - out_min) / span))
    }
}

/// `percent(part, whole)` → `part / whole * 100`.
pub struct PercentFn;
impl Function for PercentFn {
    fn name(&self) -> &'static str {
        "percent"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let whole = args[1].as_f64()?;
        if whole == 0.0 {
            return Err(EngineError::new(EngineErrorKind::ZeroDivision));
        }
        Ok(Value::Number(args[0].as_f64()? / whole * 100.0))
    }
}

pub struct SumFn;
impl Function for SumFn {
    fn name(&self) -> &'static str {
        "sum"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(collect_numbers(args)?.into_iter().sum()))
    }
}

pub struct CountFn;
impl Function for CountFn {
    fn name(&self) -> &'static str {
        "count"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let n = match args {
            [Value::List(items)] => items.len(),
            other => other.len(),
        };
        Ok(Value::Int(n as i64))
    }
}

fn mean(args: &[Value]) -> Result<f64, EngineError> {
    let nums = collect_numbers(args)?;
    if nums.is_empty() {
        return Err(EngineError::new(EngineErrorKind::Num).with_message("avg() of an empty collection"));
    }
    Ok(nums.iter().sum::<f64>() / nums.len() as f64)
}

pub struct AvgFn;
impl Function for AvgFn {
    fn name(&self) -> &'static str {
        "avg"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(mean(args)?))
    }
}

pub struct MeanFn;
impl Function for MeanFn {
    fn name(&self) -> &'static str {
        "mean"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(mean(args)?))
    }
}

pub struct MinFn;
impl Function for MinFn {
    fn name(&self) -> &'static str {
        "min"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let nums = collect_numbers(args)?;
        nums.into_iter()
            .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.min(x))))
            .map(Value::Number)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Num).with_message("min() of an empty collection"))
    }
}

pub struct MaxFn;
impl Function for MaxFn {
    fn name(&self) -> &'static str {
        "max"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        let nums = collect_numbers(args)?;
        nums.into_iter()
            .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x))))
            .map(Value::Number)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Num).with_message("max() of an empty collection"))
    }
}

fn variance(args: &[Value]) -> Result<f64, EngineError> {
    let nums = collect_numbers(args)?;
    if nums.len() < 2 {
        return Err(EngineError::new(EngineErrorKind::Num).with_message("var() requires at least 2 samples"));
    }
    let m = nums.iter().sum::<f64>() / nums.len() as f64;
    Ok(nums.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (nums.len() - 1) as f64)
}

pub struct VarFn;
impl Function for VarFn {
    fn name(&self) -> &'static str {
        "var"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(variance(args)?))
    }
}

pub struct StdFn;
impl Function for StdFn {
    fn name(&self) -> &'static str {
        "std"
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(Value::Number(variance(args)?.sqrt()))
    }
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(AbsFn));
    registry_register(std::sync::Arc::new(RoundFn));
    registry_register(std::sync::Arc::new(FloorFn));
    registry_register(std::sync::Arc::new(CeilFn));
    registry_register(std::sync::Arc::new(SqrtFn));
    registry_register(std::sync::Arc::new(PowFn));
    registry_register(std::sync::Arc::new(SinFn));
    registry_register(std::sync::Arc::new(CosFn));
    registry_register(std::sync::Arc::new(TanFn));
    registry_register(std::sync::Arc::new(LogFn));
    registry_register(std::sync::Arc::new(ExpFn));
    registry_register(std::sync::Arc::new(MinFn));
    registry_register(std::sync::Arc::new(MaxFn));
    registry_register(std::sync::Arc::new(AvgFn));
    registry_register(std::sync::Arc::new(MeanFn));
    registry_register(std::sync::Arc::new(SumFn));
    registry_register(std::sync::Arc::new(CountFn));
    registry_register(std::sync::Arc::new(ClampFn));
    registry_register(std::sync::Arc::new(MapFn));
    registry_register(std::sync::Arc::new(PercentFn));
    registry_register(std::sync::Arc::new(StdFn));
    registry_register(std::sync::Arc::new(VarFn));
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
    fn clamp_bounds_value() {
        let f = ClampFn;
        let c = ctx();
        assert_eq!(
            f.eval(&[Value::Number(15.0), Value::Number(0.0), Value::Number(10.0)], &c)
                .unwrap(),
            Value::Number(10.0)
        );
    }

    #[test]
    fn avg_over_list() {
        let f = AvgFn;
        let c = ctx();
        let list = Value::List(vec![Value::Number(2.0), Value::Number(4.0), Value::Number(6.0)]);
        assert_eq!(f.eval(&[list], &c).unwrap(), Value::Number(4.0));
    }

    #[test]
    fn map_rescales_range() {
        let f = MapFn;
        let c = ctx();
        let args = [
            Value::Number(5.0),
            Value::Number(0.0),
            Value::Number(10.0),
            Value::Number(0.0),
            Value::Number(100.0),
        ];
        assert_eq!(f.eval(&args, &c).unwrap(), Value::Number(50.0));
    }

    #[test]
    fn round_with_precision() {
        let f = RoundFn;
        let c = ctx();
        assert_eq!(
            f.eval(&[Value::Number(3.14159), Value::Int(2)], &c).unwrap(),
            Value::Number(3.14)
        );
    }
}
