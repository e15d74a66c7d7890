use synthetic_sensors_common::{Duration, EngineError, EngineErrorKind, Value};
use synthetic_sensors_parse::{BinaryOp, BoolOp, CompareOp, Expr, FStringPart, UnaryOp};

use crate::function_registry;
use crate::traits::{FunctionContext, NameEnvironment};

/// Evaluates a parsed formula against a single cycle's name environment.
/// Synchronous and side-effect free (spec §5 "the Expression Engine
/// itself must be synchronous").
pub struct Interpreter<'a> {
    pub env: &'a dyn NameEnvironment,
    pub fn_ctx: &'a dyn FunctionContext,
}

impl<'a> Interpreter<'a> {
    pub fn new(env: &'a dyn NameEnvironment, fn_ctx: &'a dyn FunctionContext) -> Self {
        Self { env, fn_ctx }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EngineError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Identifier(name) => self.env.get(name),
            Expr::Attribute { base, attr } => self.eval_attribute(base, attr),
            Expr::Index { base, index } => self.eval_index(base, index),
            Expr::Slice { base, start, stop } => self.eval_slice(base, start.as_deref(), stop.as_deref()),
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Compare { left, ops, comparators } => self.eval_compare(left, ops, comparators),
            Expr::BoolOp { op, values } => self.eval_boolop(*op, values),
            Expr::Not(inner) => Ok(Value::Boolean(!self.eval(inner)?.is_truthy())),
            Expr::Ternary { cond, body, orelse } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::In { left, right, negated } => self.eval_in(left, right, *negated),
            Expr::IsNone { expr, negated } => {
                let is_none = self.eval(expr)?.is_none();
                Ok(Value::Boolean(is_none != *negated))
            }
            Expr::Call { name, args } => self.eval_call(name, args),
            Expr::FString(parts) => self.eval_fstring(parts),
        }
    }

    fn eval_attribute(&self, base: &Expr, attr: &str) -> Result<Value, EngineError> {
        match base.as_identifier() {
            Some(name) => self.env.get_attribute(name, attr),
            None => Err(EngineError::new(EngineErrorKind::Type)
                .with_message("attribute access is only supported on a bare name")),
        }
    }

    fn eval_index(&self, base: &Expr, index: &Expr) -> Result<Value, EngineError> {
        let s = self.coerce_text(&self.eval(base)?);
        let i = self.eval(index)?.as_f64()? as i64;
        let chars: Vec<char> = s.chars().collect();
        let idx = normalize_index(i, chars.len());
        match chars.get(idx) {
            Some(c) => Ok(Value::Text(c.to_string())),
            None => Err(EngineError::new(EngineErrorKind::Num).with_message("string index out of range")),
        }
    }

    fn eval_slice(
        &self,
        base: &Expr,
        start: Option<&Expr>,
        stop: Option<&Expr>,
    ) -> Result<Value, EngineError> {
        let s = self.coerce_text(&self.eval(base)?);
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        let start_i = match start {
            Some(e) => normalize_index(self.eval(e)?.as_f64()? as i64, len),
            None => 0,
        };
        let stop_i = match stop {
            Some(e) => normalize_index(self.eval(e)?.as_f64()? as i64, len).max(start_i),
            None => len,
        };
        let slice: String = chars[start_i.min(len)..stop_i.min(len)].iter().collect();
        Ok(Value::Text(slice))
    }

    fn eval_unary(&self, op: UnaryOp, expr: &Expr) -> Result<Value, EngineError> {
        let v = self.eval(expr)?;
        let n = v.as_f64()?;
        Ok(Value::Number(match op {
            UnaryOp::Neg => -n,
            UnaryOp::Pos => n,
        }))
    }

    fn eval_boolop(&self, op: BoolOp, values: &[Expr]) -> Result<Value, EngineError> {
        match op {
            BoolOp::And => {
                let mut last = Value::Boolean(true);
                for v in values {
                    last = self.eval(v)?;
                    if !last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            BoolOp::Or => {
                let mut last = Value::Boolean(false);
                for v in values {
                    last = self.eval(v)?;
                    if last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
        }
    }

    fn eval_in(&self, left: &Expr, right: &Expr, negated: bool) -> Result<Value, EngineError> {
        let l = self.eval(left)?;
        let r = self.eval(right)?;
        let found = match &r {
            Value::List(items) => items.contains(&l),
            Value::Text(hay) => {
                let needle = self.coerce_text(&l);
                hay.contains(&needle)
            }
            other => {
                return Err(EngineError::new(EngineErrorKind::Type)
                    .with_message(format!("'in' requires a list or string, found {other:?}")));
            }
        };
        Ok(Value::Boolean(found != negated))
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<Value, EngineError> {
        let values: Vec<Value> = args.iter().map(|a| self.eval(a)).collect::<Result<_, _>>()?;
        match function_registry::get(name) {
            Some(f) => {
                if values.len() < f.min_args() {
                    return Err(EngineError::new(EngineErrorKind::Type).with_message(format!(
                        "{name}() expects at least {} argument(s), got {}",
                        f.min_args(),
                        values.len()
                    )));
                }
                if let Some(max) = f.max_args() {
                    if values.len() > max {
                        return Err(EngineError::new(EngineErrorKind::Type).with_message(format!(
                            "{name}() expects at most {max} argument(s), got {}",
                            values.len()
                        )));
                    }
                }
                f.eval(&values, self.fn_ctx)
            }
            None => Err(EngineError::new(EngineErrorKind::Name).with_name(name)),
        }
    }

    fn eval_fstring(&self, parts: &[FStringPart]) -> Result<Value, EngineError> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(s) => out.push_str(s),
                FStringPart::Expr(e) => out.push_str(&self.coerce_text(&self.eval(e)?)),
            }
        }
        Ok(Value::Text(out))
    }

    /* ----------------------------- binary ops ----------------------------- */

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EngineError> {
        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            BinaryOp::Add => self.add(l, r),
            BinaryOp::Sub => self.sub(l, r),
            BinaryOp::Mul => self.mul(l, r),
            BinaryOp::Div => self.div(l, r),
            BinaryOp::FloorDiv => self.floor_div(l, r),
            BinaryOp::Mod => self.modulo(l, r),
            BinaryOp::Pow => self.pow(l, r),
        }
    }

    fn add(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        use Value::*;
        match (l, r) {
            (Text(a), Text(b)) => Ok(Text(a + &b)),
            (Date(d), Duration(dur)) | (Duration(dur), Date(d)) => {
                Ok(Date(d + chrono::Duration::seconds(dur.total_seconds() as i64)))
            }
            (DateTime(dt), Duration(dur)) | (Duration(dur), DateTime(dt)) => {
                Ok(DateTime(dt + chrono::Duration::seconds(dur.total_seconds() as i64)))
            }
            (Duration(a), Duration(b)) => Ok(Duration(a + b)),
            (a, b) => Ok(Number(a.as_f64()? + b.as_f64()?)),
        }
    }

    fn sub(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        use Value::*;
        match (l, r) {
            (Date(d), Duration(dur)) => Ok(Date(d - chrono::Duration::seconds(dur.total_seconds() as i64))),
            (DateTime(dt), Duration(dur)) => {
                Ok(DateTime(dt - chrono::Duration::seconds(dur.total_seconds() as i64)))
            }
            (Date(a), Date(b)) => Ok(Duration(synthetic_sensors_common::Duration::from_seconds(
                (a - b).num_seconds() as f64,
            ))),
            (DateTime(a), DateTime(b)) => Ok(Duration(synthetic_sensors_common::Duration::from_seconds(
                (a - b).num_seconds() as f64,
            ))),
            (Duration(a), Duration(b)) => Ok(Duration(a - b)),
            (a, b) => Ok(Number(a.as_f64()? - b.as_f64()?)),
        }
    }

    fn mul(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        use Value::*;
        match (l, r) {
            (Duration(d), other) | (other, Duration(d)) if !matches!(other, Duration(_)) => {
                Ok(Duration(synthetic_sensors_common::Duration::from_seconds(
                    d.total_seconds() * other.as_f64()?,
                )))
            }
            (a, b) => Ok(Number(a.as_f64()? * b.as_f64()?)),
        }
    }

    fn div(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        use Value::*;
        match (l, r) {
            (Duration(a), Duration(b)) => {
                if b.total_seconds() == 0.0 {
                    return Err(EngineError::new(EngineErrorKind::ZeroDivision));
                }
                Ok(Number(a.total_seconds() / b.total_seconds()))
            }
            (Duration(a), b) => {
                let denom = b.as_f64()?;
                if denom == 0.0 {
                    return Err(EngineError::new(EngineErrorKind::ZeroDivision));
                }
                Ok(Duration(synthetic_sensors_common::Duration::from_seconds(
                    a.total_seconds() / denom,
                )))
            }
            (a, b) => {
                let denom = b.as_f64()?;
                if denom == 0.0 {
                    return Err(EngineError::new(EngineErrorKind::ZeroDivision));
                }
                Ok(Number(a.as_f64()? / denom))
            }
        }
    }

    fn floor_div(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        let denom = r.as_f64()?;
        if denom == 0.0 {
            return Err(EngineError::new(EngineErrorKind::ZeroDivision));
        }
        Ok(Value::Number((l.as_f64()? / denom).floor()))
    }

    fn modulo(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        let denom = r.as_f64()?;
        if denom == 0.0 {
            return Err(EngineError::new(EngineErrorKind::ZeroDivision));
        }
        Ok(Value::Number(l.as_f64()?.rem_euclid(denom)))
    }

    fn pow(&self, l: Value, r: Value) -> Result<Value, EngineError> {
        let base = l.as_f64()?;
        let exp = r.as_f64()?;
        let result = base.powf(exp);
        if result.is_nan() || result.is_infinite() {
            return Err(EngineError::new(EngineErrorKind::Num));
        }
        Ok(Value::Number(result))
    }

    /* ----------------------------- comparisons ----------------------------- */

    fn eval_compare(
        &self,
        left: &Expr,
        ops: &[CompareOp],
        comparators: &[Expr],
    ) -> Result<Value, EngineError> {
        let mut prev = self.eval(left)?;
        for (op, next_expr) in ops.iter().zip(comparators.iter()) {
            let next = self.eval(next_expr)?;
            if !self.compare_pair(*op, &prev, &next)? {
                return Ok(Value::Boolean(false));
            }
            prev = next;
        }
        Ok(Value::Boolean(true))
    }

    fn compare_pair(&self, op: CompareOp, l: &Value, r: &Value) -> Result<bool, EngineError> {
        use Value::*;
        let ord = match (l, r) {
            (Text(a), Text(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (DateTime(a), DateTime(b)) => a.partial_cmp(b),
            (Duration(a), Duration(b)) => a.total_seconds().partial_cmp(&b.total_seconds()),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            _ => l.as_f64().ok().and_then(|a| r.as_f64().ok().map(|b| (a, b))).and_then(
                |(a, b)| a.partial_cmp(&b),
            ),
        };
        let ord = ord.ok_or_else(|| {
            EngineError::new(EngineErrorKind::Type)
                .with_message(format!("cannot compare {l:?} and {r:?}"))
        })?;
        Ok(match op {
            CompareOp::Eq => ord == std::cmp::Ordering::Equal,
            CompareOp::NotEq => ord != std::cmp::Ordering::Equal,
            CompareOp::Lt => ord == std::cmp::Ordering::Less,
            CompareOp::LtEq => ord != std::cmp::Ordering::Greater,
            CompareOp::Gt => ord == std::cmp::Ordering::Greater,
            CompareOp::GtEq => ord != std::cmp::Ordering::Less,
        })
    }

    fn coerce_text(&self, v: &Value) -> String {
        v.to_string()
    }
}

fn normalize_index(i: i64, len: usize) -> usize {
    if i < 0 {
        (len as i64 + i).max(0) as usize
    } else {
        i as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, Value>);
    impl NameEnvironment for MapEnv {
        fn get(&self, name: &str) -> Result<Value, EngineError> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::new(EngineErrorKind::Name).with_name(name))
        }
        fn get_attribute(&self, base: &str, attr: &str) -> Result<Value, EngineError> {
            self.0
                .get(&format!("{base}.{attr}"))
                .cloned()
                .ok_or_else(|| EngineError::new(EngineErrorKind::Name).with_name(attr))
        }
    }

    struct TestCtx(FixedClock);
    impl FunctionContext for TestCtx {
        fn clock(&self) -> &dyn crate::clock::Clock {
            &self.0
        }
    }

    fn env(pairs: &[(&str, Value)]) -> MapEnv {
        MapEnv(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn energy_cost_scenario() {
        crate::function_registry::ensure_builtins_registered();
        let e = env(&[("p", Value::Number(1500.0)), ("r", Value::Number(0.12))]);
        let ctx = TestCtx(FixedClock::at(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0,0,0).unwrap()));
        let ast = synthetic_sensors_parse::parse("p * r / 1000").unwrap();
        let interp = Interpreter::new(&e, &ctx);
        assert_eq!(interp.eval(&ast).unwrap(), Value::Number(0.18));
    }

    #[test]
    fn false_preserving_conditional() {
        crate::function_registry::ensure_builtins_registered();
        let e = env(&[("last_valid_changed", Value::None)]);
        let ctx = TestCtx(FixedClock::at(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0,0,0).unwrap()));
        let ast = synthetic_sensors_parse::parse(
            "last_valid_changed is not None and minutes_between(last_valid_changed, now()) < 30",
        )
        .unwrap();
        let interp = Interpreter::new(&e, &ctx);
        assert_eq!(interp.eval(&ast).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn chained_comparison() {
        let e = env(&[("x", Value::Number(5.0))]);
        let ctx = TestCtx(FixedClock::at(chrono::NaiveDateTime::default()));
        let ast = synthetic_sensors_parse::parse("0 <= x < 10").unwrap();
        let interp = Interpreter::new(&e, &ctx);
        assert_eq!(interp.eval(&ast).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn minutes_div_minutes_is_dimensionless() {
        crate::function_registry::ensure_builtins_registered();
        let e = env(&[]);
        let ctx = TestCtx(FixedClock::at(chrono::NaiveDateTime::default()));
        let ast = synthetic_sensors_parse::parse("minutes(5) / minutes(1)").unwrap();
        let interp = Interpreter::new(&e, &ctx);
        assert_eq!(interp.eval(&ast).unwrap(), Value::Number(5.0));
    }
}
