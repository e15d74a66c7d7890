//! `metadata_result(value)` — the identity builtin the Metadata Handler
//! routes through after rewriting `metadata(ref, 'key')` call sites
//! into `_metadata_<n>` sentinel identifiers (see the engine crate's
//! metadata module). By the time this function runs, `value` is
//! already the resolved sentinel; this builtin exists only so the
//! rewritten formula text still reads as a function call the analysis
//! walk can recognize, not as a bare identifier indistinguishable from
//! any other name.

use synthetic_sensors_common::{EngineError, Value};

use crate::function_registry::register_function;
use crate::traits::{Function, FunctionContext};

pub struct MetadataResultFn;
impl Function for MetadataResultFn {
    fn name(&self) -> &'static str {
        "metadata_result"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[Value], _ctx: &dyn FunctionContext) -> Result<Value, EngineError> {
        Ok(args[0].clone())
    }
}

pub fn load(registry_register: impl Fn(std::sync::Arc<dyn Function>)) {
    registry_register(std::sync::Arc::new(MetadataResultFn));
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

    #[test]
    fn passes_value_through_unchanged() {
        let ctx = Ctx(FixedClock::at(NaiveDateTime::default()));
        let f = MetadataResultFn;
        assert_eq!(
            f.eval(&[Value::Text("living_room".into())], &ctx).unwrap(),
            Value::Text("living_room".into())
        );
    }
}
