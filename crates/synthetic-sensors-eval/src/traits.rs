//! Object-safe seams between the interpreter and its host: name
//! resolution (owned by the engine crate's `HierarchicalContext`) and
//! builtin function dispatch (owned by this crate's registry).

use synthetic_sensors_common::{EngineError, Value};

use crate::clock::Clock;

/// The interpreter's only way to read a name. Implemented by the
/// engine crate's context adapter; `get` performs lazy resolution
/// (spec §4.6 Phase 1's `LazyResolver`) and surfaces a `NameError` for
/// anything outside the current binding plan.
pub trait NameEnvironment {
    fn get(&self, name: &str) -> Result<Value, EngineError>;

    /// `<var>.<attr>` — resolve `var` through `get`, then read `attr`
    /// via the metadata provider (binding-plan strategy
    /// `state_attribute`, spec §4.4).
    fn get_attribute(&self, base: &str, attr: &str) -> Result<Value, EngineError>;
}

/// What a builtin function needs beyond its already-evaluated
/// arguments: the cycle's clock. Functions never see the
/// `NameEnvironment` — they are pure transforms over `Value`s.
pub trait FunctionContext {
    fn clock(&self) -> &dyn Clock;
}

/// A builtin, registered once at process start (spec §4.1's "built-in
/// function environment"). Object-safe so the registry can hold
/// `Arc<dyn Function>` regardless of concrete arg counts.
pub trait Function: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn min_args(&self) -> usize {
        0
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value], ctx: &dyn FunctionContext) -> Result<Value, EngineError>;
}
