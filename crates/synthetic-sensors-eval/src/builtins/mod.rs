//! Builtin function modules, grouped by category (spec §4.1's "Built-in
//! function environment" list). `load_builtins` is called exactly once
//! by `function_registry::ensure_builtins_registered`.

pub mod datetime;
pub mod duration;
pub mod math;
pub mod metadata;

pub(crate) fn load_builtins() {
    math::load_all();
    duration::load_all();
    datetime::load_all();
    metadata::load_all();
}
