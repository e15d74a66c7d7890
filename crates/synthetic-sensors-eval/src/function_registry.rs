//! Process-wide, permanent function registry (spec §5 "no global
//! mutable state beyond the three caches" — this is the evaluation
//! engine's fixed built-in environment, populated once and never
//! mutated per-cycle). Same `DashMap` + `once_cell::Lazy` shape as
//! `formualizer-eval::function_registry`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::traits::Function;

static REGISTRY: Lazy<DashMap<String, Arc<dyn Function>>> = Lazy::new(DashMap::new);

pub fn register_function(f: Arc<dyn Function>) {
    REGISTRY.insert(f.name().to_string(), f);
}

pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    REGISTRY.get(name).map(|v| Arc::clone(v.value()))
}

/// Idempotent; safe to call from multiple call sites (tests each build
/// their own interpreter but share the process-wide registry).
pub fn ensure_builtins_registered() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(crate::builtins::load_builtins);
}
