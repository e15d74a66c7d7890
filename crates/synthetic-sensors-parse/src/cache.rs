//! Compiled-AST cache, keyed by exact formula text (spec §4.1 "compile a
//! formula string once ... cache keyed by exact formula text" and §5
//! "Compiled AST cache: same [policy as the analysis/binding-plan
//! caches] — global, permanent, thread-safe"). Mirrors the registry
//! pattern in `formualizer-eval::function_registry` (a process-wide
//! `DashMap` behind a `once_cell::Lazy`).

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::ast::Expr;
use crate::parser::{parse, ParsingError};

static AST_CACHE: Lazy<DashMap<String, Arc<Expr>>> = Lazy::new(DashMap::new);

/// Parse `formula`, or return the cached AST from a prior call with the
/// identical formula text. Never evicted: analysis and evaluation both
/// hold formula text for the lifetime of a sensor-set configuration, so
/// the working set is bounded by the number of distinct formulas.
pub fn parse_cached(formula: &str) -> Result<Arc<Expr>, ParsingError> {
    if let Some(hit) = AST_CACHE.get(formula) {
        return Ok(Arc::clone(hit.value()));
    }
    let ast = Arc::new(parse(formula)?);
    AST_CACHE.insert(formula.to_string(), Arc::clone(&ast));
    Ok(ast)
}

/// Test-only escape hatch; production code never needs to evict since
/// formula text, not a mutable cell, is the cache key.
#[cfg(test)]
pub fn clear_cache() {
    AST_CACHE.clear();
}
