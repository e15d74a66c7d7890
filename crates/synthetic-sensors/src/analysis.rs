//! AST Analysis Service (spec §4.2, C2): one AST walk per distinct
//! formula text, memoized forever. Pure — no side effects, no I/O.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use synthetic_sensors_parse::{Expr, ParsingError};

/// A single `metadata(<ref>, '<key>')` call site found in a formula
/// (spec §4.7). `reference` is `None` when the first argument isn't a
/// bare name or the `state` token (e.g. a nested expression) — the
/// Metadata Handler treats that as unsupported today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCallSite {
    pub reference: Option<String>,
    pub key: String,
}

/// A collection-aggregate call whose first argument is a literal
/// selector pattern (spec §4.2 "collection function call sites and
/// their query string argument"), e.g. `sum('device_class:energy')`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCallSite {
    pub function: String,
    pub pattern: String,
}

const AGGREGATE_FUNCTIONS: &[&str] = &["sum", "count", "avg", "mean", "min", "max", "std", "var"];

/// The result of one AST walk over a formula (spec §4.2). Memoized by
/// exact formula text; never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaAnalysis {
    /// Every bare name the interpreter would look up directly via
    /// `NameEnvironment::get` — this excludes a dotted access's base,
    /// since the interpreter never resolves that base on its own, only
    /// through `get_attribute` (see `dotted` below; the tokenizer
    /// always splits `sensor.power` into `Attribute{base, attr}`, so a
    /// two-segment HA entity id and a true variable-attribute access
    /// are syntactically identical and distinguished later, by the
    /// binding plan, from the sensor's declared variable namespace).
    pub identifiers: HashSet<String>,
    /// `base.attr` accesses where `base` is a bare name.
    pub dotted: Vec<(String, String)>,
    pub metadata_calls: Vec<MetadataCallSite>,
    pub collection_calls: Vec<CollectionCallSite>,
}

impl FormulaAnalysis {
    fn walk(expr: &Expr, out: &mut FormulaAnalysis) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Identifier(name) => {
                out.identifiers.insert(name.clone());
            }
            Expr::Attribute { base, attr } => {
                if let Some(name) = base.as_identifier() {
                    out.dotted.push((name.to_string(), attr.clone()));
                } else {
                    Self::walk(base, out);
                }
            }
            Expr::Index { base, index } => {
                Self::walk(base, out);
                Self::walk(index, out);
            }
            Expr::Slice { base, start, stop } => {
                Self::walk(base, out);
                if let Some(s) = start {
                    Self::walk(s, out);
                }
                if let Some(s) = stop {
                    Self::walk(s, out);
                }
            }
            Expr::Unary { expr, .. } => Self::walk(expr, out),
            Expr::Binary { left, right, .. } => {
                Self::walk(left, out);
                Self::walk(right, out);
            }
            Expr::Compare { left, comparators, .. } => {
                Self::walk(left, out);
                for c in comparators {
                    Self::walk(c, out);
                }
            }
            Expr::BoolOp { values, .. } => {
                for v in values {
                    Self::walk(v, out);
                }
            }
            Expr::Not(inner) => Self::walk(inner, out),
            Expr::Ternary { cond, body, orelse } => {
                Self::walk(cond, out);
                Self::walk(body, out);
                Self::walk(orelse, out);
            }
            Expr::In { left, right, .. } => {
                Self::walk(left, out);
                Self::walk(right, out);
            }
            Expr::IsNone { expr, .. } => Self::walk(expr, out),
            Expr::Call { name, args } => {
                if name.eq_ignore_ascii_case("metadata") && args.len() == 2 {
                    let reference = match &args[0] {
                        Expr::Identifier(n) => Some(n.clone()),
                        _ => None,
                    };
                    if let Expr::Literal(synthetic_sensors_parse::Value::Text(key)) = &args[1] {
                        out.metadata_calls.push(MetadataCallSite { reference: reference.clone(), key: key.clone() });
                    }
                } else if AGGREGATE_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str()) {
                    if let Some(Expr::Literal(synthetic_sensors_parse::Value::Text(pattern))) = args.first() {
                        if pattern.contains(':') || pattern.contains('=') {
                            out.collection_calls
                                .push(CollectionCallSite { function: name.clone(), pattern: pattern.clone() });
                        }
                    }
                }
                for a in args {
                    Self::walk(a, out);
                }
            }
            Expr::FString(parts) => {
                for part in parts {
                    if let synthetic_sensors_parse::FStringPart::Expr(e) = part {
                        Self::walk(e, out);
                    }
                }
            }
        }
    }
}

static ANALYSIS_CACHE: Lazy<DashMap<String, Arc<FormulaAnalysis>>> = Lazy::new(DashMap::new);

/// Memoized: `identical formula text ⇒ structurally equal output`
/// (spec §8 invariant 6). Returns a fatal `SyntaxError` if the formula
/// does not parse.
pub fn get_formula_analysis(formula: &str) -> Result<Arc<FormulaAnalysis>, ParsingError> {
    if let Some(existing) = ANALYSIS_CACHE.get(formula) {
        return Ok(Arc::clone(existing.value()));
    }
    let ast = synthetic_sensors_parse::parse_cached(formula)?;
    let mut analysis = FormulaAnalysis::default();
    FormulaAnalysis::walk(ast.as_ref(), &mut analysis);
    let analysis = Arc::new(analysis);
    ANALYSIS_CACHE.insert(formula.to_string(), Arc::clone(&analysis));
    Ok(analysis)
}

#[cfg(test)]
pub(crate) fn clear_cache() {
    ANALYSIS_CACHE.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_identifiers_and_dotted_access() {
        clear_cache();
        let a = get_formula_analysis("power.battery_level + offset").unwrap();
        assert!(!a.identifiers.contains("power"));
        assert!(a.identifiers.contains("offset"));
        assert!(a.dotted.contains(&("power".to_string(), "battery_level".to_string())));
    }

    #[test]
    fn finds_metadata_call_sites() {
        clear_cache();
        let a = get_formula_analysis("minutes_between(metadata(power,'last_changed'), now()) < 60").unwrap();
        assert_eq!(a.metadata_calls.len(), 1);
        assert_eq!(a.metadata_calls[0].reference.as_deref(), Some("power"));
        assert_eq!(a.metadata_calls[0].key, "last_changed");
    }

    #[test]
    fn analysis_is_pure_given_identical_text() {
        clear_cache();
        let a1 = get_formula_analysis("x + y").unwrap();
        let a2 = get_formula_analysis("x + y").unwrap();
        assert_eq!(*a1, *a2);
    }
}
