//! Dependency Manager (spec §4.5, C5): dependency extraction,
//! collection-pattern expansion, and circular-reference detection.

use std::collections::{HashMap, HashSet};

use synthetic_sensors_common::{EngineError, EngineErrorKind};

use crate::analysis::FormulaAnalysis;
use crate::providers::StateProvider;

pub fn extract_dependencies(analysis: &FormulaAnalysis) -> HashSet<String> {
    analysis.identifiers.clone()
}

/// One alternative or exclusion term of a collection pattern (spec §6
/// "Collection pattern syntax"): `selector(:|op)value`. The selector
/// and operator are forwarded to the state provider verbatim — the
/// provider, not this crate, owns entity enumeration semantics (spec
/// §1 "explicitly out of scope").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionQuery {
    pub alternatives: Vec<Selector>,
    pub exclusions: Vec<Selector>,
}

/// Parses `selector(:|op)value (|alternative)* (, !exclusion)*` (spec
/// §6). `|` separates OR'd alternatives within one term; a leading `!`
/// or a term after a top-level `,` marks an exclusion.
pub fn parse_collection_query(query: &str) -> CollectionQuery {
    let mut out = CollectionQuery::default();
    for comma_term in query.split(',') {
        let term = comma_term.trim();
        if term.is_empty() {
            continue;
        }
        for alt in term.split('|') {
            let alt = alt.trim();
            if alt.is_empty() {
                continue;
            }
            if let Some(stripped) = alt.strip_prefix('!') {
                out.exclusions.push(Selector { raw: stripped.trim().to_string() });
            } else {
                out.alternatives.push(Selector { raw: alt.to_string() });
            }
        }
    }
    out
}

impl CollectionQuery {
    /// Inverse of `parse_collection_query`, used by `config::export_yaml`
    /// to round-trip a collection variable back into its YAML scalar
    /// form.
    pub fn to_query_string(&self) -> String {
        let alts = self.alternatives.iter().map(|s| s.raw.as_str()).collect::<Vec<_>>().join("|");
        if self.exclusions.is_empty() {
            alts
        } else {
            let excls = self.exclusions.iter().map(|s| format!("!{}", s.raw)).collect::<Vec<_>>().join(", ");
            format!("{alts}, {excls}")
        }
    }
}

/// Expansion consults the state provider's enumeration API (spec
/// §4.5). Resolved per the §9 open question: union of all alternatives
/// first, then exclusions are removed as a post-filter.
pub fn expand_collection_queries(queries: &[CollectionQuery], provider: &dyn StateProvider) -> HashSet<String> {
    let mut union = HashSet::new();
    for query in queries {
        for alt in &query.alternatives {
            union.extend(provider.enumerate(&alt.raw));
        }
    }
    let mut excluded = HashSet::new();
    for query in queries {
        for excl in &query.exclusions {
            excluded.extend(provider.enumerate(&excl.raw));
        }
    }
    union.retain(|entity| !excluded.contains(entity));
    union
}

/// One sensor's dependency shape for circular-reference detection
/// (spec §4.5): main formula, each computed variable's formula keyed
/// by name, each attribute's formula keyed by name.
#[derive(Debug, Default)]
pub struct SensorFormulaGraph {
    pub main: String,
    pub computed_variables: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
}

/// Builds a DAG over main → computed variables → attributes and fails
/// fatally if it contains a cycle (spec §4.5, §7 "fatal before any
/// evaluation begins"). Edges point from a formula node to every
/// computed-variable name it references.
pub fn detect_circular_refs(graph: &SensorFormulaGraph) -> Result<(), EngineError> {
    let mut nodes: HashMap<&str, &str> = HashMap::new();
    nodes.insert("__main__", graph.main.as_str());
    for (name, formula) in &graph.computed_variables {
        nodes.insert(name.as_str(), formula.as_str());
    }
    for (name, formula) in &graph.attributes {
        nodes.insert(name.as_str(), formula.as_str());
    }

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();

    for &start in nodes.keys() {
        if !visited.contains(start) {
            visit(start, &nodes, &mut visiting, &mut visited, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    node: &'a str,
    nodes: &HashMap<&'a str, &'a str>,
    visiting: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Result<(), EngineError> {
    if visited.contains(node) {
        return Ok(());
    }
    if visiting.contains(node) {
        stack.push(node);
        let cycle_start = stack.iter().position(|n| *n == node).unwrap_or(0);
        let cycle: Vec<String> = stack[cycle_start..].iter().map(|s| s.to_string()).collect();
        return Err(EngineError::new(EngineErrorKind::Configuration)
            .with_message(format!("circular reference: {}", cycle.join(" -> "))));
    }
    let Some(&formula) = nodes.get(node) else {
        return Ok(());
    };
    visiting.insert(node);
    stack.push(node);
    if let Ok(analysis) = crate::analysis::get_formula_analysis(formula) {
        for dep in &analysis.identifiers {
            if nodes.contains_key(dep.as_str()) {
                visit(dep.as_str(), nodes, visiting, visited, stack)?;
            }
        }
    }
    stack.pop();
    visiting.remove(node);
    visited.insert(node);
    Ok(())
}

/// Topologically orders a sensor's computed variables (spec §4.9 step
/// 2) so that each variable is evaluated only after every other
/// computed variable it references. Assumes `detect_circular_refs` has
/// already passed for the enclosing sensor.
pub fn topo_order_computed_variables(vars: &HashMap<String, String>) -> Result<Vec<String>, EngineError> {
    let mut order = Vec::with_capacity(vars.len());
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();

    fn visit(
        name: &str,
        vars: &HashMap<String, String>,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            return Err(EngineError::new(EngineErrorKind::Configuration)
                .with_message(format!("circular reference among computed variables at '{name}'")));
        }
        let Some(formula) = vars.get(name) else {
            return Ok(());
        };
        visiting.insert(name.to_string());
        if let Ok(analysis) = crate::analysis::get_formula_analysis(formula) {
            for dep in &analysis.identifiers {
                if vars.contains_key(dep.as_str()) {
                    visit(dep, vars, visiting, visited, order)?;
                }
            }
        }
        visiting.remove(name);
        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();
    for name in names {
        visit(name, vars, &mut visiting, &mut visited, &mut order)?;
    }
    Ok(order)
}
