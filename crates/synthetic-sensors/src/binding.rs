//! Variable binding plans (spec §4.2 `build_binding_plan`). Classifies
//! every name a formula references into one of the six resolver
//! strategies (spec §4.4) using the sensor's declared namespaces —
//! fixed at config-load time — plus the formula's `FormulaAnalysis`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use synthetic_sensors_parse::ParsingError;

use crate::analysis::get_formula_analysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    HaState,
    DataProvider,
    Literal,
    Computed,
    CrossSensor,
    StateAttribute,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingPlan {
    pub strategies: HashMap<String, Strategy>,
}

/// The sensor-scoped namespaces a binding plan is built against; these
/// come from config, not from any single formula, which is why the
/// cache key below is `(sensor_id, formula)` rather than formula text
/// alone (see DESIGN.md — this sharpens spec §4.2's "keyed by formula
/// text" for the fact that binding strategy also depends on the
/// sensor's declared variable namespaces).
#[derive(Debug, Clone, Default)]
pub struct BindingEnvironment {
    pub literal_names: HashSet<String>,
    pub computed_names: HashSet<String>,
    pub cross_sensor_keys: HashSet<String>,
}

/// Bare identifiers never contain a `.` — the tokenizer always splits a
/// dotted reference into an `Attribute` node, handled separately below.
/// The only bare name the resolver treats as HA state rather than a
/// data-provider lookup is the `state` keyword (spec §4.4).
fn looks_like_ha_state(name: &str) -> bool {
    name == "state"
}

fn classify(name: &str, env: &BindingEnvironment) -> Strategy {
    if env.cross_sensor_keys.contains(name) {
        Strategy::CrossSensor
    } else if env.literal_names.contains(name) {
        Strategy::Literal
    } else if env.computed_names.contains(name) {
        Strategy::Computed
    } else if looks_like_ha_state(name) {
        Strategy::HaState
    } else {
        Strategy::DataProvider
    }
}

type BindingCache = DashMap<(String, String), Arc<BindingPlan>>;
static BINDING_CACHE: Lazy<BindingCache> = Lazy::new(DashMap::new);

pub fn build_binding_plan(
    sensor_id: &str,
    formula: &str,
    env: &BindingEnvironment,
) -> Result<Arc<BindingPlan>, ParsingError> {
    let key = (sensor_id.to_string(), formula.to_string());
    if let Some(existing) = BINDING_CACHE.get(&key) {
        return Ok(Arc::clone(existing.value()));
    }
    let analysis = get_formula_analysis(formula)?;
    let mut plan = BindingPlan::default();
    for name in &analysis.identifiers {
        plan.strategies.insert(name.clone(), classify(name, env));
    }
    for (base, attr) in &analysis.dotted {
        let dotted_key = format!("{base}.{attr}");
        // A dotted access's base is syntactically identical whether it
        // names a declared sensor variable (true attribute access) or
        // is just the domain segment of a two-part HA entity id like
        // `sensor.power` (the tokenizer always splits on `.`). Only the
        // former is a declared name in this sensor's namespace.
        if env.literal_names.contains(base) || env.computed_names.contains(base) || env.cross_sensor_keys.contains(base)
        {
            plan.strategies.insert(dotted_key, Strategy::StateAttribute);
        } else {
            plan.strategies.insert(dotted_key, Strategy::HaState);
        }
    }
    let plan = Arc::new(plan);
    BINDING_CACHE.insert(key, Arc::clone(&plan));
    Ok(plan)
}

#[cfg(test)]
pub(crate) fn clear_cache() {
    BINDING_CACHE.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_declared_namespace() {
        clear_cache();
        crate::analysis::clear_cache();
        let mut env = BindingEnvironment::default();
        env.literal_names.insert("offset".to_string());
        env.computed_names.insert("step1".to_string());
        let plan = build_binding_plan("s1", "sensor.power + offset + step1", &env).unwrap();
        assert_eq!(plan.strategies.get("sensor.power"), Some(&Strategy::HaState));
        assert_eq!(plan.strategies.get("offset"), Some(&Strategy::Literal));
        assert_eq!(plan.strategies.get("step1"), Some(&Strategy::Computed));
    }

    #[test]
    fn dotted_access_to_an_undeclared_base_is_an_ha_state_entity_id() {
        clear_cache();
        crate::analysis::clear_cache();
        let env = BindingEnvironment::default();
        let plan = build_binding_plan("s1", "power.battery_level", &env).unwrap();
        assert_eq!(plan.strategies.get("power.battery_level"), Some(&Strategy::HaState));
        assert!(!plan.strategies.contains_key("power"));
    }

    #[test]
    fn dotted_access_to_a_declared_variable_is_a_state_attribute() {
        clear_cache();
        crate::analysis::clear_cache();
        let mut env = BindingEnvironment::default();
        env.literal_names.insert("power".to_string());
        let plan = build_binding_plan("s1", "power.battery_level", &env).unwrap();
        assert_eq!(plan.strategies.get("power.battery_level"), Some(&Strategy::StateAttribute));
    }
}
