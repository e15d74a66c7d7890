//! YAML sensor-set dialect (spec §6 "Configuration language"):
//! deserializes into raw `serde`/`serde_yaml` structs, then lowers those
//! into the domain types `sensor.rs` already evaluates against.
//! `import_yaml`/`export_yaml` are the two directions the storage layer
//! exposes (spec §4.10); this module owns only the translation, not the
//! CRUD/collision semantics (see `storage.rs`).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use synthetic_sensors_common::Value;

use crate::alternate_state::{AlternateStatesConfig, HandlerAction};
use crate::dependency::{parse_collection_query, CollectionQuery};
use crate::error::ConfigError;
use crate::sensor::{AttributeDefinition, AttributeSource, SensorDefinition, VariableSource};

static ENTITY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*\.[a-z0-9_]+$").unwrap());

/// Collection-pattern selectors (spec §6); a scalar variable value
/// starting with one of these, or containing a top-level `,`/`|`, is a
/// collection pattern rather than a literal or entity id.
const COLLECTION_SELECTORS: &[&str] = &["device_class", "area", "label", "state", "attribute", "regex"];

fn looks_like_collection_pattern(raw: &str) -> bool {
    raw.contains('|')
        || raw.contains(',')
        || COLLECTION_SELECTORS.iter().any(|sel| {
            raw.starts_with(sel) && raw[sel.len()..].starts_with(':')
        })
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGlobalSettings {
    pub device_identifier: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAlternateStateHandler {
    pub formula: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawHandlerValue {
    Formula(RawAlternateStateHandler),
    Literal(serde_yaml::Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAttributeFormula {
    pub formula: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub alternate_states: HashMap<String, RawHandlerValue>,
    #[serde(default)]
    pub allow_unresolved_states: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawAttribute {
    Formula(RawAttributeFormula),
    Literal(serde_yaml::Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSensor {
    pub name: Option<String>,
    pub entity_id: Option<String>,
    pub formula: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub attributes: HashMap<String, RawAttribute>,
    #[serde(default)]
    pub alternate_states: HashMap<String, RawHandlerValue>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub device_identifier: Option<String>,
    pub device_name: Option<String>,
    #[serde(default)]
    pub allow_unresolved_states: bool,
}

fn lower_variable_value(key: &str, raw: &serde_yaml::Value) -> Result<VariableSource, ConfigError> {
    // A `{formula, variables?}` mapping is always a computed variable.
    if raw.is_mapping() {
        let handler: RawAlternateStateHandler = serde_yaml::from_value(raw.clone())?;
        return Ok(VariableSource::Computed(handler.formula));
    }
    let as_text = match raw {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return Err(ConfigError::InvalidMetadataKey(format!("unsupported value for variable '{key}'"))),
    };
    if looks_like_collection_pattern(&as_text) {
        let queries: Vec<CollectionQuery> = vec![parse_collection_query(&as_text)];
        return Ok(VariableSource::Collection(queries));
    }
    if ENTITY_ID.is_match(&as_text) {
        return Ok(VariableSource::EntityReference(as_text));
    }
    Ok(VariableSource::Literal(Value::parse_literal(&as_text)))
}

fn lower_variables(raw: &HashMap<String, serde_yaml::Value>) -> Result<Vec<(String, VariableSource)>, ConfigError> {
    let mut names: Vec<&String> = raw.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| Ok((name.clone(), lower_variable_value(name, &raw[name])?)))
        .collect()
}

fn lower_handler_value(raw: &RawHandlerValue) -> HandlerAction {
    match raw {
        RawHandlerValue::Literal(v) => {
            let text = match v {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => "none".to_string(),
                other => format!("{other:?}"),
            };
            HandlerAction::Literal(Value::parse_literal(&text))
        }
        RawHandlerValue::Formula(h) => {
            let variables = h
                .variables
                .iter()
                .filter_map(|(k, v)| match lower_variable_value(k, v).ok()? {
                    VariableSource::Literal(value) => Some((k.clone(), value)),
                    _ => None,
                })
                .collect();
            HandlerAction::Formula { formula: h.formula.clone(), variables }
        }
    }
}

fn lower_alternate_states(raw: &HashMap<String, RawHandlerValue>) -> AlternateStatesConfig {
    let mut config = AlternateStatesConfig::default();
    for (key, value) in raw {
        let action = lower_handler_value(value);
        match key.to_ascii_uppercase().as_str() {
            "UNAVAILABLE" => config.unavailable = Some(action),
            "UNKNOWN" => config.unknown = Some(action),
            "NONE" => config.none = Some(action),
            "FALLBACK" => config.fallback = Some(action),
            _ => {}
        }
    }
    config
}

fn lower_attribute(raw: &RawAttribute) -> Result<AttributeDefinition, ConfigError> {
    match raw {
        RawAttribute::Literal(v) => {
            let text = match v {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => "none".to_string(),
                other => format!("{other:?}"),
            };
            Ok(AttributeDefinition {
                source: Some(AttributeSource::Literal(Value::parse_literal(&text))),
                variables: HashMap::new(),
                alternate_states: AlternateStatesConfig::default(),
                allow_unresolved_states: false,
            })
        }
        RawAttribute::Formula(f) => Ok(AttributeDefinition {
            source: Some(AttributeSource::Formula(f.formula.clone())),
            variables: lower_variables(&f.variables)?.into_iter().collect(),
            alternate_states: lower_alternate_states(&f.alternate_states),
            allow_unresolved_states: f.allow_unresolved_states,
        }),
    }
}

/// Lowers one raw sensor entry plus the sensor set's global variables
/// into a `SensorDefinition`. Global variables are not copied into the
/// sensor's own variable list — they are bound at L0 of the context by
/// the sensor orchestrator (spec §4.9 step 1), not re-declared here.
pub fn lower_sensor(key: &str, raw: &RawSensor) -> Result<SensorDefinition, ConfigError> {
    let variables = lower_variables(&raw.variables)?;
    let attributes = {
        let mut names: Vec<&String> = raw.attributes.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| Ok((name.clone(), lower_attribute(&raw.attributes[name])?)))
            .collect::<Result<Vec<_>, ConfigError>>()?
    };
    Ok(SensorDefinition {
        id: key.to_string(),
        entity_id: raw.entity_id.clone(),
        formula: raw.formula.clone(),
        variables,
        attributes,
        alternate_states: lower_alternate_states(&raw.alternate_states),
        allow_unresolved_states: raw.allow_unresolved_states,
    })
}

/// Lowers the sensor set's `global_settings.variables` into literal
/// globals bound at context L0 (spec §4.9 step 1). Collection/entity
/// references are not supported at this scope — a global is either a
/// literal or a computed formula the caller evaluates itself before the
/// cycle begins, since no sensor-scoped namespace exists yet to check
/// for e.g. cross-sensor keys.
pub fn lower_globals(raw: &RawGlobalSettings) -> HashMap<String, Value> {
    raw.variables
        .iter()
        .filter_map(|(k, v)| match v {
            serde_yaml::Value::String(s) => Some((k.clone(), Value::parse_literal(s))),
            serde_yaml::Value::Number(n) => Some((k.clone(), Value::parse_literal(&n.to_string()))),
            serde_yaml::Value::Bool(b) => Some((k.clone(), Value::Boolean(*b))),
            _ => None,
        })
        .collect()
}

fn raise_variable_value(source: &VariableSource) -> serde_yaml::Value {
    match source {
        VariableSource::Literal(v) => serde_yaml::Value::String(v.to_published().to_string()),
        VariableSource::EntityReference(entity_id) => serde_yaml::Value::String(entity_id.clone()),
        VariableSource::Collection(queries) => {
            let joined = queries.iter().map(|q| q.to_query_string()).collect::<Vec<_>>().join(", ");
            serde_yaml::Value::String(joined)
        }
        VariableSource::Computed(formula) => {
            let mut map = serde_yaml::Mapping::new();
            map.insert(serde_yaml::Value::String("formula".to_string()), serde_yaml::Value::String(formula.clone()));
            serde_yaml::Value::Mapping(map)
        }
    }
}

fn raise_handler_action(action: &HandlerAction) -> RawHandlerValue {
    match action {
        HandlerAction::Literal(v) => RawHandlerValue::Literal(serde_yaml::Value::String(v.to_published().to_string())),
        HandlerAction::Formula { formula, variables } => RawHandlerValue::Formula(RawAlternateStateHandler {
            formula: formula.clone(),
            variables: variables
                .iter()
                .map(|(k, v)| (k.clone(), serde_yaml::Value::String(v.to_published().to_string())))
                .collect(),
        }),
    }
}

fn raise_alternate_states(config: &AlternateStatesConfig) -> HashMap<String, RawHandlerValue> {
    let mut out = HashMap::new();
    if let Some(a) = &config.unavailable {
        out.insert("UNAVAILABLE".to_string(), raise_handler_action(a));
    }
    if let Some(a) = &config.unknown {
        out.insert("UNKNOWN".to_string(), raise_handler_action(a));
    }
    if let Some(a) = &config.none {
        out.insert("NONE".to_string(), raise_handler_action(a));
    }
    if let Some(a) = &config.fallback {
        out.insert("FALLBACK".to_string(), raise_handler_action(a));
    }
    out
}

fn raise_attribute(def: &AttributeDefinition) -> RawAttribute {
    match &def.source {
        Some(AttributeSource::Literal(v)) => RawAttribute::Literal(serde_yaml::Value::String(v.to_published().to_string())),
        Some(AttributeSource::Formula(formula)) => RawAttribute::Formula(RawAttributeFormula {
            formula: formula.clone(),
            variables: def.variables.iter().map(|(k, v)| (k.clone(), raise_variable_value(v))).collect(),
            metadata: HashMap::new(),
            alternate_states: raise_alternate_states(&def.alternate_states),
            allow_unresolved_states: def.allow_unresolved_states,
        }),
        None => RawAttribute::Literal(serde_yaml::Value::Null),
    }
}

/// Inverse of `lower_sensor`, used by `storage::export_yaml` (spec
/// §4.10). Metadata is not preserved here since `SensorDefinition` does
/// not retain the raw metadata map — a host that round-trips metadata
/// verbatim should keep its own copy of the original YAML document.
pub fn raise_sensor(sensor: &SensorDefinition) -> RawSensor {
    RawSensor {
        name: None,
        entity_id: sensor.entity_id.clone(),
        formula: sensor.formula.clone(),
        variables: sensor.variables.iter().map(|(k, v)| (k.clone(), raise_variable_value(v))).collect(),
        attributes: sensor.attributes.iter().map(|(k, v)| (k.clone(), raise_attribute(v))).collect(),
        alternate_states: raise_alternate_states(&sensor.alternate_states),
        metadata: HashMap::new(),
        device_identifier: None,
        device_name: None,
        allow_unresolved_states: sensor.allow_unresolved_states,
    }
}

/// Parses a sensor-set YAML document (spec §6) in declaration order —
/// `serde_yaml::Mapping` preserves insertion order, which is what the
/// entity-collision suffix rule in §4.10 depends on.
pub fn import_yaml(text: &str) -> Result<(RawGlobalSettings, Vec<(String, SensorDefinition)>), ConfigError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
    let version = doc.get("version").and_then(|v| v.as_str()).unwrap_or("1.0").to_string();
    let _ = version;
    let global_settings: RawGlobalSettings = doc
        .get("global_settings")
        .cloned()
        .map(serde_yaml::from_value)
        .transpose()?
        .unwrap_or_default();

    let mut sensors = Vec::new();
    if let Some(serde_yaml::Value::Mapping(map)) = doc.get("sensors") {
        for (key, value) in map {
            let key = key.as_str().ok_or_else(|| ConfigError::InvalidMetadataKey("sensor key must be a string".into()))?;
            let raw: RawSensor = serde_yaml::from_value(value.clone())?;
            let sensor = lower_sensor(key, &raw)?;
            sensors.push((key.to_string(), sensor));
        }
    }
    Ok((global_settings, sensors))
}

/// Serializes a sensor set back to the YAML dialect (spec §4.10
/// `export_yaml`). Round-trips through the raw structs rather than the
/// domain types directly, since `SensorDefinition` has already resolved
/// variable-source classification away from the original YAML shape.
pub fn export_yaml(
    global_settings: &RawGlobalSettings,
    sensors: &[(String, RawSensor)],
) -> Result<String, ConfigError> {
    // `serde_yaml::Mapping` preserves insertion order on serialization
    // (spec §4.10's declaration-order guarantee); a `HashMap` field
    // would not, so the sensors map is built directly rather than going
    // through `RawSensorSet::sensors`.
    let mut sensors_map = serde_yaml::Mapping::new();
    for (key, sensor) in sensors {
        sensors_map.insert(serde_yaml::Value::String(key.clone()), serde_yaml::to_value(sensor)?);
    }
    let mut doc = serde_yaml::Mapping::new();
    doc.insert(serde_yaml::Value::String("version".to_string()), serde_yaml::Value::String("1.0".to_string()));
    doc.insert(serde_yaml::Value::String("global_settings".to_string()), serde_yaml::to_value(global_settings)?);
    doc.insert(serde_yaml::Value::String("sensors".to_string()), serde_yaml::Value::Mapping(sensors_map));
    Ok(serde_yaml::to_string(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_a_basic_sensor_with_typed_variables() {
        let yaml = r#"
version: "1.0"
sensors:
  energy_cost:
    formula: "power * rate"
    variables:
      power: sensor.house_power
      rate: 0.12
"#;
        let (_, sensors) = import_yaml(yaml).unwrap();
        assert_eq!(sensors.len(), 1);
        let (key, sensor) = &sensors[0];
        assert_eq!(key, "energy_cost");
        assert_eq!(sensor.formula, "power * rate");
        let vars: HashMap<_, _> = sensor.variables.iter().cloned().collect();
        assert_eq!(vars.get("power"), Some(&VariableSource::EntityReference("sensor.house_power".to_string())));
        assert_eq!(vars.get("rate"), Some(&VariableSource::Literal(Value::Number(0.12))));
    }

    #[test]
    fn imports_a_collection_variable() {
        let yaml = r#"
version: "1.0"
sensors:
  total_energy:
    formula: "sum(devices)"
    variables:
      devices: "device_class:energy, !label:excluded"
"#;
        let (_, sensors) = import_yaml(yaml).unwrap();
        let vars: HashMap<_, _> = sensors[0].1.variables.iter().cloned().collect();
        match vars.get("devices").unwrap() {
            VariableSource::Collection(queries) => {
                assert_eq!(queries.len(), 1);
                assert_eq!(queries[0].alternatives.len(), 1);
                assert_eq!(queries[0].exclusions.len(), 1);
            }
            other => panic!("expected a collection variable, got {other:?}"),
        }
    }

    #[test]
    fn imports_alternate_states_and_attributes() {
        let yaml = r#"
version: "1.0"
sensors:
  power_sensor:
    formula: "sensor.power"
    alternate_states:
      UNAVAILABLE: 0
    attributes:
      battery:
        formula: "sensor.power.battery_level"
"#;
        let (_, sensors) = import_yaml(yaml).unwrap();
        let sensor = &sensors[0].1;
        assert_eq!(sensor.alternate_states.unavailable, Some(HandlerAction::Literal(Value::Int(0))));
        assert_eq!(sensor.attributes.len(), 1);
        assert_eq!(sensor.attributes[0].0, "battery");
    }
}
