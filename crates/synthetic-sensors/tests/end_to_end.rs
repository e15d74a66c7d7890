//! End-to-end scenarios driving `evaluate_sensor_cycle` purely through
//! the crate's public API, one sensor per scenario.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use synthetic_sensors::{
    evaluate_sensor_cycle, AlternateStatesConfig, AttributeDefinition, AttributeSource,
    CircuitBreaker, Collaborators, CrossSensorRegistry, DataProviderCallback, HandlerAction,
    LastGoodStore, MetadataProvider, ProviderLookup, SensorDefinition, StateProvider,
    VariableSource,
};
use synthetic_sensors_common::Value;
use synthetic_sensors_eval::FixedClock;

fn clock_at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> FixedClock {
    FixedClock::at(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap())
}

struct NoData;
impl DataProviderCallback for NoData {
    fn call(&self, _entity_id: &str) -> ProviderLookup {
        ProviderLookup::missing()
    }
}

struct NoCrossSensor;
impl CrossSensorRegistry for NoCrossSensor {
    fn resolve(&self, _key: &str) -> Option<Value> {
        None
    }
}

struct FixedStates(HashMap<&'static str, Value>);
impl StateProvider for FixedStates {
    fn get_state(&self, entity_id: &str) -> ProviderLookup {
        match self.0.get(entity_id) {
            Some(v) => ProviderLookup::found(v.clone()),
            None => ProviderLookup::missing(),
        }
    }
    fn enumerate(&self, _selector: &str) -> Vec<String> {
        Vec::new()
    }
    fn get_attribute(&self, _entity_id: &str, _key: &str) -> Option<Value> {
        None
    }
}

struct FixedMetadata(HashMap<(&'static str, &'static str), Value>);
impl MetadataProvider for FixedMetadata {
    fn get_metadata(&self, entity_id: &str, key: &str) -> Option<Value> {
        self.0
            .iter()
            .find(|((e, k), _)| *e == entity_id && *k == key)
            .map(|(_, v)| v.clone())
    }
}

fn empty_sensor(id: &str, formula: &str) -> SensorDefinition {
    SensorDefinition {
        id: id.to_string(),
        entity_id: None,
        formula: formula.to_string(),
        variables: Vec::new(),
        attributes: Vec::new(),
        alternate_states: AlternateStatesConfig::default(),
        allow_unresolved_states: false,
    }
}

#[test]
fn basic_numeric_formula_divides_power_by_rate() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let state = FixedStates(HashMap::new());
    let metadata = FixedMetadata(HashMap::new());
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let mut sensor = empty_sensor("energy_cost", "p * r / 1000");
    sensor.variables = vec![
        ("p".to_string(), VariableSource::Literal(Value::Number(1500.0))),
        ("r".to_string(), VariableSource::Literal(Value::Number(0.12))),
    ];

    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 100).unwrap();
    assert_eq!(publication.value, Value::Number(0.18));
}

#[test]
fn conditional_attribute_preserves_false_rather_than_none() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let state = FixedStates(HashMap::new());
    let metadata = FixedMetadata(HashMap::new());
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let mut sensor = empty_sensor("recency_gate", "1");
    sensor.variables =
        vec![("last_valid_changed".to_string(), VariableSource::Literal(Value::None))];
    sensor.attributes = vec![(
        "is_within".to_string(),
        AttributeDefinition {
            source: Some(AttributeSource::Formula(
                "last_valid_changed is not None and minutes_between(last_valid_changed, now()) < 30"
                    .to_string(),
            )),
            variables: sensor.variables.iter().cloned().collect(),
            alternate_states: AlternateStatesConfig::default(),
            allow_unresolved_states: true,
        },
    )];

    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 101).unwrap();
    assert_eq!(publication.attributes.get("is_within"), Some(&Value::Boolean(false)));
}

#[test]
fn metadata_and_duration_builtins_compare_a_thirty_minute_gap() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let mut states = HashMap::new();
    states.insert("sensor.x", Value::Number(42.0));
    let state = FixedStates(states);
    let mut meta = HashMap::new();
    meta.insert(("power", "last_changed"), Value::DateTime(NaiveDateTime::parse_from_str(
        "2026-07-30 11:30:00",
        "%Y-%m-%d %H:%M:%S",
    ).unwrap()));
    let metadata = FixedMetadata(meta);
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let mut sensor = empty_sensor(
        "recently_changed",
        "minutes_between(metadata(power,'last_changed'), now()) < 60",
    );
    sensor.variables =
        vec![("power".to_string(), VariableSource::EntityReference("sensor.x".to_string()))];
    sensor.allow_unresolved_states = true;

    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 102).unwrap();
    assert_eq!(publication.value, Value::Boolean(true));
}

#[test]
fn unavailable_entity_falls_back_to_its_configured_literal() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let state = FixedStates(HashMap::new());
    let metadata = FixedMetadata(HashMap::new());
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let mut sensor = empty_sensor("with_fallback", "missing_entity + 10");
    sensor.variables = vec![(
        "missing_entity".to_string(),
        VariableSource::EntityReference("sensor.missing".to_string()),
    )];
    sensor.allow_unresolved_states = true;
    sensor.alternate_states = AlternateStatesConfig {
        unavailable: Some(HandlerAction::Literal(Value::Number(50.0))),
        ..AlternateStatesConfig::default()
    };

    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 103).unwrap();
    assert_eq!(publication.value, Value::Number(50.0));
}

#[test]
fn unavailable_entity_runs_a_formula_handler_over_its_own_variables() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let state = FixedStates(HashMap::new());
    let metadata = FixedMetadata(HashMap::new());
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let mut sensor = empty_sensor("with_formula_handler", "missing_entity + 10");
    sensor.variables = vec![(
        "missing_entity".to_string(),
        VariableSource::EntityReference("sensor.missing".to_string()),
    )];
    sensor.allow_unresolved_states = true;

    let mut handler_variables = HashMap::new();
    handler_variables.insert("base".to_string(), Value::Number(20.0));
    handler_variables.insert("margin".to_string(), Value::Number(5.0));
    sensor.alternate_states = AlternateStatesConfig {
        unavailable: Some(HandlerAction::Formula {
            formula: "base + margin".to_string(),
            variables: handler_variables,
        }),
        ..AlternateStatesConfig::default()
    };

    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 106).unwrap();
    assert_eq!(publication.value, Value::Number(25.0));
}

#[test]
fn yaml_config_round_trips_an_imported_sensor_set() {
    use synthetic_sensors::{InMemoryStorage, StorageApi};

    let yaml = r#"
version: "1.0"
sensors:
  power_cost:
    name: Power Cost
    formula: p * r
    variables:
      p: sensor.power_draw
      r: 0.12
"#;

    let storage = InMemoryStorage::default();
    storage.create_sensor_set("set1", None).unwrap();
    storage.import_yaml("set1", yaml).unwrap();
    let exported = storage.export_yaml("set1").unwrap();

    storage.create_sensor_set("set2", None).unwrap();
    storage.import_yaml("set2", &exported).unwrap();

    let original = storage.list_sensors("set1").unwrap();
    let roundtripped = storage.list_sensors("set2").unwrap();
    assert_eq!(original.len(), roundtripped.len());
    assert_eq!(original[0].1.formula, roundtripped[0].1.formula);
}

#[test]
fn duration_and_date_arithmetic_builtins_agree_with_their_units() {
    let clock = clock_at(2026, 7, 30, 12, 0, 0);
    let breaker = CircuitBreaker::default();
    let state = FixedStates(HashMap::new());
    let metadata = FixedMetadata(HashMap::new());
    let collaborators = Collaborators {
        state_provider: &state,
        data_provider: &NoData,
        metadata_provider: &metadata,
        cross_sensor: &NoCrossSensor,
        clock: &clock,
        breaker: &breaker,
    };

    let sensor = empty_sensor("unit_ratio", "minutes(5) / minutes(1)");
    let mut last_good = LastGoodStore::new();
    let publication =
        evaluate_sensor_cycle(&sensor, &HashMap::new(), collaborators, &mut last_good, 104).unwrap();
    assert_eq!(publication.value, Value::Number(5.0));

    let sensor2 = empty_sensor("date_plus_days", "date('2025-01-01') + days(30)");
    let mut last_good2 = LastGoodStore::new();
    let publication2 =
        evaluate_sensor_cycle(&sensor2, &HashMap::new(), collaborators, &mut last_good2, 105).unwrap();
    assert_eq!(publication2.value.to_published(), Value::Text("2025-01-31".to_string()));
}
