//! Storage/Registry Interface (spec §4.10, C10): sensor-set CRUD,
//! deterministic entity-id collision suffixing, and the
//! registry-listener rename hook. `InMemoryStorage` is the reference
//! implementation a host can use directly or swap out for its own
//! persistent store behind the same `StorageApi` trait.

use std::collections::HashMap;

use dashmap::DashMap;
use synthetic_sensors_common::Value;

use crate::config::{self, RawGlobalSettings};
use crate::error::StorageError;
use crate::providers::RegistryListener;
use crate::sensor::{SensorDefinition, VariableSource};

/// One sensor set: a named collection of sensors plus its own global
/// variable scope (spec §6 `global_settings`). `sensors` preserves
/// declaration order, since collision suffixing (spec §4.10) is defined
/// over it.
#[derive(Debug, Clone, Default)]
pub struct SensorSet {
    pub id: String,
    pub device_identifier: Option<String>,
    pub globals: HashMap<String, Value>,
    sensors: Vec<(String, SensorDefinition)>,
}

impl SensorSet {
    fn new(id: impl Into<String>, device_identifier: Option<String>) -> Self {
        Self { id: id.into(), device_identifier, globals: HashMap::new(), sensors: Vec::new() }
    }

    pub fn sensors(&self) -> &[(String, SensorDefinition)] {
        &self.sensors
    }

    /// Appends deterministic `_2, _3, …` suffixes to the final entity
    /// id of every sensor after the first to claim it, in declaration
    /// order (spec §4.10). A sensor's own `id`/key is untouched; only
    /// the published `entity_id` is renumbered.
    fn renumber_entity_ids(&mut self) {
        let mut seen: HashMap<String, u32> = HashMap::new();
        for (key, sensor) in self.sensors.iter_mut() {
            let base = sensor.entity_id.clone().unwrap_or_else(|| key.clone());
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            sensor.entity_id = Some(if *count == 1 { base } else { format!("{base}_{}", *count) });
        }
    }
}

/// CRUD + collision/rename contracts surfaced to external collaborators
/// (spec §4.10). All methods take `&self`; implementations own their
/// own interior mutability, matching the process-wide cache pattern
/// used for `FormulaAnalysis`/`BindingPlan`.
pub trait StorageApi: Send + Sync {
    fn create_sensor_set(&self, id: &str, device_identifier: Option<&str>) -> Result<(), StorageError>;
    fn get_sensor_set(&self, id: &str) -> Result<SensorSet, StorageError>;
    fn list_sensor_sets(&self, device_identifier: Option<&str>) -> Vec<SensorSet>;
    fn delete_sensor_set(&self, id: &str) -> Result<(), StorageError>;

    fn add_sensor(&self, set_id: &str, key: &str, sensor: SensorDefinition) -> Result<(), StorageError>;
    fn update_sensor(&self, set_id: &str, key: &str, sensor: SensorDefinition) -> Result<(), StorageError>;
    fn remove_sensor(&self, set_id: &str, key: &str) -> Result<(), StorageError>;
    fn get_sensor(&self, set_id: &str, key: &str) -> Result<SensorDefinition, StorageError>;
    fn list_sensors(&self, set_id: &str) -> Result<Vec<(String, SensorDefinition)>, StorageError>;
    fn replace_sensors(&self, set_id: &str, sensors: Vec<(String, SensorDefinition)>) -> Result<(), StorageError>;

    fn import_yaml(&self, set_id: &str, text: &str) -> Result<(), StorageError>;
    fn export_yaml(&self, set_id: &str) -> Result<String, StorageError>;

    /// The registry-listener hook (spec §4.10): rewrites every
    /// `VariableSource::EntityReference` equal to `old_id` across every
    /// sensor set. Formula text is never rewritten — formulas reference
    /// entities through variable names, never inline ids (see
    /// DESIGN.md).
    fn rename_entity(&self, old_id: &str, new_id: &str);
}

#[derive(Default)]
pub struct InMemoryStorage {
    sets: DashMap<String, SensorSet>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageApi for InMemoryStorage {
    fn create_sensor_set(&self, id: &str, device_identifier: Option<&str>) -> Result<(), StorageError> {
        self.sets.insert(id.to_string(), SensorSet::new(id, device_identifier.map(str::to_string)));
        Ok(())
    }

    fn get_sensor_set(&self, id: &str) -> Result<SensorSet, StorageError> {
        self.sets.get(id).map(|e| e.value().clone()).ok_or_else(|| StorageError::SensorSetNotFound(id.to_string()))
    }

    fn list_sensor_sets(&self, device_identifier: Option<&str>) -> Vec<SensorSet> {
        self.sets
            .iter()
            .filter(|e| device_identifier.is_none() || e.value().device_identifier.as_deref() == device_identifier)
            .map(|e| e.value().clone())
            .collect()
    }

    fn delete_sensor_set(&self, id: &str) -> Result<(), StorageError> {
        self.sets.remove(id).map(|_| ()).ok_or_else(|| StorageError::SensorSetNotFound(id.to_string()))
    }

    fn add_sensor(&self, set_id: &str, key: &str, sensor: SensorDefinition) -> Result<(), StorageError> {
        let mut set = self.sets.get_mut(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        if set.sensors.iter().any(|(k, _)| k == key) {
            return Err(StorageError::Config(crate::error::ConfigError::DuplicateSensorKey(key.to_string())));
        }
        set.sensors.push((key.to_string(), sensor));
        set.renumber_entity_ids();
        Ok(())
    }

    fn update_sensor(&self, set_id: &str, key: &str, sensor: SensorDefinition) -> Result<(), StorageError> {
        let mut set = self.sets.get_mut(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        let slot = set
            .sensors
            .iter_mut()
            .find(|(k, _)| k == key)
            .ok_or_else(|| StorageError::SensorNotFound(key.to_string()))?;
        slot.1 = sensor;
        set.renumber_entity_ids();
        Ok(())
    }

    fn remove_sensor(&self, set_id: &str, key: &str) -> Result<(), StorageError> {
        let mut set = self.sets.get_mut(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        let before = set.sensors.len();
        set.sensors.retain(|(k, _)| k != key);
        if set.sensors.len() == before {
            return Err(StorageError::SensorNotFound(key.to_string()));
        }
        set.renumber_entity_ids();
        Ok(())
    }

    fn get_sensor(&self, set_id: &str, key: &str) -> Result<SensorDefinition, StorageError> {
        let set = self.sets.get(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        set.sensors
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| StorageError::SensorNotFound(key.to_string()))
    }

    fn list_sensors(&self, set_id: &str) -> Result<Vec<(String, SensorDefinition)>, StorageError> {
        let set = self.sets.get(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        Ok(set.sensors.clone())
    }

    fn replace_sensors(&self, set_id: &str, sensors: Vec<(String, SensorDefinition)>) -> Result<(), StorageError> {
        let mut set = self.sets.get_mut(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        let mut seen_keys = std::collections::HashSet::new();
        for (key, _) in &sensors {
            if !seen_keys.insert(key.clone()) {
                return Err(StorageError::Config(crate::error::ConfigError::DuplicateSensorKey(key.clone())));
            }
        }
        set.sensors = sensors;
        set.renumber_entity_ids();
        Ok(())
    }

    fn import_yaml(&self, set_id: &str, text: &str) -> Result<(), StorageError> {
        let (global_settings, sensors) = config::import_yaml(text)?;
        let mut set = self.sets.get_mut(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        set.globals = config::lower_globals(&global_settings);
        set.device_identifier = global_settings.device_identifier.clone();
        set.sensors = sensors;
        set.renumber_entity_ids();
        Ok(())
    }

    fn export_yaml(&self, set_id: &str) -> Result<String, StorageError> {
        let set = self.sets.get(set_id).ok_or_else(|| StorageError::SensorSetNotFound(set_id.to_string()))?;
        let global_settings = RawGlobalSettings {
            device_identifier: set.device_identifier.clone(),
            variables: HashMap::new(),
            metadata: HashMap::new(),
        };
        let raw_sensors: Vec<_> =
            set.sensors.iter().map(|(k, s)| (k.clone(), config::raise_sensor(s))).collect();
        Ok(config::export_yaml(&global_settings, &raw_sensors)?)
    }

    fn rename_entity(&self, old_id: &str, new_id: &str) {
        for mut set in self.sets.iter_mut() {
            for (_, sensor) in set.sensors.iter_mut() {
                for (_, source) in sensor.variables.iter_mut() {
                    if let VariableSource::EntityReference(id) = source {
                        if id == old_id {
                            *id = new_id.to_string();
                        }
                    }
                }
                for (_, attr) in sensor.attributes.iter_mut() {
                    for source in attr.variables.values_mut() {
                        if let VariableSource::EntityReference(id) = source {
                            if id == old_id {
                                *id = new_id.to_string();
                            }
                        }
                    }
                }
            }
        }
        // Result caches are not retained across cycles in this engine
        // beyond per-sensor last-good state, which is keyed by sensor
        // id, not entity id — nothing further to invalidate here. The
        // `FormulaAnalysis`/`BindingPlan` caches are keyed by formula
        // text, which a rename never changes (spec §4.10).
    }
}

/// Notifies an `InMemoryStorage`'s sensors of a host-driven entity
/// rename, then runs an arbitrary `RegistryListener` callback — the
/// storage layer applies the rewrite itself; the listener is purely an
/// external notification hook (spec §4.10).
pub fn propagate_rename(storage: &dyn StorageApi, listener: &dyn RegistryListener, old_id: &str, new_id: &str) {
    storage.rename_entity(old_id, new_id);
    listener.on_entity_renamed(old_id, new_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::VariableSource;

    fn sample_sensor(entity_id: Option<&str>) -> SensorDefinition {
        SensorDefinition {
            id: "s".to_string(),
            entity_id: entity_id.map(str::to_string),
            formula: "1 + 1".to_string(),
            variables: Vec::new(),
            attributes: Vec::new(),
            alternate_states: Default::default(),
            allow_unresolved_states: false,
        }
    }

    #[test]
    fn collision_suffixes_are_deterministic_and_declaration_ordered() {
        let storage = InMemoryStorage::new();
        storage.create_sensor_set("set1", None).unwrap();
        storage.add_sensor("set1", "a", sample_sensor(Some("sensor.power"))).unwrap();
        storage.add_sensor("set1", "b", sample_sensor(Some("sensor.power"))).unwrap();
        storage.add_sensor("set1", "c", sample_sensor(Some("sensor.power"))).unwrap();
        let sensors = storage.list_sensors("set1").unwrap();
        let ids: Vec<_> = sensors.iter().map(|(_, s)| s.entity_id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["sensor.power", "sensor.power_2", "sensor.power_3"]);
    }

    #[test]
    fn duplicate_sensor_key_is_rejected() {
        let storage = InMemoryStorage::new();
        storage.create_sensor_set("set1", None).unwrap();
        storage.add_sensor("set1", "a", sample_sensor(None)).unwrap();
        assert!(storage.add_sensor("set1", "a", sample_sensor(None)).is_err());
    }

    #[test]
    fn rename_entity_rewrites_entity_reference_variables() {
        let storage = InMemoryStorage::new();
        storage.create_sensor_set("set1", None).unwrap();
        let mut sensor = sample_sensor(None);
        sensor.variables.push(("power".to_string(), VariableSource::EntityReference("sensor.old".to_string())));
        storage.add_sensor("set1", "a", sensor).unwrap();

        storage.rename_entity("sensor.old", "sensor.new");

        let updated = storage.get_sensor("set1", "a").unwrap();
        assert_eq!(
            updated.variables.iter().find(|(n, _)| n == "power").map(|(_, v)| v.clone()),
            Some(VariableSource::EntityReference("sensor.new".to_string()))
        );
    }

    #[test]
    fn yaml_round_trips_through_import_and_export() {
        let storage = InMemoryStorage::new();
        storage.create_sensor_set("set1", None).unwrap();
        let yaml = r#"
version: "1.0"
sensors:
  energy_cost:
    formula: "power * rate"
    variables:
      power: sensor.house_power
      rate: 0.12
"#;
        storage.import_yaml("set1", yaml).unwrap();
        let exported = storage.export_yaml("set1").unwrap();
        assert!(exported.contains("energy_cost"));
        assert!(exported.contains("power * rate"));
    }
}
