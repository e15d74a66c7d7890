//! Variable Resolver (spec §4.4, C4): a factory dispatching by
//! binding-plan strategy. Each resolver returns a raw value; the phase
//! orchestrator is responsible for wrapping it via `unified_set`.

use std::collections::HashMap;

use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::binding::Strategy;
use crate::providers::{DataProviderCallback, MetadataProvider, StateProvider};

/// Cross-sensor lookups (spec §4.4 `cross_sensor`), resolved through
/// the storage layer's cross-sensor registry with collision-suffix
/// rules already applied (spec §6).
pub trait CrossSensorRegistry: Send + Sync {
    fn resolve(&self, key: &str) -> Option<Value>;
}

/// Evaluates a computed variable's own formula recursively within the
/// current cycle (spec §4.4 `computed`). Supplied by the sensor
/// orchestrator, which owns the phase pipeline the resolver itself
/// must not depend on to avoid a resolver↔orchestrator cycle.
pub trait ComputedVariableEvaluator {
    fn evaluate(&mut self, name: &str) -> Result<Value, EngineError>;
}

pub struct VariableResolver<'a> {
    pub state_provider: &'a dyn StateProvider,
    pub data_provider: &'a dyn DataProviderCallback,
    pub metadata_provider: &'a dyn MetadataProvider,
    pub cross_sensor: &'a dyn CrossSensorRegistry,
    pub literal_table: &'a HashMap<String, Value>,
}

impl<'a> VariableResolver<'a> {
    pub fn resolve(
        &self,
        name: &str,
        strategy: Strategy,
        computed: &mut dyn ComputedVariableEvaluator,
    ) -> Result<Value, EngineError> {
        match strategy {
            Strategy::HaState => {
                let lookup = self.state_provider.get_state(name);
                if !lookup.exists {
                    return Err(EngineError::missing_dependency(name));
                }
                Ok(lookup.value)
            }
            Strategy::DataProvider => {
                let lookup = self.data_provider.call(name);
                if !lookup.exists {
                    return Err(EngineError::missing_dependency(name));
                }
                Ok(lookup.value)
            }
            Strategy::Literal => self
                .literal_table
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::new(EngineErrorKind::Name).with_name(name)),
            Strategy::Computed => computed.evaluate(name),
            Strategy::CrossSensor => self
                .cross_sensor
                .resolve(name)
                .ok_or_else(|| EngineError::missing_dependency(name)),
            Strategy::StateAttribute => {
                Err(EngineError::new(EngineErrorKind::Type)
                    .with_message("state_attribute names are resolved via resolve_attribute, not resolve"))
            }
        }
    }

    /// `<var>.<attr>` resolution (spec §4.4): `var` resolves through
    /// its own strategy first — the caller supplies the already-
    /// resolved base value's entity reference — then `attr` is read
    /// via the metadata provider.
    pub fn resolve_attribute(&self, base_reference: &str, attr: &str) -> Result<Value, EngineError> {
        self.metadata_provider
            .get_metadata(base_reference, attr)
            .or_else(|| self.state_provider.get_attribute(base_reference, attr))
            .ok_or_else(|| EngineError::new(EngineErrorKind::Name).with_name(attr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderLookup;

    struct FixedState;
    impl StateProvider for FixedState {
        fn get_state(&self, entity_id: &str) -> ProviderLookup {
            if entity_id == "sensor.power" {
                ProviderLookup::found(Value::Number(42.0))
            } else {
                ProviderLookup::missing()
            }
        }
        fn enumerate(&self, _selector: &str) -> Vec<String> {
            Vec::new()
        }
        fn get_attribute(&self, _entity_id: &str, _key: &str) -> Option<Value> {
            None
        }
    }

    struct NoData;
    impl DataProviderCallback for NoData {
        fn call(&self, _entity_id: &str) -> ProviderLookup {
            ProviderLookup::missing()
        }
    }

    struct NoMetadata;
    impl MetadataProvider for NoMetadata {
        fn get_metadata(&self, _entity_id: &str, _key: &str) -> Option<Value> {
            None
        }
    }

    struct NoCrossSensor;
    impl CrossSensorRegistry for NoCrossSensor {
        fn resolve(&self, _key: &str) -> Option<Value> {
            None
        }
    }

    struct NeverComputed;
    impl ComputedVariableEvaluator for NeverComputed {
        fn evaluate(&mut self, name: &str) -> Result<Value, EngineError> {
            Err(EngineError::new(EngineErrorKind::Name).with_name(name))
        }
    }

    #[test]
    fn ha_state_missing_is_missing_dependency() {
        let literal_table = HashMap::new();
        let resolver = VariableResolver {
            state_provider: &FixedState,
            data_provider: &NoData,
            metadata_provider: &NoMetadata,
            cross_sensor: &NoCrossSensor,
            literal_table: &literal_table,
        };
        let err = resolver.resolve("sensor.missing", Strategy::HaState, &mut NeverComputed).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::MissingDependency);
    }

    #[test]
    fn ha_state_found_returns_value() {
        let literal_table = HashMap::new();
        let resolver = VariableResolver {
            state_provider: &FixedState,
            data_provider: &NoData,
            metadata_provider: &NoMetadata,
            cross_sensor: &NoCrossSensor,
            literal_table: &literal_table,
        };
        let v = resolver.resolve("sensor.power", Strategy::HaState, &mut NeverComputed).unwrap();
        assert_eq!(v, Value::Number(42.0));
    }
}
