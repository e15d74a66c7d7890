//! Interfaces the core consumes from its host (spec §6 "State-provider
//! contract" / "Data-provider callback") — the external collaborators
//! the spec deliberately leaves unimplemented here. Object-safe so a
//! host can hand the engine a single trait object per cycle.

use synthetic_sensors_common::Value;

/// Result of a state or data-provider lookup: the looked-up value plus
/// whether the backing entity/callback considers it to exist at all.
/// `exists=false` is distinct from `value` being an alternate-state
/// sentinel — both are treated as "missing" by the resolver (spec §4.4),
/// but a provider surfaces them separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLookup {
    pub value: Value,
    pub exists: bool,
}

impl ProviderLookup {
    pub fn found(value: Value) -> Self {
        Self { value, exists: true }
    }

    pub fn missing() -> Self {
        Self { value: Value::None, exists: false }
    }
}

/// The host's entity registry and state store (spec §1 "explicitly out
/// of scope": entity registry, state store — we specify only the
/// interface).
pub trait StateProvider: Send + Sync {
    fn get_state(&self, entity_id: &str) -> ProviderLookup;

    /// Enumerate entity ids matching one alternative of a collection
    /// pattern selector (spec §6, a single `selector(:|op)value` term,
    /// already split out by the dependency manager).
    fn enumerate(&self, selector: &str) -> Vec<String>;

    fn get_attribute(&self, entity_id: &str, key: &str) -> Option<Value>;
}

/// An integration-supplied data callback for the `data_provider`
/// binding strategy (spec §4.4, §6).
pub trait DataProviderCallback: Send + Sync {
    fn call(&self, entity_id: &str) -> ProviderLookup;
}

impl<F> DataProviderCallback for F
where
    F: Fn(&str) -> ProviderLookup + Send + Sync,
{
    fn call(&self, entity_id: &str) -> ProviderLookup {
        self(entity_id)
    }
}

/// Metadata reads (spec §6 "Metadata keys") — `last_changed`,
/// `last_updated`, `domain`, `object_id`, `friendly_name`, `entity_id`
/// come from the host; `last_valid_state`/`last_valid_changed` are
/// engine-managed and answered from the sensor's own last-good record
/// rather than this provider (see `alternate_state::LastGoodStore`).
pub trait MetadataProvider: Send + Sync {
    fn get_metadata(&self, entity_id: &str, key: &str) -> Option<Value>;
}

/// The host-supplied hook invoked when an entity id is renamed in the
/// registry (spec §4.10 "Registry-listener hook").
pub trait RegistryListener: Send + Sync {
    fn on_entity_renamed(&self, old_id: &str, new_id: &str);
}

pub const ENGINE_METADATA_KEYS: &[&str] = &[
    "last_changed",
    "last_updated",
    "domain",
    "object_id",
    "friendly_name",
    "entity_id",
    "last_valid_state",
    "last_valid_changed",
];

pub fn is_known_metadata_key(key: &str) -> bool {
    ENGINE_METADATA_KEYS.contains(&key)
}
