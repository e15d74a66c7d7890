//! Hierarchical-context synthetic sensor formula evaluation engine.
//!
//! Wires together the AST analysis/binding-plan caches (§4.2), the
//! layered evaluation context (§4.3), the variable resolver (§4.4), the
//! dependency manager (§4.5), the phase orchestrator (§4.6), the
//! metadata handler (§4.7), alternate-state/last-good handling (§4.8),
//! the per-sensor pipeline (§4.9), and the storage/registry interface
//! (§4.10) into one crate. `synthetic-sensors-parse` and
//! `synthetic-sensors-eval` own the expression grammar and interpreter
//! this crate drives.

pub mod alternate_state;
pub mod analysis;
pub mod binding;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod metadata;
pub mod phase;
pub mod providers;
pub mod resolver;
pub mod sensor;
pub mod storage;

pub use alternate_state::{AlternateStatesConfig, HandlerAction, LastGoodStore, Trigger};
pub use analysis::{get_formula_analysis, FormulaAnalysis};
pub use binding::{build_binding_plan, BindingEnvironment, BindingPlan, Strategy};
pub use circuit_breaker::{BreakerStatus, CircuitBreaker};
pub use context::{ContextIntegrity, HierarchicalContext, ReferenceValue};
pub use dependency::{detect_circular_refs, expand_collection_queries, CollectionQuery, SensorFormulaGraph};
pub use error::{ConfigError, StorageError};
pub use phase::{evaluate_formula, FormulaInputs, FormulaOutcome};
pub use providers::{DataProviderCallback, MetadataProvider, ProviderLookup, RegistryListener, StateProvider};
pub use resolver::{ComputedVariableEvaluator, CrossSensorRegistry, VariableResolver};
pub use sensor::{
    evaluate_sensor_cycle, AttributeDefinition, AttributeSource, Collaborators, SensorDefinition,
    SensorPublication, VariableSource,
};
pub use storage::{InMemoryStorage, SensorSet, StorageApi};

pub use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};
