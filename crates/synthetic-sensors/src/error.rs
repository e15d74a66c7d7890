//! Crate-level error taxonomy beyond the per-formula `EngineError`
//! (spec §7 "Configuration errors" / "Collision errors", fatal at load
//! rather than per-cycle).

use thiserror::Error;

pub use synthetic_sensors_common::{EngineError, EngineErrorKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate sensor key '{0}'")]
    DuplicateSensorKey(String),
    #[error("sensor '{sensor}' references unknown entity '{entity}'")]
    UnknownEntityReference { sensor: String, entity: String },
    #[error("circular dependency detected among: {0:?}")]
    CircularDependency(Vec<String>),
    #[error("invalid metadata key '{0}'")]
    InvalidMetadataKey(String),
    #[error("formula syntax error in sensor '{sensor}': {source}")]
    Syntax {
        sensor: String,
        #[source]
        source: synthetic_sensors_parse::ParsingError,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sensor set '{0}' not found")]
    SensorSetNotFound(String),
    #[error("sensor '{0}' not found")]
    SensorNotFound(String),
    #[error(
        "entity id collision could not be resolved deterministically for '{0}'; this should be unreachable"
    )]
    UnresolvedCollision(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
