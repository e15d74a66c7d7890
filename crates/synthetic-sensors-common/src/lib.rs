pub mod error;
pub mod value;

pub use error::{EngineError, EngineErrorKind};
pub use value::{AlternateState, Duration, Value};
