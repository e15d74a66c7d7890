pub mod builtins;
pub mod clock;
pub mod function_registry;
pub mod interpreter;
pub mod traits;

pub use clock::{Clock, FixedClock};
#[cfg(feature = "system-clock")]
pub use clock::SystemClock;
pub use function_registry::{ensure_builtins_registered, get, register_function};
pub use interpreter::Interpreter;
pub use traits::{Function, FunctionContext, NameEnvironment};

pub use synthetic_sensors_common::{AlternateState, Duration, EngineError, EngineErrorKind, Value};
pub use synthetic_sensors_parse::{parse, parse_cached, Expr};
