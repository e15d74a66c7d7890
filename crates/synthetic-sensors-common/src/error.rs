//! Error taxonomy for the formula engine.
//!
//! - **`EngineErrorKind`** : the canonical set of failure categories (§7)
//! - **`EngineError`**     : kind + optional message + optional formula
//!   context, the single error type threaded through parsing,
//!   analysis, and evaluation.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Failure categories from spec §7's error taxonomy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EngineErrorKind {
    /// Formula text could not be parsed. Fatal at load.
    Syntax,
    /// A referenced name has no binding in the current environment.
    Name,
    /// An operator or function received an operand of the wrong type.
    Type,
    /// Division, or another operation, by zero.
    ZeroDivision,
    /// Numeric overflow or an otherwise invalid numeric result.
    Num,
    /// A referenced entity/variable does not exist or has no state.
    MissingDependency,
    /// A configuration-time problem (duplicate key, unknown ref, cycle).
    Configuration,
    /// Entity id collision that survived suffix resolution.
    Collision,
    /// Catch-all for errors raised by a user-supplied provider.
    Provider,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "SyntaxError",
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Num => "NumError",
            Self::MissingDependency => "MissingDependencyError",
            Self::Configuration => "ConfigurationError",
            Self::Collision => "CollisionError",
            Self::Provider => "ProviderError",
        })
    }
}

/// The single error type threaded through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: Option<String>,
    /// The name that triggered the error, if the error is name-shaped
    /// (NameError / MissingDependency).
    pub name: Option<String>,
}

impl From<EngineErrorKind> for EngineError {
    fn from(kind: EngineErrorKind) -> Self {
        Self {
            kind,
            message: None,
            name: None,
        }
    }
}

impl EngineError {
    pub fn new(kind: EngineErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn missing_dependency(name: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::MissingDependency).with_name(name)
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::Type
                | EngineErrorKind::ZeroDivision
                | EngineErrorKind::Num
                | EngineErrorKind::MissingDependency
                | EngineErrorKind::Name
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " '{name}'")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}
