//! Alternate-State & Last-Good handling (spec §4.8, C8). Classifies a
//! raised trigger, runs the configured handler (literal, formula
//! object, or a recoverable error's fallback), and tracks each
//! sensor's last known non-alternate value.

use std::collections::{HashMap, HashSet};

use synthetic_sensors_common::{AlternateState, EngineError, EngineErrorKind, Value};

use crate::analysis::FormulaAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Unavailable,
    Unknown,
    None,
    /// Any other recoverable evaluation error (§7): type errors,
    /// zero-division, unresolved names once metadata-only exemptions
    /// are applied.
    Fallback,
}

impl Trigger {
    fn sentinel_value(self) -> Value {
        match self {
            Trigger::Unavailable => Value::Alternate(AlternateState::Unavailable),
            Trigger::Unknown => Value::Alternate(AlternateState::Unknown),
            Trigger::None => Value::None,
            Trigger::Fallback => Value::Alternate(AlternateState::Unavailable),
        }
    }
}

pub fn classify_value(value: &Value) -> Option<Trigger> {
    match value {
        Value::Alternate(AlternateState::Unavailable) => Some(Trigger::Unavailable),
        Value::Alternate(AlternateState::Unknown) => Some(Trigger::Unknown),
        Value::None => Some(Trigger::None),
        _ => None,
    }
}

/// A raised error becomes a `Fallback` trigger only if it is recoverable
/// (spec §7); configuration-time failures (syntax, circular reference,
/// collision) are never routed through alternate-state handling.
pub fn classify_error(err: &EngineError) -> Option<Trigger> {
    err.is_recoverable().then_some(Trigger::Fallback)
}

/// Phase 2's missing-state guard (spec §4.6) is scoped to names the
/// post-metadata formula actually needs resolved through the variable
/// resolver — a name that appears only as the reference argument of a
/// `metadata(...)` call is resolved by the Metadata Handler instead and
/// must not fail presence checking on its own account.
pub fn names_requiring_presence(analysis: &FormulaAnalysis) -> HashSet<String> {
    let metadata_refs: HashSet<&str> =
        analysis.metadata_calls.iter().filter_map(|c| c.reference.as_deref()).collect();
    analysis
        .identifiers
        .iter()
        .filter(|name| !metadata_refs.contains(name.as_str()))
        .cloned()
        .collect()
}

/// One configured handler action (spec §4.8 "Handler value semantics").
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerAction {
    /// A literal boolean/number/string, parsed via `Value::parse_literal`
    /// at config-load time, or a legacy bare string evaluated directly
    /// as an expression (both YAML shapes collapse to this once the
    /// config layer decides which one it saw).
    Literal(Value),
    /// A `{formula, variables}` object, evaluated through the full
    /// pipeline with its own local variable bindings layered on top of
    /// the sensor's own context.
    Formula { formula: String, variables: HashMap<String, Value> },
}

/// Evaluates a `Formula` handler action. Implemented by the sensor
/// orchestrator, which owns the phase pipeline this module must not
/// depend on directly.
pub trait HandlerFormulaEvaluator {
    fn evaluate(&mut self, formula: &str, variables: &HashMap<String, Value>) -> Result<Value, EngineError>;
}

pub fn run_handler(action: &HandlerAction, evaluator: &mut dyn HandlerFormulaEvaluator) -> Result<Value, EngineError> {
    match action {
        HandlerAction::Literal(value) => Ok(value.clone()),
        HandlerAction::Formula { formula, variables } => evaluator.evaluate(formula, variables),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlternateStatesConfig {
    pub unavailable: Option<HandlerAction>,
    pub unknown: Option<HandlerAction>,
    pub none: Option<HandlerAction>,
    /// Catch-all handler used when no trigger-specific handler is
    /// configured (spec §4.8).
    pub fallback: Option<HandlerAction>,
}

/// Resolves a classified trigger to a final value: the trigger-specific
/// handler, else the catch-all `fallback` handler, else the raw
/// sentinel if `allow_unresolved_states` permits it, else a fatal error.
pub fn resolve_trigger(
    config: &AlternateStatesConfig,
    trigger: Trigger,
    evaluator: &mut dyn HandlerFormulaEvaluator,
    allow_unresolved_states: bool,
) -> Result<Value, EngineError> {
    let specific = match trigger {
        Trigger::Unavailable => &config.unavailable,
        Trigger::Unknown => &config.unknown,
        Trigger::None => &config.none,
        Trigger::Fallback => &None,
    };
    if let Some(action) = specific {
        return run_handler(action, evaluator);
    }
    if let Some(action) = &config.fallback {
        return run_handler(action, evaluator);
    }
    if allow_unresolved_states {
        Ok(trigger.sentinel_value())
    } else {
        Err(EngineError::new(EngineErrorKind::Configuration)
            .with_message(format!("unresolved alternate state: {trigger:?}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastGoodRecord {
    pub value: Value,
    pub changed_at: String,
}

/// Tracks a single sensor's last-published non-alternate value (spec
/// §4.8 "last-good preservation"). Never initialized until the first
/// non-alternate result; updated only when a cycle's final result is
/// itself non-alternate.
#[derive(Debug, Clone, Default)]
pub struct LastGoodStore {
    record: Option<LastGoodRecord>,
}

impl LastGoodStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: &Value, timestamp: impl Into<String>) {
        if !value.is_alternate() {
            self.record = Some(LastGoodRecord { value: value.clone(), changed_at: timestamp.into() });
        }
    }

    pub fn last_valid_state(&self) -> Option<&Value> {
        self.record.as_ref().map(|r| &r.value)
    }

    pub fn last_valid_changed(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.changed_at.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverEvaluates;
    impl HandlerFormulaEvaluator for NeverEvaluates {
        fn evaluate(&mut self, _formula: &str, _variables: &HashMap<String, Value>) -> Result<Value, EngineError> {
            panic!("handler should not evaluate a formula in this test")
        }
    }

    #[test]
    fn unavailable_value_classifies_as_unavailable_trigger() {
        assert_eq!(classify_value(&Value::unavailable()), Some(Trigger::Unavailable));
        assert_eq!(classify_value(&Value::unknown()), Some(Trigger::Unknown));
        assert_eq!(classify_value(&Value::None), Some(Trigger::None));
        assert_eq!(classify_value(&Value::Number(0.0)), None);
    }

    #[test]
    fn recoverable_error_is_fallback_configuration_error_is_not() {
        let recoverable = EngineError::new(EngineErrorKind::ZeroDivision);
        let fatal = EngineError::new(EngineErrorKind::Syntax);
        assert_eq!(classify_error(&recoverable), Some(Trigger::Fallback));
        assert_eq!(classify_error(&fatal), None);
    }

    #[test]
    fn literal_handler_short_circuits_formula_evaluation() {
        let config = AlternateStatesConfig {
            unavailable: Some(HandlerAction::Literal(Value::Number(0.0))),
            ..Default::default()
        };
        let v = resolve_trigger(&config, Trigger::Unavailable, &mut NeverEvaluates, false).unwrap();
        assert_eq!(v, Value::Number(0.0));
    }

    #[test]
    fn no_handler_and_disallowed_is_fatal() {
        let config = AlternateStatesConfig::default();
        let err = resolve_trigger(&config, Trigger::Unknown, &mut NeverEvaluates, false).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Configuration);
    }

    #[test]
    fn no_handler_and_allowed_passes_sentinel_through() {
        let config = AlternateStatesConfig::default();
        let v = resolve_trigger(&config, Trigger::Unknown, &mut NeverEvaluates, true).unwrap();
        assert_eq!(v, Value::unknown());
    }

    #[test]
    fn last_good_store_ignores_alternate_results() {
        let mut store = LastGoodStore::new();
        store.observe(&Value::Number(42.0), "t1");
        store.observe(&Value::unavailable(), "t2");
        assert_eq!(store.last_valid_state(), Some(&Value::Number(42.0)));
        assert_eq!(store.last_valid_changed(), Some("t1"));
    }

    #[test]
    fn metadata_only_reference_is_exempt_from_presence_guard() {
        crate::analysis::clear_cache();
        let analysis = crate::analysis::get_formula_analysis("metadata(power, 'last_changed')").unwrap();
        let required = names_requiring_presence(&analysis);
        assert!(!required.contains("power"));
    }
}
