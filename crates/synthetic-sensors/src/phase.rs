//! Phase Orchestrator (spec §4.6, C6): runs one formula through the
//! five-phase pipeline. The sensor orchestrator (C9) drives this once
//! per main formula, computed variable, and attribute formula, each
//! against its own context layer.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};
use synthetic_sensors_eval::{Clock, FunctionContext, Interpreter, NameEnvironment};

use crate::alternate_state::{self, AlternateStatesConfig, HandlerFormulaEvaluator, Trigger};
use crate::analysis::get_formula_analysis;
use crate::binding::{build_binding_plan, BindingEnvironment, BindingPlan, Strategy};
use crate::circuit_breaker::CircuitBreaker;
use crate::context::{HierarchicalContext, ReferenceValue};
use crate::metadata::{inject_sentinels, rewrite_metadata_calls, MetadataRewrite};
use crate::providers::{DataProviderCallback, MetadataProvider, StateProvider};
use crate::resolver::{ComputedVariableEvaluator, CrossSensorRegistry, VariableResolver};

/// Lazily resolves names against the current `HierarchicalContext` the
/// first time the interpreter asks for them (spec §4.6 Phase 1), then
/// memoizes the result for the rest of the cycle via `unified_set`.
struct LazyEnvironment<'a> {
    ctx: RefCell<&'a mut HierarchicalContext>,
    plan: std::sync::Arc<BindingPlan>,
    resolver: VariableResolver<'a>,
    computed: RefCell<&'a mut dyn ComputedVariableEvaluator>,
}

impl<'a> NameEnvironment for LazyEnvironment<'a> {
    fn get(&self, name: &str) -> Result<Value, EngineError> {
        if let Some(rv) = self.ctx.borrow().get(name) {
            return Ok(rv.value().clone());
        }
        let strategy = self.plan.strategies.get(name).copied().unwrap_or(Strategy::DataProvider);
        let value = self.resolver.resolve(name, strategy, *self.computed.borrow_mut())?;
        self.ctx.borrow_mut().unified_set(name, ReferenceValue::new(name.to_string(), value.clone()));
        Ok(value)
    }

    fn get_attribute(&self, base: &str, attr: &str) -> Result<Value, EngineError> {
        let dotted_key = format!("{base}.{attr}");
        if let Some(rv) = self.ctx.borrow().get(&dotted_key) {
            return Ok(rv.value().clone());
        }
        // The tokenizer always splits `sensor.power` into
        // `Attribute{base: "sensor", attr: "power"}`, so a two-segment
        // HA entity id is indistinguishable at the AST level from true
        // attribute access on a declared variable. The binding plan
        // already made that call for this exact pair; only when it
        // says `StateAttribute` do we resolve `base` as a variable
        // first and read `attr` off of it.
        match self.plan.strategies.get(dotted_key.as_str()) {
            Some(Strategy::HaState) => {
                let value =
                    self.resolver.resolve(&dotted_key, Strategy::HaState, *self.computed.borrow_mut())?;
                self.ctx
                    .borrow_mut()
                    .unified_set(&dotted_key, ReferenceValue::new(dotted_key.clone(), value.clone()));
                Ok(value)
            }
            _ => {
                self.get(base)?;
                self.resolver.resolve_attribute(base, attr)
            }
        }
    }
}

struct ClockContext<'a> {
    clock: &'a dyn Clock,
}

impl<'a> FunctionContext for ClockContext<'a> {
    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

pub struct NoComputed;
impl ComputedVariableEvaluator for NoComputed {
    fn evaluate(&mut self, name: &str) -> Result<Value, EngineError> {
        Err(EngineError::new(EngineErrorKind::Name)
            .with_name(name)
            .with_message("no computed-variable evaluator supplied for this cycle"))
    }
}

/// The read-only collaborators a formula evaluation needs (spec §4.6
/// Phase 1-3). All shared references, so this is cheap to pass by
/// value; the two pieces of per-cycle mutable state — the context and
/// the computed-variable evaluator — are passed alongside it rather
/// than bundled in, since both must be borrowed mutably.
#[derive(Clone, Copy)]
pub struct FormulaInputs<'a> {
    pub sensor_id: &'a str,
    pub formula: &'a str,
    pub binding_env: &'a BindingEnvironment,
    pub state_provider: &'a dyn StateProvider,
    pub data_provider: &'a dyn DataProviderCallback,
    pub metadata_provider: &'a dyn MetadataProvider,
    pub cross_sensor: &'a dyn CrossSensorRegistry,
    pub literal_table: &'a HashMap<String, Value>,
    pub clock: &'a dyn Clock,
    pub breaker: &'a CircuitBreaker,
    pub alternate_states: &'a AlternateStatesConfig,
    pub allow_unresolved_states: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaOutcome {
    Value(Value),
    /// The pipeline could not attempt evaluation at all: the circuit
    /// breaker is tripped and its cool-down hasn't elapsed (spec §4.6
    /// Phase 0).
    BreakerOpen,
}

/// `handler_evaluator` is consulted only if a trigger is raised and no
/// `Literal` handler covers it — a `Formula` handler value (spec §4.8
/// "handler value semantics") is evaluated through it. Callers that
/// never configure a `Formula` handler can pass `&mut NoRecursiveHandlers`.
pub fn evaluate_formula(
    inputs: FormulaInputs<'_>,
    ctx: &mut HierarchicalContext,
    computed: &mut dyn ComputedVariableEvaluator,
    handler_evaluator: &mut dyn HandlerFormulaEvaluator,
) -> Result<FormulaOutcome, EngineError> {
    // Phase 0: pre-evaluation guards.
    let breaker_key = format!("{}::{}", inputs.sensor_id, inputs.formula);
    if !inputs.breaker.may_attempt(&breaker_key) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sensor = %inputs.sensor_id, "skipping evaluation: breaker open");
        return Ok(FormulaOutcome::BreakerOpen);
    }
    synthetic_sensors_eval::ensure_builtins_registered();

    let result = run_pipeline(inputs, ctx, computed, handler_evaluator);

    match &result {
        Ok(_) => inputs.breaker.record_success(&breaker_key),
        Err(err) if err.is_recoverable() => inputs.breaker.record_failure(&breaker_key),
        Err(_) => {}
    }
    result
}

fn run_pipeline(
    inputs: FormulaInputs<'_>,
    ctx: &mut HierarchicalContext,
    computed: &mut dyn ComputedVariableEvaluator,
    handler_evaluator: &mut dyn HandlerFormulaEvaluator,
) -> Result<FormulaOutcome, EngineError> {
    // Phase 1: binding plan (lazy resolver setup, memoized per sensor+formula).
    let plan = build_binding_plan(inputs.sensor_id, inputs.formula, inputs.binding_env)
        .map_err(|e| EngineError::new(EngineErrorKind::Syntax).with_message(e.to_string()))?;

    // Phase 2: dependency validation + metadata rewrite.
    let analysis = get_formula_analysis(inputs.formula)
        .map_err(|e| EngineError::new(EngineErrorKind::Syntax).with_message(e.to_string()))?;
    let mut required = alternate_state::names_requiring_presence(&analysis);
    for (base, attr) in &analysis.dotted {
        let dotted_key = format!("{base}.{attr}");
        if matches!(plan.strategies.get(dotted_key.as_str()), Some(Strategy::HaState)) {
            required.insert(dotted_key);
        }
    }

    if let Some(trigger) = check_presence(&required, &inputs) {
        return resolve_with_handler(&inputs, trigger, handler_evaluator);
    }

    let rewrite = if analysis.metadata_calls.is_empty() {
        None
    } else {
        match rewrite_metadata_calls(inputs.formula, inputs.metadata_provider, inputs.state_provider) {
            Ok(r) => Some(r),
            Err(err) => return classify_and_resolve(&inputs, Err(err), handler_evaluator),
        }
    };

    let routed_formula = rewrite.as_ref().map(|r| r.formula.clone()).unwrap_or_else(|| inputs.formula.to_string());

    // Phase 3: execution routing. The metadata rewrite above already
    // reduces both routes to one shape — a formula the Expression
    // Engine evaluates directly, with sentinel values pre-injected.
    let eval_result = evaluate_routed(&inputs, &routed_formula, rewrite.as_ref(), plan, ctx, computed);

    // Phase 4: result processing.
    classify_and_resolve(&inputs, eval_result, handler_evaluator)
}

/// Phase 2's missing-state guard, refined to surface the *specific*
/// alternate-state trigger a required name's current value calls for
/// (spec §7 "triggers the alternate-state chain") rather than a
/// generic recoverable error — `alternate_states: {UNAVAILABLE: 50}`
/// must fire from an `unavailable`-valued dependency even though no
/// arithmetic error was ever raised.
fn check_presence(required: &HashSet<String>, inputs: &FormulaInputs<'_>) -> Option<Trigger> {
    for name in required {
        if inputs.binding_env.literal_names.contains(name)
            || inputs.binding_env.computed_names.contains(name)
            || inputs.binding_env.cross_sensor_keys.contains(name)
        {
            continue;
        }
        if name == "state" {
            continue;
        }
        let state_lookup = inputs.state_provider.get_state(name);
        let lookup = if state_lookup.exists { Some(state_lookup) } else {
            let data_lookup = inputs.data_provider.call(name);
            data_lookup.exists.then_some(data_lookup)
        };
        match lookup {
            None => return Some(Trigger::Unavailable),
            Some(found) => {
                if let Some(trigger) = alternate_state::classify_value(&found.value) {
                    return Some(trigger);
                }
            }
        }
    }
    None
}

fn evaluate_routed(
    inputs: &FormulaInputs<'_>,
    formula: &str,
    rewrite: Option<&MetadataRewrite>,
    plan: std::sync::Arc<BindingPlan>,
    ctx: &mut HierarchicalContext,
    computed: &mut dyn ComputedVariableEvaluator,
) -> Result<Value, EngineError> {
    let ast = synthetic_sensors_parse::parse_cached(formula)
        .map_err(|e| EngineError::new(EngineErrorKind::Syntax).with_message(e.to_string()))?;

    if let Some(r) = rewrite {
        inject_sentinels(ctx, r);
    }

    let resolver = VariableResolver {
        state_provider: inputs.state_provider,
        data_provider: inputs.data_provider,
        metadata_provider: inputs.metadata_provider,
        cross_sensor: inputs.cross_sensor,
        literal_table: inputs.literal_table,
    };

    let env = LazyEnvironment { ctx: RefCell::new(ctx), plan, resolver, computed: RefCell::new(computed) };
    let fn_ctx = ClockContext { clock: inputs.clock };
    let interpreter = Interpreter::new(&env, &fn_ctx);
    interpreter.eval(ast.as_ref())
}

fn classify_and_resolve(
    inputs: &FormulaInputs<'_>,
    result: Result<Value, EngineError>,
    handler_evaluator: &mut dyn HandlerFormulaEvaluator,
) -> Result<FormulaOutcome, EngineError> {
    match result {
        Ok(value) => {
            if let Some(trigger) = alternate_state::classify_value(&value) {
                resolve_with_handler(inputs, trigger, handler_evaluator)
            } else {
                Ok(FormulaOutcome::Value(value.to_published()))
            }
        }
        Err(err) => match alternate_state::classify_error(&err) {
            Some(trigger) => resolve_with_handler(inputs, trigger, handler_evaluator),
            None => Err(err),
        },
    }
}

/// A `HandlerFormulaEvaluator` that fails any `Formula` handler action —
/// appropriate where handler formulas are known never to be configured
/// (colocated tests) or where a handler formula's own evaluation must
/// not itself recurse into another handler formula.
pub struct NoRecursiveHandlers;
impl HandlerFormulaEvaluator for NoRecursiveHandlers {
    fn evaluate(&mut self, _formula: &str, _variables: &HashMap<String, Value>) -> Result<Value, EngineError> {
        Err(EngineError::new(EngineErrorKind::Configuration)
            .with_message("formula-object alternate-state handlers may not themselves configure one"))
    }
}

fn resolve_with_handler(
    inputs: &FormulaInputs<'_>,
    trigger: Trigger,
    handler_evaluator: &mut dyn HandlerFormulaEvaluator,
) -> Result<FormulaOutcome, EngineError> {
    #[cfg(feature = "tracing")]
    tracing::debug!(sensor = %inputs.sensor_id, trigger = ?trigger, "formula resolved via alternate-state handler");
    let value = alternate_state::resolve_trigger(
        inputs.alternate_states,
        trigger,
        handler_evaluator,
        inputs.allow_unresolved_states,
    )?;
    Ok(FormulaOutcome::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderLookup;

    struct FixedState;
    impl StateProvider for FixedState {
        fn get_state(&self, entity_id: &str) -> ProviderLookup {
            match entity_id {
                "sensor.power" => ProviderLookup::found(Value::Number(1500.0)),
                _ => ProviderLookup::missing(),
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

    fn fixed_clock() -> synthetic_sensors_eval::FixedClock {
        synthetic_sensors_eval::FixedClock::at(
            chrono::NaiveDate::from_ymd_opt(2026, 7, 30).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn basic_numeric_formula_evaluates_through_all_phases() {
        crate::analysis::clear_cache();
        crate::binding::clear_cache();
        let mut ctx = HierarchicalContext::new(1);
        let binding_env = BindingEnvironment::default();
        let literal_table = HashMap::new();
        let breaker = CircuitBreaker::default();
        let alt_states = AlternateStatesConfig::default();
        let clock = fixed_clock();
        let mut computed = NoComputed;

        let inputs = FormulaInputs {
            sensor_id: "energy_cost",
            formula: "sensor.power * 0.12",
            binding_env: &binding_env,
            state_provider: &FixedState,
            data_provider: &NoData,
            metadata_provider: &NoMetadata,
            cross_sensor: &NoCrossSensor,
            literal_table: &literal_table,
            clock: &clock,
            breaker: &breaker,
            alternate_states: &alt_states,
            allow_unresolved_states: false,
        };

        let outcome = evaluate_formula(inputs, &mut ctx, &mut computed, &mut NoRecursiveHandlers).unwrap();
        assert_eq!(outcome, FormulaOutcome::Value(Value::Number(180.0)));
    }

    #[test]
    fn missing_dependency_with_fallback_handler_resolves_literal() {
        crate::analysis::clear_cache();
        crate::binding::clear_cache();
        let mut ctx = HierarchicalContext::new(1);
        let binding_env = BindingEnvironment::default();
        let literal_table = HashMap::new();
        let breaker = CircuitBreaker::default();
        let alt_states = AlternateStatesConfig {
            fallback: Some(alternate_state::HandlerAction::Literal(Value::Number(0.0))),
            ..Default::default()
        };
        let clock = fixed_clock();
        let mut computed = NoComputed;

        let inputs = FormulaInputs {
            sensor_id: "s1",
            formula: "sensor.missing + 1",
            binding_env: &binding_env,
            state_provider: &FixedState,
            data_provider: &NoData,
            metadata_provider: &NoMetadata,
            cross_sensor: &NoCrossSensor,
            literal_table: &literal_table,
            clock: &clock,
            breaker: &breaker,
            alternate_states: &alt_states,
            allow_unresolved_states: false,
        };

        let outcome = evaluate_formula(inputs, &mut ctx, &mut computed, &mut NoRecursiveHandlers).unwrap();
        assert_eq!(outcome, FormulaOutcome::Value(Value::Number(0.0)));
    }

    #[test]
    fn unavailable_sentinel_dependency_uses_the_unavailable_specific_handler() {
        struct UnavailableState;
        impl StateProvider for UnavailableState {
            fn get_state(&self, entity_id: &str) -> ProviderLookup {
                if entity_id == "missing_entity" {
                    ProviderLookup::found(Value::unavailable())
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

        crate::analysis::clear_cache();
        crate::binding::clear_cache();
        let mut ctx = HierarchicalContext::new(1);
        let binding_env = BindingEnvironment::default();
        let literal_table = HashMap::new();
        let breaker = CircuitBreaker::default();
        let alt_states = AlternateStatesConfig {
            unavailable: Some(alternate_state::HandlerAction::Literal(Value::Number(50.0))),
            ..Default::default()
        };
        let clock = fixed_clock();
        let mut computed = NoComputed;

        let inputs = FormulaInputs {
            sensor_id: "s1",
            formula: "missing_entity + 10",
            binding_env: &binding_env,
            state_provider: &UnavailableState,
            data_provider: &NoData,
            metadata_provider: &NoMetadata,
            cross_sensor: &NoCrossSensor,
            literal_table: &literal_table,
            clock: &clock,
            breaker: &breaker,
            alternate_states: &alt_states,
            allow_unresolved_states: false,
        };

        let outcome = evaluate_formula(inputs, &mut ctx, &mut computed, &mut NoRecursiveHandlers).unwrap();
        assert_eq!(outcome, FormulaOutcome::Value(Value::Number(50.0)));
    }
}
