//! Sensor Orchestrator (spec §4.9, C9): the seven-step per-cycle
//! pipeline that turns a sensor definition plus a set of globals into
//! one atomic publication.

use std::collections::HashMap;

use synthetic_sensors_common::{EngineError, Value};
use synthetic_sensors_eval::Clock;

use crate::alternate_state::{AlternateStatesConfig, HandlerFormulaEvaluator, LastGoodStore};
use crate::binding::BindingEnvironment;
use crate::circuit_breaker::CircuitBreaker;
use crate::context::{HierarchicalContext, ReferenceValue};
use crate::dependency::{expand_collection_queries, topo_order_computed_variables, CollectionQuery};
use crate::phase::{self, FormulaInputs, FormulaOutcome, NoComputed, NoRecursiveHandlers};
use crate::providers::{DataProviderCallback, MetadataProvider, StateProvider};
use crate::resolver::CrossSensorRegistry;

/// How a declared variable's value is produced (spec §6 "variables?").
#[derive(Debug, Clone, PartialEq)]
pub enum VariableSource {
    Literal(Value),
    EntityReference(String),
    Collection(Vec<CollectionQuery>),
    Computed(String),
}

/// `name?, entity_id?, {formula,variables?,metadata?,alternate_states?}`
/// (spec §6 "attributes?"). A bare literal attribute skips the pipeline
/// entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSource {
    Literal(Value),
    Formula(String),
}

#[derive(Debug, Clone, Default)]
pub struct AttributeDefinition {
    pub source: Option<AttributeSource>,
    pub variables: HashMap<String, VariableSource>,
    pub alternate_states: AlternateStatesConfig,
    pub allow_unresolved_states: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SensorDefinition {
    pub id: String,
    pub entity_id: Option<String>,
    pub formula: String,
    pub variables: Vec<(String, VariableSource)>,
    pub attributes: Vec<(String, AttributeDefinition)>,
    pub alternate_states: AlternateStatesConfig,
    pub allow_unresolved_states: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorPublication {
    pub value: Value,
    pub attributes: HashMap<String, Value>,
    pub last_valid_state: Option<Value>,
    pub last_valid_changed: Option<String>,
}

/// Read-only collaborators shared by every formula a sensor evaluates
/// this cycle (spec §4.6, §6). Cheap to copy — every field is a shared
/// reference.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub state_provider: &'a dyn StateProvider,
    pub data_provider: &'a dyn DataProviderCallback,
    pub metadata_provider: &'a dyn MetadataProvider,
    pub cross_sensor: &'a dyn CrossSensorRegistry,
    pub clock: &'a dyn Clock,
    pub breaker: &'a CircuitBreaker,
}

fn binding_env_for(variables: &HashMap<String, VariableSource>) -> BindingEnvironment {
    let mut env = BindingEnvironment::default();
    for (name, source) in variables {
        match source {
            VariableSource::Literal(_) => {
                env.literal_names.insert(name.clone());
            }
            VariableSource::Computed(_) => {
                env.computed_names.insert(name.clone());
            }
            _ => {}
        }
    }
    env
}

fn resolve_plain_variable(
    source: &VariableSource,
    collaborators: Collaborators<'_>,
) -> Option<(String, Value)> {
    match source {
        VariableSource::Literal(_) | VariableSource::Computed(_) => None,
        VariableSource::EntityReference(entity_id) => {
            let lookup = collaborators.state_provider.get_state(entity_id);
            let value = if lookup.exists { lookup.value } else { Value::unavailable() };
            Some((entity_id.clone(), value))
        }
        VariableSource::Collection(queries) => {
            let members = expand_collection_queries(queries, collaborators.state_provider);
            let mut values: Vec<Value> = members
                .iter()
                .filter_map(|m| {
                    let lookup = collaborators.state_provider.get_state(m);
                    lookup.exists.then_some(lookup.value)
                })
                .collect();
            values.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            Some(("<collection>".to_string(), Value::List(values)))
        }
    }
}

/// Evaluates one sensor for one cycle (spec §4.9). `last_good` is
/// caller-owned so it persists across cycles; `instance_id` should be
/// stable for a given sensor across its lifetime.
pub fn evaluate_sensor_cycle(
    sensor: &SensorDefinition,
    globals: &HashMap<String, Value>,
    collaborators: Collaborators<'_>,
    last_good: &mut LastGoodStore,
    instance_id: u64,
) -> Result<SensorPublication, EngineError> {
    // Step 1: fresh context, globals at L0, sensor variables at L1.
    let mut ctx = HierarchicalContext::new(instance_id);
    for (name, value) in globals {
        ctx.unified_set(name, ReferenceValue::new(format!("global:{name}"), value.clone()));
    }
    ctx.push_layer(format!("sensor:{}", sensor.id));

    let sensor_variables: HashMap<String, VariableSource> = sensor.variables.iter().cloned().collect();
    let binding_env = binding_env_for(&sensor_variables);
    let mut literal_table = HashMap::new();

    for (name, source) in &sensor.variables {
        match source {
            VariableSource::Literal(value) => {
                literal_table.insert(name.clone(), value.clone());
                ctx.unified_set(name, ReferenceValue::new(format!("literal:{}:{}", sensor.id, name), value.clone()));
            }
            VariableSource::Computed(_) => {}
            other => {
                if let Some((reference, value)) = resolve_plain_variable(other, collaborators) {
                    ctx.unified_set(name, ReferenceValue::new(reference, value));
                }
            }
        }
    }

    // Step 2: topologically ordered computed-variable pass.
    let computed_formulas: HashMap<String, String> = sensor
        .variables
        .iter()
        .filter_map(|(name, source)| match source {
            VariableSource::Computed(formula) => Some((name.clone(), formula.clone())),
            _ => None,
        })
        .collect();
    let order = topo_order_computed_variables(&computed_formulas)?;
    for name in &order {
        let formula = &computed_formulas[name];
        let outcome = run_formula(sensor, formula, &binding_env, &literal_table, collaborators, false, &mut ctx)?;
        let value = outcome_value(outcome, last_good);
        ctx.unified_set(name, ReferenceValue::new(format!("computed:{}:{}", sensor.id, name), value));
    }

    // Step 3: main formula.
    let main_outcome = run_formula(
        sensor,
        &sensor.formula,
        &binding_env,
        &literal_table,
        collaborators,
        sensor.allow_unresolved_states,
        &mut ctx,
    )?;
    let main_value = outcome_value(main_outcome, last_good);

    // Step 4: publish `state` in its own layer.
    ctx.push_layer("state");
    ctx.unified_set("state", ReferenceValue::new(format!("state:{}", sensor.id), main_value.clone()));

    // Step 5: attributes, each in its own sibling layer above `state`.
    let mut attributes = HashMap::new();
    for (attr_name, attr_def) in &sensor.attributes {
        ctx.push_layer(format!("attribute:{attr_name}"));
        let attr_binding_env = binding_env_for(&attr_def.variables);
        let mut attr_literal_table = HashMap::new();
        for (vname, vsource) in &attr_def.variables {
            match vsource {
                VariableSource::Literal(value) => {
                    attr_literal_table.insert(vname.clone(), value.clone());
                    ctx.unified_set(
                        vname,
                        ReferenceValue::new(format!("literal:{}:{attr_name}:{vname}", sensor.id), value.clone()),
                    );
                }
                VariableSource::Computed(_) => {}
                other => {
                    if let Some((reference, value)) = resolve_plain_variable(other, collaborators) {
                        ctx.unified_set(vname, ReferenceValue::new(reference, value));
                    }
                }
            }
        }

        let attr_value = match &attr_def.source {
            None | Some(AttributeSource::Literal(_)) => match &attr_def.source {
                Some(AttributeSource::Literal(v)) => v.clone(),
                _ => Value::None,
            },
            Some(AttributeSource::Formula(formula)) => {
                let inputs = FormulaInputs {
                    sensor_id: &sensor.id,
                    formula,
                    binding_env: &attr_binding_env,
                    state_provider: collaborators.state_provider,
                    data_provider: collaborators.data_provider,
                    metadata_provider: collaborators.metadata_provider,
                    cross_sensor: collaborators.cross_sensor,
                    literal_table: &attr_literal_table,
                    clock: collaborators.clock,
                    breaker: collaborators.breaker,
                    alternate_states: &attr_def.alternate_states,
                    allow_unresolved_states: attr_def.allow_unresolved_states,
                };
                let mut computed = NoComputed;
                let mut handler_evaluator = SensorHandlerEvaluator { sensor_id: &sensor.id, collaborators };
                let outcome = phase::evaluate_formula(inputs, &mut ctx, &mut computed, &mut handler_evaluator)?;
                outcome_value(outcome, &mut LastGoodStore::new())
            }
        };
        attributes.insert(attr_name.clone(), attr_value);
        ctx.pop_layer();
    }

    // Step 6: consolidate the alternate-state decision into last-good.
    let timestamp = collaborators.clock.utc_now().format("%Y-%m-%dT%H:%M:%S").to_string();
    last_good.observe(&main_value, timestamp);

    // Step 7: single atomic publication.
    Ok(SensorPublication {
        value: main_value,
        attributes,
        last_valid_state: last_good.last_valid_state().cloned(),
        last_valid_changed: last_good.last_valid_changed().map(|s| s.to_string()),
    })
}

/// Evaluates a `HandlerAction::Formula{formula, variables}` alternate-state
/// handler value (spec §4.8 "handler value semantics") by running it
/// through the same five-phase pipeline in a standalone context seeded
/// only with the handler's own `variables`, each bound as a literal —
/// the "enhanced local layer" the handler value is evaluated against.
/// Nested handler formulas are not supported: a handler formula that
/// itself goes unavailable/unknown resolves through `NoRecursiveHandlers`.
struct SensorHandlerEvaluator<'a> {
    sensor_id: &'a str,
    collaborators: Collaborators<'a>,
}

impl<'a> HandlerFormulaEvaluator for SensorHandlerEvaluator<'a> {
    fn evaluate(&mut self, formula: &str, variables: &HashMap<String, Value>) -> Result<Value, EngineError> {
        let mut ctx = HierarchicalContext::new(0);
        ctx.push_layer(format!("handler:{}", self.sensor_id));

        let mut binding_env = BindingEnvironment::default();
        let mut literal_table = HashMap::new();
        for (name, value) in variables {
            binding_env.literal_names.insert(name.clone());
            literal_table.insert(name.clone(), value.clone());
            ctx.unified_set(name, ReferenceValue::new(format!("handler:{}:{name}", self.sensor_id), value.clone()));
        }

        let alt_states = AlternateStatesConfig::default();
        let inputs = FormulaInputs {
            sensor_id: self.sensor_id,
            formula,
            binding_env: &binding_env,
            state_provider: self.collaborators.state_provider,
            data_provider: self.collaborators.data_provider,
            metadata_provider: self.collaborators.metadata_provider,
            cross_sensor: self.collaborators.cross_sensor,
            literal_table: &literal_table,
            clock: self.collaborators.clock,
            breaker: self.collaborators.breaker,
            alternate_states: &alt_states,
            allow_unresolved_states: false,
        };
        let mut computed = NoComputed;
        let outcome = phase::evaluate_formula(inputs, &mut ctx, &mut computed, &mut NoRecursiveHandlers)?;
        Ok(match outcome {
            FormulaOutcome::Value(v) => v,
            FormulaOutcome::BreakerOpen => Value::unavailable(),
        })
    }
}

fn run_formula(
    sensor: &SensorDefinition,
    formula: &str,
    binding_env: &BindingEnvironment,
    literal_table: &HashMap<String, Value>,
    collaborators: Collaborators<'_>,
    allow_unresolved_states: bool,
    ctx: &mut HierarchicalContext,
) -> Result<FormulaOutcome, EngineError> {
    let inputs = FormulaInputs {
        sensor_id: &sensor.id,
        formula,
        binding_env,
        state_provider: collaborators.state_provider,
        data_provider: collaborators.data_provider,
        metadata_provider: collaborators.metadata_provider,
        cross_sensor: collaborators.cross_sensor,
        literal_table,
        clock: collaborators.clock,
        breaker: collaborators.breaker,
        alternate_states: &sensor.alternate_states,
        allow_unresolved_states,
    };
    let mut computed = NoComputed;
    let mut handler_evaluator = SensorHandlerEvaluator { sensor_id: &sensor.id, collaborators };
    phase::evaluate_formula(inputs, ctx, &mut computed, &mut handler_evaluator)
}

fn outcome_value(outcome: FormulaOutcome, last_good: &mut LastGoodStore) -> Value {
    match outcome {
        FormulaOutcome::Value(v) => v,
        FormulaOutcome::BreakerOpen => last_good.last_valid_state().cloned().unwrap_or_else(Value::unavailable),
    }
}
