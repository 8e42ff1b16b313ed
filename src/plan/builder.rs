use super::definition::{validate_plan_definition, PlanDefinition};
use super::graph::StepGraph;
use super::model::{Plan, PlanConfig, Step, StepInput, StepStatus, StepType};
use super::PlanError;
use crate::shared::ids::{PlanId, StepId, ID_MAX_GENERATION_ATTEMPTS};
use serde_json::Map;
use std::collections::HashMap;

pub fn create_plan(
    name: impl Into<String>,
    description: impl Into<String>,
    config: PlanConfig,
    now: i64,
) -> Result<Plan, PlanError> {
    let id = PlanId::generate(now).map_err(PlanError::IdAllocation)?;
    Ok(empty_plan(id, name.into(), description.into(), config, now))
}

fn empty_plan(id: PlanId, name: String, description: String, config: PlanConfig, now: i64) -> Plan {
    Plan {
        id,
        name,
        description,
        steps: Vec::new(),
        config,
        context: Map::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Appends a new `pending` step with a fresh id. The plan is untouched on error.
pub fn add_step(plan: &mut Plan, input: StepInput, now: i64) -> Result<&Step, PlanError> {
    if plan.steps.len() >= plan.config.max_steps {
        return Err(PlanError::PlanCapacityExceeded {
            max_steps: plan.config.max_steps,
        });
    }
    let id = allocate_step_id(plan, now)?;
    plan.steps.push(Step {
        id,
        name: input.name,
        description: input.description,
        step_type: input.step_type,
        input: input.input,
        config: input.config,
        status: StepStatus::Pending,
        dependencies: Vec::new(),
        output: None,
        error: None,
        start_time: None,
        end_time: None,
    });
    plan.touch(now);
    let index = plan.steps.len() - 1;
    Ok(&plan.steps[index])
}

fn allocate_step_id(plan: &Plan, now: i64) -> Result<StepId, PlanError> {
    for _ in 0..ID_MAX_GENERATION_ATTEMPTS {
        let id = StepId::generate(now).map_err(PlanError::IdAllocation)?;
        if !plan.contains_step(id.as_str()) {
            return Ok(id);
        }
    }
    Err(PlanError::IdAllocation(format!(
        "failed to allocate unique step id after {ID_MAX_GENERATION_ATTEMPTS} attempts"
    )))
}

/// Records that `dependent_id` must run after `dependency_id`.
///
/// The cycle check runs over the existing edges before anything is written, so a
/// rejected edge leaves every dependency list exactly as it was.
pub fn add_dependency(
    plan: &mut Plan,
    dependent_id: &str,
    dependency_id: &str,
    now: i64,
) -> Result<(), PlanError> {
    let dependent = plan
        .index_of(dependent_id)
        .ok_or_else(|| PlanError::StepNotFound {
            step_id: dependent_id.to_string(),
        })?;
    let dependency = plan
        .index_of(dependency_id)
        .ok_or_else(|| PlanError::StepNotFound {
            step_id: dependency_id.to_string(),
        })?;

    if plan.steps[dependent]
        .dependencies
        .iter()
        .any(|existing| existing.as_str() == dependency_id)
    {
        return Ok(());
    }

    let creates_cycle = StepGraph::from_steps(&plan.steps)?.reaches(dependency, dependent);
    if creates_cycle {
        return Err(PlanError::CircularDependency {
            dependent: plan.steps[dependent].id.clone(),
            dependency: plan.steps[dependency].id.clone(),
        });
    }

    let edge = plan.steps[dependency].id.clone();
    plan.steps[dependent].dependencies.push(edge);
    plan.touch(now);
    Ok(())
}

/// Validates `definition` and builds a plan from it. Either the whole plan is
/// returned or nothing is constructed.
pub fn build_plan(definition: &PlanDefinition, now: i64) -> Result<Plan, PlanError> {
    build_plan_with_defaults(definition, PlanConfig::default(), now)
}

/// Like [`build_plan`], using `defaults` when the definition has no `config`.
pub fn build_plan_with_defaults(
    definition: &PlanDefinition,
    defaults: PlanConfig,
    now: i64,
) -> Result<Plan, PlanError> {
    validate_plan_definition(definition)?;

    let id = match definition.id.as_deref() {
        Some(raw) => PlanId::parse(raw).map_err(PlanError::InvalidPlanDefinition)?,
        None => PlanId::generate(now).map_err(PlanError::IdAllocation)?,
    };
    let mut plan = empty_plan(
        id,
        definition.name.clone(),
        definition.description.clone(),
        definition.config.unwrap_or(defaults),
        now,
    );
    plan.context = definition.context.clone();

    let mut ids_by_reference: HashMap<&str, StepId> = HashMap::new();
    for step in &definition.steps {
        let step_type = StepType::parse(&step.step_type).ok_or_else(|| {
            PlanError::InvalidPlanDefinition(format!("unknown step type `{}`", step.step_type))
        })?;
        let input = StepInput {
            name: step.name.clone(),
            description: step.description.clone(),
            step_type,
            input: step.input.clone(),
            config: step.config.clone(),
        };
        let id = add_step(&mut plan, input, now)?.id.clone();
        ids_by_reference.insert(step.reference(), id);
    }

    for step in &definition.steps {
        let dependent = &ids_by_reference[step.reference()];
        for reference in &step.depends_on {
            let dependency = ids_by_reference.get(reference.as_str()).ok_or_else(|| {
                PlanError::InvalidPlanDefinition(format!("unknown step `{reference}`"))
            })?;
            add_dependency(&mut plan, dependent.as_str(), dependency.as_str(), now)?;
        }
    }

    Ok(plan)
}
