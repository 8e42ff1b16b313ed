use serde_json::json;
use stepgraph::plan::{
    add_dependency, add_step, build_plan, create_plan, resolve_dependencies, PlanConfig,
    PlanDefinition, PlanError, StepInput, StepStatus, StepType,
};
use stepgraph::shared::ids::StepId;

fn step_input(name: &str) -> StepInput {
    StepInput::new(name, StepType::Action)
}

fn dependencies_snapshot(plan: &stepgraph::plan::Plan) -> Vec<Vec<StepId>> {
    plan.steps
        .iter()
        .map(|step| step.dependencies.clone())
        .collect()
}

#[test]
fn plan_builder_resolves_fan_out_in_insertion_order() {
    let mut plan = create_plan("fan-out", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_001).expect("A").id.clone();
    let b = add_step(&mut plan, step_input("B"), 1_002).expect("B").id.clone();
    let c = add_step(&mut plan, step_input("C"), 1_003).expect("C").id.clone();
    add_dependency(&mut plan, b.as_str(), a.as_str(), 1_004).expect("B->A");
    add_dependency(&mut plan, c.as_str(), a.as_str(), 1_005).expect("C->A");

    let order = resolve_dependencies(&plan)
        .expect("order")
        .into_iter()
        .map(|step| step.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(order, vec![a, b, c]);
}

#[test]
fn plan_builder_rejects_cycle_without_touching_edges() {
    let mut plan = create_plan("cycle", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_000).expect("A").id.clone();
    let b = add_step(&mut plan, step_input("B"), 1_000).expect("B").id.clone();

    add_dependency(&mut plan, a.as_str(), b.as_str(), 1_001).expect("A->B");
    let before = dependencies_snapshot(&plan);
    let updated_at = plan.updated_at;

    let err = add_dependency(&mut plan, b.as_str(), a.as_str(), 1_002).expect_err("cycle");
    assert!(matches!(err, PlanError::CircularDependency { .. }));
    assert_eq!(dependencies_snapshot(&plan), before);
    assert_eq!(plan.step(a.as_str()).expect("A").dependencies, vec![b.clone()]);
    assert!(plan.step(b.as_str()).expect("B").dependencies.is_empty());
    assert_eq!(plan.updated_at, updated_at);
}

#[test]
fn plan_builder_rejects_transitive_and_self_cycles() {
    let mut plan = create_plan("chain", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_000).expect("A").id.clone();
    let b = add_step(&mut plan, step_input("B"), 1_000).expect("B").id.clone();
    let c = add_step(&mut plan, step_input("C"), 1_000).expect("C").id.clone();
    add_dependency(&mut plan, b.as_str(), a.as_str(), 1_000).expect("B->A");
    add_dependency(&mut plan, c.as_str(), b.as_str(), 1_000).expect("C->B");
    let before = dependencies_snapshot(&plan);

    assert!(matches!(
        add_dependency(&mut plan, a.as_str(), c.as_str(), 1_000),
        Err(PlanError::CircularDependency { .. })
    ));
    assert!(matches!(
        add_dependency(&mut plan, a.as_str(), a.as_str(), 1_000),
        Err(PlanError::CircularDependency { .. })
    ));
    assert_eq!(dependencies_snapshot(&plan), before);
}

#[test]
fn plan_builder_duplicate_edge_is_a_noop() {
    let mut plan = create_plan("dup", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_000).expect("A").id.clone();
    let b = add_step(&mut plan, step_input("B"), 1_000).expect("B").id.clone();
    add_dependency(&mut plan, b.as_str(), a.as_str(), 1_000).expect("first");
    add_dependency(&mut plan, b.as_str(), a.as_str(), 1_000).expect("second");
    assert_eq!(plan.step(b.as_str()).expect("B").dependencies, vec![a]);
}

#[test]
fn plan_builder_reports_missing_steps() {
    let mut plan = create_plan("missing", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_000).expect("A").id.clone();

    let err = add_dependency(&mut plan, a.as_str(), "ghost", 1_000).expect_err("missing");
    assert!(matches!(err, PlanError::StepNotFound { ref step_id } if step_id == "ghost"));
    let err = add_dependency(&mut plan, "ghost", a.as_str(), 1_000).expect_err("missing");
    assert!(matches!(err, PlanError::StepNotFound { .. }));
    assert!(plan.step(a.as_str()).expect("A").dependencies.is_empty());
}

#[test]
fn plan_builder_enforces_capacity() {
    let config = PlanConfig {
        max_steps: 2,
        ..PlanConfig::default()
    };
    let mut plan = create_plan("small", "", config, 1_000).expect("plan");
    add_step(&mut plan, step_input("one"), 1_000).expect("one");
    add_step(&mut plan, step_input("two"), 1_000).expect("two");

    let err = add_step(&mut plan, step_input("three"), 1_000).expect_err("capacity");
    assert!(matches!(err, PlanError::PlanCapacityExceeded { max_steps: 2 }));
    assert_eq!(plan.steps.len(), 2);
}

#[test]
fn plan_builder_initializes_new_steps() {
    let mut plan = create_plan("init", "desc", PlanConfig::default(), 1_000).expect("plan");
    let input = StepInput::new("validate", StepType::ModelValidation)
        .with_description("check model")
        .with_input(json!({"model": "m1"}));
    let step = add_step(&mut plan, input, 2_000).expect("step").clone();

    assert_eq!(step.status, StepStatus::Pending);
    assert!(step.dependencies.is_empty());
    assert_eq!(step.step_type, StepType::ModelValidation);
    assert_eq!(step.description.as_deref(), Some("check model"));
    assert_eq!(step.input, Some(json!({"model": "m1"})));
    assert!(step.id.as_str().starts_with("step-"));
    assert_eq!(plan.created_at, 1_000);
    assert_eq!(plan.updated_at, 2_000);

    let other = add_step(&mut plan, step_input("other"), 2_000).expect("other").id.clone();
    assert_ne!(other, step.id);
}

#[test]
fn plan_builder_tracks_step_status_transitions() {
    let mut plan = create_plan("status", "", PlanConfig::default(), 1_000).expect("plan");
    let a = add_step(&mut plan, step_input("A"), 1_000).expect("A").id.clone();

    let err = plan
        .mark_step_completed(a.as_str(), None, 1_001)
        .expect_err("pending -> completed");
    assert!(matches!(
        err,
        PlanError::InvalidStepTransition {
            from: StepStatus::Pending,
            to: StepStatus::Completed,
            ..
        }
    ));

    plan.mark_step_running(a.as_str(), 1_010).expect("running");
    plan.mark_step_failed(a.as_str(), "provider timeout", 1_020)
        .expect("failed");
    let step = plan.step(a.as_str()).expect("A");
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_deref(), Some("provider timeout"));
    assert_eq!(step.start_time, Some(1_010));
    assert_eq!(step.end_time, Some(1_020));

    plan.reset_step(a.as_str(), 1_030).expect("reset");
    plan.mark_step_running(a.as_str(), 1_040).expect("rerun");
    plan.mark_step_completed(a.as_str(), Some(json!("ok")), 1_050)
        .expect("completed");
    let step = plan.step(a.as_str()).expect("A");
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.error, None);
    assert_eq!(step.output, Some(json!("ok")));
    assert_eq!(plan.updated_at, 1_050);
    assert!(plan.is_finished());
}

#[test]
fn plan_builder_builds_from_yaml_definition() {
    let definition = PlanDefinition::from_yaml_str(
        r#"
id: research-plan
name: research
description: gather and summarize
config:
  maxSteps: 10
  retryAttempts: 1
context:
  topic: rust
steps:
  - key: init
    name: start agent
    type: agent_init
  - key: browse
    name: browse sources
    type: action
    dependsOn: [init]
  - key: check
    name: validate model
    type: model_validation
    dependsOn: [init]
  - key: summary
    name: summarize
    type: action
    input: { format: markdown }
    dependsOn: [browse, check]
"#,
    )
    .expect("definition");

    let plan = build_plan(&definition, 5_000).expect("plan");
    assert_eq!(plan.id.as_str(), "research-plan");
    assert_eq!(plan.config.max_steps, 10);
    assert_eq!(plan.config.retry_attempts, 1);
    assert_eq!(plan.context.get("topic"), Some(&json!("rust")));
    assert_eq!(plan.steps.len(), 4);

    let names = resolve_dependencies(&plan)
        .expect("order")
        .into_iter()
        .map(|step| step.name.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["start agent", "browse sources", "validate model", "summarize"]
    );
    let summary = &plan.steps[3];
    assert_eq!(
        summary.dependencies,
        vec![plan.steps[1].id.clone(), plan.steps[2].id.clone()]
    );
}

#[test]
fn plan_builder_rejects_invalid_definitions_before_building() {
    let cases = [
        ("name: ''\nsteps: [{name: a, type: action}]", "name"),
        ("name: p\nsteps: []", "at least one step"),
        ("name: p\nsteps: [{name: a, type: teleport}]", "teleport"),
        (
            "name: p\nsteps: [{name: a, type: action, dependsOn: [b]}]",
            "unknown step",
        ),
        (
            "name: p\nsteps: [{name: a, type: action}, {name: a, type: action}]",
            "more than once",
        ),
    ];
    for (raw, expected) in cases {
        let definition = PlanDefinition::from_yaml_str(raw).expect("yaml");
        let err = build_plan(&definition, 1_000).expect_err(raw);
        match err {
            PlanError::InvalidPlanDefinition(message) => {
                assert!(message.contains(expected), "{message} should mention {expected}")
            }
            other => panic!("unexpected error for {raw}: {other}"),
        }
    }
}

#[test]
fn plan_builder_rejects_cyclic_definition() {
    let definition = PlanDefinition::from_yaml_str(
        r#"
name: loop
steps:
  - { key: a, name: a, type: action, dependsOn: [b] }
  - { key: b, name: b, type: action, dependsOn: [a] }
"#,
    )
    .expect("definition");
    let err = build_plan(&definition, 1_000).expect_err("cycle");
    assert!(matches!(err, PlanError::CircularDependency { .. }));
}

#[test]
fn plan_builder_loads_definition_from_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("plan.yaml");
    std::fs::write(&path, "name: from-file\nsteps:\n  - {name: only, type: checkpoint}\n")
        .expect("write");
    let definition = PlanDefinition::from_yaml_path(&path).expect("load");
    let plan = build_plan(&definition, 1_000).expect("plan");
    assert_eq!(plan.name, "from-file");
    assert_eq!(plan.steps[0].step_type, StepType::Checkpoint);

    let missing = PlanDefinition::from_yaml_path(&temp.path().join("nope.yaml"));
    assert!(matches!(missing, Err(PlanError::Read { .. })));
}
