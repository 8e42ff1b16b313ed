use serde_json::{Map, Value};
use std::fs;
use stepgraph::checkpoint::CheckpointReason;
use stepgraph::config::{
    load_settings, open_checkpoint_store, plan_from_settings, recovery_manager_from_settings,
    runner_from_settings, save_settings, ConfigError, EngineSettings, StoreBackend, StoreConfig,
};
use stepgraph::plan::{
    add_step, create_plan, PlanDefinition, PlanError, Step, StepInput, StepType,
};
use stepgraph::recovery::RetentionPolicy;

#[test]
fn config_settings_module_applies_defaults() {
    let settings = EngineSettings::from_yaml_str("{}").expect("parse");
    assert_eq!(settings, EngineSettings::default());
    assert_eq!(settings.store.backend, StoreBackend::Memory);
    assert_eq!(settings.checkpoint_every_batches, 1);
    assert!(settings.retention.is_noop());
    assert_eq!(settings.plan_defaults.max_steps, 100);
    assert_eq!(settings.plan_defaults.timeout_ms, 300_000);
    settings.validate().expect("defaults are valid");
}

#[test]
fn config_settings_module_parses_full_document() {
    let settings = EngineSettings::from_yaml_str(
        r#"
store:
  backend: sqlite
  path: /var/lib/stepgraph/checkpoints.db
retention:
  keep: 5
  max_age_ms: 86400000
checkpoint_every_batches: 3
event_log: /var/log/stepgraph/events.log
plan_defaults:
  max_steps: 40
  retry_attempts: 1
"#,
    )
    .expect("parse");

    assert_eq!(settings.store.backend, StoreBackend::Sqlite);
    assert_eq!(
        settings.retention,
        RetentionPolicy {
            max_age_ms: Some(86_400_000),
            keep: Some(5),
        }
    );
    assert_eq!(settings.checkpoint_every_batches, 3);
    let plan_config = settings.plan_defaults.to_plan_config();
    assert_eq!(plan_config.max_steps, 40);
    assert_eq!(plan_config.retry_attempts, 1);
    assert_eq!(plan_config.retry_delay_ms, 1_000);
    settings.validate().expect("valid");
}

#[test]
fn config_settings_module_rejects_unknown_fields() {
    assert!(EngineSettings::from_yaml_str("stor: {}").is_err());
    assert!(EngineSettings::from_yaml_str("retention: {keep_last: 2}").is_err());
    assert!(EngineSettings::from_yaml_str("store: {backend: redis}").is_err());
}

#[test]
fn config_settings_module_validation_errors() {
    let cases = [
        ("store: {backend: file}", "store.path"),
        ("store: {backend: sqlite, path: relative.db}", "absolute"),
        ("retention: {keep: 0}", "retention.keep"),
        ("retention: {max_age_ms: 0}", "retention.max_age_ms"),
        ("checkpoint_every_batches: 0", "checkpoint_every_batches"),
        ("event_log: logs/events.log", "event_log"),
        ("plan_defaults: {max_steps: 0}", "plan_defaults.max_steps"),
    ];
    for (raw, expected) in cases {
        let settings = EngineSettings::from_yaml_str(raw).expect(raw);
        match settings.validate() {
            Err(ConfigError::Settings(message)) => {
                assert!(message.contains(expected), "{message} should mention {expected}")
            }
            other => panic!("unexpected validation result for {raw}: {other:?}"),
        }
    }
}

#[test]
fn config_settings_module_save_and_load_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config/engine.yaml");
    let settings = EngineSettings {
        store: StoreConfig {
            backend: StoreBackend::File,
            path: Some(temp.path().join("checkpoints")),
        },
        retention: RetentionPolicy::keep_latest(3),
        checkpoint_every_batches: 2,
        event_log: Some(temp.path().join("events.log")),
        ..EngineSettings::default()
    };

    save_settings(&path, &settings).expect("save");
    assert_eq!(load_settings(&path).expect("load"), settings);
}

#[test]
fn config_settings_module_refuses_to_save_invalid_settings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("engine.yaml");
    let settings = EngineSettings {
        checkpoint_every_batches: 0,
        ..EngineSettings::default()
    };
    assert!(matches!(
        save_settings(&path, &settings),
        Err(ConfigError::Settings(_))
    ));
    assert!(!path.exists());
}

#[test]
fn config_settings_module_load_reports_read_and_parse_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing.yaml");
    assert!(matches!(
        load_settings(&missing),
        Err(ConfigError::Read { .. })
    ));

    let broken = temp.path().join("broken.yaml");
    fs::write(&broken, "store: [").expect("write");
    assert!(matches!(
        load_settings(&broken),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn config_settings_module_opens_each_backend() {
    let temp = tempfile::tempdir().expect("tempdir");
    let configs = [
        StoreConfig::default(),
        StoreConfig {
            backend: StoreBackend::File,
            path: Some(temp.path().join("files")),
        },
        StoreConfig {
            backend: StoreBackend::Sqlite,
            path: Some(temp.path().join("db/checkpoints.db")),
        },
    ];
    for config in configs {
        let store = open_checkpoint_store(&config).expect("open");
        store.save("ckpt-1", "value").expect("save");
        assert_eq!(
            store.load("ckpt-1").expect("load").as_deref(),
            Some("value"),
            "{}",
            config.backend
        );
    }
}

#[test]
fn config_settings_module_builds_recovery_manager() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("events.log");
    let settings = EngineSettings {
        store: StoreConfig {
            backend: StoreBackend::Sqlite,
            path: Some(temp.path().join("checkpoints.db")),
        },
        event_log: Some(log_path.clone()),
        ..EngineSettings::default()
    };
    let manager = recovery_manager_from_settings(&settings).expect("manager");
    assert_eq!(manager.event_log(), Some(log_path.as_path()));

    let mut plan = create_plan(
        "configured",
        "",
        settings.plan_defaults.to_plan_config(),
        1_000,
    )
    .expect("plan");
    let step = add_step(&mut plan, StepInput::new("a", StepType::Action), 1_000)
        .expect("step")
        .id
        .clone();
    let checkpoint = manager
        .create_recovery_point(&plan, &[step], CheckpointReason::Periodic, Map::new(), 2_000)
        .expect("checkpoint");

    let reopened = recovery_manager_from_settings(&settings).expect("reopen");
    assert_eq!(
        reopened
            .get_latest_checkpoint(&plan.id)
            .expect("latest")
            .map(|latest| latest.id().clone()),
        Some(checkpoint.id().clone())
    );
    assert!(log_path.is_file());
}

#[test]
fn config_settings_module_builds_runner_with_interval_and_retention() {
    let temp = tempfile::tempdir().expect("tempdir");
    let definition = PlanDefinition::from_yaml_str(
        r#"
name: chain
steps:
  - key: a
    name: a
    type: action
  - key: b
    name: b
    type: action
    dependsOn: [a]
  - key: c
    name: c
    type: action
    dependsOn: [b]
"#,
    )
    .expect("definition");
    let executor = |_: &Step| -> Result<Value, String> { Ok(Value::Null) };

    let spaced = EngineSettings {
        store: StoreConfig {
            backend: StoreBackend::File,
            path: Some(temp.path().join("spaced")),
        },
        checkpoint_every_batches: 2,
        ..EngineSettings::default()
    };
    let runner = runner_from_settings(&spaced).expect("runner");
    let mut plan = plan_from_settings(&spaced, &definition, 1_000).expect("plan");
    runner.run(&mut plan, &executor).expect("run");
    let reasons = runner
        .manager()
        .get_previous_checkpoints(&plan.id)
        .expect("history")
        .iter()
        .map(|checkpoint| checkpoint.reason().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(reasons, vec!["periodic", "completed"]);

    let trimmed = EngineSettings {
        store: StoreConfig {
            backend: StoreBackend::File,
            path: Some(temp.path().join("trimmed")),
        },
        retention: RetentionPolicy::keep_latest(1),
        ..EngineSettings::default()
    };
    let runner = runner_from_settings(&trimmed).expect("runner");
    let mut plan = plan_from_settings(&trimmed, &definition, 1_000).expect("plan");
    let report = runner.run(&mut plan, &executor).expect("run");
    let history = runner
        .manager()
        .get_previous_checkpoints(&plan.id)
        .expect("history");
    assert_eq!(history, vec![report.checkpoint]);
}

#[test]
fn config_settings_module_plan_defaults_apply_to_definitions_without_config() {
    let settings = EngineSettings::from_yaml_str(
        "plan_defaults: {max_steps: 2, timeout_ms: 5000, retry_attempts: 0}",
    )
    .expect("parse");
    let bare = PlanDefinition::from_yaml_str(
        "name: bare\nsteps:\n  - {key: a, name: a, type: action}\n",
    )
    .expect("bare");
    let plan = plan_from_settings(&settings, &bare, 1_000).expect("plan");
    assert_eq!(plan.config, settings.plan_defaults.to_plan_config());
    assert_eq!(plan.config.max_steps, 2);
    assert_eq!(plan.config.timeout_ms, 5_000);

    let crowded = PlanDefinition::from_yaml_str(
        r#"
name: crowded
steps:
  - {key: a, name: a, type: action}
  - {key: b, name: b, type: action}
  - {key: c, name: c, type: action}
"#,
    )
    .expect("crowded");
    assert!(matches!(
        plan_from_settings(&settings, &crowded, 1_000),
        Err(PlanError::PlanCapacityExceeded { .. })
    ));

    let explicit = PlanDefinition::from_yaml_str(
        "name: explicit\nconfig: {maxSteps: 7}\nsteps:\n  - {key: a, name: a, type: action}\n",
    )
    .expect("explicit");
    let plan = plan_from_settings(&settings, &explicit, 1_000).expect("plan");
    assert_eq!(plan.config.max_steps, 7);
}
