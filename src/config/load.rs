use super::{ConfigError, EngineSettings, StoreBackend, StoreConfig};
use crate::checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
};
use crate::orchestration::PlanRunner;
use crate::plan::{build_plan_with_defaults, Plan, PlanDefinition, PlanError};
use crate::recovery::RecoveryManager;
use std::path::Path;
use std::sync::Arc;

pub fn load_settings(path: &Path) -> Result<EngineSettings, ConfigError> {
    let settings = EngineSettings::from_path(path)?;
    settings.validate()?;
    Ok(settings)
}

pub fn open_checkpoint_store(
    config: &StoreConfig,
) -> Result<Arc<dyn CheckpointStore>, ConfigError> {
    let store: Arc<dyn CheckpointStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
        StoreBackend::File => Arc::new(FileCheckpointStore::open(required_path(config)?)?),
        StoreBackend::Sqlite => Arc::new(SqliteCheckpointStore::open(required_path(config)?)?),
    };
    Ok(store)
}

pub fn recovery_manager_from_settings(
    settings: &EngineSettings,
) -> Result<RecoveryManager, ConfigError> {
    let store = open_checkpoint_store(&settings.store)?;
    let manager = RecoveryManager::new(store);
    Ok(match settings.event_log.as_ref() {
        Some(path) => manager.with_event_log(path),
        None => manager,
    })
}

/// Runner over the configured store with the configured checkpoint interval
/// and retention.
pub fn runner_from_settings(settings: &EngineSettings) -> Result<PlanRunner, ConfigError> {
    let runner = PlanRunner::new(recovery_manager_from_settings(settings)?)
        .with_checkpoint_every_batches(settings.checkpoint_every_batches);
    Ok(if settings.retention.is_noop() {
        runner
    } else {
        runner.with_retention(settings.retention)
    })
}

/// Builds `definition`, falling back to `plan_defaults` when it has no `config`.
pub fn plan_from_settings(
    settings: &EngineSettings,
    definition: &PlanDefinition,
    now: i64,
) -> Result<Plan, PlanError> {
    build_plan_with_defaults(definition, settings.plan_defaults.to_plan_config(), now)
}

fn required_path(config: &StoreConfig) -> Result<&Path, ConfigError> {
    config.path.as_deref().ok_or_else(|| {
        ConfigError::Settings(format!(
            "`store.path` is required for the `{}` backend",
            config.backend
        ))
    })
}
