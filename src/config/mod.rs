pub mod error;
pub mod load;
pub mod save;
pub mod settings;

pub use error::ConfigError;
pub use load::{
    load_settings, open_checkpoint_store, plan_from_settings, recovery_manager_from_settings,
    runner_from_settings,
};
pub use save::save_settings;
pub use settings::{EngineSettings, PlanDefaults, StoreBackend, StoreConfig};
