pub mod errors;
pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod time;

pub use errors::{EngineError, FailureClass};
pub use ids::{CheckpointId, PlanId, StepId};
