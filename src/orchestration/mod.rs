pub mod error;
pub mod executor;
pub mod runner;

pub use error::RunnerError;
pub use executor::StepExecutor;
pub use runner::{PlanRunner, RunOutcome, RunReport};
