use crate::plan::Step;
use serde_json::Value;

/// Performs the work a step declares (model call, browser action, shell, ...).
///
/// Implementations live outside this crate. Steps of one batch are executed
/// concurrently on scoped threads, hence `Sync`. A returned error is recorded
/// on the step; it is not retried here.
pub trait StepExecutor: Sync {
    fn execute(&self, step: &Step) -> Result<Value, String>;
}

impl<F> StepExecutor for F
where
    F: Fn(&Step) -> Result<Value, String> + Sync,
{
    fn execute(&self, step: &Step) -> Result<Value, String> {
        self(step)
    }
}
