use crate::error::{EngineResult, StepError};
use crate::executors::ExecutorRegistry;
use crate::store::WorkflowStore;
use crate::types::{StepStatus, WorkflowId, WorkflowStep};
use crate::workflow::executor::ExecutorConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Drives a single step to a terminal status: executor lookup, per-attempt
/// timeout, retry with exponential backoff, and store updates.
pub struct StepRunner {
    registry: Arc<ExecutorRegistry>,
    config: ExecutorConfig,
}

impl StepRunner {
    pub fn new(registry: Arc<ExecutorRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Execute one step and record its terminal status. The caller has
    /// already claimed the step (marked it RUNNING); an `Err` means the
    /// workflow vanished from the store, not a step failure.
    pub async fn run(
        &self,
        store: &WorkflowStore,
        workflow_id: WorkflowId,
        step: &WorkflowStep,
    ) -> EngineResult<StepStatus> {
        // Unknown step types fail the step immediately, with no attempts.
        let Some(executor) = self.registry.get(&step.step_type) else {
            let error = StepError::UnknownStepType(step.step_type.clone());
            tracing::error!("step {} failed: {}", step.id, error);
            store.update_step(workflow_id, &step.id, |s| {
                s.status = StepStatus::Failed;
                s.completed_at = Some(Utc::now());
                s.error_message = Some(error.to_string());
            })?;
            return Ok(StepStatus::Failed);
        };

        tracing::info!("executing step {} ({})", step.id, step.step_type);

        match self.attempt_with_retries(executor.as_ref(), step).await {
            Ok(result) => {
                tracing::debug!("step {} result: {}", step.id, result);
                store.update_step(workflow_id, &step.id, |s| {
                    s.status = StepStatus::Completed;
                    s.completed_at = Some(Utc::now());
                })?;
                tracing::info!("step {} completed", step.id);
                Ok(StepStatus::Completed)
            }
            Err(error) => {
                tracing::error!("step {} failed: {}", step.id, error);
                store.update_step(workflow_id, &step.id, |s| {
                    s.status = StepStatus::Failed;
                    s.completed_at = Some(Utc::now());
                    s.error_message = Some(error.to_string());
                })?;
                Ok(StepStatus::Failed)
            }
        }
    }

    /// Up to `retry_count + 1` attempts, each bounded by the step's
    /// timeout. Attempt k (0-indexed) waits base * 2^k before the next try.
    async fn attempt_with_retries(
        &self,
        executor: &dyn crate::executors::StepExecutor,
        step: &WorkflowStep,
    ) -> Result<serde_json::Value, StepError> {
        let attempts = step.retry_count + 1;
        let mut attempt = 0u32;

        loop {
            let outcome = timeout(
                Duration::from_secs(step.timeout_secs),
                executor.execute(&step.parameters),
            )
            .await;

            let error = match outcome {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => StepError::Execution(e),
                Err(_) => StepError::Timeout(step.timeout_secs),
            };

            tracing::warn!(
                "step {} attempt {}/{} failed: {}",
                step.id,
                attempt + 1,
                attempts,
                error
            );

            if attempt + 1 >= attempts {
                return Err(error);
            }

            let backoff = self.config.retry_base_delay * 2u32.pow(attempt);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
