use crate::error::EngineResult;
use crate::executors::ExecutorRegistry;
use crate::store::WorkflowStore;
use crate::types::{StepId, StepStatus, WorkflowId, WorkflowStatus};
use crate::workflow::dag::ready_steps;
use crate::workflow::step_executor::StepRunner;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Tuning knobs for step execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base delay for exponential backoff between step attempts; attempt k
    /// (0-indexed) waits base * 2^k before the next try.
    pub retry_base_delay: Duration,
    /// How long the loop waits before re-checking when steps are still
    /// in flight.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Drives a workflow from RUNNING to a terminal state by repeatedly
/// dispatching ready-step batches.
///
/// Batches execute in strict sequence: the next batch is not computed
/// until every unit of the current batch has settled. Pause and cancel
/// are observed between batches, never mid-attempt.
pub struct WorkflowExecutor {
    store: WorkflowStore,
    runner: Arc<StepRunner>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        store: WorkflowStore,
        registry: Arc<ExecutorRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        let runner = Arc::new(StepRunner::new(registry, config.clone()));
        Self {
            store,
            runner,
            config,
        }
    }

    /// Run the execution loop for one workflow. Errors are terminal for
    /// the loop and recorded on the workflow.
    pub async fn run(&self, workflow_id: WorkflowId) {
        if let Err(e) = self.run_loop(workflow_id).await {
            tracing::error!("workflow {} execution error: {}", workflow_id, e);
            let _ = self.store.update(workflow_id, |workflow| {
                if !workflow.status.is_terminal() {
                    workflow.status = WorkflowStatus::Failed;
                    workflow.error_message = Some(e.to_string());
                }
            });
        }
    }

    async fn run_loop(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        loop {
            let snapshot = self.store.get(workflow_id)?;

            // Pause and cancel are honored here, before the next batch.
            if snapshot.status != WorkflowStatus::Running {
                tracing::info!(
                    "workflow {} execution stopped (status {:?})",
                    workflow_id,
                    snapshot.status
                );
                return Ok(());
            }

            // A failed step fails the whole workflow; no further batches.
            if let Some(failed) = snapshot
                .steps
                .iter()
                .find(|s| s.status == StepStatus::Failed)
            {
                let reason = format!("step '{}' failed", failed.id);
                tracing::error!("workflow {} failed: {}", workflow_id, reason);
                self.finalize(workflow_id, WorkflowStatus::Failed, Some(reason))?;
                return Ok(());
            }

            let completed: HashSet<StepId> = snapshot
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .map(|s| s.id.clone())
                .collect();

            if completed.len() == snapshot.steps.len() {
                tracing::info!("workflow {} completed", workflow_id);
                self.finalize(workflow_id, WorkflowStatus::Completed, None)?;
                return Ok(());
            }

            let ready: Vec<_> = ready_steps(&snapshot.steps, &completed)
                .into_iter()
                .cloned()
                .collect();

            if ready.is_empty() {
                if snapshot
                    .steps
                    .iter()
                    .any(|s| s.status == StepStatus::Running)
                {
                    // Steps still settling; check again shortly.
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }

                // Validation passed but nothing can proceed.
                let error = crate::error::EngineError::Deadlock(workflow_id);
                tracing::error!("{}", error);
                self.finalize(workflow_id, WorkflowStatus::Failed, Some(error.to_string()))?;
                return Ok(());
            }

            self.dispatch_batch(workflow_id, ready).await?;
        }
    }

    /// Launch all ready steps concurrently and wait for every unit to
    /// settle. A failing or panicking step must not disturb its siblings.
    async fn dispatch_batch(
        &self,
        workflow_id: WorkflowId,
        batch: Vec<crate::types::WorkflowStep>,
    ) -> EngineResult<()> {
        // Claim the batch under the store lock: only steps still PENDING
        // are marked RUNNING and dispatched, so a concurrently resumed
        // loop can never execute the same step twice.
        let claimed = self.store.update(workflow_id, |workflow| {
            let mut claimed = Vec::new();
            for step in &batch {
                if let Some(s) = workflow.steps.iter_mut().find(|s| s.id == step.id) {
                    if s.status == StepStatus::Pending {
                        s.status = StepStatus::Running;
                        s.started_at = Some(Utc::now());
                        claimed.push(s.clone());
                    }
                }
            }
            claimed
        })?;

        tracing::debug!(
            "workflow {} dispatching batch of {} step(s)",
            workflow_id,
            claimed.len()
        );

        let batch_ids: Vec<StepId> = claimed.iter().map(|s| s.id.clone()).collect();
        let mut tasks = JoinSet::new();

        for step in claimed {
            let runner = self.runner.clone();
            let store = self.store.clone();
            tasks.spawn(async move {
                let step_id = step.id.clone();
                (step_id, runner.run(&store, workflow_id, &step).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((step_id, Ok(status))) => {
                    tracing::debug!("step {} settled as {:?}", step_id, status);
                }
                Ok((step_id, Err(e))) => {
                    tracing::error!("step {} could not record its outcome: {}", step_id, e);
                }
                Err(join_error) => {
                    tracing::error!("step task panicked: {}", join_error);
                }
            }
        }

        // A panicked task leaves its step RUNNING with no owner; settle it
        // so the loop cannot stall on it.
        for step_id in batch_ids {
            self.store.update_step(workflow_id, &step_id, |step| {
                if step.status == StepStatus::Running {
                    step.status = StepStatus::Failed;
                    step.completed_at = Some(Utc::now());
                    step.error_message = Some("step task aborted unexpectedly".to_string());
                }
            })?;
        }

        Ok(())
    }

    /// Move the workflow to a terminal status unless an external
    /// transition (pause, cancel) won the race.
    fn finalize(
        &self,
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        error_message: Option<String>,
    ) -> EngineResult<()> {
        self.store.update(workflow_id, |workflow| {
            if workflow.status == WorkflowStatus::Running {
                workflow.status = status;
                workflow.error_message = error_message;
            }
        })
    }
}
