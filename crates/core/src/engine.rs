//! Engine facade exposing the workflow lifecycle operations.
//!
//! The engine exclusively owns all workflow and policy state; callers get
//! snapshot clones and never mutate engine state directly.

use crate::error::{EngineError, EngineResult};
use crate::executors::ExecutorRegistry;
use crate::policy::PolicyEvaluator;
use crate::store::WorkflowStore;
use crate::template::{TemplateCatalog, WorkflowTemplate};
use crate::types::{
    PolicyRule, StepSpec, Workflow, WorkflowId, WorkflowStatus, WorkflowStep,
};
use crate::workflow::dag::validate_dependencies;
use crate::workflow::executor::{ExecutorConfig, WorkflowExecutor};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Workflow orchestration engine.
///
/// Workflows are created PENDING, started explicitly, and driven to a
/// terminal state by a background execution loop per workflow. The caller
/// never blocks on `start_workflow`; completion can be awaited through
/// [`OrchestrationEngine::wait_for_completion`].
pub struct OrchestrationEngine {
    store: WorkflowStore,
    evaluator: PolicyEvaluator,
    templates: TemplateCatalog,
    executor: Arc<WorkflowExecutor>,
    running: Arc<Mutex<HashMap<WorkflowId, JoinHandle<()>>>>,
}

impl OrchestrationEngine {
    /// Engine with the built-in executors, default policies and built-in
    /// templates.
    pub fn new() -> Self {
        Self::with_registry(ExecutorRegistry::with_builtins())
    }

    /// Engine with a caller-supplied executor registry.
    pub fn with_registry(registry: ExecutorRegistry) -> Self {
        Self::with_config(registry, ExecutorConfig::default())
    }

    /// Engine with a caller-supplied registry and execution tuning.
    pub fn with_config(registry: ExecutorRegistry, config: ExecutorConfig) -> Self {
        let store = WorkflowStore::new();
        let executor = Arc::new(WorkflowExecutor::new(
            store.clone(),
            Arc::new(registry),
            config,
        ));

        Self {
            store,
            evaluator: PolicyEvaluator::new(),
            templates: TemplateCatalog::with_builtins(),
            executor,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate and register a new workflow. Graph problems fail the call
    /// before anything is stored; policy violations are logged but do not
    /// block creation.
    pub fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<StepSpec>,
        created_by: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> EngineResult<WorkflowId> {
        let mut workflow = Workflow {
            id: WorkflowId::new(),
            name: name.into(),
            description: description.into(),
            steps: steps.into_iter().map(WorkflowStep::from).collect(),
            status: WorkflowStatus::Pending,
            created_by: created_by.into(),
            created_at: Utc::now(),
            metadata,
            policies: vec![],
            error_message: None,
        };

        validate_dependencies(&workflow.steps)?;

        let violations = self.evaluator.evaluate(&workflow);
        for violation in &violations {
            tracing::warn!(
                "policy violation for workflow {}: {}",
                workflow.id,
                violation.message
            );
        }
        workflow.policies = violations.iter().map(|v| v.rule_id.clone()).collect();

        let id = workflow.id;
        self.store.insert(workflow)?;

        tracing::info!("workflow created: {}", id);
        Ok(id)
    }

    /// Create a workflow from a registered template.
    pub fn instantiate_template(
        &self,
        template_name: &str,
        created_by: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> EngineResult<WorkflowId> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| EngineError::TemplateNotFound(template_name.to_string()))?;

        self.create_workflow(
            template.name.clone(),
            template.description.clone(),
            template.steps.clone(),
            created_by,
            metadata,
        )
    }

    /// Transition a PENDING workflow to RUNNING and launch its execution
    /// loop in the background.
    pub fn start_workflow(&self, id: WorkflowId) -> EngineResult<()> {
        let previous = self.store.update(id, |workflow| {
            let previous = workflow.status;
            if previous == WorkflowStatus::Pending {
                workflow.status = WorkflowStatus::Running;
            }
            previous
        })?;

        if previous != WorkflowStatus::Pending {
            return Err(EngineError::InvalidState {
                id,
                expected: WorkflowStatus::Pending,
                actual: previous,
            });
        }

        self.spawn_execution(id);
        tracing::info!("workflow started: {}", id);
        Ok(())
    }

    /// Pause a RUNNING workflow. The execution loop finishes the batch in
    /// flight and stops before dispatching another. Returns false from any
    /// other status.
    pub fn pause_workflow(&self, id: WorkflowId) -> EngineResult<bool> {
        let paused = self.store.update(id, |workflow| {
            if workflow.status == WorkflowStatus::Running {
                workflow.status = WorkflowStatus::Paused;
                true
            } else {
                false
            }
        })?;

        if paused {
            tracing::info!("workflow paused: {}", id);
        }
        Ok(paused)
    }

    /// Resume a PAUSED workflow; execution re-enters the loop with the
    /// current completed-step set. Returns false from any other status.
    pub fn resume_workflow(&self, id: WorkflowId) -> EngineResult<bool> {
        let resumed = self.store.update(id, |workflow| {
            if workflow.status == WorkflowStatus::Paused {
                workflow.status = WorkflowStatus::Running;
                true
            } else {
                false
            }
        })?;

        if resumed {
            self.spawn_execution(id);
            tracing::info!("workflow resumed: {}", id);
        }
        Ok(resumed)
    }

    /// Cancel a workflow from any non-terminal state. The execution loop
    /// observes the cancellation at its next batch selection; in-flight
    /// step attempts run to completion.
    pub fn cancel_workflow(&self, id: WorkflowId) -> EngineResult<bool> {
        let cancelled = self.store.update(id, |workflow| {
            if workflow.status.is_terminal() {
                false
            } else {
                workflow.status = WorkflowStatus::Cancelled;
                true
            }
        })?;

        if cancelled {
            tracing::info!("workflow cancelled: {}", id);
        }
        Ok(cancelled)
    }

    /// Snapshot of a workflow and its per-step status.
    pub fn get_workflow_status(&self, id: WorkflowId) -> EngineResult<Workflow> {
        self.store.get(id)
    }

    /// Snapshots of all registered workflows.
    pub fn list_workflows(&self) -> Vec<Workflow> {
        self.store.list()
    }

    /// Wait until the workflow's current execution loop settles, then
    /// return the final snapshot. Returns immediately when no loop is
    /// running.
    pub async fn wait_for_completion(&self, id: WorkflowId) -> EngineResult<Workflow> {
        // Taking the handle out keeps a second waiter from joining it.
        let handle = self.running.lock().unwrap().remove(&id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("execution loop for workflow {} panicked: {}", id, e);
            }
        }
        self.store.get(id)
    }

    /// The policy rules consulted at workflow creation.
    pub fn policy_rules(&self) -> Vec<&PolicyRule> {
        self.evaluator.rules()
    }

    /// The registered workflow templates.
    pub fn templates(&self) -> Vec<&WorkflowTemplate> {
        self.templates.list()
    }

    fn spawn_execution(&self, id: WorkflowId) {
        let executor = self.executor.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            executor.run(id).await;
            running.lock().unwrap().remove(&id);
        });

        self.running.lock().unwrap().insert(id, handle);
    }
}

impl Default for OrchestrationEngine {
    fn default() -> Self {
        Self::new()
    }
}
