//! Pluggable step executors.
//!
//! Each workflow step carries a `type` tag; the registry maps that tag to
//! the executor that performs the actual work. The built-in executors are
//! placeholders that return simulated result maps until the adjacent
//! services (blueprint generation, deployment, approvals, notifications)
//! are wired in.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque key/value parameters passed to an executor.
pub type StepParameters = HashMap<String, serde_json::Value>;

/// A handler registered per step type that performs the actual work.
///
/// Implementations return a result map on success or an error on failure;
/// retry and timeout handling happen in the coordinator, not here.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, parameters: &StepParameters) -> Result<serde_json::Value>;
}

/// Maps step `type` strings to executors.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in executors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("blueprint", Arc::new(BlueprintExecutor));
        registry.register("deploy", Arc::new(DeployExecutor));
        registry.register("validate", Arc::new(ValidateExecutor));
        registry.register("approve", Arc::new(ApproveExecutor));
        registry.register("notify", Arc::new(NotifyExecutor));
        registry
    }

    /// Register an executor for a step type, replacing any existing one.
    pub fn register(&mut self, step_type: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(step_type.into(), executor);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(step_type).cloned()
    }

    /// Registered step types.
    pub fn step_types(&self) -> Vec<&str> {
        self.executors.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates an infrastructure blueprint.
pub struct BlueprintExecutor;

#[async_trait]
impl StepExecutor for BlueprintExecutor {
    async fn execute(&self, _parameters: &StepParameters) -> Result<serde_json::Value> {
        let blueprint_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("generated blueprint {}", blueprint_id);
        Ok(serde_json::json!({
            "status": "success",
            "blueprint_id": blueprint_id,
        }))
    }
}

/// Rolls out a deployment.
pub struct DeployExecutor;

#[async_trait]
impl StepExecutor for DeployExecutor {
    async fn execute(&self, _parameters: &StepParameters) -> Result<serde_json::Value> {
        let deployment_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("started deployment {}", deployment_id);
        Ok(serde_json::json!({
            "status": "success",
            "deployment_id": deployment_id,
        }))
    }
}

/// Runs post-deployment validation checks.
pub struct ValidateExecutor;

#[async_trait]
impl StepExecutor for ValidateExecutor {
    async fn execute(&self, _parameters: &StepParameters) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "status": "success",
            "validation_result": "passed",
        }))
    }
}

/// Records an approval decision. Auto-approves until the approval service
/// is integrated.
pub struct ApproveExecutor;

#[async_trait]
impl StepExecutor for ApproveExecutor {
    async fn execute(&self, _parameters: &StepParameters) -> Result<serde_json::Value> {
        tracing::info!("auto-approving step (no approval service configured)");
        Ok(serde_json::json!({
            "status": "success",
            "approved_by": "system",
        }))
    }
}

/// Sends a notification to the configured channel.
pub struct NotifyExecutor;

#[async_trait]
impl StepExecutor for NotifyExecutor {
    async fn execute(&self, parameters: &StepParameters) -> Result<serde_json::Value> {
        let channel = parameters
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or("#general");
        let message = parameters
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Workflow notification");

        tracing::info!("sending notification to {}: {}", channel, message);
        Ok(serde_json::json!({
            "status": "success",
            "channel": channel,
            "message": message,
            "notification_sent": true,
        }))
    }
}
