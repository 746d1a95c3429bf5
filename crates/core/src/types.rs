use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a policy rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Caller-facing definition of a single step, as submitted to
/// `create_workflow`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: StepId,
    pub name: String,
    /// Tag selecting the executor registered for this step
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retry_count() -> u32 {
    3
}

/// A step together with its runtime state. Steps are owned by their
/// workflow and transition only under the execution coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub name: String,
    pub step_type: String,
    pub depends_on: Vec<StepId>,
    pub parameters: HashMap<String, serde_json::Value>,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<StepSpec> for WorkflowStep {
    fn from(spec: StepSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            step_type: spec.step_type,
            depends_on: spec.depends_on,
            parameters: spec.parameters,
            timeout_secs: spec.timeout_secs,
            retry_count: spec.retry_count,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// A named DAG of steps with an overall lifecycle status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub policies: Vec<PolicyId>,
    /// Failure reason when the workflow itself fails (step failure, deadlock)
    pub error_message: Option<String>,
}

impl Workflow {
    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == *id)
    }
}

/// Action taken when a policy rule's condition matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
    Warn,
    RequireApproval,
}

/// Severity attached to a policy rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Condition expression evaluated against a workflow at creation time.
///
/// Evaluation is fail-open: a missing metadata field or a value of the
/// wrong type means the condition does not trigger. Hard enforcement must
/// not be encoded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// metadata[field] equals the given value
    MetadataEquals {
        field: String,
        value: serde_json::Value,
    },
    /// metadata[field], read as a number, exceeds the threshold
    MetadataExceeds { field: String, threshold: f64 },
    /// any step's `tags` parameter (array of strings) contains the tag
    AnyStepTagged { tag: String },
}

/// A named condition/action pair checked against workflows at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: PolicyId,
    pub name: String,
    pub description: String,
    pub condition: PolicyCondition,
    pub action: PolicyAction,
    pub severity: PolicySeverity,
    pub tags: Vec<String>,
    pub enabled: bool,
}

/// A triggered policy rule, reported from workflow creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule_id: PolicyId,
    pub rule_name: String,
    pub action: PolicyAction,
    pub severity: PolicySeverity,
    pub message: String,
}
