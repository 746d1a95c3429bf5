use crate::error::{EngineError, EngineResult};
use crate::types::{StepId, Workflow, WorkflowId, WorkflowStatus, WorkflowStep};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory registry of workflow definitions and their live state.
///
/// All mutations for a given workflow are serialized through the single
/// mutex, so the execution loop and external pause/cancel requests never
/// interleave mid-update. Reads return snapshot clones and never hand out
/// references into the guarded map.
#[derive(Clone)]
pub struct WorkflowStore {
    workflows: Arc<Mutex<HashMap<WorkflowId, Workflow>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert a new workflow. Ids are generated by the caller-facing layer,
    /// so a collision is caller error.
    pub fn insert(&self, workflow: Workflow) -> EngineResult<()> {
        let mut workflows = self.workflows.lock().unwrap();
        if workflows.contains_key(&workflow.id) {
            return Err(EngineError::AlreadyExists(workflow.id));
        }
        workflows.insert(workflow.id, workflow);
        Ok(())
    }

    /// Snapshot of a workflow and its per-step state.
    pub fn get(&self, id: WorkflowId) -> EngineResult<Workflow> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Snapshots of all registered workflows.
    pub fn list(&self) -> Vec<Workflow> {
        self.workflows.lock().unwrap().values().cloned().collect()
    }

    /// Current status of a workflow.
    pub fn status(&self, id: WorkflowId) -> EngineResult<WorkflowStatus> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .map(|w| w.status)
            .ok_or(EngineError::NotFound(id))
    }

    /// Apply a mutation to a workflow while holding the lock. The closure's
    /// return value is passed through.
    pub fn update<T>(
        &self,
        id: WorkflowId,
        mutate: impl FnOnce(&mut Workflow) -> T,
    ) -> EngineResult<T> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        Ok(mutate(workflow))
    }

    /// Apply a mutation to a single step of a workflow.
    pub fn update_step(
        &self,
        id: WorkflowId,
        step_id: &StepId,
        mutate: impl FnOnce(&mut WorkflowStep),
    ) -> EngineResult<()> {
        self.update(id, |workflow| {
            if let Some(step) = workflow.steps.iter_mut().find(|s| s.id == *step_id) {
                mutate(step);
            }
        })
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepStatus;
    use chrono::Utc;

    fn sample_workflow() -> Workflow {
        Workflow {
            id: WorkflowId::new(),
            name: "test".to_string(),
            description: "a test workflow".to_string(),
            steps: vec![WorkflowStep {
                id: StepId::new("a"),
                name: "Step A".to_string(),
                step_type: "notify".to_string(),
                depends_on: vec![],
                parameters: Default::default(),
                timeout_secs: 300,
                retry_count: 3,
                status: StepStatus::Pending,
                started_at: None,
                completed_at: None,
                error_message: None,
            }],
            status: WorkflowStatus::Pending,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            metadata: Default::default(),
            policies: vec![],
            error_message: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = WorkflowStore::new();
        let workflow = sample_workflow();
        let id = workflow.id;

        store.insert(workflow).unwrap();

        let snapshot = store.get(id).unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.status, WorkflowStatus::Pending);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = WorkflowStore::new();
        let workflow = sample_workflow();

        store.insert(workflow.clone()).unwrap();
        let err = store.insert(workflow).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
    }

    #[test]
    fn test_get_unknown_fails() {
        let store = WorkflowStore::new();
        let err = store.get(WorkflowId::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_update_step() {
        let store = WorkflowStore::new();
        let workflow = sample_workflow();
        let id = workflow.id;
        store.insert(workflow).unwrap();

        store
            .update_step(id, &StepId::new("a"), |step| {
                step.status = StepStatus::Completed;
            })
            .unwrap();

        let snapshot = store.get(id).unwrap();
        assert_eq!(snapshot.steps[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_snapshots_do_not_alias_store_state() {
        let store = WorkflowStore::new();
        let workflow = sample_workflow();
        let id = workflow.id;
        store.insert(workflow).unwrap();

        let mut snapshot = store.get(id).unwrap();
        snapshot.status = WorkflowStatus::Cancelled;

        assert_eq!(store.status(id).unwrap(), WorkflowStatus::Pending);
    }
}
