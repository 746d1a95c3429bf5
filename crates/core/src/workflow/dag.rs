use crate::error::{EngineError, EngineResult};
use crate::types::{StepId, StepStatus, WorkflowStep};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// DAG view of a workflow's `depends_on` relation
pub struct DependencyGraph {
    graph: DiGraph<StepId, ()>,
    step_indices: HashMap<StepId, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a workflow's steps, rejecting unknown
    /// dependencies and cycles.
    pub fn build(steps: &[WorkflowStep]) -> EngineResult<Self> {
        let mut graph = DiGraph::new();
        let mut step_indices = HashMap::new();

        for step in steps {
            let node = graph.add_node(step.id.clone());
            step_indices.insert(step.id.clone(), node);
        }

        // Edge from dependency to dependent (dep -> step)
        for step in steps {
            let step_idx = step_indices[&step.id];
            for dep in &step.depends_on {
                let dep_idx =
                    step_indices
                        .get(dep)
                        .copied()
                        .ok_or_else(|| EngineError::UnknownDependency {
                            step_id: step.id.clone(),
                            dependency: dep.clone(),
                        })?;
                graph.add_edge(dep_idx, step_idx, ());
            }
        }

        // Toposort doubles as cycle detection and names a cycle member
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(EngineError::CircularDependency {
                step_id: graph[cycle.node_id()].clone(),
            });
        }

        Ok(Self {
            graph,
            step_indices,
        })
    }

    /// Direct dependencies of a step.
    pub fn dependencies(&self, step_id: &StepId) -> Vec<StepId> {
        self.step_indices
            .get(step_id)
            .map(|&node| {
                self.graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validate that `depends_on` references resolve within the workflow and
/// the dependency relation is acyclic.
pub fn validate_dependencies(steps: &[WorkflowStep]) -> EngineResult<()> {
    DependencyGraph::build(steps).map(|_| ())
}

/// All PENDING steps whose full dependency set is contained in
/// `completed`. The returned steps are eligible simultaneously and carry
/// no ordering among themselves; the coordinator dispatches them as one
/// parallel batch.
pub fn ready_steps<'a>(
    steps: &'a [WorkflowStep],
    completed: &HashSet<StepId>,
) -> Vec<&'a WorkflowStep> {
    steps
        .iter()
        .filter(|step| {
            step.status == StepStatus::Pending
                && step.depends_on.iter().all(|dep| completed.contains(dep))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: StepId::new(id),
            name: id.to_uppercase(),
            step_type: "validate".to_string(),
            depends_on: deps.iter().map(|d| StepId::new(*d)).collect(),
            parameters: Default::default(),
            timeout_secs: 300,
            retry_count: 3,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn test_linear_graph_validates() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        assert!(validate_dependencies(&steps).is_ok());

        let graph = DependencyGraph::build(&steps).unwrap();
        assert_eq!(graph.dependencies(&StepId::new("c")), vec![StepId::new("b")]);
    }

    #[test]
    fn test_two_step_cycle_rejected() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        let err = validate_dependencies(&steps).unwrap_err();
        assert!(matches!(err, EngineError::CircularDependency { .. }));
    }

    #[test]
    fn test_three_step_cycle_rejected() {
        // a -> b -> c -> a
        let steps = vec![step("a", &["b"]), step("b", &["c"]), step("c", &["a"])];
        let err = validate_dependencies(&steps).unwrap_err();
        match err {
            EngineError::CircularDependency { step_id } => {
                assert!(["a", "b", "c"].contains(&step_id.0.as_str()));
            }
            other => panic!("expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_rejected() {
        let steps = vec![step("a", &["a"])];
        assert!(matches!(
            validate_dependencies(&steps).unwrap_err(),
            EngineError::CircularDependency { .. }
        ));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let steps = vec![step("a", &[]), step("b", &["missing"])];
        let err = validate_dependencies(&steps).unwrap_err();
        match err {
            EngineError::UnknownDependency {
                step_id,
                dependency,
            } => {
                assert_eq!(step_id, StepId::new("b"));
                assert_eq!(dependency, StepId::new("missing"));
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_ready_steps_respects_dependencies() {
        let steps = vec![
            step("a", &[]),
            step("b", &[]),
            step("c", &["a", "b"]),
            step("d", &["c"]),
        ];

        let none_done = HashSet::new();
        let ready: Vec<_> = ready_steps(&steps, &none_done)
            .iter()
            .map(|s| s.id.0.as_str())
            .collect();
        assert_eq!(ready, vec!["a", "b"]);

        let mut ab_done = HashSet::new();
        ab_done.insert(StepId::new("a"));
        ab_done.insert(StepId::new("b"));
        let ready: Vec<_> = ready_steps(&steps, &ab_done)
            .iter()
            .map(|s| s.id.0.as_str())
            .collect();
        assert_eq!(ready, vec!["c"]);
    }

    #[test]
    fn test_ready_steps_is_idempotent() {
        let steps = vec![step("a", &[]), step("b", &["a"])];
        let completed = HashSet::new();

        let first: Vec<_> = ready_steps(&steps, &completed)
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let second: Vec<_> = ready_steps(&steps, &completed)
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ready_steps_skips_non_pending() {
        let mut steps = vec![step("a", &[]), step("b", &[])];
        steps[0].status = StepStatus::Completed;

        let ready = ready_steps(&steps, &HashSet::new());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, StepId::new("b"));
    }
}
