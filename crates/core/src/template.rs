// Predefined workflow templates for common orchestration flows

use crate::types::{StepId, StepSpec};
use std::collections::HashMap;

/// A reusable workflow definition that can be instantiated by name.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepSpec>,
}

/// Catalog of workflow templates keyed by name.
pub struct TemplateCatalog {
    templates: HashMap<String, WorkflowTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Catalog pre-populated with the built-in templates.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(production_release_template());
        catalog.register(incident_response_template());
        catalog
    }

    pub fn register(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(name)
    }

    pub fn list(&self) -> Vec<&WorkflowTemplate> {
        self.templates.values().collect()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn spec(id: &str, name: &str, step_type: &str, deps: &[&str]) -> StepSpec {
    StepSpec {
        id: StepId::new(id),
        name: name.to_string(),
        step_type: step_type.to_string(),
        depends_on: deps.iter().map(|d| StepId::new(*d)).collect(),
        parameters: HashMap::new(),
        timeout_secs: 300,
        retry_count: 3,
    }
}

/// Full release chain: blueprint, approval gate, rollout, validation,
/// then a completion notification.
fn production_release_template() -> WorkflowTemplate {
    WorkflowTemplate {
        name: "production_release".to_string(),
        description: "Blueprint, approve, deploy, validate and announce a release".to_string(),
        steps: vec![
            spec("blueprint", "Generate blueprint", "blueprint", &[]),
            spec("approval", "Approve release", "approve", &["blueprint"]),
            spec("rollout", "Deploy release", "deploy", &["approval"]),
            spec("verify", "Validate deployment", "validate", &["rollout"]),
            spec("announce", "Announce release", "notify", &["verify"]),
        ],
    }
}

/// Alert, remediate, then verify containment.
fn incident_response_template() -> WorkflowTemplate {
    let mut alert = spec("alert", "Alert on-call", "notify", &[]);
    alert.parameters.insert(
        "channel".to_string(),
        serde_json::Value::String("#security-alerts".to_string()),
    );
    alert.parameters.insert(
        "message".to_string(),
        serde_json::Value::String("Security incident detected".to_string()),
    );

    WorkflowTemplate {
        name: "incident_response".to_string(),
        description: "Alert, remediate and verify containment of an incident".to_string(),
        steps: vec![
            alert,
            spec("contain", "Apply remediation", "deploy", &["alert"]),
            spec("verify", "Verify containment", "validate", &["contain"]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::dag::validate_dependencies;
    use crate::types::WorkflowStep;

    #[test]
    fn test_builtin_templates_are_registered() {
        let catalog = TemplateCatalog::with_builtins();
        assert!(catalog.get("production_release").is_some());
        assert!(catalog.get("incident_response").is_some());
        assert!(catalog.get("nonexistent").is_none());
        assert_eq!(catalog.list().len(), 2);
    }

    #[test]
    fn test_builtin_templates_have_valid_graphs() {
        let catalog = TemplateCatalog::with_builtins();
        for template in catalog.list() {
            let steps: Vec<WorkflowStep> = template
                .steps
                .iter()
                .cloned()
                .map(WorkflowStep::from)
                .collect();
            validate_dependencies(&steps)
                .unwrap_or_else(|e| panic!("template {} invalid: {}", template.name, e));
        }
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut catalog = TemplateCatalog::with_builtins();
        catalog.register(WorkflowTemplate {
            name: "production_release".to_string(),
            description: "replacement".to_string(),
            steps: vec![],
        });

        assert_eq!(catalog.list().len(), 2);
        assert_eq!(
            catalog.get("production_release").unwrap().description,
            "replacement"
        );
    }
}
