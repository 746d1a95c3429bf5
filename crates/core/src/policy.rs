//! Creation-time policy evaluation.
//!
//! Rules are checked when a workflow is created, never during execution.
//! Evaluation is fail-open: a condition that cannot be evaluated against
//! the workflow (missing field, wrong value type) is treated as not
//! triggered, and `deny` results are reported but do not block creation;
//! the create path only logs them. Callers that need hard enforcement must
//! gate on the returned violations themselves.

use crate::types::{
    PolicyAction, PolicyCondition, PolicyId, PolicyRule, PolicySeverity, PolicyViolation, Workflow,
};
use std::collections::HashMap;

/// Stateless rule checker over a fixed rule set.
///
/// The rule set is seeded at engine initialization and immutable while a
/// workflow is being evaluated.
pub struct PolicyEvaluator {
    rules: HashMap<PolicyId, PolicyRule>,
}

impl PolicyEvaluator {
    /// Evaluator seeded with the default rule set.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Evaluator over a caller-supplied rule set.
    pub fn with_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// All registered rules, enabled or not.
    pub fn rules(&self) -> Vec<&PolicyRule> {
        self.rules.values().collect()
    }

    /// Check a candidate workflow against all enabled rules and return the
    /// triggered ones. Order is arbitrary; severity does not affect it.
    pub fn evaluate(&self, workflow: &Workflow) -> Vec<PolicyViolation> {
        self.rules
            .values()
            .filter(|rule| rule.enabled)
            .filter(|rule| condition_matches(&rule.condition, workflow))
            .filter(|rule| rule.action != PolicyAction::Allow)
            .map(|rule| PolicyViolation {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                action: rule.action,
                severity: rule.severity,
                message: match rule.action {
                    PolicyAction::Deny => {
                        format!("policy '{}' denies this workflow", rule.name)
                    }
                    PolicyAction::Warn => {
                        format!("policy '{}' warns about this workflow", rule.name)
                    }
                    PolicyAction::RequireApproval => {
                        format!("policy '{}' requires approval for this workflow", rule.name)
                    }
                    PolicyAction::Allow => unreachable!(),
                },
            })
            .collect()
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a condition against workflow metadata and step parameters.
/// Returns false for anything that cannot be evaluated.
fn condition_matches(condition: &PolicyCondition, workflow: &Workflow) -> bool {
    match condition {
        PolicyCondition::MetadataEquals { field, value } => {
            workflow.metadata.get(field) == Some(value)
        }
        PolicyCondition::MetadataExceeds { field, threshold } => workflow
            .metadata
            .get(field)
            .and_then(|v| v.as_f64())
            .map(|v| v > *threshold)
            .unwrap_or(false),
        PolicyCondition::AnyStepTagged { tag } => workflow.steps.iter().any(|step| {
            step.parameters
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
                .unwrap_or(false)
        }),
    }
}

/// Default rule set seeded at engine initialization.
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            id: PolicyId::new("prod_approval"),
            name: "Production Approval Required".to_string(),
            description: "All production deployments require approval".to_string(),
            condition: PolicyCondition::MetadataEquals {
                field: "environment".to_string(),
                value: serde_json::Value::String("production".to_string()),
            },
            action: PolicyAction::RequireApproval,
            severity: PolicySeverity::Error,
            tags: vec!["production".to_string(), "approval".to_string()],
            enabled: true,
        },
        PolicyRule {
            id: PolicyId::new("sensitive_data"),
            name: "Sensitive Data Handling".to_string(),
            description: "Workflows touching sensitive data require encryption".to_string(),
            condition: PolicyCondition::AnyStepTagged {
                tag: "sensitive".to_string(),
            },
            action: PolicyAction::Warn,
            severity: PolicySeverity::Warning,
            tags: vec!["security".to_string(), "data".to_string()],
            enabled: true,
        },
        PolicyRule {
            id: PolicyId::new("cost_limit"),
            name: "Cost Limit Check".to_string(),
            description: "Workflows exceeding the cost limit require approval".to_string(),
            condition: PolicyCondition::MetadataExceeds {
                field: "estimated_cost".to_string(),
                threshold: 1000.0,
            },
            action: PolicyAction::RequireApproval,
            severity: PolicySeverity::Warning,
            tags: vec!["cost".to_string(), "approval".to_string()],
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepId, StepStatus, WorkflowId, WorkflowStatus, WorkflowStep};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    fn workflow_with(
        metadata: HashMap<String, serde_json::Value>,
        steps: Vec<WorkflowStep>,
    ) -> Workflow {
        Workflow {
            id: WorkflowId::new(),
            name: "wf".to_string(),
            description: String::new(),
            steps,
            status: WorkflowStatus::Pending,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            metadata,
            policies: vec![],
            error_message: None,
        }
    }

    fn step_with_params(params: HashMap<String, serde_json::Value>) -> WorkflowStep {
        WorkflowStep {
            id: StepId::new("s1"),
            name: "S1".to_string(),
            step_type: "deploy".to_string(),
            depends_on: vec![],
            parameters: params,
            timeout_secs: 300,
            retry_count: 3,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn test_production_workflow_triggers_approval_rule() {
        let evaluator = PolicyEvaluator::new();
        let mut metadata = HashMap::new();
        metadata.insert("environment".to_string(), json!("production"));

        let violations = evaluator.evaluate(&workflow_with(metadata, vec![]));

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, PolicyId::new("prod_approval"));
        assert_eq!(violations[0].action, PolicyAction::RequireApproval);
    }

    #[test]
    fn test_non_production_workflow_passes() {
        let evaluator = PolicyEvaluator::new();
        let mut metadata = HashMap::new();
        metadata.insert("environment".to_string(), json!("staging"));

        let violations = evaluator.evaluate(&workflow_with(metadata, vec![]));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_sensitive_step_triggers_warning() {
        let evaluator = PolicyEvaluator::new();
        let mut params = HashMap::new();
        params.insert("tags".to_string(), json!(["sensitive", "pii"]));

        let workflow = workflow_with(HashMap::new(), vec![step_with_params(params)]);
        let violations = evaluator.evaluate(&workflow);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, PolicyId::new("sensitive_data"));
        assert_eq!(violations[0].severity, PolicySeverity::Warning);
    }

    #[test]
    fn test_cost_threshold() {
        let evaluator = PolicyEvaluator::new();

        let mut over = HashMap::new();
        over.insert("estimated_cost".to_string(), json!(2500));
        assert_eq!(evaluator.evaluate(&workflow_with(over, vec![])).len(), 1);

        let mut under = HashMap::new();
        under.insert("estimated_cost".to_string(), json!(999));
        assert!(evaluator.evaluate(&workflow_with(under, vec![])).is_empty());
    }

    #[test]
    fn test_unevaluable_condition_is_not_triggered() {
        let evaluator = PolicyEvaluator::new();

        // Cost recorded as a string cannot be compared numerically;
        // fail-open means the rule does not trigger.
        let mut metadata = HashMap::new();
        metadata.insert("estimated_cost".to_string(), json!("a lot"));

        let violations = evaluator.evaluate(&workflow_with(metadata, vec![]));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let mut rules = default_rules();
        for rule in &mut rules {
            rule.enabled = false;
        }
        let evaluator = PolicyEvaluator::with_rules(rules);

        let mut metadata = HashMap::new();
        metadata.insert("environment".to_string(), json!("production"));

        let violations = evaluator.evaluate(&workflow_with(metadata, vec![]));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_deny_rule_is_reported_not_enforced() {
        let evaluator = PolicyEvaluator::with_rules(vec![PolicyRule {
            id: PolicyId::new("no_legacy"),
            name: "No Legacy Targets".to_string(),
            description: "Deny workflows targeting the legacy estate".to_string(),
            condition: PolicyCondition::MetadataEquals {
                field: "target".to_string(),
                value: json!("legacy"),
            },
            action: PolicyAction::Deny,
            severity: PolicySeverity::Critical,
            tags: vec![],
            enabled: true,
        }]);

        let mut metadata = HashMap::new();
        metadata.insert("target".to_string(), json!("legacy"));

        let violations = evaluator.evaluate(&workflow_with(metadata, vec![]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].action, PolicyAction::Deny);
    }
}
