//! Policy data model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a policy asks for when it matches. Ordered by restrictiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolicyAction {
    Allow,
    Warn,
    Deny,
}

impl PolicyAction {
    pub fn severity(self) -> Severity {
        match self {
            PolicyAction::Deny => Severity::High,
            PolicyAction::Warn => Severity::Medium,
            PolicyAction::Allow => Severity::Low,
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyAction::Allow => "Allow",
            PolicyAction::Warn => "Warn",
            PolicyAction::Deny => "Deny",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub name: String,
    pub expression: String,
    /// Scoring weight. Only positive weights contribute to the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Overrides the policy action when deriving violation severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PolicyAction>,
}

impl PolicyRule {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            weight: None,
            required: false,
            error_message: None,
            action: None,
        }
    }

    pub fn weighted(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_action(mut self, action: PolicyAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Weight that counts toward the score, if any.
    pub fn scoring_weight(&self) -> Option<u32> {
        self.weight
            .filter(|w| *w > 0)
            .and_then(|w| u32::try_from(w).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PolicyAction>,
}

impl Policy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            priority: 0,
            action: None,
        }
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: PolicyAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Severity of a violation of `rule`: the rule action, then the policy
    /// action, then `Medium`.
    pub fn severity_for(&self, rule: &PolicyRule) -> Severity {
        rule.action
            .or(self.action)
            .map_or(Severity::Medium, PolicyAction::severity)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStrategy {
    #[default]
    FirstMatch,
    HighestPriority,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySet {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default = "default_action")]
    pub default_action: PolicyAction,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

fn default_action() -> PolicyAction {
    PolicyAction::Allow
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule: String,
    pub message: String,
    pub severity: Severity,
    /// The failed rule was marked `required`.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub policy_name: String,
    pub passed: bool,
    /// 0 to 100.
    pub score: f64,
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EvaluationResult {
    pub fn required_failed(&self) -> bool {
        self.violations.iter().any(|v| v.required)
    }
}
