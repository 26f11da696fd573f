//! Policy evaluation: run each rule, collect violations, compute a score.

use std::collections::HashMap;
use std::sync::Arc;

use fleetgrid_core::Cancellation;
use fleetgrid_core::config::{ConfigError, ExpressionConfig};
use fleetgrid_expr::{Compiler, Evaluator, Value};
use serde_json::json;

use crate::error::{PolicyError, PolicyResult};
use crate::types::{EvaluationResult, Policy, PolicyRule, PolicySet, Violation};

/// Score of a policy whose rules carry no positive weight.
pub const FULL_SCORE: f64 = 100.0;

/// Evaluates policies through a shared expression compiler, so rule
/// programs are cached across policies and calls.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    compiler: Arc<Compiler>,
    evaluator: Evaluator,
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(Compiler::new()), Evaluator::new())
    }

    pub fn with_parts(compiler: Arc<Compiler>, evaluator: Evaluator) -> Self {
        Self {
            compiler,
            evaluator,
        }
    }

    pub fn from_config(config: &ExpressionConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_parts(
            Arc::new(Compiler::from_config(config)),
            Evaluator::from_config(config)?,
        ))
    }

    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    /// Evaluate every rule of `policy` in declaration order.
    ///
    /// Any rule that fails to compile or evaluate, or yields a non-boolean,
    /// aborts the whole evaluation with [`PolicyError::RuleEvaluation`].
    pub fn evaluate(
        &self,
        cancel: &Cancellation,
        policy: &Policy,
        vars: &HashMap<String, Value>,
    ) -> PolicyResult<EvaluationResult> {
        let mut violations = Vec::new();
        let mut rules_passed = 0usize;
        let mut total_weight = 0u64;
        let mut passed_weight = 0u64;

        for rule in &policy.rules {
            let passed = self.evaluate_rule(cancel, rule, vars)?;
            let weight = rule.scoring_weight().map(u64::from);
            if let Some(weight) = weight {
                total_weight += weight;
            }

            if passed {
                rules_passed += 1;
                passed_weight += weight.unwrap_or(0);
                continue;
            }

            tracing::debug!(
                policy = %policy.name,
                rule = %rule.name,
                required = rule.required,
                "policy rule failed"
            );
            violations.push(Violation {
                rule: rule.name.clone(),
                message: rule
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("rule '{}' failed: {}", rule.name, rule.expression)),
                severity: policy.severity_for(rule),
                required: rule.required,
            });
        }

        let score = if total_weight > 0 {
            FULL_SCORE * passed_weight as f64 / total_weight as f64
        } else {
            FULL_SCORE
        };

        let metadata = [
            ("rulesEvaluated".to_string(), json!(policy.rules.len())),
            ("rulesPassed".to_string(), json!(rules_passed)),
            ("priority".to_string(), json!(policy.priority)),
            (
                "action".to_string(),
                json!(policy.action.map(|a| a.to_string())),
            ),
        ]
        .into_iter()
        .collect();

        Ok(EvaluationResult {
            policy_name: policy.name.clone(),
            passed: violations.is_empty(),
            score,
            violations,
            metadata,
        })
    }

    /// Evaluate each policy independently, preserving input order. Conflict
    /// resolution is left to [`resolve`](crate::resolve::resolve).
    pub fn evaluate_policy_set(
        &self,
        cancel: &Cancellation,
        set: &PolicySet,
        vars: &HashMap<String, Value>,
    ) -> PolicyResult<Vec<EvaluationResult>> {
        set.policies
            .iter()
            .map(|policy| self.evaluate(cancel, policy, vars))
            .collect()
    }

    /// Compile every rule without evaluating anything.
    pub fn check(&self, policy: &Policy) -> PolicyResult<()> {
        if policy.name.is_empty() {
            return Err(PolicyError::InvalidPolicy {
                policy: policy.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        for rule in &policy.rules {
            self.compiler
                .compile(&rule.expression)
                .map_err(|source| PolicyError::RuleEvaluation {
                    rule: rule.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn evaluate_rule(
        &self,
        cancel: &Cancellation,
        rule: &PolicyRule,
        vars: &HashMap<String, Value>,
    ) -> PolicyResult<bool> {
        let wrap = |source| PolicyError::RuleEvaluation {
            rule: rule.name.clone(),
            source,
        };
        let compiled = self.compiler.compile(&rule.expression).map_err(wrap)?;
        self.evaluator
            .evaluate_bool(cancel, &compiled, vars)
            .map_err(wrap)
    }
}
