//! Conflict resolution across the results of a policy set.

use serde::Serialize;

use crate::types::{ConflictStrategy, EvaluationResult, Policy, PolicyAction, PolicySet};

/// Outcome of resolving a policy set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub score: f64,
    /// Names of the passing policies that contributed, in set order.
    pub matched: Vec<String>,
    pub strategy: ConflictStrategy,
}

/// Combine `results` (as returned by `evaluate_policy_set` for `set`) into
/// one decision. A policy matches when it passed. A matching policy with no
/// action of its own contributes the set's default action.
pub fn resolve(set: &PolicySet, results: &[EvaluationResult]) -> PolicyDecision {
    let matches: Vec<(&Policy, &EvaluationResult)> = set
        .policies
        .iter()
        .zip(results)
        .filter(|(_, result)| result.passed)
        .collect();

    let action_of = |policy: &Policy| policy.action.unwrap_or(set.default_action);
    let single = |(policy, result): (&Policy, &EvaluationResult)| PolicyDecision {
        action: action_of(policy),
        score: result.score,
        matched: vec![policy.name.clone()],
        strategy: set.conflict_strategy,
    };

    let decision = match set.conflict_strategy {
        ConflictStrategy::FirstMatch => matches.first().copied().map(single),
        ConflictStrategy::HighestPriority => matches
            .iter()
            .copied()
            // max_by_key keeps the last maximum; reverse so the earliest wins.
            .rev()
            .max_by_key(|(policy, _)| policy.priority)
            .map(single),
        ConflictStrategy::Merge if !matches.is_empty() => {
            let action = matches
                .iter()
                .map(|(policy, _)| action_of(policy))
                .max()
                .unwrap_or(set.default_action);
            let score =
                matches.iter().map(|(_, r)| r.score).sum::<f64>() / matches.len() as f64;
            Some(PolicyDecision {
                action,
                score,
                matched: matches.iter().map(|(p, _)| p.name.clone()).collect(),
                strategy: set.conflict_strategy,
            })
        }
        ConflictStrategy::Merge => None,
    };

    decision.unwrap_or_else(|| PolicyDecision {
        action: set.default_action,
        score: 0.0,
        matched: Vec::new(),
        strategy: set.conflict_strategy,
    })
}
