//! Evaluation with defaults, a timeout and caller cancellation.

use std::collections::HashMap;
use std::time::Duration;

use fleetgrid_core::Cancellation;
use fleetgrid_core::config::{ConfigError, DEFAULT_EVALUATION_TIMEOUT, ExpressionConfig};

use crate::compiler::CompiledExpression;
use crate::error::{ExprError, ExprResult};
use crate::interpreter::Deadline;
use crate::value::Value;

/// Inputs for a placement decision, flattened into the variable map by
/// [`PlacementContext::to_variables`].
#[derive(Debug, Clone, Default)]
pub struct PlacementContext {
    pub workspace: Value,
    pub request: Value,
    pub resources: Value,
    /// Extra variables; these override the three named fields on collision.
    pub variables: HashMap<String, Value>,
}

impl PlacementContext {
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let mut vars = HashMap::with_capacity(self.variables.len() + 3);
        vars.insert("workspace".to_string(), self.workspace.clone());
        vars.insert("request".to_string(), self.request.clone());
        vars.insert("resources".to_string(), self.resources.clone());
        vars.extend(self.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    timeout: Option<Duration>,
    defaults: HashMap<String, Value>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_EVALUATION_TIMEOUT)
    }
}

impl Evaluator {
    /// An evaluator with the default 10s timeout and no defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            defaults: HashMap::new(),
        }
    }

    /// No time limit; only caller cancellation stops evaluation.
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            defaults: HashMap::new(),
        }
    }

    pub fn from_config(config: &ExpressionConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_timeout(config.timeout()?))
    }

    /// Add a default variable. Caller-supplied variables win.
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn evaluate_with_variables(
        &self,
        cancel: &Cancellation,
        compiled: &CompiledExpression,
        vars: &HashMap<String, Value>,
    ) -> ExprResult<Value> {
        let deadline = Deadline::new(self.timeout, cancel.clone());
        if self.defaults.is_empty() {
            return compiled.evaluate_with(vars, deadline);
        }

        let mut merged = self.defaults.clone();
        merged.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        compiled.evaluate_with(&merged, deadline)
    }

    /// Evaluate and require a boolean result.
    pub fn evaluate_bool(
        &self,
        cancel: &Cancellation,
        compiled: &CompiledExpression,
        vars: &HashMap<String, Value>,
    ) -> ExprResult<bool> {
        let value = self.evaluate_with_variables(cancel, compiled, vars)?;
        value
            .as_bool()
            .ok_or_else(|| ExprError::NonBooleanResult(value.value_type()))
    }

    pub fn evaluate_placement(
        &self,
        cancel: &Cancellation,
        compiled: &CompiledExpression,
        context: &PlacementContext,
    ) -> ExprResult<bool> {
        let allowed = self.evaluate_bool(cancel, compiled, &context.to_variables())?;
        tracing::debug!(hash = %compiled.hash(), allowed, "evaluated placement expression");
        Ok(allowed)
    }
}
