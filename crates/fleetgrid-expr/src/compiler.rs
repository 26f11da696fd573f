//! Expression compiler: parse, check, wrap, cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use fleetgrid_core::config::{DEFAULT_CACHE_MAX_SIZE, DEFAULT_MAX_COST, ExpressionConfig};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ast::Expr;
use crate::cache::{CacheStats, ExpressionCache};
use crate::checker::check;
use crate::error::{ExprError, ExprResult};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::interpreter::{Deadline, evaluate};
use crate::parser::parse;
use crate::value::{Value, ValueType};

/// Variables every placement expression may reference without a warning.
pub const DEFAULT_DECLARED_VARIABLES: [&str; 5] =
    ["workspace", "request", "resources", "cluster", "workload"];

/// Hex SHA-256 of the expression source. Used as the cache key.
pub fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Source text plus the metadata extracted while checking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    pub source: String,
    /// Root variable names, sorted.
    pub variables: Vec<String>,
    /// Every function called, sorted.
    pub functions: Vec<String>,
    /// The subset of `functions` that are not built-ins.
    pub custom_functions: Vec<String>,
}

/// A variable referenced by an expression and the dotted paths read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct Program {
    expression: Expression,
    ast: Expr,
    result_type: ValueType,
    cost: u64,
    hash: String,
    warnings: Vec<String>,
    variables: BTreeMap<String, BTreeSet<String>>,
    functions: Arc<FunctionRegistry>,
}

/// A checked, reusable program.
///
/// Cloning is cheap. The program keeps the function registry it was checked
/// against, so later registrations never change what an existing program
/// calls.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    program: Arc<Program>,
}

impl CompiledExpression {
    /// Evaluate without a deadline.
    pub fn evaluate(&self, vars: &HashMap<String, Value>) -> ExprResult<Value> {
        self.evaluate_with(vars, Deadline::unbounded())
    }

    pub(crate) fn evaluate_with(
        &self,
        vars: &HashMap<String, Value>,
        deadline: Deadline,
    ) -> ExprResult<Value> {
        evaluate(&self.program.ast, &self.program.functions, vars, deadline)
    }

    pub fn cost(&self) -> u64 {
        self.program.cost
    }

    pub fn hash(&self) -> &str {
        &self.program.hash
    }

    pub fn source(&self) -> &str {
        &self.program.expression.source
    }

    pub fn expression(&self) -> &Expression {
        &self.program.expression
    }

    /// Static result type; `Dyn` when it depends on variables.
    pub fn result_type(&self) -> ValueType {
        self.program.result_type
    }

    pub fn warnings(&self) -> &[String] {
        &self.program.warnings
    }

    pub fn variables(&self) -> Vec<Variable> {
        self.program
            .variables
            .iter()
            .map(|(name, paths)| Variable {
                name: name.clone(),
                paths: paths.iter().cloned().collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub cache_max_size: usize,
    pub max_cost: u64,
    pub declared_variables: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            max_cost: DEFAULT_MAX_COST,
            declared_variables: DEFAULT_DECLARED_VARIABLES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl From<&ExpressionConfig> for CompilerConfig {
    fn from(config: &ExpressionConfig) -> Self {
        Self {
            cache_max_size: config.cache_max_size,
            max_cost: config.max_cost,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Compiler {
    config: CompilerConfig,
    registry: RwLock<Arc<FunctionRegistry>>,
    cache: ExpressionCache,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            cache: ExpressionCache::new(config.cache_max_size),
            registry: RwLock::new(Arc::new(FunctionRegistry::with_builtins())),
            config,
        }
    }

    pub fn from_config(config: &ExpressionConfig) -> Self {
        Self::with_config(CompilerConfig::from(config))
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Snapshot of the current function registry.
    pub fn functions(&self) -> Arc<FunctionRegistry> {
        self.registry.read().expect("function registry lock").clone()
    }

    /// Compile `source`, returning a cached program when one exists.
    /// Failed compilations are never cached.
    pub fn compile(&self, source: &str) -> ExprResult<CompiledExpression> {
        let hash = source_hash(source);
        if let Some(cached) = self.cache.get(&hash) {
            return Ok(cached);
        }

        let functions = self.functions();
        let ast = parse(source)?;
        let report = check(
            &ast,
            &functions,
            &self.config.declared_variables,
            self.config.max_cost,
        )?;

        let expression = Expression {
            source: source.to_string(),
            variables: report.variables.keys().cloned().collect(),
            functions: report.functions.iter().cloned().collect(),
            custom_functions: report.custom_functions.iter().cloned().collect(),
        };
        let compiled = CompiledExpression {
            program: Arc::new(Program {
                expression,
                ast,
                result_type: report.result_type,
                cost: report.cost,
                hash: hash.clone(),
                warnings: report.warnings,
                variables: report.variables,
                functions: functions.clone(),
            }),
        };
        tracing::debug!(
            hash = %hash,
            cost = compiled.cost(),
            warnings = compiled.warnings().len(),
            "compiled expression"
        );

        // Skip caching if a function was registered while we were checking.
        let current = self.registry.read().expect("function registry lock");
        if Arc::ptr_eq(&*current, &functions) {
            self.cache.put(&hash, compiled.clone());
        }
        Ok(compiled)
    }

    /// Compile and report success, the diagnostic, and any warnings.
    pub fn validate(&self, source: &str) -> CompilationResult {
        match self.compile(source) {
            Ok(compiled) => CompilationResult {
                success: true,
                error: None,
                warnings: compiled.warnings().to_vec(),
            },
            Err(e) => CompilationResult {
                success: false,
                error: Some(e.to_string()),
                warnings: Vec::new(),
            },
        }
    }

    /// One entry per root variable; comprehension-bound names are excluded.
    pub fn extract_variables(&self, source: &str) -> ExprResult<Vec<Variable>> {
        self.compile(source).map(|compiled| compiled.variables())
    }

    /// Add or replace a function. Clears the whole program cache.
    pub fn register_function(&self, def: FunctionDef) -> ExprResult<()> {
        if def.name().is_empty() {
            return Err(ExprError::Compilation(
                "function name must not be empty".to_string(),
            ));
        }
        if def.arity().is_empty() {
            return Err(ExprError::Compilation(format!(
                "function '{}' accepts no argument count",
                def.name()
            )));
        }

        let mut registry = self.registry.write().expect("function registry lock");
        let name = def.name().to_string();
        let mut next = (**registry).clone();
        let replaced = next.register(def).is_some();
        *registry = Arc::new(next);
        self.cache.clear();

        tracing::info!(function = %name, replaced, "registered expression function");
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
