//! fleetgrid-expr — the placement expression language.
//!
//! Expressions are CEL-flavoured: `hasLabel(cluster.labels, "gpu") &&
//! cluster.available.cpu >= workload.resources.cpu`. The pipeline is
//!
//! 1. [`parser`] turns source text into an [`Expr`] tree (pest grammar).
//! 2. [`checker`] infers static types, rejects impossible programs and
//!    estimates cost.
//! 3. [`Compiler`] wraps the result in a [`CompiledExpression`] and caches
//!    it by source hash in a bounded FIFO [`ExpressionCache`].
//! 4. [`Evaluator`] runs a compiled program with defaults, a timeout and
//!    the caller's [`Cancellation`](fleetgrid_core::Cancellation).

pub mod ast;
pub mod cache;
pub mod checker;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod functions;
mod interpreter;
pub mod parser;
pub mod value;

pub use ast::Expr;
pub use cache::{CacheStats, ExpressionCache};
pub use compiler::{
    CompilationResult, CompiledExpression, Compiler, CompilerConfig, Expression, Variable,
    source_hash,
};
pub use error::{ExprError, ExprResult};
pub use evaluator::{Evaluator, PlacementContext};
pub use functions::{FunctionDef, FunctionRegistry};
pub use value::{Value, ValueType};
