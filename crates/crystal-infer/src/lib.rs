//! Type inference for Crystal.
//!
//! Inference runs over an already scoped [`crystal_ast::Ast`] in three steps:
//!
//! 1. [`validate_functions`] checks function declarations and computes the
//!    order functions are typed in (callees first where possible).
//! 2. [`determine_types`] types every definition in that order. Forward
//!    references that cannot be typed yet are backfilled in later passes.
//!    Literals are coerced to the types their context needs, constant
//!    expressions fold, and syntax sugar is rewritten into builtin calls.
//! 3. [`validate_trait_implementations`] checks every implemented trait
//!    has all of its members.
//!
//! Inference mutates the tree in place. Node ids held by callers stay
//! valid, though the payload behind an id may change.

mod abi;
mod brackets;
pub mod builtins;
mod calls;
mod coerce;
mod exprs;
mod foreach;
mod functions;
mod returns;
mod scope;
pub mod trace;
mod traits;
mod typeck;

#[cfg(test)]
mod prop_tests;

pub use abi::{AbiArg, AbiEntry};
pub use builtins::{Builtin, lookup};
pub use functions::{DepEntry, validate_functions};
pub use scope::{generate_fn_name, generate_id_name};
pub use trace::{InferStep, InferTrace, PassOutcome};
pub use traits::validate_trait_implementations;
pub use typeck::{InferOptions, determine_types};

// Re-export for convenience.
pub use crystal_diag::{Category, Diagnostic, WarningSink};
