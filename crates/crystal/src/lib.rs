//! Compile driver for Crystal.
//!
//! Takes a parsed [`Program`], runs the checking and lowering passes in
//! order and assembles the Clarity output, plus an import stub when a
//! contract name is configured.

mod comments;
mod compiler;

pub use comments::{Comment, merge_comments};
pub use compiler::{
    CompilationContext, CompileOptions, CompileOutput, Program, check_program, compile,
    emit_program,
};
pub use crystal_diag::{Category, Diagnostic, DiagnosticError};
pub use crystal_infer::InferTrace;
