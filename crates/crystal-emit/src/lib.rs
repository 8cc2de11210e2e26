//! Clarity output for a lowered Crystal tree.
//!
//! [`emit`] writes the contract source; [`emit_import_stub`] writes the
//! declaration file other contracts import to call it. Both expect a tree
//! that went through inference and lowering: every function is top level,
//! named and typed, and no `foreach` remains.

mod clarity;
pub mod format;
mod stub;

pub use clarity::{emit, to_clarity};
pub use format::{Formatter, Sexp};
pub use stub::{emit_import_stub, import_stub};
