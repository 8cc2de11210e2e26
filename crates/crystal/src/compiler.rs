use std::path::Path;

use crystal_ast::Ast;
use crystal_diag::{Diagnostic, DiagnosticError};
use crystal_infer::{
    InferOptions, InferTrace, determine_types, validate_functions, validate_trait_implementations,
};
use crystal_lower::{globalize_inner_functions, lower_foreach};
use tracing::{debug, info};

use crate::comments::{Comment, merge_comments};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Enables the `;; contract:` header line and the import stub.
    pub contract_name: Option<String>,
    /// Source file the program was parsed from; only its file name is used.
    pub source_name: String,
    /// Fold constant conditions and literal arithmetic.
    pub optimize: bool,
    /// Record an [`InferTrace`].
    pub trace: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            contract_name: None,
            source_name: "contract.crystal".to_string(),
            optimize: true,
            trace: false,
        }
    }
}

/// A parsed program: the scoped tree and the source comments, in line order.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub ast: Ast,
    pub comments: Vec<Comment>,
}

impl Program {
    pub fn new(ast: Ast) -> Self {
        Self {
            ast,
            comments: Vec::new(),
        }
    }

    pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
        self.comments = comments;
        self
    }
}

/// A program that passed every check and is lowered to the target's
/// function model, ready for emission.
#[derive(Debug)]
pub struct CompilationContext {
    pub ast: Ast,
    /// Comments after the last node, emitted at end of file.
    pub trailing_comments: Vec<Comment>,
    pub warnings: Vec<Diagnostic>,
    pub trace: Option<InferTrace>,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub clarity: String,
    /// Crystal source other contracts import to call this one.
    pub import_stub: Option<String>,
    pub warnings: Vec<Diagnostic>,
    pub trace: Option<InferTrace>,
}

/// Run every pass up to emission. On failure, the fatal diagnostic comes
/// first, followed by the warnings produced before it.
pub fn check_program(
    program: Program,
    options: &CompileOptions,
) -> Result<CompilationContext, DiagnosticError> {
    let Program { mut ast, comments } = program;
    let mut warnings = Vec::new();
    let mut trace = options.trace.then(InferTrace::default);

    let trailing_comments = merge_comments(&mut ast, comments);
    let result = run_passes(&mut ast, options, &mut warnings, trace.as_mut());
    if let Err(fatal) = result {
        let mut diags = vec![fatal];
        diags.append(&mut warnings);
        return Err(DiagnosticError::multiple(diags));
    }

    Ok(CompilationContext {
        ast,
        trailing_comments,
        warnings,
        trace,
    })
}

fn run_passes(
    ast: &mut Ast,
    options: &CompileOptions,
    warnings: &mut Vec<Diagnostic>,
    trace: Option<&mut InferTrace>,
) -> Result<(), Diagnostic> {
    let order = validate_functions(ast)?;
    debug!(functions = order.len(), "validated functions");

    ast.remove_unreachable();
    ast.remove_nops();

    let infer_options = InferOptions {
        optimize: options.optimize,
    };
    determine_types(ast, order, &infer_options, warnings, trace)?;
    validate_trait_implementations(ast)?;

    globalize_inner_functions(ast)?;
    lower_foreach(ast)?;
    ast.remove_nops();
    Ok(())
}

/// Write the target source for a checked program.
pub fn emit_program(
    ctx: &CompilationContext,
    options: &CompileOptions,
) -> Result<CompileOutput, DiagnosticError> {
    let mut clarity = header(options);
    crystal_emit::emit(&ctx.ast, &mut |chunk| clarity.push_str(chunk))?;

    if !ctx.trailing_comments.is_empty() {
        clarity.push('\n');
        for comment in &ctx.trailing_comments {
            clarity.push_str(&comment.text);
            clarity.push('\n');
        }
    }

    let import_stub = options
        .contract_name
        .as_deref()
        .and_then(|name| crystal_emit::import_stub(&ctx.ast, name));

    Ok(CompileOutput {
        clarity,
        import_stub,
        warnings: ctx.warnings.clone(),
        trace: ctx.trace.clone(),
    })
}

/// Compile a parsed program to Clarity.
pub fn compile(program: Program, options: &CompileOptions) -> Result<CompileOutput, DiagnosticError> {
    info!(
        source = %options.source_name,
        definitions = program.ast.definitions().len(),
        "compiling"
    );
    let ctx = check_program(program, options)?;
    let output = emit_program(&ctx, options)?;
    info!(
        warnings = output.warnings.len(),
        import_stub = output.import_stub.is_some(),
        "compiled"
    );
    Ok(output)
}

fn header(options: &CompileOptions) -> String {
    let mut out = String::new();
    if let Some(name) = &options.contract_name {
        out.push_str(&format!(";; contract: {name}\n"));
    }
    let source = Path::new(&options.source_name)
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| options.source_name.as_str().into());
    out.push_str(&format!(";; generated from {source}\n\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_uses_the_source_file_name() {
        let options = CompileOptions {
            contract_name: Some("vault".to_string()),
            source_name: "contracts/vault.crystal".to_string(),
            ..CompileOptions::default()
        };
        assert_eq!(
            header(&options),
            ";; contract: vault\n;; generated from vault.crystal\n\n"
        );
    }

    #[test]
    fn header_without_contract_name() {
        let options = CompileOptions {
            source_name: "a.crystal".to_string(),
            ..CompileOptions::default()
        };
        assert_eq!(header(&options), ";; generated from a.crystal\n\n");
    }
}
