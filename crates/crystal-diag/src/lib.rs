//! Error reporting and diagnostics for the Crystal compiler.
//!
//! Every pass in the compiler reports failures as a [`Diagnostic`] carrying a
//! closed [`Category`], a message, and the source line of the offending node
//! when one is known. Only [`Category::UndeterminedType`] is ever recovered
//! locally (by the inference backfill pass); everything else aborts the
//! compilation.
//!
//! Warnings never abort. They are routed through a caller-supplied
//! [`WarningSink`].

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Malformed construct that the parser accepted but the compiler cannot use.
    Syntax,
    /// A broken invariant inside the compiler itself.
    Internal,
    /// Expression type does not match the required type.
    TypeMismatch,
    /// A sized value exceeds the declared maximum size.
    Size,
    /// A single argument is unusable where it appears.
    Argument,
    /// No overload accepts the call's arguments.
    ArgumentMismatch,
    /// A type could not be determined, even after backfilling.
    UndeterminedType,
    /// A type that is only known at runtime was used where a static type is needed.
    UndefinedRuntimeType,
    /// Identifier is not declared in any visible scope.
    UndeclaredIdentifier,
    /// Identifier or function was declared twice.
    AlreadyDeclared,
    /// A function calls itself, directly or transitively.
    Recursion,
    /// A read-only function calls something that writes.
    ReadOnlyViolation,
    /// Unknown property in dot access.
    PropertyNotFound,
    /// Unknown key in a map lookup.
    MapKeyNotFound,
    /// Accessing the ok or err part of a result that never has one.
    UnsetResponseType,
    /// A trait member and its implementation disagree.
    TraitFunctionMismatch,
    /// A declared trait is not fully implemented.
    TraitNotImplemented,
    /// Two implemented traits declare the same function differently.
    DuplicateTraitFunction,
    /// Legal source construct the target dialect cannot express.
    NotSupported,
    /// A relative and an absolute contract id refer to the same contract.
    AmbiguousContractIdentifier,
    /// A literal value is outside the range its type allows.
    InvalidLiteralValue,
    /// An imported declaration file is unusable.
    ImportFile,
    /// Non-fatal observation.
    Warning,
}

impl Category {
    pub const ALL: [Category; 23] = [
        Category::Syntax,
        Category::Internal,
        Category::TypeMismatch,
        Category::Size,
        Category::Argument,
        Category::ArgumentMismatch,
        Category::UndeterminedType,
        Category::UndefinedRuntimeType,
        Category::UndeclaredIdentifier,
        Category::AlreadyDeclared,
        Category::Recursion,
        Category::ReadOnlyViolation,
        Category::PropertyNotFound,
        Category::MapKeyNotFound,
        Category::UnsetResponseType,
        Category::TraitFunctionMismatch,
        Category::TraitNotImplemented,
        Category::DuplicateTraitFunction,
        Category::NotSupported,
        Category::AmbiguousContractIdentifier,
        Category::InvalidLiteralValue,
        Category::ImportFile,
        Category::Warning,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Syntax => "syntax",
            Category::Internal => "internal",
            Category::TypeMismatch => "type_mismatch",
            Category::Size => "size",
            Category::Argument => "argument",
            Category::ArgumentMismatch => "argument_mismatch",
            Category::UndeterminedType => "undetermined_type",
            Category::UndefinedRuntimeType => "undefined_runtime_type",
            Category::UndeclaredIdentifier => "undeclared_identifier",
            Category::AlreadyDeclared => "already_declared",
            Category::Recursion => "recursion",
            Category::ReadOnlyViolation => "read_only_violation",
            Category::PropertyNotFound => "property_not_found",
            Category::MapKeyNotFound => "map_key_not_found",
            Category::UnsetResponseType => "unset_response_type",
            Category::TraitFunctionMismatch => "trait_function_mismatch",
            Category::TraitNotImplemented => "trait_not_implemented",
            Category::DuplicateTraitFunction => "duplicate_trait_function",
            Category::NotSupported => "not_supported",
            Category::AmbiguousContractIdentifier => "ambiguous_contract_identifier",
            Category::InvalidLiteralValue => "invalid_literal_value",
            Category::ImportFile => "import_file",
            Category::Warning => "warning",
        }
    }

    /// The name users see in error listings, e.g. `TypeMismatchError`.
    pub fn name(self) -> &'static str {
        match self {
            Category::Syntax => "SyntaxError",
            Category::Internal => "InternalError",
            Category::TypeMismatch => "TypeMismatchError",
            Category::Size => "SizeError",
            Category::Argument => "ArgumentError",
            Category::ArgumentMismatch => "ArgumentMismatchError",
            Category::UndeterminedType => "UndeterminedTypeError",
            Category::UndefinedRuntimeType => "UndefinedRuntimeTypeError",
            Category::UndeclaredIdentifier => "UndeclaredIdentifierError",
            Category::AlreadyDeclared => "AlreadyDeclaredError",
            Category::Recursion => "RecursionError",
            Category::ReadOnlyViolation => "ReadOnlyViolationError",
            Category::PropertyNotFound => "PropertyNotFoundError",
            Category::MapKeyNotFound => "MapKeyNotFoundError",
            Category::UnsetResponseType => "UnsetResponseTypeError",
            Category::TraitFunctionMismatch => "TraitFunctionMismatchError",
            Category::TraitNotImplemented => "TraitNotImplementedError",
            Category::DuplicateTraitFunction => "DuplicateTraitFunctionError",
            Category::NotSupported => "NotSupportedError",
            Category::AmbiguousContractIdentifier => "AmbiguousContractIdentifierError",
            Category::InvalidLiteralValue => "InvalidLiteralValueError",
            Category::ImportFile => "ImportFileError",
            Category::Warning => "Warning",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::Syntax => "E0001",
            Category::Internal => "E0002",
            Category::TypeMismatch => "E0003",
            Category::Size => "E0004",
            Category::Argument => "E0005",
            Category::ArgumentMismatch => "E0006",
            Category::UndeterminedType => "E0007",
            Category::UndefinedRuntimeType => "E0008",
            Category::UndeclaredIdentifier => "E0009",
            Category::AlreadyDeclared => "E0010",
            Category::Recursion => "E0011",
            Category::ReadOnlyViolation => "E0012",
            Category::PropertyNotFound => "E0013",
            Category::MapKeyNotFound => "E0014",
            Category::UnsetResponseType => "E0015",
            Category::TraitFunctionMismatch => "E0016",
            Category::TraitNotImplemented => "E0017",
            Category::DuplicateTraitFunction => "E0018",
            Category::NotSupported => "E0019",
            Category::AmbiguousContractIdentifier => "E0020",
            Category::InvalidLiteralValue => "E0021",
            Category::ImportFile => "E0022",
            Category::Warning => "W0001",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Syntax => "The construct is not valid in this position.",
            Category::Internal => "The compiler reached a state it considers impossible.",
            Category::TypeMismatch => "Expression type does not match the expected type.",
            Category::Size => "A value can exceed the maximum size of its destination.",
            Category::Argument => "An argument cannot be used in this position.",
            Category::ArgumentMismatch => "No signature of the callee accepts these arguments.",
            Category::UndeterminedType => "The type of an expression could not be determined.",
            Category::UndefinedRuntimeType => "A runtime-only type was used statically.",
            Category::UndeclaredIdentifier => "A referenced name is not declared.",
            Category::AlreadyDeclared => "A name is declared more than once in the same scope chain.",
            Category::Recursion => "Functions may not call themselves directly or indirectly.",
            Category::ReadOnlyViolation => "A read-only function calls a function that writes.",
            Category::PropertyNotFound => "The value has no property with that name.",
            Category::MapKeyNotFound => "The map has no key with that name.",
            Category::UnsetResponseType => "The result never carries the requested part.",
            Category::TraitFunctionMismatch => "A function does not match its trait declaration.",
            Category::TraitNotImplemented => "A declared trait is missing implementations.",
            Category::DuplicateTraitFunction => {
                "Two traits declare the same function with different signatures."
            }
            Category::NotSupported => "The target dialect cannot express this construct.",
            Category::AmbiguousContractIdentifier => {
                "Relative and absolute contract ids are mixed for one contract."
            }
            Category::InvalidLiteralValue => "A literal value is not representable.",
            Category::ImportFile => "An imported declaration file could not be used.",
            Category::Warning => "Something suspicious that does not stop compilation.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::Syntax => "Rewrite the construct as the message suggests.",
            Category::Internal => "Report the input that triggered this; it is a compiler bug.",
            Category::TypeMismatch => "Convert the value, e.g. `uint(x)`, or change the declaration.",
            Category::Size => "Shrink the value or enlarge the declared maximum size.",
            Category::Argument => "Pass a value of the kind the callee expects.",
            Category::ArgumentMismatch => "Check the argument types against the callee.",
            Category::UndeterminedType => "Give the value a concrete type, e.g. `list<int>[5]`.",
            Category::UndefinedRuntimeType => "Convert the value to a concrete type first.",
            Category::UndeclaredIdentifier => "Declare the name before using it or fix the spelling.",
            Category::AlreadyDeclared => "Rename one of the declarations.",
            Category::Recursion => "Replace the recursion with `foreach` or a bounded helper.",
            Category::ReadOnlyViolation => "Make the caller public or the callee read-only.",
            Category::PropertyNotFound => "Use one of the listed valid properties.",
            Category::MapKeyNotFound => "Use one of the listed valid keys.",
            Category::UnsetResponseType => "Return both `ok()` and `err()` from the callee.",
            Category::TraitFunctionMismatch => "Make the function signature match the trait.",
            Category::TraitNotImplemented => "Implement every function the trait declares.",
            Category::DuplicateTraitFunction => "Implement only one of the conflicting traits.",
            Category::NotSupported => "Restructure the code without this construct.",
            Category::AmbiguousContractIdentifier => "Use the same contract id form everywhere.",
            Category::InvalidLiteralValue => "Change the literal so it fits its type.",
            Category::ImportFile => "Regenerate the import file from its contract.",
            Category::Warning => "Review the flagged code.",
        }
    }

    /// Whether the inference engine may retry after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, Category::UndeterminedType)
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A source location for diagnostics. Lines are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: u32,
}

impl SourceLocation {
    pub fn line(line: u32) -> Self {
        Self { line }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Imported file the failing definition came from.
    pub file: Option<String>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            file: None,
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            code: Some(Category::Warning.code().to_string()),
            severity: Severity::Warning,
            category: Category::Warning,
            message: message.into(),
            location: None,
            file: None,
            help: None,
        }
    }

    /// Shorthand for a broken compiler invariant.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::error(Category::Internal, message)
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a line when one is known. A missing line leaves the
    /// diagnostic unchanged.
    pub fn at_line(mut self, line: Option<u32>) -> Self {
        if let Some(line) = line {
            self.location = Some(SourceLocation::line(line));
        }
        self
    }

    /// Like [`Diagnostic::at_line`], but never overwrites an existing location.
    pub fn or_at_line(self, line: Option<u32>) -> Self {
        if self.location.is_some() {
            return self;
        }
        self.at_line(line)
    }

    /// Record the imported file the failing definition came from.
    /// The first file set wins.
    pub fn in_file(mut self, path: impl Into<String>) -> Self {
        if self.file.is_none() {
            self.file = Some(path.into());
        }
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn line(&self) -> Option<u32> {
        self.location.map(|loc| loc.line)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        match (&self.location, &self.file) {
            (Some(loc), Some(file)) => write!(f, " at line {} of file {file}", loc.line)?,
            (Some(loc), None) => write!(f, " at line {}", loc.line)?,
            (None, Some(file)) => write!(f, " in {file}")?,
            (None, None) => {}
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Warning sink
// ---------------------------------------------------------------------------

/// Receives warnings as the compiler produces them.
pub trait WarningSink {
    fn warn(&mut self, diag: Diagnostic);
}

impl WarningSink for Vec<Diagnostic> {
    fn warn(&mut self, diag: Diagnostic) {
        self.push(diag);
    }
}

/// Discards every warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreWarnings;

impl WarningSink for IgnoreWarnings {
    fn warn(&mut self, _diag: Diagnostic) {}
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    /// Category of the first (fatal) diagnostic.
    pub fn category(&self) -> Option<Category> {
        self.0.first().map(|d| d.category)
    }
}

impl From<Diagnostic> for DiagnosticError {
    fn from(diag: Diagnostic) -> Self {
        Self::single(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let diag = Diagnostic::error(Category::TypeMismatch, "expected int, got string")
            .at(SourceLocation::line(12))
            .with_help("Use `int(x)` to convert");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0003"));
        assert_eq!(diag.category, Category::TypeMismatch);
        assert_eq!(diag.line(), Some(12));
        assert!(diag.help.unwrap().contains("int(x)"));
    }

    #[test]
    fn diagnostic_display_includes_line_and_file() {
        let diag = Diagnostic::error(Category::Syntax, "empty body").at_line(Some(4));
        assert_eq!(diag.to_string(), "error[E0001]: empty body at line 4");

        let diag = diag.in_file("token.import");
        assert_eq!(
            diag.to_string(),
            "error[E0001]: empty body at line 4 of file token.import"
        );

        let unlocated = Diagnostic::error(Category::Syntax, "empty body").in_file("a.import");
        assert_eq!(unlocated.to_string(), "error[E0001]: empty body in a.import");
    }

    #[test]
    fn first_file_wins_and_location_is_not_overwritten() {
        let diag = Diagnostic::internal("boom")
            .at_line(Some(3))
            .or_at_line(Some(9))
            .in_file("a")
            .in_file("b");
        assert_eq!(diag.line(), Some(3));
        assert_eq!(diag.file.as_deref(), Some("a"));
    }

    #[test]
    fn warnings_go_to_the_sink() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.warn(Diagnostic::warning("unchecked response"));
        IgnoreWarnings.warn(Diagnostic::warning("dropped"));
        assert_eq!(sink.len(), 1);
        assert!(!sink[0].is_error());
        assert_eq!(sink[0].category, Category::Warning);
    }

    #[test]
    fn only_undetermined_types_are_retryable() {
        let retryable: Vec<_> = Category::all()
            .iter()
            .filter(|c| c.is_retryable())
            .collect();
        assert_eq!(retryable, vec![&Category::UndeterminedType]);
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(!cat.example_fix().is_empty());
            assert!(cat.name().ends_with("Error") || *cat == Category::Warning);
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
