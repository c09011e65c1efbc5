//! Diagnostic infrastructure for the evaluation layer
//!
//! Inference never aborts on analyzed-code problems; it records structured
//! diagnostics instead. Lookup misses and precision losses (unresolvable
//! decorators, missing protocol methods, unresolved star imports) become
//! warnings on the session sink; structural errors become error-severity
//! diagnostics when surfaced.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use pythia_syntax::Span;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Error code for a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    /// The code text
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// A structured diagnostic with optional source location
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Error code (e.g. "E4001")
    pub code: Option<ErrorCode>,
    /// Main message
    pub message: String,
    /// Primary source location, when known
    pub span: Option<Span>,
    /// Additional notes
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a diagnostic with the given severity
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code: None,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Create an error diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the primary source location
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Build a diagnostic from an evaluation error
    ///
    /// Lookup misses report as warnings (analysis continues with an empty
    /// set); structural misuse reports as an error.
    pub fn from_eval_error(error: &EvalError) -> Self {
        let severity = if error.is_lookup_miss() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self::new(severity, error.to_string()).with_code(error_code(error))
    }

    /// Convert into a codespan diagnostic against `file_id`
    pub fn to_codespan(&self, file_id: usize) -> CsDiagnostic<usize> {
        let mut diag = CsDiagnostic::new(self.severity).with_message(self.message.clone());
        if let Some(code) = &self.code {
            diag = diag.with_code(code.0);
        }
        if let Some(span) = self.span {
            let label = Label::primary(file_id, span.start as usize..span.end as usize);
            diag = diag.with_labels(vec![label]);
        }
        diag.notes.extend(self.notes.iter().cloned());
        diag
    }

    /// Emit to stderr with colors
    pub fn emit(
        &self,
        files: &SimpleFiles<String, String>,
        file_id: usize,
    ) -> Result<(), codespan_reporting::files::Error> {
        let mut writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        term::emit(&mut writer, &config, files, &self.to_codespan(file_id))
    }

    /// Convert to JSON for IDE integration
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonDiagnostic::from_diagnostic(self))
    }
}

/// JSON representation of a diagnostic
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    /// Error code, if set
    pub code: Option<String>,
    /// Severity name
    pub severity: String,
    /// Main message
    pub message: String,
    /// Start line of the primary location (1-indexed)
    pub line: Option<u32>,
    /// Start column of the primary location (1-indexed)
    pub column: Option<u32>,
    /// Additional notes
    pub notes: Vec<String>,
}

impl JsonDiagnostic {
    /// Build the JSON mirror of a diagnostic
    pub fn from_diagnostic(diag: &Diagnostic) -> Self {
        let severity = match diag.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Help => "help",
            Severity::Bug => "bug",
        };
        JsonDiagnostic {
            code: diag.code.as_ref().map(|c| c.0.to_string()),
            severity: severity.to_string(),
            message: diag.message.clone(),
            line: diag.span.map(|s| s.line),
            column: diag.span.map(|s| s.column),
            notes: diag.notes.clone(),
        }
    }
}

/// Get the error code for an evaluation error
pub fn error_code(error: &EvalError) -> ErrorCode {
    use EvalError::*;

    match error {
        NotCallable { .. } => ErrorCode("E4001"),
        SubscopeNotFound { .. } => ErrorCode("E4002"),
        UnsupportedOperation { .. } => ErrorCode("E4003"),
        NotAPackage { .. } => ErrorCode("E4004"),
    }
}

/// Codes for precision-loss warnings raised during inference
pub mod codes {
    use super::ErrorCode;

    /// A decorator expression evaluated to no values
    pub const DECORATOR_UNRESOLVED: ErrorCode = ErrorCode("W4101");
    /// A decorator expression evaluated to several values; one was picked
    pub const DECORATOR_AMBIGUOUS: ErrorCode = ErrorCode("W4102");
    /// Applying a decorator produced no values
    pub const DECORATOR_NO_RESULT: ErrorCode = ErrorCode("W4103");
    /// Iteration was requested but `__iter__` is missing
    pub const MISSING_ITER: ErrorCode = ErrorCode("W4104");
    /// An iterator instance has no `__next__`
    pub const MISSING_NEXT: ErrorCode = ErrorCode("W4105");
    /// Indexing was requested but `__getitem__` is missing
    pub const MISSING_GETITEM: ErrorCode = ErrorCode("W4106");
    /// A star-import target could not be resolved
    pub const STAR_IMPORT_UNRESOLVED: ErrorCode = ErrorCode("W4107");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_is_warning() {
        let err = EvalError::SubscopeNotFound {
            name: "__call__".to_string(),
            on: "instance of C".to_string(),
        };
        let diag = Diagnostic::from_eval_error(&err);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.code, Some(ErrorCode("E4002")));
    }

    #[test]
    fn test_structural_misuse_is_error() {
        let err = EvalError::UnsupportedOperation {
            op: "path",
            on: "function f".to_string(),
        };
        let diag = Diagnostic::from_eval_error(&err);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code, Some(ErrorCode("E4003")));
    }

    #[test]
    fn test_json_output() {
        let diag = Diagnostic::warning("decorator not found")
            .with_code(codes::DECORATOR_UNRESOLVED)
            .with_span(Span::new(5, 9, 2, 1));
        let json = diag.to_json().unwrap();
        assert!(json.contains("\"W4101\""));
        assert!(json.contains("\"warning\""));
        assert!(json.contains("\"line\""));
    }
}
