//! Diagnostic codes and error reporting
//!
//! Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - tooling matches on the string form.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // SQL front end (1xxx)
    /// Failed to parse SQL
    SqlParseError,

    // Macro expansion (2xxx)
    /// A registered macro was called with the wrong number of arguments
    MacroArityMismatch,

    /// A macro site could not be rendered into SQL
    MacroRenderError,

    // CTE placeholders (3xxx)
    /// A CTE placeholder has no usable name
    CteInvalidPlaceholder,

    /// The same CTE placeholder name was declared more than once
    CteDuplicateName,

    // Request handling (4xxx)
    /// The request payload was rejected before any SQL was touched
    RequestInvalid,

    /// The caller cancelled the request or its deadline expired
    RequestCancelled,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::MacroArityMismatch => "MACRO_ARITY_MISMATCH",
            Self::MacroRenderError => "MACRO_RENDER_ERROR",
            Self::CteInvalidPlaceholder => "CTE_INVALID_PLACEHOLDER",
            Self::CteDuplicateName => "CTE_DUPLICATE_NAME",
            Self::RequestInvalid => "REQUEST_INVALID",
            Self::RequestCancelled => "REQUEST_CANCELLED",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the query still renders, but probably not as intended
    Warn,

    /// Error - the request fails
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position inside the SQL text (1-indexed, as reported by the tokenizer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u64,
    pub column: u64,
}

impl Location {
    pub fn new(line: u64, column: u64) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Macro or CTE name the diagnostic is about
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            subject: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the subject (macro or CTE name)
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(DiagnosticCode::CteDuplicateName.as_str(), "CTE_DUPLICATE_NAME");
        assert_eq!(DiagnosticCode::RequestCancelled.to_string(), "REQUEST_CANCELLED");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::MacroArityMismatch,
            Severity::Error,
            "$__timeFilter expects 1 argument, got 0",
        )
        .with_location(Location::new(1, 23))
        .with_subject("$__timeFilter");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("MACRO_ARITY_MISMATCH"));
        assert!(json.contains("\"error\""));
        assert!(json.contains("\"column\":23"));
    }
}
