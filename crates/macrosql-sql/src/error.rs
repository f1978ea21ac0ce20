//! Errors of the interpolation and extraction paths

use macrosql_core::{Cancelled, Diagnostic, DiagnosticCode, Location, Severity, TimeRangeError};
use crate::parser::ParseError;
use crate::walker::{ShapeError, ShapeTarget};

/// Interpolation / CTE extraction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Raw SQL does not parse; displayed as `line L:C message`
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A registered macro was used with an argument shape it does not accept
    #[error("failed to interpolate {macro_name}: {message}")]
    MacroShape {
        macro_name: String,
        message: String,
        location: Option<Location>,
    },

    /// A macro site could not be rendered
    #[error("failed to interpolate {macro_name}: {message}")]
    Interpolation {
        macro_name: String,
        message: String,
        location: Option<Location>,
    },

    #[error("invalid CTE placeholder {name}: {message}")]
    InvalidCte {
        name: String,
        message: String,
        location: Option<Location>,
    },

    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Coarse classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Interpolation,
    InvalidCte,
    Request,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::MacroShape { .. } | Self::Interpolation { .. } => ErrorKind::Interpolation,
            Self::InvalidCte { .. } => ErrorKind::InvalidCte,
            Self::TimeRange(_) => ErrorKind::Request,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Parse(e) => e.location,
            Self::MacroShape { location, .. }
            | Self::Interpolation { location, .. }
            | Self::InvalidCte { location, .. } => *location,
            Self::TimeRange(_) | Self::Cancelled(_) => None,
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (code, subject) = match self {
            Self::Parse(e) => return e.to_diagnostic(),
            Self::MacroShape { macro_name, .. } => (DiagnosticCode::MacroArityMismatch, Some(macro_name)),
            Self::Interpolation { macro_name, .. } => (DiagnosticCode::MacroRenderError, Some(macro_name)),
            Self::InvalidCte { name, .. } => (DiagnosticCode::CteInvalidPlaceholder, Some(name)),
            Self::TimeRange(_) => (DiagnosticCode::RequestInvalid, None),
            Self::Cancelled(_) => (DiagnosticCode::RequestCancelled, None),
        };

        let mut diag = Diagnostic::new(code, Severity::Error, self.to_string());
        if let Some(location) = self.location() {
            diag = diag.with_location(location);
        }
        if let Some(subject) = subject {
            diag = diag.with_subject(subject.clone());
        }
        diag
    }
}

impl From<ShapeError> for Error {
    fn from(error: ShapeError) -> Self {
        match error.target {
            ShapeTarget::Call => Self::MacroShape {
                macro_name: error.name,
                message: error.message,
                location: error.location,
            },
            ShapeTarget::Cte => Self::InvalidCte {
                name: error.name,
                message: error.message,
                location: error.location,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_errors_map_by_target() {
        let call = ShapeError {
            name: "$__timeFilter".to_string(),
            message: "expects 1 argument(s), got 0".to_string(),
            target: ShapeTarget::Call,
            location: Some(Location::new(1, 23)),
        };
        let error = Error::from(call);
        assert_eq!(error.kind(), ErrorKind::Interpolation);
        assert_eq!(error.to_string(), "failed to interpolate $__timeFilter: expects 1 argument(s), got 0");

        let diag = error.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::MacroArityMismatch);
        assert_eq!(diag.subject.as_deref(), Some("$__timeFilter"));
        assert_eq!(diag.location, Some(Location::new(1, 23)));

        let cte = ShapeError {
            name: "$__".to_string(),
            message: "placeholder CTE has no name after the macro prefix".to_string(),
            target: ShapeTarget::Cte,
            location: None,
        };
        assert_eq!(Error::from(cte).kind(), ErrorKind::InvalidCte);
    }

    #[test]
    fn cancellation_is_distinct() {
        let error = Error::from(Cancelled::DeadlineExceeded);
        assert!(error.is_cancelled());
        assert_eq!(error.to_string(), "context deadline exceeded");
        assert_eq!(error.to_diagnostic().code, DiagnosticCode::RequestCancelled);
    }
}
