//! Engine error taxonomy.
//!
//! Every engine operation returns [`Error`]. Callers branch on
//! [`Error::kind`], which collapses the variants into the five kinds a
//! transport layer maps to responses.

use crate::store::StoreError;
use std::fmt;

/// Result alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The entity a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Ticket,
    Staff,
    Team,
    Department,
}

impl Resource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Staff => "staff",
            Self::Team => "team",
            Self::Department => "department",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    /// No staff principal was supplied to a staff-only operation.
    #[error("{0}")]
    Unauthorized(String),

    /// Scope or role violation.
    #[error("{0}")]
    AccessDenied(String),

    /// Business-rule violation.
    #[error("{0}")]
    Conflict(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub(crate) fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) | Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Cancelled | Self::DeadlineExceeded | Self::Store(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

/// Coarse error classes, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AccessDenied,
    Conflict,
    Infrastructure,
}

impl ErrorKind {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "E1001",
            Self::NotFound => "E2001",
            Self::AccessDenied => "E3001",
            Self::Conflict => "E4001",
            Self::Infrastructure => "E9001",
        }
    }

    /// Snake-case label used in JSON output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Conflict => "conflict",
            Self::Infrastructure => "infrastructure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::Validation => Some("Check the request fields and retry."),
            Self::NotFound => None,
            Self::AccessDenied => {
                Some("Act as a staff member whose team or department owns the ticket.")
            }
            Self::Conflict => {
                Some("Reload the ticket; its status or the org roster no longer allows this.")
            }
            Self::Infrastructure => Some("Retry once. If persistent, check the store and logs."),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, Resource};
    use crate::store::StoreError;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::AccessDenied,
            ErrorKind::Conflict,
            ErrorKind::Infrastructure,
        ];

        let mut seen = HashSet::new();
        for kind in all {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorKind::Conflict.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn variants_collapse_into_kinds() {
        assert_eq!(
            Error::Unauthorized("staff required".into()).kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Infrastructure);
        assert_eq!(
            Error::from(StoreError::Unavailable("lock poisoned".into())).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            Error::not_found(Resource::Team, "t-9").to_string(),
            "team not found: t-9"
        );
    }
}
