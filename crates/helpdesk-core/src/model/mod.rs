//! Domain model for the helpdesk: tickets, messages, history, and the
//! organization (departments, teams, staff) that scopes access to them.

pub mod history;
pub mod message;
pub mod org;
pub mod ticket;

use std::fmt;

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

/// Canonical form for enum parsing: `in-progress`, `In_Progress` and
/// `IN_PROGRESS` all normalize to `IN_PROGRESS`.
pub(crate) fn normalize(input: &str) -> String {
    input.trim().replace('-', "_").to_ascii_uppercase()
}
