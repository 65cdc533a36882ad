use super::{ParseEnumError, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The six lifecycle states of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    PendingUser,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [Self; 6] = [
        Self::Open,
        Self::InProgress,
        Self::PendingUser,
        Self::Resolved,
        Self::Closed,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::PendingUser => "PENDING_USER",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// States reachable from `self` in one staff-driven step.
    ///
    /// | from | to |
    /// |---|---|
    /// | `OPEN` | `IN_PROGRESS`, `CANCELLED` |
    /// | `IN_PROGRESS` | `PENDING_USER`, `RESOLVED`, `CANCELLED` |
    /// | `PENDING_USER` | `IN_PROGRESS`, `RESOLVED`, `CANCELLED` |
    /// | `RESOLVED` | `CLOSED`, `IN_PROGRESS` |
    /// | `CLOSED`, `CANCELLED` | (none) |
    #[must_use]
    pub const fn allowed_next(self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::PendingUser, Self::Resolved, Self::Cancelled],
            Self::PendingUser => &[Self::InProgress, Self::Resolved, Self::Cancelled],
            Self::Resolved => &[Self::Closed, Self::InProgress],
            Self::Closed | Self::Cancelled => &[],
        }
    }

    /// `CLOSED` and `CANCELLED` have no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Statuses from which the requester may close their own ticket.
    #[must_use]
    pub const fn is_user_closable(self) -> bool {
        matches!(self, Self::Resolved | Self::PendingUser)
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `target` is not in
    /// [`allowed_next`](Self::allowed_next).
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidTransition> {
        if is_valid_transition(self, target) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

/// Pure lookup into the static transition table.
#[must_use]
pub fn is_valid_transition(from: TicketStatus, to: TicketStatus) -> bool {
    from.allowed_next().contains(&to)
}

/// SLA urgency of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

/// The ticket aggregate.
///
/// If `team_id` is set, the team belongs to `department_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub external_key: String,
    pub requester_id: String,
    pub department_id: String,
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Error returned when a status transition is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid status transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "OPEN" => Ok(Self::Open),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PENDING_USER" => Ok(Self::PendingUser),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for TicketPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
