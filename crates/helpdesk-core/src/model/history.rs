//! Audit history entries.
//!
//! Inside the engine a change is a [`HistoryChange`] variant keyed by its
//! [`ChangeType`]. At the persistence boundary it is flattened into a
//! `change_type` column plus generic JSON `old_value` / `new_value`
//! documents, and [`HistoryChange::from_payload`] restores the variant.
//!
//! Entries are append-only: no store exposes an update or delete.

use super::message::AuthorType;
use super::ticket::{TicketPriority, TicketStatus};
use super::{ParseEnumError, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{fmt, str::FromStr};

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    StatusChange,
    AssigneeChange,
    PriorityChange,
    TeamChange,
    DepartmentChange,
    TagsChange,
}

impl ChangeType {
    pub const ALL: [Self; 6] = [
        Self::StatusChange,
        Self::AssigneeChange,
        Self::PriorityChange,
        Self::TeamChange,
        Self::DepartmentChange,
        Self::TagsChange,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "STATUS_CHANGE",
            Self::AssigneeChange => "ASSIGNEE_CHANGE",
            Self::PriorityChange => "PRIORITY_CHANGE",
            Self::TeamChange => "TEAM_CHANGE",
            Self::DepartmentChange => "DEPARTMENT_CHANGE",
            Self::TagsChange => "TAGS_CHANGE",
        }
    }

    /// Priority, department and tag changes are staff-only.
    #[must_use]
    pub const fn visible_to_requester(self) -> bool {
        matches!(
            self,
            Self::StatusChange | Self::AssigneeChange | Self::TeamChange
        )
    }
}

/// Typed old/new values of a single field-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryChange {
    StatusChange {
        old: TicketStatus,
        new: TicketStatus,
        comment: String,
    },
    PriorityChange {
        old: TicketPriority,
        new: TicketPriority,
    },
    AssigneeChange {
        old: Option<String>,
        new: Option<String>,
    },
    TeamChange {
        old: Option<String>,
        new: Option<String>,
    },
    DepartmentChange {
        old: String,
        new: String,
    },
    TagsChange {
        old: Vec<String>,
        new: Vec<String>,
    },
}

impl HistoryChange {
    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        match self {
            Self::StatusChange { .. } => ChangeType::StatusChange,
            Self::PriorityChange { .. } => ChangeType::PriorityChange,
            Self::AssigneeChange { .. } => ChangeType::AssigneeChange,
            Self::TeamChange { .. } => ChangeType::TeamChange,
            Self::DepartmentChange { .. } => ChangeType::DepartmentChange,
            Self::TagsChange { .. } => ChangeType::TagsChange,
        }
    }

    /// Generic `old_value` document written to storage.
    #[must_use]
    pub fn old_value(&self) -> Value {
        match self {
            Self::StatusChange { old, .. } => json!({ "status": old }),
            Self::PriorityChange { old, .. } => json!({ "priority": old }),
            Self::AssigneeChange { old, .. } => json!({ "assignee_staff_id": old }),
            Self::TeamChange { old, .. } => json!({ "team_id": old }),
            Self::DepartmentChange { old, .. } => json!({ "department_id": old }),
            Self::TagsChange { old, .. } => json!({ "tags": old }),
        }
    }

    /// Generic `new_value` document written to storage.
    #[must_use]
    pub fn new_value(&self) -> Value {
        match self {
            Self::StatusChange { new, comment, .. } => {
                json!({ "status": new, "comment": comment })
            }
            Self::PriorityChange { new, .. } => json!({ "priority": new }),
            Self::AssigneeChange { new, .. } => json!({ "assignee_staff_id": new }),
            Self::TeamChange { new, .. } => json!({ "team_id": new }),
            Self::DepartmentChange { new, .. } => json!({ "department_id": new }),
            Self::TagsChange { new, .. } => json!({ "tags": new }),
        }
    }

    /// Rebuild the typed change from its stored documents.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] if either document does not match the
    /// schema for `change_type`.
    pub fn from_payload(
        change_type: ChangeType,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<Self, PayloadError> {
        let wrap = |source: serde_json::Error| PayloadError {
            change_type,
            source,
        };
        let change = match change_type {
            ChangeType::StatusChange => {
                let old: StatusDoc = serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: StatusDoc = serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::StatusChange {
                    old: old.status,
                    new: new.status,
                    comment: new.comment.unwrap_or_default(),
                }
            }
            ChangeType::PriorityChange => {
                let old: PriorityDoc =
                    serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: PriorityDoc =
                    serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::PriorityChange {
                    old: old.priority,
                    new: new.priority,
                }
            }
            ChangeType::AssigneeChange => {
                let old: AssigneeDoc =
                    serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: AssigneeDoc =
                    serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::AssigneeChange {
                    old: old.assignee_staff_id,
                    new: new.assignee_staff_id,
                }
            }
            ChangeType::TeamChange => {
                let old: TeamDoc = serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: TeamDoc = serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::TeamChange {
                    old: old.team_id,
                    new: new.team_id,
                }
            }
            ChangeType::DepartmentChange => {
                let old: DepartmentDoc =
                    serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: DepartmentDoc =
                    serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::DepartmentChange {
                    old: old.department_id,
                    new: new.department_id,
                }
            }
            ChangeType::TagsChange => {
                let old: TagsDoc = serde_json::from_value(old_value.clone()).map_err(wrap)?;
                let new: TagsDoc = serde_json::from_value(new_value.clone()).map_err(wrap)?;
                Self::TagsChange {
                    old: old.tags,
                    new: new.tags,
                }
            }
        };
        Ok(change)
    }
}

#[derive(Deserialize)]
struct StatusDoc {
    status: TicketStatus,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Deserialize)]
struct PriorityDoc {
    priority: TicketPriority,
}

#[derive(Deserialize)]
struct AssigneeDoc {
    #[serde(default)]
    assignee_staff_id: Option<String>,
}

#[derive(Deserialize)]
struct TeamDoc {
    #[serde(default)]
    team_id: Option<String>,
}

#[derive(Deserialize)]
struct DepartmentDoc {
    department_id: String,
}

#[derive(Deserialize)]
struct TagsDoc {
    #[serde(default)]
    tags: Vec<String>,
}

/// An immutable audit record of one change to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketHistory {
    pub id: String,
    pub ticket_id: String,
    pub changed_by_type: AuthorType,
    pub changed_by_id: Option<String>,
    #[serde(flatten)]
    pub change: HistoryChange,
    pub created_at: DateTime<Utc>,
}

impl TicketHistory {
    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        self.change.change_type()
    }
}

/// Error returned when a stored history document does not match its
/// change type.
#[derive(Debug)]
pub struct PayloadError {
    pub change_type: ChangeType,
    pub source: serde_json::Error,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} history payload: {}",
            self.change_type, self.source
        )
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "STATUS_CHANGE" => Ok(Self::StatusChange),
            "ASSIGNEE_CHANGE" => Ok(Self::AssigneeChange),
            "PRIORITY_CHANGE" => Ok(Self::PriorityChange),
            "TEAM_CHANGE" => Ok(Self::TeamChange),
            "DEPARTMENT_CHANGE" => Ok(Self::DepartmentChange),
            "TAGS_CHANGE" => Ok(Self::TagsChange),
            _ => Err(ParseEnumError {
                expected: "change type",
                got: s.to_string(),
            }),
        }
    }
}
