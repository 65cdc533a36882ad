use super::{ParseEnumError, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Operator roles, in increasing order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Agent,
    TeamLead,
    Admin,
}

impl StaffRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "AGENT",
            Self::TeamLead => "TEAM_LEAD",
            Self::Admin => "ADMIN",
        }
    }

    /// Roles allowed to bind other staff or teams to a ticket.
    #[must_use]
    pub const fn can_assign_others(self) -> bool {
        matches!(self, Self::TeamLead | Self::Admin)
    }
}

/// A support agent, team lead or administrator.
///
/// `department_id` and `team_id` define the staff member's scope; both are
/// optional and an admin ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    pub department_id: Option<String>,
    pub team_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl StaffMember {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == StaffRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A sub-group of a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub department_id: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "AGENT" => Ok(Self::Agent),
            "TEAM_LEAD" | "LEAD" => Ok(Self::TeamLead),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(ParseEnumError {
                expected: "staff role",
                got: s.to_string(),
            }),
        }
    }
}
