use super::{ParseEnumError, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which kind of principal is calling the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectType {
    User,
    Staff,
}

/// Who authored a message or a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorType {
    User,
    Staff,
    System,
}

impl AuthorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Staff => "STAFF",
            Self::System => "SYSTEM",
        }
    }
}

impl From<SubjectType> for AuthorType {
    fn from(subject: SubjectType) -> Self {
        match subject {
            SubjectType::User => Self::User,
            SubjectType::Staff => Self::Staff,
        }
    }
}

/// Visibility class of a message in a ticket thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Visible to the requester.
    PublicReply,
    /// Staff-only.
    InternalNote,
    SystemEvent,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicReply => "PUBLIC_REPLY",
            Self::InternalNote => "INTERNAL_NOTE",
            Self::SystemEvent => "SYSTEM_EVENT",
        }
    }

    /// Whether the requester may ever see a message of this type.
    #[must_use]
    pub const fn visible_to_requester(self) -> bool {
        !matches!(self, Self::InternalNote)
    }
}

/// A message in a ticket thread, with its attachments populated on reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: String,
    pub ticket_id: String,
    pub author_type: AuthorType,
    pub author_id: Option<String>,
    pub message_type: MessageType,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentReference>,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata. The binary payload lives in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentReference {
    pub id: String,
    pub message_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata supplied by a caller posting a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttachment {
    pub storage_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "USER",
            Self::Staff => "STAFF",
        })
    }
}

impl fmt::Display for AuthorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "USER" => Ok(Self::User),
            "STAFF" => Ok(Self::Staff),
            "SYSTEM" => Ok(Self::System),
            _ => Err(ParseEnumError {
                expected: "author type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for MessageType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "PUBLIC_REPLY" | "REPLY" => Ok(Self::PublicReply),
            "INTERNAL_NOTE" | "NOTE" => Ok(Self::InternalNote),
            "SYSTEM_EVENT" => Ok(Self::SystemEvent),
            _ => Err(ParseEnumError {
                expected: "message type",
                got: s.to_string(),
            }),
        }
    }
}
