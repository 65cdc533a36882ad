//! Typed event payloads, one struct per [`EventType`].

use super::EventType;
use crate::model::message::{AuthorType, MessageType};
use crate::model::ticket::{TicketPriority, TicketStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload for `ticket_created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedData {
    pub department_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub priority: TicketPriority,
    pub title: String,
}

/// Payload for `ticket_status_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Payload for `ticket_priority_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityChangedData {
    pub old_priority: TicketPriority,
    pub new_priority: TicketPriority,
}

/// Payload for `ticket_assigned`. A team reassignment carries no assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_staff_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// Payload for `ticket_message_added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAddedData {
    pub message_id: String,
    pub message_type: MessageType,
    pub author_type: AuthorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Trimmed body, shortened with a trailing `...` when too long.
    pub body_preview: String,
}

/// Payload for `ticket_tags_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsChangedData {
    pub old_tags: Vec<String>,
    pub new_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Created(CreatedData),
    StatusChanged(StatusChangedData),
    PriorityChanged(PriorityChangedData),
    Assigned(AssignedData),
    MessageAdded(MessageAddedData),
    TagsChanged(TagsChangedData),
}

impl EventPayload {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Created(_) => EventType::Created,
            Self::StatusChanged(_) => EventType::StatusChanged,
            Self::PriorityChanged(_) => EventType::PriorityChanged,
            Self::Assigned(_) => EventType::Assigned,
            Self::MessageAdded(_) => EventType::MessageAdded,
            Self::TagsChanged(_) => EventType::TagsChanged,
        }
    }

    /// Deserialize a JSON payload into the variant named by `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`DataParseError`] if the JSON does not match the schema for
    /// `event_type`.
    pub fn deserialize_for(
        event_type: EventType,
        json: serde_json::Value,
    ) -> Result<Self, DataParseError> {
        let result = match event_type {
            EventType::Created => serde_json::from_value(json).map(Self::Created),
            EventType::StatusChanged => serde_json::from_value(json).map(Self::StatusChanged),
            EventType::PriorityChanged => {
                serde_json::from_value(json).map(Self::PriorityChanged)
            }
            EventType::Assigned => serde_json::from_value(json).map(Self::Assigned),
            EventType::MessageAdded => serde_json::from_value(json).map(Self::MessageAdded),
            EventType::TagsChanged => serde_json::from_value(json).map(Self::TagsChanged),
        };
        result.map_err(|source| DataParseError { event_type, source })
    }
}

impl Serialize for EventPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Created(d) => d.serialize(serializer),
            Self::StatusChanged(d) => d.serialize(serializer),
            Self::PriorityChanged(d) => d.serialize(serializer),
            Self::Assigned(d) => d.serialize(serializer),
            Self::MessageAdded(d) => d.serialize(serializer),
            Self::TagsChanged(d) => d.serialize(serializer),
        }
    }
}

/// Error returned when a payload does not match its event type.
#[derive(Debug)]
pub struct DataParseError {
    pub event_type: EventType,
    pub source: serde_json::Error,
}

impl fmt::Display for DataParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid payload for {}: {}",
            self.event_type, self.source
        )
    }
}

impl std::error::Error for DataParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
