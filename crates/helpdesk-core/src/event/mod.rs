//! Ticket notifications.
//!
//! Events are published after the mutation they describe has been
//! committed. Delivery is at-most-once and best-effort with no ordering
//! guarantee, either across tickets or within one ticket's stream. A failed
//! publish never rolls back the mutation.

pub mod bus;
pub mod data;
pub mod types;

pub use bus::{EventBus, EventHandler, HandlerError, InMemoryEventBus, PublishError};
pub use data::{
    AssignedData, CreatedData, DataParseError, EventPayload, MessageAddedData,
    PriorityChangedData, StatusChangedData, TagsChangedData,
};
pub use types::{EventType, UnknownEventType};

use crate::model::message::SubjectType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventActor {
    #[serde(rename = "type")]
    pub actor_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
}

impl EventActor {
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            actor_type: SubjectType::User,
            user_id: Some(id.into()),
            staff_id: None,
        }
    }

    #[must_use]
    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            actor_type: SubjectType::Staff,
            user_id: None,
            staff_id: Some(id.into()),
        }
    }

    #[must_use]
    pub fn from_subject(subject: SubjectType, id: impl Into<String>) -> Self {
        match subject {
            SubjectType::User => Self::user(id),
            SubjectType::Staff => Self::staff(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub ticket_id: String,
    pub actor: EventActor,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl TicketEvent {
    /// Build an event with a fresh id; the type follows the payload.
    #[must_use]
    pub fn new(
        ticket_id: impl Into<String>,
        actor: EventActor,
        timestamp: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: payload.event_type(),
            ticket_id: ticket_id.into(),
            actor,
            timestamp,
            payload,
        }
    }
}

impl<'de> Deserialize<'de> for TicketEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// First pass reads the type, second pass types the payload.
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            #[serde(rename = "type")]
            event_type: EventType,
            ticket_id: String,
            actor: EventActor,
            timestamp: DateTime<Utc>,
            payload: serde_json::Value,
        }

        let raw = Raw::deserialize(deserializer)?;
        let payload = EventPayload::deserialize_for(raw.event_type, raw.payload)
            .map_err(serde::de::Error::custom)?;

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            ticket_id: raw.ticket_id,
            actor: raw.actor,
            timestamp: raw.timestamp,
            payload,
        })
    }
}
