//! Event type catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Notifications emitted after a ticket mutation is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Created,
    StatusChanged,
    PriorityChanged,
    Assigned,
    MessageAdded,
    TagsChanged,
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of ticket_created, \
             ticket_status_changed, ticket_priority_changed, ticket_assigned, \
             ticket_message_added, ticket_tags_changed",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::StatusChanged,
        Self::PriorityChanged,
        Self::Assigned,
        Self::MessageAdded,
        Self::TagsChanged,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "ticket_created",
            Self::StatusChanged => "ticket_status_changed",
            Self::PriorityChanged => "ticket_priority_changed",
            Self::Assigned => "ticket_assigned",
            Self::MessageAdded => "ticket_message_added",
            Self::TagsChanged => "ticket_tags_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
