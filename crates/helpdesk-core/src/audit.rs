//! History recording and event publication shared by both engines.

use crate::context::RequestContext;
use crate::error::Result;
use crate::event::{EventBus, TicketEvent};
use crate::model::history::{HistoryChange, TicketHistory};
use crate::model::message::AuthorType;
use crate::model::ticket::Ticket;
use crate::store::TicketStore;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Current time at store precision (microseconds).
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `TCK-` followed by the first 8 hex digits of a fresh UUID, uppercased.
#[must_use]
pub fn generate_external_key() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TCK-{}", hex[..8].to_ascii_uppercase())
}

/// Trimmed `body`, cut to `max` characters with a trailing `...` when longer.
/// Limits of three or fewer characters leave no room for the ellipsis.
#[must_use]
pub fn body_preview(body: &str, max: usize) -> String {
    let body = body.trim();
    if body.chars().count() <= max {
        return body.to_string();
    }
    if max <= 3 {
        return body.chars().take(max).collect();
    }
    let mut preview: String = body.chars().take(max - 3).collect();
    preview.push_str("...");
    preview
}

/// Trim tags, drop empties, and drop repeats keeping the first occurrence.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// History entries for one mutation, sharing actor and timestamp.
#[derive(Debug)]
pub(crate) struct ChangeSet {
    ticket_id: String,
    changed_by_type: AuthorType,
    changed_by_id: Option<String>,
    at: DateTime<Utc>,
    entries: Vec<TicketHistory>,
}

impl ChangeSet {
    pub(crate) fn new(
        ticket: &Ticket,
        changed_by_type: AuthorType,
        changed_by_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: ticket.id.clone(),
            changed_by_type,
            changed_by_id: changed_by_id.map(str::to_string),
            at,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, change: HistoryChange) -> &mut Self {
        self.entries.push(TicketHistory {
            id: new_id(),
            ticket_id: self.ticket_id.clone(),
            changed_by_type: self.changed_by_type,
            changed_by_id: self.changed_by_id.clone(),
            change,
            created_at: self.at,
        });
        self
    }

    /// Final cancellation check, then write ticket and history atomically.
    pub(crate) fn commit(
        &self,
        ctx: &RequestContext,
        tickets: &dyn TicketStore,
        ticket: &Ticket,
    ) -> Result<()> {
        ctx.checkpoint()?;
        tickets.commit_change(ticket, &self.entries)?;
        for entry in &self.entries {
            tracing::debug!(
                ticket_id = %ticket.id,
                change_type = %entry.change_type(),
                "recorded ticket change"
            );
        }
        Ok(())
    }
}

/// Hand `event` to the bus, logging and swallowing any failure.
pub(crate) fn publish_best_effort(bus: &dyn EventBus, ctx: &RequestContext, event: &TicketEvent) {
    if let Err(error) = bus.publish(ctx, event) {
        tracing::warn!(
            event_type = %event.event_type,
            ticket_id = %event.ticket_id,
            %error,
            "event publish failed; mutation already committed"
        );
    }
}
