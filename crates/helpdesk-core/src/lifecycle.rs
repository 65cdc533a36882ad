//! Ticket creation, status and priority changes, messages, and the
//! requester and staff read paths.
//!
//! Every mutation goes through [`ChangeSet::commit`], which writes the ticket
//! and its history entries in one store call, and only then publishes an
//! event.

use crate::access::AccessScopeGuard;
use crate::audit::{self, ChangeSet};
use crate::config::EngineSettings;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::event::{
    CreatedData, EventActor, EventBus, EventPayload, MessageAddedData, PriorityChangedData,
    StatusChangedData, TagsChangedData, TicketEvent,
};
use crate::model::history::{HistoryChange, TicketHistory};
use crate::model::message::{
    AttachmentReference, AuthorType, MessageType, NewAttachment, SubjectType, TicketMessage,
};
use crate::model::org::StaffMember;
use crate::model::ticket::{Ticket, TicketPriority, TicketStatus};
use crate::store::{Page, Repositories, TicketFilter};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Requester-supplied fields for a new ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTicketInput {
    pub department_id: String,
    pub team_id: Option<String>,
    pub title: String,
    pub description: String,
    /// `None` means `MEDIUM`.
    pub priority: Option<TicketPriority>,
    pub tags: Vec<String>,
}

/// Who is posting a message.
///
/// Staff posts must carry the staff record as context; a staff post without
/// it is rejected.
#[derive(Debug, Clone, Copy)]
pub struct MessageActor<'a> {
    pub actor_type: SubjectType,
    pub actor_id: &'a str,
    pub staff: Option<&'a StaffMember>,
}

impl<'a> MessageActor<'a> {
    #[must_use]
    pub const fn user(user_id: &'a str) -> Self {
        Self {
            actor_type: SubjectType::User,
            actor_id: user_id,
            staff: None,
        }
    }

    #[must_use]
    pub fn staff(staff: &'a StaffMember) -> Self {
        Self {
            actor_type: SubjectType::Staff,
            actor_id: &staff.id,
            staff: Some(staff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub message_type: MessageType,
    pub body: String,
    pub attachments: Vec<NewAttachment>,
}

/// A ticket with the messages the caller is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

/// Requester listing criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTicketQuery {
    pub statuses: Vec<TicketStatus>,
    pub priorities: Vec<TicketPriority>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: Page,
}

/// Staff listing criteria, narrowed to the caller's scope before querying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffTicketQuery {
    pub department_id: Option<String>,
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    pub statuses: Vec<TicketStatus>,
    pub priorities: Vec<TicketPriority>,
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
    pub page: Page,
}

pub struct TicketLifecycleEngine {
    repos: Repositories,
    events: Arc<dyn EventBus>,
    settings: EngineSettings,
}

impl std::fmt::Debug for TicketLifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketLifecycleEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

pub(crate) fn require_staff(staff: Option<&StaffMember>) -> Result<&StaffMember> {
    staff.ok_or_else(|| Error::Unauthorized("staff required".into()))
}

fn ensure_access(staff: &StaffMember, ticket: &Ticket) -> Result<()> {
    if AccessScopeGuard::can_access(staff, ticket) {
        Ok(())
    } else {
        Err(Error::access_denied("access denied"))
    }
}

fn ensure_requester(user_id: &str, ticket: &Ticket) -> Result<()> {
    if ticket.requester_id == user_id {
        Ok(())
    } else {
        Err(Error::access_denied("access denied"))
    }
}

fn validate_attachment(attachment: &NewAttachment) -> Result<()> {
    if attachment.storage_key.trim().is_empty() {
        return Err(Error::validation("attachment storage key is required"));
    }
    if attachment.file_name.trim().is_empty() {
        return Err(Error::validation("attachment file name is required"));
    }
    Ok(())
}

impl TicketLifecycleEngine {
    #[must_use]
    pub fn new(repos: Repositories, events: Arc<dyn EventBus>, settings: EngineSettings) -> Self {
        Self {
            repos,
            events,
            settings,
        }
    }

    fn publish(&self, ctx: &RequestContext, ticket: &Ticket, actor: EventActor, payload: EventPayload) {
        let event = TicketEvent::new(ticket.id.clone(), actor, audit::now(), payload);
        audit::publish_best_effort(self.events.as_ref(), ctx, &event);
    }

    /// Open a new ticket on behalf of `requester_id`.
    ///
    /// No history entry is written for creation.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank title or requester
    /// - `NotFound` for an unknown department or team
    /// - `Conflict` for an inactive department or team, or a team outside
    ///   the department
    pub fn create_ticket(
        &self,
        ctx: &RequestContext,
        requester_id: &str,
        input: CreateTicketInput,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        if requester_id.trim().is_empty() {
            return Err(Error::validation("requester is required"));
        }
        let title = input.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title is required"));
        }

        let department = self.repos.department(&input.department_id)?;
        if !department.active {
            return Err(Error::conflict("department inactive"));
        }
        if let Some(team_id) = input.team_id.as_deref() {
            let team = self.repos.team(team_id)?;
            if !team.active {
                return Err(Error::conflict("team inactive"));
            }
            if team.department_id != department.id {
                return Err(Error::conflict("team not part of department"));
            }
        }

        let now = audit::now();
        let ticket = Ticket {
            id: audit::new_id(),
            external_key: audit::generate_external_key(),
            requester_id: requester_id.to_string(),
            department_id: department.id,
            team_id: input.team_id,
            assignee_id: None,
            title: title.to_string(),
            description: input.description.trim().to_string(),
            status: TicketStatus::Open,
            priority: input.priority.unwrap_or_default(),
            tags: audit::normalize_tags(&input.tags),
            created_at: now,
            updated_at: now,
            closed_at: None,
        };

        ctx.checkpoint()?;
        self.repos.tickets.create(&ticket)?;
        tracing::info!(
            ticket_id = %ticket.id,
            key = %ticket.external_key,
            department_id = %ticket.department_id,
            "ticket created"
        );

        self.publish(
            ctx,
            &ticket,
            EventActor::user(requester_id),
            EventPayload::Created(CreatedData {
                department_id: ticket.department_id.clone(),
                team_id: ticket.team_id.clone(),
                priority: ticket.priority,
                title: ticket.title.clone(),
            }),
        );
        Ok(ticket)
    }

    /// Post a message to a ticket thread.
    ///
    /// Requesters may only post public replies to their own tickets. Staff
    /// need scope on the ticket and may post replies or internal notes.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, or `Validation` for a disallowed message
    /// type, missing staff context, an empty message, or bad attachment
    /// metadata.
    pub fn add_message(
        &self,
        ctx: &RequestContext,
        actor: MessageActor<'_>,
        ticket_id: &str,
        input: NewMessage,
    ) -> Result<TicketMessage> {
        ctx.checkpoint()?;
        let ticket = self.repos.ticket(ticket_id)?;

        let (author_type, author_id) = match actor.actor_type {
            SubjectType::User => {
                ensure_requester(actor.actor_id, &ticket)?;
                if input.message_type != MessageType::PublicReply {
                    return Err(Error::validation("users can only post public replies"));
                }
                (AuthorType::User, ticket.requester_id.clone())
            }
            SubjectType::Staff => {
                let staff = actor
                    .staff
                    .ok_or_else(|| Error::validation("staff context required"))?;
                ensure_access(staff, &ticket)?;
                if !matches!(
                    input.message_type,
                    MessageType::PublicReply | MessageType::InternalNote
                ) {
                    return Err(Error::validation("invalid message type for staff"));
                }
                (AuthorType::Staff, staff.id.clone())
            }
        };

        let body = input.body.trim().to_string();
        if body.is_empty() && input.attachments.is_empty() {
            return Err(Error::validation("message body is required"));
        }
        input
            .attachments
            .iter()
            .try_for_each(validate_attachment)?;

        let now = audit::now();
        let mut message = TicketMessage {
            id: audit::new_id(),
            ticket_id: ticket.id.clone(),
            author_type,
            author_id: Some(author_id),
            message_type: input.message_type,
            body,
            attachments: Vec::new(),
            created_at: now,
        };
        let attachments: Vec<AttachmentReference> = input
            .attachments
            .into_iter()
            .map(|a| AttachmentReference {
                id: audit::new_id(),
                message_id: message.id.clone(),
                storage_key: a.storage_key.trim().to_string(),
                file_name: a.file_name.trim().to_string(),
                mime_type: a.mime_type,
                size_bytes: a.size_bytes,
                created_at: now,
            })
            .collect();

        ctx.checkpoint()?;
        self.repos
            .messages
            .create_with_attachments(&message, &attachments)?;
        message.attachments = attachments;
        tracing::debug!(
            ticket_id = %ticket.id,
            message_id = %message.id,
            message_type = %message.message_type,
            "message added"
        );

        self.publish(
            ctx,
            &ticket,
            EventActor::from_subject(actor.actor_type, actor.actor_id),
            EventPayload::MessageAdded(MessageAddedData {
                message_id: message.id.clone(),
                message_type: message.message_type,
                author_type: message.author_type,
                author_id: message.author_id.clone(),
                body_preview: audit::body_preview(
                    &message.body,
                    self.settings.message_preview_chars,
                ),
            }),
        );
        Ok(message)
    }

    /// Move a ticket along the status table.
    ///
    /// Entering `CLOSED` stamps `closed_at`; any other target clears it.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, `AccessDenied`, or
    /// `Conflict` for a transition not in the table.
    pub fn update_status(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
        new_status: TicketStatus,
        comment: &str,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;
        ticket
            .status
            .can_transition_to(new_status)
            .map_err(|e| Error::conflict(e.to_string()))?;

        let now = audit::now();
        let old_status = ticket.status;
        ticket.status = new_status;
        ticket.closed_at = (new_status == TicketStatus::Closed).then_some(now);
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&staff.id), now);
        changes.record(HistoryChange::StatusChange {
            old: old_status,
            new: new_status,
            comment: comment.to_string(),
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        self.publish(
            ctx,
            &ticket,
            EventActor::staff(&staff.id),
            EventPayload::StatusChanged(StatusChangedData {
                old_status,
                new_status,
                comment: comment.to_string(),
            }),
        );
        Ok(ticket)
    }

    /// Set a ticket's priority. A history entry is written even when the
    /// value does not change.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, or `AccessDenied`.
    pub fn update_priority(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
        new_priority: TicketPriority,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;

        let now = audit::now();
        let old_priority = ticket.priority;
        ticket.priority = new_priority;
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&staff.id), now);
        changes.record(HistoryChange::PriorityChange {
            old: old_priority,
            new: new_priority,
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        self.publish(
            ctx,
            &ticket,
            EventActor::staff(&staff.id),
            EventPayload::PriorityChanged(PriorityChangedData {
                old_priority,
                new_priority,
            }),
        );
        Ok(ticket)
    }

    /// Replace a ticket's tags. Tags are trimmed, blanks dropped, and
    /// repeats collapsed keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, or `AccessDenied`.
    pub fn update_tags(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
        tags: &[String],
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;

        let now = audit::now();
        let old_tags = std::mem::replace(&mut ticket.tags, audit::normalize_tags(tags));
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&staff.id), now);
        changes.record(HistoryChange::TagsChange {
            old: old_tags.clone(),
            new: ticket.tags.clone(),
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        self.publish(
            ctx,
            &ticket,
            EventActor::staff(&staff.id),
            EventPayload::TagsChanged(TagsChangedData {
                old_tags,
                new_tags: ticket.tags.clone(),
            }),
        );
        Ok(ticket)
    }

    /// Let the requester close their own ticket from `RESOLVED` or
    /// `PENDING_USER`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied` for anyone but the requester, or
    /// `Conflict` from any other status.
    pub fn close_ticket_as_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        ticket_id: &str,
    ) -> Result<Ticket> {
        const COMMENT: &str = "user_closed";

        ctx.checkpoint()?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_requester(user_id, &ticket)?;
        if !ticket.status.is_user_closable() {
            return Err(Error::conflict("ticket cannot be closed in current status"));
        }

        let now = audit::now();
        let old_status = ticket.status;
        ticket.status = TicketStatus::Closed;
        ticket.closed_at = Some(now);
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::User, Some(user_id), now);
        changes.record(HistoryChange::StatusChange {
            old: old_status,
            new: TicketStatus::Closed,
            comment: COMMENT.to_string(),
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        self.publish(
            ctx,
            &ticket,
            EventActor::user(user_id),
            EventPayload::StatusChanged(StatusChangedData {
                old_status,
                new_status: TicketStatus::Closed,
                comment: COMMENT.to_string(),
            }),
        );
        Ok(ticket)
    }

    fn messages_with_attachments(&self, ticket_id: &str) -> Result<Vec<TicketMessage>> {
        let mut messages = self.repos.messages.list_by_ticket(ticket_id)?;
        for message in &mut messages {
            message.attachments = self.repos.attachments.list_by_message(&message.id)?;
        }
        Ok(messages)
    }

    /// The requester's view: internal notes are never included.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn get_ticket_for_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        ticket_id: &str,
    ) -> Result<TicketView> {
        ctx.checkpoint()?;
        let ticket = self.repos.ticket(ticket_id)?;
        ensure_requester(user_id, &ticket)?;
        let messages = self
            .messages_with_attachments(&ticket.id)?
            .into_iter()
            .filter(|m| m.message_type.visible_to_requester())
            .collect();
        Ok(TicketView { ticket, messages })
    }

    /// The staff view: every message, internal notes included.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, or `AccessDenied`.
    pub fn get_ticket_for_staff(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
    ) -> Result<TicketView> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;
        let messages = self.messages_with_attachments(&ticket.id)?;
        Ok(TicketView { ticket, messages })
    }

    /// Status, assignee and team changes from the newest
    /// `user_history_limit` entries.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn list_history_for_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        ticket_id: &str,
    ) -> Result<Vec<TicketHistory>> {
        ctx.checkpoint()?;
        let ticket = self.repos.ticket(ticket_id)?;
        ensure_requester(user_id, &ticket)?;
        let entries = self
            .repos
            .history
            .list_by_ticket(&ticket.id, Page::new(self.settings.user_history_limit, 0))?;
        Ok(entries
            .into_iter()
            .filter(|h| h.change_type().visible_to_requester())
            .collect())
    }

    /// Every history entry, newest first, one page at a time.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, or `AccessDenied`.
    pub fn list_history_for_staff(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
        page: Page,
    ) -> Result<Vec<TicketHistory>> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;
        let page = page.normalized(self.settings.default_page_limit, self.settings.max_page_limit);
        Ok(self.repos.history.list_by_ticket(&ticket.id, page)?)
    }

    /// The requester's own tickets, most recently updated first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn list_user_tickets(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: UserTicketQuery,
    ) -> Result<Vec<Ticket>> {
        ctx.checkpoint()?;
        let filter = TicketFilter {
            requester_id: Some(user_id.to_string()),
            statuses: query.statuses,
            priorities: query.priorities,
            created_from: query.created_from,
            created_to: query.created_to,
            page: query
                .page
                .normalized(self.settings.default_page_limit, self.settings.max_page_limit),
            ..TicketFilter::default()
        };
        Ok(self.repos.tickets.list_with_filter(&filter)?)
    }

    /// Tickets within the caller's scope that match `query`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, or store failures.
    pub fn list_staff_tickets(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        query: StaffTicketQuery,
    ) -> Result<Vec<Ticket>> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let filter = TicketFilter {
            department_id: query.department_id,
            team_id: query.team_id,
            assignee_id: query.assignee_id,
            statuses: query.statuses,
            priorities: query.priorities,
            search: query.search,
            created_from: query.created_from,
            created_to: query.created_to,
            updated_from: query.updated_from,
            updated_to: query.updated_to,
            page: query
                .page
                .normalized(self.settings.default_page_limit, self.settings.max_page_limit),
            ..TicketFilter::default()
        };
        let filter = AccessScopeGuard::narrow_list_filter(filter, staff);
        Ok(self.repos.tickets.list_with_filter(&filter)?)
    }
}
