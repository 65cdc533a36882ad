//! Collaborator contracts consumed by the engines.
//!
//! Every trait is object safe and `Send + Sync`; engines hold them as
//! `Arc<dyn ...>` inside [`Repositories`]. Two implementations ship with the
//! crate: [`memory::MemoryStore`] and [`crate::db::SqliteStore`].
//!
//! The one write the engines rely on for their audit invariant is
//! [`TicketStore::commit_change`]: the ticket row and its history rows land
//! together or not at all.

pub mod memory;

use crate::error::{Error, Resource};
use crate::model::history::{PayloadError, TicketHistory};
use crate::model::message::{AttachmentReference, TicketMessage};
use crate::model::org::{Department, StaffMember, StaffRole, Team};
use crate::model::ticket::{Ticket, TicketPriority, TicketStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use memory::MemoryStore;

/// Failure raised by a store implementation.
///
/// Engines surface every variant as an infrastructure error; none are
/// swallowed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    History(#[from] PayloadError),

    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// A row exists but cannot be decoded into the model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Pagination and filters
// ---------------------------------------------------------------------------

/// A limit/offset window.
///
/// A `limit` of zero means "use the configured default"; see
/// [`Page::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    #[must_use]
    pub const fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Replace a zero limit with `default_limit` and clamp to `max_limit`.
    #[must_use]
    pub fn normalized(self, default_limit: usize, max_limit: usize) -> Self {
        let limit = if self.limit == 0 {
            default_limit
        } else {
            self.limit
        };
        Self {
            limit: limit.min(max_limit),
            offset: self.offset,
        }
    }

    /// Apply the window to an already ordered sequence.
    pub fn slice<T>(self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// Authorization boundary applied to a ticket listing.
///
/// Produced by [`crate::access::AccessScopeGuard::narrow_list_filter`] and
/// AND-combined with every other filter field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListScope {
    /// No scope restriction (admins, requester listings).
    #[default]
    Unrestricted,
    /// Only tickets in the given department and/or team. An unset field
    /// adds no condition.
    Restricted {
        department_id: Option<String>,
        team_id: Option<String>,
    },
}

impl ListScope {
    #[must_use]
    pub fn allows(&self, ticket: &Ticket) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Restricted {
                department_id,
                team_id,
            } => {
                department_id
                    .as_ref()
                    .is_none_or(|dept| *dept == ticket.department_id)
                    && team_id
                        .as_ref()
                        .is_none_or(|team| ticket.team_id.as_ref() == Some(team))
            }
        }
    }
}

/// Criteria for [`TicketStore::list_with_filter`].
///
/// All fields are optional and combined with AND semantics. Results are
/// ordered most recently updated first, ties broken by ticket id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub requester_id: Option<String>,
    pub department_id: Option<String>,
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<TicketStatus>,
    /// Empty means any priority.
    pub priorities: Vec<TicketPriority>,
    /// Case-insensitive substring over title, description and external key.
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
    pub scope: ListScope,
    pub page: Page,
}

impl TicketFilter {
    /// The search term, trimmed, or `None` when blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Whether `ticket` satisfies every criterion except pagination.
    #[must_use]
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if !self.scope.allows(ticket) {
            return false;
        }
        if self
            .requester_id
            .as_ref()
            .is_some_and(|id| *id != ticket.requester_id)
        {
            return false;
        }
        if self
            .department_id
            .as_ref()
            .is_some_and(|id| *id != ticket.department_id)
        {
            return false;
        }
        if self
            .team_id
            .as_ref()
            .is_some_and(|id| ticket.team_id.as_ref() != Some(id))
        {
            return false;
        }
        if self
            .assignee_id
            .as_ref()
            .is_some_and(|id| ticket.assignee_id.as_ref() != Some(id))
        {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&ticket.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&ticket.priority) {
            return false;
        }
        if let Some(term) = self.search_term() {
            let needle = term.to_lowercase();
            let hit = [&ticket.title, &ticket.description, &ticket.external_key]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        within(ticket.created_at, self.created_from, self.created_to)
            && within(ticket.updated_at, self.updated_from, self.updated_to)
    }
}

fn within(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.is_none_or(|from| at >= from) && to.is_none_or(|to| at <= to)
}

/// Criteria for [`StaffDirectory::list_staff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffFilter {
    pub department_id: Option<String>,
    pub team_id: Option<String>,
    pub role: Option<StaffRole>,
    pub active_only: bool,
    pub page: Page,
}

impl StaffFilter {
    #[must_use]
    pub fn matches(&self, staff: &StaffMember) -> bool {
        self.department_id
            .as_ref()
            .is_none_or(|id| staff.department_id.as_ref() == Some(id))
            && self
                .team_id
                .as_ref()
                .is_none_or(|id| staff.team_id.as_ref() == Some(id))
            && self.role.is_none_or(|role| staff.role == role)
            && (!self.active_only || staff.active)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait TicketStore: Send + Sync {
    /// Insert a new ticket.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Duplicate`] if the id or external key exists.
    fn create(&self, ticket: &Ticket) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a store failure; a missing ticket is `Ok(None)`.
    fn get_by_id(&self, id: &str) -> Result<Option<Ticket>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure; a missing ticket is `Ok(None)`.
    fn get_by_external_key(&self, key: &str) -> Result<Option<Ticket>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn list_with_filter(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Overwrite the ticket row and append `history` as one all-or-nothing
    /// write.
    ///
    /// # Errors
    ///
    /// Returns a store failure, in which case neither the ticket nor any
    /// history entry was written.
    fn commit_change(&self, ticket: &Ticket, history: &[TicketHistory])
    -> Result<(), StoreError>;

    /// Overwrite the ticket row without recording history.
    ///
    /// Part of the collaborator contract for callers outside the engines,
    /// such as data repair. Engine mutations always go through
    /// [`TicketStore::commit_change`].
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn update(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.commit_change(ticket, &[])
    }
}

/// Append-only audit log.
pub trait TicketHistoryStore: Send + Sync {
    /// Append one entry on its own.
    ///
    /// Collaborator contract only: the engines write history through
    /// [`TicketStore::commit_change`] so it lands with the ticket row.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn append(&self, entry: &TicketHistory) -> Result<(), StoreError>;

    /// Entries for one ticket, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn list_by_ticket(&self, ticket_id: &str, page: Page)
    -> Result<Vec<TicketHistory>, StoreError>;
}

pub trait TicketMessageStore: Send + Sync {
    /// Persist the message row and its `attachments` as one all-or-nothing
    /// write. `message.attachments` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a store failure, in which case neither the message nor any
    /// attachment was written.
    fn create_with_attachments(
        &self,
        message: &TicketMessage,
        attachments: &[AttachmentReference],
    ) -> Result<(), StoreError>;

    /// Persist the message row alone.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn create(&self, message: &TicketMessage) -> Result<(), StoreError> {
        self.create_with_attachments(message, &[])
    }

    /// Messages for one ticket, oldest first, attachments not populated.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn list_by_ticket(&self, ticket_id: &str) -> Result<Vec<TicketMessage>, StoreError>;
}

pub trait AttachmentStore: Send + Sync {
    /// Attach a file to an existing message. The engines write attachments
    /// through [`TicketMessageStore::create_with_attachments`] instead.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn create(&self, attachment: &AttachmentReference) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn list_by_message(&self, message_id: &str) -> Result<Vec<AttachmentReference>, StoreError>;
}

/// Read access to departments, teams and staff.
pub trait StaffDirectory: Send + Sync {
    /// # Errors
    ///
    /// Returns a store failure; a missing staff member is `Ok(None)`.
    fn staff_by_id(&self, id: &str) -> Result<Option<StaffMember>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn staff_by_email(&self, email: &str) -> Result<Option<StaffMember>, StoreError>;

    /// Staff matching `filter`, oldest first (ties by id).
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<StaffMember>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn team_by_id(&self, id: &str) -> Result<Option<Team>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn list_teams(
        &self,
        department_id: Option<&str>,
        include_inactive: bool,
    ) -> Result<Vec<Team>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn department_by_id(&self, id: &str) -> Result<Option<Department>, StoreError>;

    /// # Errors
    ///
    /// Returns a store failure.
    fn list_departments(&self, include_inactive: bool) -> Result<Vec<Department>, StoreError>;
}

/// Org bootstrap writes. Not used by the engines.
pub trait OrgRoster: Send + Sync {
    /// # Errors
    ///
    /// Returns a store failure or [`StoreError::Duplicate`].
    fn insert_department(&self, department: &Department) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a store failure or [`StoreError::Duplicate`].
    fn insert_team(&self, team: &Team) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a store failure or [`StoreError::Duplicate`].
    fn insert_staff(&self, staff: &StaffMember) -> Result<(), StoreError>;

    /// Flip a staff member's `active` flag. Returns `false` if unknown.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    fn set_staff_active(&self, staff_id: &str, active: bool) -> Result<bool, StoreError>;
}

/// Every collaborator an engine needs, as shared trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub tickets: Arc<dyn TicketStore>,
    pub history: Arc<dyn TicketHistoryStore>,
    pub messages: Arc<dyn TicketMessageStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub directory: Arc<dyn StaffDirectory>,
}

impl Repositories {
    /// Use one store object for every collaborator.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TicketStore
            + TicketHistoryStore
            + TicketMessageStore
            + AttachmentStore
            + StaffDirectory
            + 'static,
    {
        Self {
            tickets: store.clone(),
            history: store.clone(),
            messages: store.clone(),
            attachments: store.clone(),
            directory: store,
        }
    }

    pub(crate) fn ticket(&self, id: &str) -> crate::Result<Ticket> {
        self.tickets
            .get_by_id(id)?
            .ok_or_else(|| Error::not_found(Resource::Ticket, id))
    }

    pub(crate) fn staff(&self, id: &str) -> crate::Result<StaffMember> {
        self.directory
            .staff_by_id(id)?
            .ok_or_else(|| Error::not_found(Resource::Staff, id))
    }

    pub(crate) fn team(&self, id: &str) -> crate::Result<Team> {
        self.directory
            .team_by_id(id)?
            .ok_or_else(|| Error::not_found(Resource::Team, id))
    }

    pub(crate) fn department(&self, id: &str) -> crate::Result<Department> {
        self.directory
            .department_by_id(id)?
            .ok_or_else(|| Error::not_found(Resource::Department, id))
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
