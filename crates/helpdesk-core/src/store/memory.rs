//! In-memory implementation of every store trait.
//!
//! All state sits behind one mutex, so `commit_change` is trivially atomic.
//! Used by tests and by callers that want the engines without a database.

use super::{
    AttachmentStore, OrgRoster, Page, StaffDirectory, StaffFilter, StoreError, TicketFilter,
    TicketHistoryStore, TicketMessageStore, TicketStore,
};
use crate::model::history::TicketHistory;
use crate::model::message::{AttachmentReference, TicketMessage};
use crate::model::org::{Department, StaffMember, Team};
use crate::model::ticket::Ticket;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    tickets: BTreeMap<String, Ticket>,
    /// Insertion order doubles as the tiebreak for equal timestamps.
    history: Vec<TicketHistory>,
    messages: Vec<TicketMessage>,
    attachments: Vec<AttachmentReference>,
    staff: BTreeMap<String, StaffMember>,
    teams: BTreeMap<String, Team>,
    departments: BTreeMap<String, Department>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Number of history rows across all tickets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn history_len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.history.len())
    }
}

impl TicketStore for MemoryStore {
    fn create(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate {
                entity: "ticket",
                id: ticket.id.clone(),
            });
        }
        if state
            .tickets
            .values()
            .any(|t| t.external_key == ticket.external_key)
        {
            return Err(StoreError::Duplicate {
                entity: "ticket key",
                id: ticket.external_key.clone(),
            });
        }
        state.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self.lock()?.tickets.get(id).cloned())
    }

    fn get_by_external_key(&self, key: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .find(|t| t.external_key.eq_ignore_ascii_case(key))
            .cloned())
    }

    fn list_with_filter(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let state = self.lock()?;
        let mut hits: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(filter.page.slice(hits))
    }

    fn commit_change(
        &self,
        ticket: &Ticket,
        history: &[TicketHistory],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Corrupt(format!(
                "update of unknown ticket {}",
                ticket.id
            )));
        }
        state.tickets.insert(ticket.id.clone(), ticket.clone());
        state.history.extend(history.iter().cloned());
        Ok(())
    }
}

impl TicketHistoryStore for MemoryStore {
    fn append(&self, entry: &TicketHistory) -> Result<(), StoreError> {
        self.lock()?.history.push(entry.clone());
        Ok(())
    }

    fn list_by_ticket(
        &self,
        ticket_id: &str,
        page: Page,
    ) -> Result<Vec<TicketHistory>, StoreError> {
        let state = self.lock()?;
        let mut entries: Vec<TicketHistory> = state
            .history
            .iter()
            .rev()
            .filter(|h| h.ticket_id == ticket_id)
            .cloned()
            .collect();
        // stable: equal timestamps keep newest-inserted first
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.slice(entries))
    }
}

impl TicketMessageStore for MemoryStore {
    fn create_with_attachments(
        &self,
        message: &TicketMessage,
        attachments: &[AttachmentReference],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut stored = message.clone();
        stored.attachments.clear();
        state.messages.push(stored);
        state.attachments.extend(attachments.iter().cloned());
        Ok(())
    }

    fn list_by_ticket(&self, ticket_id: &str) -> Result<Vec<TicketMessage>, StoreError> {
        let state = self.lock()?;
        let mut messages: Vec<TicketMessage> = state
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }
}

impl AttachmentStore for MemoryStore {
    fn create(&self, attachment: &AttachmentReference) -> Result<(), StoreError> {
        self.lock()?.attachments.push(attachment.clone());
        Ok(())
    }

    fn list_by_message(&self, message_id: &str) -> Result<Vec<AttachmentReference>, StoreError> {
        Ok(self
            .lock()?
            .attachments
            .iter()
            .filter(|a| a.message_id == message_id)
            .cloned()
            .collect())
    }
}

impl StaffDirectory for MemoryStore {
    fn staff_by_id(&self, id: &str) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.lock()?.staff.get(id).cloned())
    }

    fn staff_by_email(&self, email: &str) -> Result<Option<StaffMember>, StoreError> {
        Ok(self
            .lock()?
            .staff
            .values()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<StaffMember>, StoreError> {
        let state = self.lock()?;
        let mut staff: Vec<StaffMember> = state
            .staff
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        staff.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(filter.page.slice(staff))
    }

    fn team_by_id(&self, id: &str) -> Result<Option<Team>, StoreError> {
        Ok(self.lock()?.teams.get(id).cloned())
    }

    fn list_teams(
        &self,
        department_id: Option<&str>,
        include_inactive: bool,
    ) -> Result<Vec<Team>, StoreError> {
        let state = self.lock()?;
        let mut teams: Vec<Team> = state
            .teams
            .values()
            .filter(|t| department_id.is_none_or(|d| t.department_id == d))
            .filter(|t| include_inactive || t.active)
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(teams)
    }

    fn department_by_id(&self, id: &str) -> Result<Option<Department>, StoreError> {
        Ok(self.lock()?.departments.get(id).cloned())
    }

    fn list_departments(&self, include_inactive: bool) -> Result<Vec<Department>, StoreError> {
        let state = self.lock()?;
        let mut departments: Vec<Department> = state
            .departments
            .values()
            .filter(|d| include_inactive || d.active)
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(departments)
    }
}

impl OrgRoster for MemoryStore {
    fn insert_department(&self, department: &Department) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.departments.contains_key(&department.id) {
            return Err(StoreError::Duplicate {
                entity: "department",
                id: department.id.clone(),
            });
        }
        state
            .departments
            .insert(department.id.clone(), department.clone());
        Ok(())
    }

    fn insert_team(&self, team: &Team) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.teams.contains_key(&team.id) {
            return Err(StoreError::Duplicate {
                entity: "team",
                id: team.id.clone(),
            });
        }
        state.teams.insert(team.id.clone(), team.clone());
        Ok(())
    }

    fn insert_staff(&self, staff: &StaffMember) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.staff.contains_key(&staff.id)
            || state
                .staff
                .values()
                .any(|s| s.email.eq_ignore_ascii_case(&staff.email))
        {
            return Err(StoreError::Duplicate {
                entity: "staff",
                id: staff.id.clone(),
            });
        }
        state.staff.insert(staff.id.clone(), staff.clone());
        Ok(())
    }

    fn set_staff_active(&self, staff_id: &str, active: bool) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        Ok(state.staff.get_mut(staff_id).is_some_and(|s| {
            s.active = active;
            true
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::history::HistoryChange;
    use crate::model::message::AuthorType;
    use crate::model::org::StaffRole;
    use crate::model::ticket::{TicketPriority, TicketStatus};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 9, minute, 0).unwrap()
    }

    fn ticket(id: &str, updated: u32) -> Ticket {
        Ticket {
            id: id.into(),
            external_key: format!("TCK-{}", id.to_uppercase()),
            requester_id: "u-1".into(),
            department_id: "d-1".into(),
            team_id: None,
            assignee_id: None,
            title: format!("ticket {id}"),
            description: String::new(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            tags: vec![],
            created_at: at(0),
            updated_at: at(updated),
            closed_at: None,
        }
    }

    fn history(id: &str, ticket_id: &str, minute: u32) -> TicketHistory {
        TicketHistory {
            id: id.into(),
            ticket_id: ticket_id.into(),
            changed_by_type: AuthorType::Staff,
            changed_by_id: Some("s-1".into()),
            change: HistoryChange::PriorityChange {
                old: TicketPriority::Medium,
                new: TicketPriority::High,
            },
            created_at: at(minute),
        }
    }

    #[test]
    fn listing_orders_by_update_then_id() {
        let store = MemoryStore::new();
        TicketStore::create(&store, &ticket("b", 5)).unwrap();
        TicketStore::create(&store, &ticket("a", 5)).unwrap();
        TicketStore::create(&store, &ticket("c", 9)).unwrap();

        let ids: Vec<String> = store
            .list_with_filter(&TicketFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_ticket_is_rejected() {
        let store = MemoryStore::new();
        TicketStore::create(&store, &ticket("a", 0)).unwrap();
        let err = TicketStore::create(&store, &ticket("a", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "ticket", .. }));
    }

    #[test]
    fn commit_change_requires_existing_ticket() {
        let store = MemoryStore::new();
        let err = store
            .commit_change(&ticket("ghost", 0), &[history("h1", "ghost", 0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert_eq!(store.history_len().unwrap(), 0);
    }

    #[test]
    fn history_is_newest_first_with_stable_ties() {
        let store = MemoryStore::new();
        let t = ticket("a", 0);
        TicketStore::create(&store, &t).unwrap();
        store
            .commit_change(&t, &[history("h1", "a", 1), history("h2", "a", 1)])
            .unwrap();
        store.append(&history("h3", "a", 2)).unwrap();
        store.append(&history("other", "b", 3)).unwrap();

        let ids: Vec<String> = TicketHistoryStore::list_by_ticket(&store, "a", Page::default())
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["h3", "h2", "h1"]);

        let window = TicketHistoryStore::list_by_ticket(&store, "a", Page::new(1, 1)).unwrap();
        assert_eq!(window[0].id, "h2");
    }

    #[test]
    fn staff_listing_filters_and_sorts_by_creation() {
        let store = MemoryStore::new();
        for (id, offset, active) in [("s-2", 2, true), ("s-1", 1, true), ("s-3", 0, false)] {
            store
                .insert_staff(&StaffMember {
                    id: id.into(),
                    name: id.into(),
                    email: format!("{id}@example.com"),
                    role: StaffRole::Agent,
                    department_id: Some("d-1".into()),
                    team_id: Some("team-a".into()),
                    active,
                    created_at: at(0) + Duration::minutes(offset),
                })
                .unwrap();
        }

        let filter = StaffFilter {
            team_id: Some("team-a".into()),
            active_only: true,
            ..StaffFilter::default()
        };
        let ids: Vec<String> = store
            .list_staff(&filter)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s-1", "s-2"]);

        assert!(store.set_staff_active("s-3", true).unwrap());
        assert!(!store.set_staff_active("nobody", true).unwrap());
        assert_eq!(store.list_staff(&filter).unwrap().len(), 3);
        assert!(store.staff_by_email("S-1@EXAMPLE.COM").unwrap().is_some());
    }
}
