//! `rusqlite` implementation of the store traits.

use super::query::{
    self, ATTACHMENT_COLUMNS, MESSAGE_COLUMNS, STAFF_COLUMNS, TICKET_COLUMNS, row_to_attachment,
    row_to_department, row_to_history, row_to_message, row_to_staff, row_to_team, row_to_ticket,
};
use crate::model::history::TicketHistory;
use crate::model::message::{AttachmentReference, TicketMessage};
use crate::model::org::{Department, StaffMember, Team};
use crate::model::ticket::Ticket;
use crate::store::{
    AttachmentStore, OrgRoster, Page, StaffDirectory, StaffFilter, StoreError, TicketFilter,
    TicketHistoryStore, TicketMessageStore, TicketStore,
};
use rusqlite::{Connection, OptionalExtension, ffi, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A single serialized connection shared by every trait impl.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating and migrating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self::from_connection(super::open_database(path, busy_timeout)?))
    }

    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be migrated.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::from_connection(super::open_in_memory()?))
    }

    /// Wrap a connection from [`super::open_database`] or
    /// [`super::open_in_memory`]; listing search needs the `casefold()`
    /// function those register.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
    }
}

fn insert_error(entity: &'static str, id: &str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    let id = id.to_string();
    move |err| match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::Duplicate { entity, id }
        }
        _ => StoreError::Sqlite(err),
    }
}

fn size_to_sql(size: u64) -> Result<i64, StoreError> {
    i64::try_from(size).map_err(|_| StoreError::Corrupt(format!("attachment size {size} too large")))
}

fn insert_history(conn: &Connection, entry: &TicketHistory) -> Result<(), StoreError> {
    let old_value = serde_json::to_string(&entry.change.old_value())?;
    let new_value = serde_json::to_string(&entry.change.new_value())?;
    conn.execute(
        "INSERT INTO ticket_history (history_id, ticket_id, changed_by_type, changed_by_id, \
         change_type, old_value, new_value, created_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.ticket_id,
            entry.changed_by_type.as_str(),
            entry.changed_by_id,
            entry.change_type().as_str(),
            old_value,
            new_value,
            entry.created_at.timestamp_micros(),
        ],
    )
    .map_err(insert_error("history entry", &entry.id))?;
    Ok(())
}

fn insert_attachment(conn: &Connection, attachment: &AttachmentReference) -> Result<(), StoreError> {
    let size = size_to_sql(attachment.size_bytes)?;
    conn.execute(
        "INSERT INTO message_attachments (attachment_id, message_id, storage_key, \
         file_name, mime_type, size_bytes, created_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            attachment.id,
            attachment.message_id,
            attachment.storage_key,
            attachment.file_name,
            attachment.mime_type,
            size,
            attachment.created_at.timestamp_micros(),
        ],
    )
    .map_err(insert_error("attachment", &attachment.id))?;
    Ok(())
}

impl TicketStore for SqliteStore {
    fn create(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&ticket.tags)?;
        self.conn()?
            .execute(
                "INSERT INTO tickets (ticket_id, external_key, requester_id, department_id, \
                 team_id, assignee_id, title, description, status, priority, tags_json, \
                 created_at_us, updated_at_us, closed_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    ticket.id,
                    ticket.external_key,
                    ticket.requester_id,
                    ticket.department_id,
                    ticket.team_id,
                    ticket.assignee_id,
                    ticket.title,
                    ticket.description,
                    ticket.status.as_str(),
                    ticket.priority.as_str(),
                    tags,
                    ticket.created_at.timestamp_micros(),
                    ticket.updated_at.timestamp_micros(),
                    ticket.closed_at.map(|at| at.timestamp_micros()),
                ],
            )
            .map_err(insert_error("ticket", &ticket.id))?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        let conn = self.conn()?;
        let ticket = conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.ticket_id = ?1"),
                [id],
                row_to_ticket,
            )
            .optional()?;
        Ok(ticket)
    }

    fn get_by_external_key(&self, key: &str) -> Result<Option<Ticket>, StoreError> {
        let conn = self.conn()?;
        let ticket = conn
            .query_row(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets t WHERE upper(t.external_key) = upper(?1)"
                ),
                [key],
                row_to_ticket,
            )
            .optional()?;
        Ok(ticket)
    }

    fn list_with_filter(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let built = query::ticket_list_query(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&built.sql)?;
        let rows = stmt.query_map(params_from_iter(built.param_refs()), row_to_ticket)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn commit_change(
        &self,
        ticket: &Ticket,
        history: &[TicketHistory],
    ) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&ticket.tags)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE tickets SET department_id = ?2, team_id = ?3, assignee_id = ?4, \
             title = ?5, description = ?6, status = ?7, priority = ?8, tags_json = ?9, \
             updated_at_us = ?10, closed_at_us = ?11 \
             WHERE ticket_id = ?1",
            params![
                ticket.id,
                ticket.department_id,
                ticket.team_id,
                ticket.assignee_id,
                ticket.title,
                ticket.description,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                tags,
                ticket.updated_at.timestamp_micros(),
                ticket.closed_at.map(|at| at.timestamp_micros()),
            ],
        )?;
        if changed == 0 {
            // dropping `tx` rolls back
            return Err(StoreError::Corrupt(format!(
                "update of unknown ticket {}",
                ticket.id
            )));
        }

        for entry in history {
            insert_history(&tx, entry)?;
        }

        tx.commit()?;
        Ok(())
    }
}

impl TicketHistoryStore for SqliteStore {
    fn append(&self, entry: &TicketHistory) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_history(&conn, entry)
    }

    fn list_by_ticket(
        &self,
        ticket_id: &str,
        page: Page,
    ) -> Result<Vec<TicketHistory>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query::history_page_sql(page))?;
        let rows = stmt.query_map([ticket_id], row_to_history)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl TicketMessageStore for SqliteStore {
    fn create_with_attachments(
        &self,
        message: &TicketMessage,
        attachments: &[AttachmentReference],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO ticket_messages (message_id, ticket_id, author_type, author_id, \
             message_type, body, created_at_us) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.ticket_id,
                message.author_type.as_str(),
                message.author_id,
                message.message_type.as_str(),
                message.body,
                message.created_at.timestamp_micros(),
            ],
        )
        .map_err(insert_error("message", &message.id))?;

        for attachment in attachments {
            insert_attachment(&tx, attachment)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_by_ticket(&self, ticket_id: &str) -> Result<Vec<TicketMessage>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE ticket_id = ?1 \
             ORDER BY created_at_us ASC, seq ASC"
        ))?;
        let rows = stmt.query_map([ticket_id], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl AttachmentStore for SqliteStore {
    fn create(&self, attachment: &AttachmentReference) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_attachment(&conn, attachment)
    }

    fn list_by_message(&self, message_id: &str) -> Result<Vec<AttachmentReference>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM message_attachments WHERE message_id = ?1 \
             ORDER BY rowid ASC"
        ))?;
        let rows = stmt.query_map([message_id], row_to_attachment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl StaffDirectory for SqliteStore {
    fn staff_by_id(&self, id: &str) -> Result<Option<StaffMember>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE staff_id = ?1"),
                [id],
                row_to_staff,
            )
            .optional()?)
    }

    fn staff_by_email(&self, email: &str) -> Result<Option<StaffMember>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE email = ?1"),
                [email],
                row_to_staff,
            )
            .optional()?)
    }

    fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<StaffMember>, StoreError> {
        let built = query::staff_list_query(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&built.sql)?;
        let rows = stmt.query_map(params_from_iter(built.param_refs()), row_to_staff)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn team_by_id(&self, id: &str) -> Result<Option<Team>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT team_id, department_id, name, active, created_at_us \
                 FROM teams WHERE team_id = ?1",
                [id],
                row_to_team,
            )
            .optional()?)
    }

    fn list_teams(
        &self,
        department_id: Option<&str>,
        include_inactive: bool,
    ) -> Result<Vec<Team>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT team_id, department_id, name, active, created_at_us FROM teams \
             WHERE (?1 IS NULL OR department_id = ?1) AND (?2 OR active = 1) \
             ORDER BY name ASC, team_id ASC",
        )?;
        let rows = stmt.query_map(params![department_id, include_inactive], row_to_team)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn department_by_id(&self, id: &str) -> Result<Option<Department>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT department_id, name, active, created_at_us \
                 FROM departments WHERE department_id = ?1",
                [id],
                row_to_department,
            )
            .optional()?)
    }

    fn list_departments(&self, include_inactive: bool) -> Result<Vec<Department>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT department_id, name, active, created_at_us FROM departments \
             WHERE (?1 OR active = 1) ORDER BY name ASC, department_id ASC",
        )?;
        let rows = stmt.query_map([include_inactive], row_to_department)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl OrgRoster for SqliteStore {
    fn insert_department(&self, department: &Department) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO departments (department_id, name, active, created_at_us) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    department.id,
                    department.name,
                    department.active,
                    department.created_at.timestamp_micros(),
                ],
            )
            .map_err(insert_error("department", &department.id))?;
        Ok(())
    }

    fn insert_team(&self, team: &Team) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO teams (team_id, department_id, name, active, created_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    team.id,
                    team.department_id,
                    team.name,
                    team.active,
                    team.created_at.timestamp_micros(),
                ],
            )
            .map_err(insert_error("team", &team.id))?;
        Ok(())
    }

    fn insert_staff(&self, staff: &StaffMember) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO staff (staff_id, name, email, role, department_id, team_id, \
                 active, created_at_us) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    staff.id,
                    staff.name,
                    staff.email,
                    staff.role.as_str(),
                    staff.department_id,
                    staff.team_id,
                    staff.active,
                    staff.created_at.timestamp_micros(),
                ],
            )
            .map_err(insert_error("staff", &staff.id))?;
        Ok(())
    }

    fn set_staff_active(&self, staff_id: &str, active: bool) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE staff SET active = ?2 WHERE staff_id = ?1",
            params![staff_id, active],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::history::HistoryChange;
    use crate::model::message::{AuthorType, MessageType};
    use crate::model::org::StaffRole;
    use crate::model::ticket::{TicketPriority, TicketStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, minute, 0).unwrap()
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_department(&Department {
                id: "d-1".into(),
                name: "Support".into(),
                active: true,
                created_at: at(0),
            })
            .unwrap();
        store
            .insert_team(&Team {
                id: "team-a".into(),
                department_id: "d-1".into(),
                name: "Tier 1".into(),
                active: true,
                created_at: at(0),
            })
            .unwrap();
        store
            .insert_staff(&StaffMember {
                id: "s-1".into(),
                name: "Ana".into(),
                email: "ana@example.com".into(),
                role: StaffRole::Agent,
                department_id: Some("d-1".into()),
                team_id: Some("team-a".into()),
                active: true,
                created_at: at(1),
            })
            .unwrap();
        store
    }

    fn ticket() -> Ticket {
        Ticket {
            id: "t-1".into(),
            external_key: "TCK-1A2B3C4D".into(),
            requester_id: "u-1".into(),
            department_id: "d-1".into(),
            team_id: Some("team-a".into()),
            assignee_id: None,
            title: "VPN drops".into(),
            description: "every ten minutes".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            tags: vec!["vpn".into(), "network".into()],
            created_at: at(2),
            updated_at: at(2),
            closed_at: None,
        }
    }

    #[test]
    fn ticket_round_trips_through_sqlite() {
        let store = seeded();
        let t = ticket();
        TicketStore::create(&store, &t).unwrap();
        assert_eq!(store.get_by_id("t-1").unwrap(), Some(t.clone()));
        assert_eq!(store.get_by_external_key("tck-1a2b3c4d").unwrap(), Some(t));
        assert_eq!(store.get_by_id("missing").unwrap(), None);
    }

    #[test]
    fn duplicate_external_key_maps_to_duplicate() {
        let store = seeded();
        TicketStore::create(&store, &ticket()).unwrap();
        let mut again = ticket();
        again.id = "t-2".into();
        let err = TicketStore::create(&store, &again).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "ticket", .. }));
    }

    #[test]
    fn commit_change_writes_ticket_and_history_together() {
        let store = seeded();
        let mut t = ticket();
        TicketStore::create(&store, &t).unwrap();

        t.assignee_id = Some("s-1".into());
        t.updated_at = at(3);
        let entry = TicketHistory {
            id: "h-1".into(),
            ticket_id: t.id.clone(),
            changed_by_type: AuthorType::Staff,
            changed_by_id: Some("s-1".into()),
            change: HistoryChange::AssigneeChange {
                old: None,
                new: Some("s-1".into()),
            },
            created_at: at(3),
        };
        store.commit_change(&t, &[entry.clone()]).unwrap();

        assert_eq!(store.get_by_id("t-1").unwrap(), Some(t));
        assert_eq!(
            TicketHistoryStore::list_by_ticket(&store, "t-1", Page::default()).unwrap(),
            vec![entry]
        );
    }

    #[test]
    fn failed_commit_leaves_no_partial_state() {
        let store = seeded();
        let mut t = ticket();
        TicketStore::create(&store, &t).unwrap();

        // unknown assignee violates the foreign key inside the transaction
        t.assignee_id = Some("ghost".into());
        let entry = TicketHistory {
            id: "h-1".into(),
            ticket_id: t.id.clone(),
            changed_by_type: AuthorType::Staff,
            changed_by_id: None,
            change: HistoryChange::AssigneeChange {
                old: None,
                new: Some("ghost".into()),
            },
            created_at: at(3),
        };
        assert!(store.commit_change(&t, &[entry]).is_err());

        assert_eq!(store.get_by_id("t-1").unwrap(), Some(ticket()));
        assert!(
            TicketHistoryStore::list_by_ticket(&store, "t-1", Page::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn messages_and_attachments_round_trip() {
        let store = seeded();
        TicketStore::create(&store, &ticket()).unwrap();
        let message = TicketMessage {
            id: "m-1".into(),
            ticket_id: "t-1".into(),
            author_type: AuthorType::Staff,
            author_id: Some("s-1".into()),
            message_type: MessageType::InternalNote,
            body: "checked the logs".into(),
            attachments: vec![],
            created_at: at(4),
        };
        TicketMessageStore::create(&store, &message).unwrap();
        let attachment = AttachmentReference {
            id: "a-1".into(),
            message_id: "m-1".into(),
            storage_key: "blobs/a-1".into(),
            file_name: "vpn.log".into(),
            mime_type: "text/plain".into(),
            size_bytes: 2048,
            created_at: at(4),
        };
        AttachmentStore::create(&store, &attachment).unwrap();

        assert_eq!(
            TicketMessageStore::list_by_ticket(&store, "t-1").unwrap(),
            vec![message]
        );
        assert_eq!(store.list_by_message("m-1").unwrap(), vec![attachment]);
    }

    #[test]
    fn failed_attachment_rolls_back_its_message() {
        let store = seeded();
        TicketStore::create(&store, &ticket()).unwrap();
        let message = TicketMessage {
            id: "m-1".into(),
            ticket_id: "t-1".into(),
            author_type: AuthorType::User,
            author_id: Some("u-1".into()),
            message_type: MessageType::PublicReply,
            body: "screenshots attached".into(),
            attachments: vec![],
            created_at: at(4),
        };
        let shot = AttachmentReference {
            id: "a-1".into(),
            message_id: "m-1".into(),
            storage_key: "blobs/a-1".into(),
            file_name: "one.png".into(),
            mime_type: "image/png".into(),
            size_bytes: 10,
            created_at: at(4),
        };

        let err = store
            .create_with_attachments(&message, &[shot.clone(), shot])
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "attachment", .. }));
        assert!(TicketMessageStore::list_by_ticket(&store, "t-1").unwrap().is_empty());
        assert!(store.list_by_message("m-1").unwrap().is_empty());
    }

    #[test]
    fn standalone_update_and_append() {
        let store = seeded();
        let mut t = ticket();
        TicketStore::create(&store, &t).unwrap();

        t.priority = TicketPriority::Urgent;
        t.updated_at = at(5);
        store.update(&t).unwrap();
        assert_eq!(store.get_by_id("t-1").unwrap(), Some(t));
        assert!(
            TicketHistoryStore::list_by_ticket(&store, "t-1", Page::default())
                .unwrap()
                .is_empty()
        );

        let entry = TicketHistory {
            id: "h-1".into(),
            ticket_id: "t-1".into(),
            changed_by_type: AuthorType::System,
            changed_by_id: None,
            change: HistoryChange::PriorityChange {
                old: TicketPriority::Medium,
                new: TicketPriority::Urgent,
            },
            created_at: at(5),
        };
        store.append(&entry).unwrap();
        assert_eq!(
            TicketHistoryStore::list_by_ticket(&store, "t-1", Page::default()).unwrap(),
            vec![entry]
        );
    }

    #[test]
    fn directory_lookups() {
        let store = seeded();
        assert!(store.staff_by_email("ANA@example.com").unwrap().is_some());
        assert_eq!(store.list_teams(Some("d-1"), false).unwrap().len(), 1);
        assert_eq!(store.list_departments(false).unwrap().len(), 1);

        assert!(store.set_staff_active("s-1", false).unwrap());
        let active = store
            .list_staff(&StaffFilter {
                team_id: Some("team-a".into()),
                active_only: true,
                ..StaffFilter::default()
            })
            .unwrap();
        assert!(active.is_empty());
    }
}
