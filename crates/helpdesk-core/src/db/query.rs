//! Filter-to-SQL translation and row decoding.

use crate::model::history::{ChangeType, HistoryChange, TicketHistory};
use crate::model::message::{AttachmentReference, TicketMessage};
use crate::model::org::{Department, StaffMember, Team};
use crate::model::ticket::Ticket;
use crate::store::{ListScope, Page, StaffFilter, TicketFilter};
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::Row;
use std::fmt::Write as _;
use std::str::FromStr;

pub const TICKET_COLUMNS: &str = "t.ticket_id, t.external_key, t.requester_id, t.department_id, \
     t.team_id, t.assignee_id, t.title, t.description, t.status, t.priority, t.tags_json, \
     t.created_at_us, t.updated_at_us, t.closed_at_us";

pub const HISTORY_COLUMNS: &str = "history_id, ticket_id, changed_by_type, changed_by_id, \
     change_type, old_value, new_value, created_at_us";

pub const MESSAGE_COLUMNS: &str =
    "message_id, ticket_id, author_type, author_id, message_type, body, created_at_us";

pub const ATTACHMENT_COLUMNS: &str = "attachment_id, message_id, storage_key, file_name, \
     mime_type, size_bytes, created_at_us";

pub const STAFF_COLUMNS: &str =
    "staff_id, name, email, role, department_id, team_id, active, created_at_us";

/// A SQL statement with its positional parameters.
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Box<dyn ToSql>>,
}

impl BuiltQuery {
    #[must_use]
    pub fn param_refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(AsRef::as_ref).collect()
    }
}

/// Accumulates `WHERE` conditions with numbered placeholders.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    /// Push a value and return its placeholder (`?N`).
    fn bind(&mut self, value: impl ToSql + 'static) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    fn eq(&mut self, column: &str, value: &str) {
        let placeholder = self.bind(value.to_string());
        self.clauses.push(format!("{column} = {placeholder}"));
    }

    fn one_of(&mut self, column: &str, values: &[&'static str]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(*v)).collect();
        self.clauses
            .push(format!("{column} IN ({})", placeholders.join(", ")));
    }

    fn range(&mut self, column: &str, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        if let Some(from) = from {
            let placeholder = self.bind(from.timestamp_micros());
            self.clauses.push(format!("{column} >= {placeholder}"));
        }
        if let Some(to) = to {
            let placeholder = self.bind(to.timestamp_micros());
            self.clauses.push(format!("{column} <= {placeholder}"));
        }
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn limit_clause(page: Page) -> String {
    match (page.limit, page.offset) {
        (0, 0) => String::new(),
        (0, offset) => format!(" LIMIT -1 OFFSET {offset}"),
        (limit, offset) => format!(" LIMIT {limit} OFFSET {offset}"),
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Build the ticket listing query for `filter`.
///
/// Ordering matches the in-memory store: `updated_at` descending, then id.
/// The search term is matched through the connection's `casefold()`
/// function, registered by [`super::open_database`].
#[must_use]
pub fn ticket_list_query(filter: &TicketFilter) -> BuiltQuery {
    let mut cond = Conditions::default();

    match &filter.scope {
        ListScope::Unrestricted => {}
        ListScope::Restricted {
            department_id,
            team_id,
        } => {
            if let Some(dept) = department_id {
                cond.eq("t.department_id", dept);
            }
            if let Some(team) = team_id {
                cond.eq("t.team_id", team);
            }
        }
    }

    if let Some(ref id) = filter.requester_id {
        cond.eq("t.requester_id", id);
    }
    if let Some(ref id) = filter.department_id {
        cond.eq("t.department_id", id);
    }
    if let Some(ref id) = filter.team_id {
        cond.eq("t.team_id", id);
    }
    if let Some(ref id) = filter.assignee_id {
        cond.eq("t.assignee_id", id);
    }

    let statuses: Vec<&'static str> = filter.statuses.iter().map(|s| s.as_str()).collect();
    cond.one_of("t.status", &statuses);
    let priorities: Vec<&'static str> = filter.priorities.iter().map(|p| p.as_str()).collect();
    cond.one_of("t.priority", &priorities);

    if let Some(term) = filter.search_term() {
        let placeholder = cond.bind(like_pattern(term));
        cond.clauses.push(format!(
            "(casefold(t.title) LIKE {placeholder} ESCAPE '\\' \
             OR casefold(t.description) LIKE {placeholder} ESCAPE '\\' \
             OR casefold(t.external_key) LIKE {placeholder} ESCAPE '\\')"
        ));
    }

    cond.range("t.created_at_us", filter.created_from, filter.created_to);
    cond.range("t.updated_at_us", filter.updated_from, filter.updated_to);

    let mut sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets t{}",
        cond.where_clause()
    );
    sql.push_str(" ORDER BY t.updated_at_us DESC, t.ticket_id ASC");
    sql.push_str(&limit_clause(filter.page));

    BuiltQuery {
        sql,
        params: cond.params,
    }
}

/// Build the staff listing query for `filter`, oldest first.
#[must_use]
pub fn staff_list_query(filter: &StaffFilter) -> BuiltQuery {
    let mut cond = Conditions::default();
    if let Some(ref id) = filter.department_id {
        cond.eq("department_id", id);
    }
    if let Some(ref id) = filter.team_id {
        cond.eq("team_id", id);
    }
    if let Some(role) = filter.role {
        cond.eq("role", role.as_str());
    }
    if filter.active_only {
        cond.clauses.push("active = 1".to_string());
    }

    let mut sql = format!("SELECT {STAFF_COLUMNS} FROM staff{}", cond.where_clause());
    let _ = write!(
        sql,
        " ORDER BY created_at_us ASC, staff_id ASC{}",
        limit_clause(filter.page)
    );

    BuiltQuery {
        sql,
        params: cond.params,
    }
}

/// History for one ticket, newest first.
#[must_use]
pub fn history_page_sql(page: Page) -> String {
    format!(
        "SELECT {HISTORY_COLUMNS} FROM ticket_history WHERE ticket_id = ?1 \
         ORDER BY created_at_us DESC, seq DESC{}",
        limit_clause(page)
    )
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn conversion_error<E>(idx: usize, ty: Type, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(error))
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

#[derive(Debug, thiserror::Error)]
#[error("timestamp out of range: {0}")]
struct TimestampRange(i64);

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let us: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| conversion_error(idx, Type::Integer, TimestampRange(us)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let us: Option<i64> = row.get(idx)?;
    us.map(|us| {
        DateTime::from_timestamp_micros(us)
            .ok_or_else(|| conversion_error(idx, Type::Integer, TimestampRange(us)))
    })
    .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

/// Decode a row selected with [`TICKET_COLUMNS`].
///
/// # Errors
///
/// Returns a conversion error for unknown enum text, bad JSON or an
/// out-of-range timestamp.
pub fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        external_key: row.get(1)?,
        requester_id: row.get(2)?,
        department_id: row.get(3)?,
        team_id: row.get(4)?,
        assignee_id: row.get(5)?,
        title: row.get(6)?,
        description: row.get(7)?,
        status: parsed(row, 8)?,
        priority: parsed(row, 9)?,
        tags: json_column(row, 10)?,
        created_at: timestamp(row, 11)?,
        updated_at: timestamp(row, 12)?,
        closed_at: optional_timestamp(row, 13)?,
    })
}

/// Decode a row selected with [`HISTORY_COLUMNS`], restoring the typed
/// change from its JSON documents.
///
/// # Errors
///
/// Returns a conversion error if the documents do not match `change_type`.
pub fn row_to_history(row: &Row<'_>) -> rusqlite::Result<TicketHistory> {
    let change_type: ChangeType = parsed(row, 4)?;
    let old_value: serde_json::Value = json_column(row, 5)?;
    let new_value: serde_json::Value = json_column(row, 6)?;
    let change = HistoryChange::from_payload(change_type, &old_value, &new_value)
        .map_err(|e| conversion_error(5, Type::Text, e))?;

    Ok(TicketHistory {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        changed_by_type: parsed(row, 2)?,
        changed_by_id: row.get(3)?,
        change,
        created_at: timestamp(row, 7)?,
    })
}

/// Decode a row selected with [`MESSAGE_COLUMNS`]; attachments are empty.
///
/// # Errors
///
/// Returns a conversion error for unknown enum text or a bad timestamp.
pub fn row_to_message(row: &Row<'_>) -> rusqlite::Result<TicketMessage> {
    Ok(TicketMessage {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        author_type: parsed(row, 2)?,
        author_id: row.get(3)?,
        message_type: parsed(row, 4)?,
        body: row.get(5)?,
        attachments: Vec::new(),
        created_at: timestamp(row, 6)?,
    })
}

/// Decode a row selected with [`ATTACHMENT_COLUMNS`].
///
/// # Errors
///
/// Returns a conversion error for a negative size or a bad timestamp.
pub fn row_to_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentReference> {
    let size: i64 = row.get(5)?;
    Ok(AttachmentReference {
        id: row.get(0)?,
        message_id: row.get(1)?,
        storage_key: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        size_bytes: u64::try_from(size).map_err(|e| conversion_error(5, Type::Integer, e))?,
        created_at: timestamp(row, 6)?,
    })
}

/// Decode a row selected with [`STAFF_COLUMNS`].
///
/// # Errors
///
/// Returns a conversion error for an unknown role or a bad timestamp.
pub fn row_to_staff(row: &Row<'_>) -> rusqlite::Result<StaffMember> {
    Ok(StaffMember {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: parsed(row, 3)?,
        department_id: row.get(4)?,
        team_id: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
        created_at: timestamp(row, 7)?,
    })
}

/// Decode `team_id, department_id, name, active, created_at_us`.
///
/// # Errors
///
/// Returns a conversion error for a bad timestamp.
pub fn row_to_team(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        department_id: row.get(1)?,
        name: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: timestamp(row, 4)?,
    })
}

/// Decode `department_id, name, active, created_at_us`.
///
/// # Errors
///
/// Returns a conversion error for a bad timestamp.
pub fn row_to_department(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
        created_at: timestamp(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ticket::{TicketPriority, TicketStatus};

    #[test]
    fn empty_filter_has_no_where_clause() {
        let q = ticket_list_query(&TicketFilter::default());
        assert!(!q.sql.contains("WHERE"));
        assert!(q.sql.ends_with("ORDER BY t.updated_at_us DESC, t.ticket_id ASC"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn sets_become_in_lists_with_numbered_params() {
        let filter = TicketFilter {
            requester_id: Some("u-1".into()),
            statuses: vec![TicketStatus::Open, TicketStatus::InProgress],
            priorities: vec![TicketPriority::Urgent],
            page: Page::new(10, 20),
            ..TicketFilter::default()
        };
        let q = ticket_list_query(&filter);
        assert!(q.sql.contains("t.requester_id = ?1"));
        assert!(q.sql.contains("t.status IN (?2, ?3)"));
        assert!(q.sql.contains("t.priority IN (?4)"));
        assert!(q.sql.ends_with("LIMIT 10 OFFSET 20"));
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn restricted_scope_only_binds_set_fields() {
        let filter = TicketFilter {
            scope: ListScope::Restricted {
                department_id: Some("d-1".into()),
                team_id: None,
            },
            ..TicketFilter::default()
        };
        let q = ticket_list_query(&filter);
        assert!(q.sql.contains("t.department_id = ?1"));
        assert!(!q.sql.contains("t.team_id"));
        assert_eq!(q.params.len(), 1);

        let empty = TicketFilter {
            scope: ListScope::Restricted {
                department_id: None,
                team_id: None,
            },
            ..TicketFilter::default()
        };
        assert!(!ticket_list_query(&empty).sql.contains("WHERE"));
    }

    #[test]
    fn search_term_is_escaped() {
        assert_eq!(like_pattern("50%_Off"), "%50\\%\\_off%");
        let filter = TicketFilter {
            search: Some("   ".into()),
            ..TicketFilter::default()
        };
        assert!(!ticket_list_query(&filter).sql.contains("LIKE"));
    }

    #[test]
    fn staff_query_orders_oldest_first() {
        let q = staff_list_query(&StaffFilter {
            team_id: Some("team-a".into()),
            active_only: true,
            page: Page::new(1000, 0),
            ..StaffFilter::default()
        });
        assert!(q.sql.contains("team_id = ?1 AND active = 1"));
        assert!(q.sql.contains("ORDER BY created_at_us ASC, staff_id ASC LIMIT 1000"));
    }
}
