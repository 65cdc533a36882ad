//! SQLite schema for the helpdesk store.
//!
//! - `departments`, `teams`, `staff` hold the org roster that scopes access
//! - `tickets` keeps the current aggregate; tags are a JSON array column
//! - `ticket_history` is the append-only audit log, with the typed change
//!   flattened to `change_type` plus JSON `old_value` / `new_value`
//! - `ticket_messages` and `message_attachments` hold the conversation
//!
//! Timestamps are microseconds since the Unix epoch.

/// Migration v1: core tables and append-only guards.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    department_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS teams (
    team_id TEXT PRIMARY KEY,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS staff (
    staff_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL COLLATE NOCASE UNIQUE,
    role TEXT NOT NULL CHECK (role IN ('AGENT', 'TEAM_LEAD', 'ADMIN')),
    department_id TEXT REFERENCES departments(department_id),
    team_id TEXT REFERENCES teams(team_id),
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    ticket_id TEXT PRIMARY KEY,
    external_key TEXT NOT NULL UNIQUE,
    requester_id TEXT NOT NULL,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    team_id TEXT REFERENCES teams(team_id),
    assignee_id TEXT REFERENCES staff(staff_id),
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL CHECK (status IN (
        'OPEN', 'IN_PROGRESS', 'PENDING_USER', 'RESOLVED', 'CLOSED', 'CANCELLED'
    )),
    priority TEXT NOT NULL CHECK (priority IN ('LOW', 'MEDIUM', 'HIGH', 'URGENT')),
    tags_json TEXT NOT NULL DEFAULT '[]',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    closed_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS ticket_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    history_id TEXT NOT NULL UNIQUE,
    ticket_id TEXT NOT NULL REFERENCES tickets(ticket_id),
    changed_by_type TEXT NOT NULL CHECK (changed_by_type IN ('USER', 'STAFF', 'SYSTEM')),
    changed_by_id TEXT,
    change_type TEXT NOT NULL CHECK (change_type IN (
        'STATUS_CHANGE', 'ASSIGNEE_CHANGE', 'PRIORITY_CHANGE',
        'TEAM_CHANGE', 'DEPARTMENT_CHANGE', 'TAGS_CHANGE'
    )),
    old_value TEXT NOT NULL,
    new_value TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TRIGGER IF NOT EXISTS ticket_history_no_update
BEFORE UPDATE ON ticket_history
BEGIN
    SELECT RAISE(ABORT, 'ticket_history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS ticket_history_no_delete
BEFORE DELETE ON ticket_history
BEGIN
    SELECT RAISE(ABORT, 'ticket_history is append-only');
END;

CREATE TABLE IF NOT EXISTS ticket_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL UNIQUE,
    ticket_id TEXT NOT NULL REFERENCES tickets(ticket_id),
    author_type TEXT NOT NULL CHECK (author_type IN ('USER', 'STAFF', 'SYSTEM')),
    author_id TEXT,
    message_type TEXT NOT NULL CHECK (message_type IN (
        'PUBLIC_REPLY', 'INTERNAL_NOTE', 'SYSTEM_EVENT'
    )),
    body TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS message_attachments (
    attachment_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES ticket_messages(message_id),
    storage_key TEXT NOT NULL CHECK (length(trim(storage_key)) > 0),
    file_name TEXT NOT NULL CHECK (length(trim(file_name)) > 0),
    mime_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    created_at_us INTEGER NOT NULL
);
"#;

/// Migration v2: indexes for listing, history and roster lookups.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_tickets_requester_updated
    ON tickets(requester_id, updated_at_us DESC);
CREATE INDEX IF NOT EXISTS idx_tickets_department_team
    ON tickets(department_id, team_id);
CREATE INDEX IF NOT EXISTS idx_tickets_assignee
    ON tickets(assignee_id);
CREATE INDEX IF NOT EXISTS idx_tickets_status
    ON tickets(status);
CREATE INDEX IF NOT EXISTS idx_history_ticket_created
    ON ticket_history(ticket_id, created_at_us DESC, seq DESC);
CREATE INDEX IF NOT EXISTS idx_messages_ticket_created
    ON ticket_messages(ticket_id, created_at_us, seq);
CREATE INDEX IF NOT EXISTS idx_attachments_message
    ON message_attachments(message_id);
CREATE INDEX IF NOT EXISTS idx_staff_team_active
    ON staff(team_id, active, created_at_us);
";

/// Indexes that must exist after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_tickets_requester_updated",
    "idx_tickets_department_team",
    "idx_tickets_assignee",
    "idx_tickets_status",
    "idx_history_ticket_created",
    "idx_messages_ticket_created",
    "idx_attachments_message",
    "idx_staff_team_active",
];
