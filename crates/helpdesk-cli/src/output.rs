//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / `--json` flag
//! 2. `HELPDESK_FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use helpdesk_core::model::history::TicketHistory;
use helpdesk_core::model::org::{Department, StaffMember, Team};
use helpdesk_core::model::ticket::Ticket;
use helpdesk_core::TicketView;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

pub const FORMAT_ENV: &str = "HELPDESK_FORMAT";

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }
    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var(FORMAT_ENV).ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Anything a command can print in all three modes.
pub trait Renderable: Serialize {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()>;

    /// One text row, columns in [`table_headers`](Renderable::table_headers) order.
    fn render_table(&self, w: &mut dyn Write) -> io::Result<()>;

    fn table_headers() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }
}

fn write_json<T: Serialize + ?Sized>(w: &mut dyn Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value).map_err(io::Error::other)?;
    writeln!(w)
}

pub fn render_item<R: Renderable>(item: &R, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => item.render_human(&mut out),
        OutputMode::Text => item.render_table(&mut out),
        OutputMode::Json => write_json(&mut out, item),
    }
}

/// Render a list of [`Renderable`] items to stdout.
///
/// JSON mode prints one array; text mode prints a header row first.
pub fn render_list<R: Renderable>(items: &[R], mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => {
            if items.is_empty() {
                writeln!(out, "(none)")?;
            }
            for item in items {
                item.render_human(&mut out)?;
            }
        }
        OutputMode::Text => {
            if !items.is_empty() && !R::table_headers().is_empty() {
                writeln!(out, "{}", R::table_headers().join("\t"))?;
            }
            for item in items {
                item.render_table(&mut out)?;
            }
        }
        OutputMode::Json => write_json(&mut out, items)?,
    }
    Ok(())
}

/// Render a serializable value: JSON as-is, otherwise through `human_fn`.
pub fn render_value<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => write_json(&mut out, value)?,
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E4001", "missing_user").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
            kind: None,
        }
    }

    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
            kind: None,
        }
    }
}

impl From<&helpdesk_core::Error> for CliError {
    fn from(err: &helpdesk_core::Error) -> Self {
        let kind = err.kind();
        Self {
            message: err.to_string(),
            suggestion: kind.hint().map(str::to_string),
            error_code: Some(kind.code().to_string()),
            kind: Some(kind.label()),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            write_json(&mut out, &serde_json::json!({ "error": error }))?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error: {}", error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

pub fn render_success(mode: OutputMode, message: &str) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            write_json(&mut out, &serde_json::json!({ "ok": true, "message": message }))?;
        }
        OutputMode::Pretty | OutputMode::Text => writeln!(out, "✓ {message}")?,
    }
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl Renderable for Ticket {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &format!("{} {}", self.external_key, self.title))?;
        pretty_kv(w, "ID", &self.id)?;
        pretty_kv(w, "Status", self.status.as_str())?;
        pretty_kv(w, "Priority", self.priority.as_str())?;
        pretty_kv(w, "Requester", &self.requester_id)?;
        pretty_kv(w, "Department", &self.department_id)?;
        pretty_kv(w, "Team", or_dash(self.team_id.as_deref()))?;
        pretty_kv(w, "Assignee", or_dash(self.assignee_id.as_deref()))?;
        if !self.tags.is_empty() {
            pretty_kv(w, "Tags", self.tags.join(", "))?;
        }
        pretty_kv(w, "Updated", self.updated_at.to_rfc3339())?;
        if let Some(closed) = self.closed_at {
            pretty_kv(w, "Closed", closed.to_rfc3339())?;
        }
        if !self.description.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", self.description)?;
        }
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            self.external_key,
            self.status,
            self.priority,
            or_dash(self.team_id.as_deref()),
            or_dash(self.assignee_id.as_deref()),
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "key", "status", "priority", "team", "assignee", "title"]
    }
}

impl Renderable for TicketView {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        self.ticket.render_human(w)?;
        pretty_section(w, &format!("Messages ({})", self.messages.len()))?;
        for message in &self.messages {
            writeln!(
                w,
                "[{}] {} {} ({})",
                message.created_at.format("%Y-%m-%d %H:%M"),
                message.author_type,
                or_dash(message.author_id.as_deref()),
                message.message_type
            )?;
            if !message.body.is_empty() {
                writeln!(w, "  {}", message.body)?;
            }
            for attachment in &message.attachments {
                writeln!(
                    w,
                    "  + {} ({}, {} bytes)",
                    attachment.file_name, attachment.mime_type, attachment.size_bytes
                )?;
            }
        }
        Ok(())
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        self.ticket.render_table(w)?;
        for message in &self.messages {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                message.id,
                message.message_type,
                or_dash(message.author_id.as_deref()),
                message.body.replace('\n', " ")
            )?;
        }
        Ok(())
    }
}

impl Renderable for TicketHistory {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {:<17} {} {}  {} -> {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.change_type().as_str(),
            self.changed_by_type,
            or_dash(self.changed_by_id.as_deref()),
            self.change.old_value(),
            self.change.new_value()
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.created_at.to_rfc3339(),
            self.change_type().as_str(),
            self.changed_by_type,
            or_dash(self.changed_by_id.as_deref()),
            self.change.old_value(),
            self.change.new_value()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["at", "change", "by_type", "by", "old", "new"]
    }
}

impl Renderable for StaffMember {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:<12} {:<10} {:<24} dept={} team={}{}",
            self.id,
            self.role.as_str(),
            self.email,
            or_dash(self.department_id.as_deref()),
            or_dash(self.team_id.as_deref()),
            if self.active { "" } else { " (inactive)" }
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            self.name,
            self.email,
            self.role,
            or_dash(self.department_id.as_deref()),
            or_dash(self.team_id.as_deref()),
            self.active
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "name", "email", "role", "department", "team", "active"]
    }
}

impl Renderable for Team {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:<12} {:<24} dept={}{}",
            self.id,
            self.name,
            self.department_id,
            if self.active { "" } else { " (inactive)" }
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.id, self.department_id, self.name, self.active
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "department", "name", "active"]
    }
}

impl Renderable for Department {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:<12} {}{}",
            self.id,
            self.name,
            if self.active { "" } else { " (inactive)" }
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}\t{}", self.id, self.name, self.active)
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "name", "active"]
    }
}
