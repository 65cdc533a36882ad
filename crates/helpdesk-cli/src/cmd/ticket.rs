//! `hd ticket`: create, inspect and move tickets.
//!
//! Read commands use the staff view when `--as-staff` resolves and the
//! requester view otherwise.

use crate::app::App;
use crate::output::{render_item, render_list, render_value};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use helpdesk_core::model::message::{MessageType, NewAttachment};
use helpdesk_core::model::ticket::{TicketPriority, TicketStatus};
use helpdesk_core::{
    CreateTicketInput, MessageActor, NewMessage, Page, StaffTicketQuery, UserTicketQuery,
};
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum TicketCommand {
    /// Open a ticket as the requester.
    Create(CreateArgs),
    /// Show a ticket with its visible messages.
    Show(TicketRef),
    /// List tickets visible to the caller.
    List(ListArgs),
    /// Move a ticket to a new status (staff).
    Status(StatusArgs),
    /// Change a ticket's priority (staff).
    Priority(PriorityArgs),
    /// Replace a ticket's tags (staff).
    Tags(TagsArgs),
    /// Close a resolved or pending ticket as its requester.
    Close(TicketRef),
    /// Post a reply or internal note.
    Message(MessageArgs),
}

#[derive(Args, Debug)]
pub struct TicketRef {
    /// Ticket id or TCK- key.
    pub ticket: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(short, long)]
    pub title: String,
    #[arg(long)]
    pub department: String,
    #[arg(long)]
    pub team: Option<String>,
    #[arg(short, long, default_value = "")]
    pub description: String,
    #[arg(short, long)]
    pub priority: Option<TicketPriority>,
    /// Tags (repeat or comma-separate).
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<TicketStatus>,
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<TicketPriority>,
    /// Case-insensitive match on title and description (staff).
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub team: Option<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    /// Created on or after (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_time)]
    pub created_from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_time)]
    pub created_to: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_time)]
    pub updated_from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_time)]
    pub updated_to: Option<DateTime<Utc>>,
    /// Page size; 0 uses the configured default.
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub ticket: String,
    pub status: TicketStatus,
    #[arg(short, long, default_value = "")]
    pub comment: String,
}

#[derive(Args, Debug)]
pub struct PriorityArgs {
    pub ticket: String,
    pub priority: TicketPriority,
}

#[derive(Args, Debug)]
pub struct TagsArgs {
    pub ticket: String,
    /// New tag set; pass none to clear.
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MessageArgs {
    pub ticket: String,
    #[arg(short, long, default_value = "")]
    pub body: String,
    /// Post an internal note instead of a public reply (staff).
    #[arg(long)]
    pub internal: bool,
    /// Attachment as STORAGE_KEY:FILE_NAME[:MIME[:SIZE]].
    #[arg(long = "attach", value_parser = parse_attachment)]
    pub attachments: Vec<NewAttachment>,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"))
}

fn parse_attachment(raw: &str) -> Result<NewAttachment, String> {
    let mut parts = raw.splitn(4, ':');
    let storage_key = parts.next().unwrap_or_default().to_string();
    let file_name = parts
        .next()
        .ok_or_else(|| format!("invalid attachment '{raw}': expected STORAGE_KEY:FILE_NAME"))?
        .to_string();
    let mime_type = parts
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let size_bytes = match parts.next() {
        Some(size) => size
            .parse()
            .map_err(|_| format!("invalid attachment size '{size}'"))?,
        None => 0,
    };
    Ok(NewAttachment {
        storage_key,
        file_name,
        mime_type,
        size_bytes,
    })
}

/// # Errors
///
/// Returns an error for missing identity, engine rejections, or store
/// failures.
pub fn run_ticket(app: &App, command: TicketCommand) -> Result<()> {
    let ctx = app.context();
    match command {
        TicketCommand::Create(args) => {
            let user = app.user()?;
            let ticket = app.check(app.lifecycle.create_ticket(
                &ctx,
                &user,
                CreateTicketInput {
                    department_id: args.department,
                    team_id: args.team,
                    title: args.title,
                    description: args.description,
                    priority: args.priority,
                    tags: args.tags,
                },
            ))?;
            Ok(render_item(&ticket, app.output)?)
        }
        TicketCommand::Show(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let view = match app.staff()? {
                Some(staff) => app.lifecycle.get_ticket_for_staff(&ctx, Some(&staff), &id),
                None => {
                    let user = app.user()?;
                    app.lifecycle.get_ticket_for_user(&ctx, &user, &id)
                }
            };
            Ok(render_item(&app.check(view)?, app.output)?)
        }
        TicketCommand::List(args) => {
            let page = Page::new(args.limit, args.offset);
            let tickets = match app.staff()? {
                Some(staff) => app.lifecycle.list_staff_tickets(
                    &ctx,
                    Some(&staff),
                    StaffTicketQuery {
                        department_id: args.department,
                        team_id: args.team,
                        assignee_id: args.assignee,
                        statuses: args.status,
                        priorities: args.priority,
                        search: args.search,
                        created_from: args.created_from,
                        created_to: args.created_to,
                        updated_from: args.updated_from,
                        updated_to: args.updated_to,
                        page,
                    },
                ),
                None => {
                    let user = app.user()?;
                    app.lifecycle.list_user_tickets(
                        &ctx,
                        &user,
                        UserTicketQuery {
                            statuses: args.status,
                            priorities: args.priority,
                            created_from: args.created_from,
                            created_to: args.created_to,
                            page,
                        },
                    )
                }
            };
            Ok(render_list(&app.check(tickets)?, app.output)?)
        }
        TicketCommand::Status(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            let ticket = app.check(app.lifecycle.update_status(
                &ctx,
                staff.as_ref(),
                &id,
                args.status,
                &args.comment,
            ))?;
            Ok(render_item(&ticket, app.output)?)
        }
        TicketCommand::Priority(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            let ticket = app.check(app.lifecycle.update_priority(
                &ctx,
                staff.as_ref(),
                &id,
                args.priority,
            ))?;
            Ok(render_item(&ticket, app.output)?)
        }
        TicketCommand::Tags(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            let ticket =
                app.check(app.lifecycle.update_tags(&ctx, staff.as_ref(), &id, &args.tags))?;
            Ok(render_item(&ticket, app.output)?)
        }
        TicketCommand::Close(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let user = app.user()?;
            let ticket = app.check(app.lifecycle.close_ticket_as_user(&ctx, &user, &id))?;
            Ok(render_item(&ticket, app.output)?)
        }
        TicketCommand::Message(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let message_type = if args.internal {
                MessageType::InternalNote
            } else {
                MessageType::PublicReply
            };
            let input = NewMessage {
                message_type,
                body: args.body,
                attachments: args.attachments,
            };
            let staff = app.staff()?;
            let user;
            let actor = match &staff {
                Some(staff) => MessageActor::staff(staff),
                None => {
                    user = app.user()?;
                    MessageActor::user(&user)
                }
            };
            let message = app.check(app.lifecycle.add_message(&ctx, actor, &id, input))?;
            render_value(app.output, &message, |m, w| {
                writeln!(w, "✓ Posted {} {}", m.message_type, m.id)
            })
        }
    }
}
