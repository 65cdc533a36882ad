//! `hd history`: a ticket's audit trail, newest first.

use crate::app::App;
use crate::output::render_list;
use anyhow::Result;
use clap::Args;
use helpdesk_core::Page;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Ticket id or TCK- key.
    pub ticket: String,
    /// Page size for staff; 0 uses the configured default.
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

/// Staff see every entry one page at a time; requesters see status,
/// assignee and team changes only.
///
/// # Errors
///
/// Returns an error for missing identity, engine rejections, or store
/// failures.
pub fn run_history(app: &App, args: &HistoryArgs) -> Result<()> {
    let ctx = app.context();
    let id = app.ticket_id(&args.ticket)?;
    let entries = match app.staff()? {
        Some(staff) => app.lifecycle.list_history_for_staff(
            &ctx,
            Some(&staff),
            &id,
            Page::new(args.limit, args.offset),
        ),
        None => {
            let user = app.user()?;
            app.lifecycle.list_history_for_user(&ctx, &user, &id)
        }
    };
    Ok(render_list(&app.check(entries)?, app.output)?)
}
