//! `hd assign`: bind tickets to staff and teams.

use crate::app::App;
use crate::output::render_item;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum AssignCommand {
    /// Take a ticket yourself.
    #[command(name = "self")]
    SelfAssign(TicketArg),
    /// Assign a ticket to a staff member (team lead or admin).
    Staff(StaffArgs),
    /// Route a ticket to a team, clearing its assignee (team lead or admin).
    Team(TeamArgs),
    /// Route a ticket to a team and pick an assignee from its roster.
    Auto(TeamArgs),
}

#[derive(Args, Debug)]
pub struct TicketArg {
    /// Ticket id or TCK- key.
    pub ticket: String,
}

#[derive(Args, Debug)]
pub struct StaffArgs {
    pub ticket: String,
    pub staff: String,
}

#[derive(Args, Debug)]
pub struct TeamArgs {
    pub ticket: String,
    pub team: String,
}

/// # Errors
///
/// Returns an error for engine rejections or store failures.
pub fn run_assign(app: &App, command: &AssignCommand) -> Result<()> {
    let ctx = app.context();
    let ticket = match command {
        AssignCommand::SelfAssign(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            app.check(app.assignment.self_assign(&ctx, staff.as_ref(), &id))?
        }
        AssignCommand::Staff(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            app.check(
                app.assignment
                    .assign_to_staff(&ctx, staff.as_ref(), &id, &args.staff),
            )?
        }
        AssignCommand::Team(args) => {
            let id = app.ticket_id(&args.ticket)?;
            let staff = app.staff()?;
            app.check(
                app.assignment
                    .assign_to_team(&ctx, staff.as_ref(), &id, &args.team),
            )?
        }
        AssignCommand::Auto(args) => {
            let id = app.ticket_id(&args.ticket)?;
            app.check(app.assignment.auto_assign(&ctx, &id, &args.team))?
        }
    };
    Ok(render_item(&ticket, app.output)?)
}
