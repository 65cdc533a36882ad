//! `hd org`: manage departments, teams and staff.

use crate::app::App;
use crate::output::{CliError, render_list, render_success};
use anyhow::Result;
use chrono::{SubsecRound, Utc};
use clap::{Args, Subcommand};
use helpdesk_core::model::org::{Department, StaffMember, StaffRole, Team};
use helpdesk_core::store::{OrgRoster, Page, StaffDirectory, StaffFilter, StoreError};

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// Departments.
    #[command(subcommand)]
    Dept(DeptCommand),
    /// Teams within departments.
    #[command(subcommand)]
    Team(TeamCommand),
    /// Agents, team leads and admins.
    #[command(subcommand)]
    Staff(StaffCommand),
}

#[derive(Subcommand, Debug)]
pub enum DeptCommand {
    Add(DeptAddArgs),
    List(ListInactiveArgs),
}

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    Add(TeamAddArgs),
    List(TeamListArgs),
}

#[derive(Subcommand, Debug)]
pub enum StaffCommand {
    Add(StaffAddArgs),
    List(StaffListArgs),
    /// Stop a staff member from being assigned or acting.
    Deactivate(StaffIdArgs),
    Activate(StaffIdArgs),
}

#[derive(Args, Debug)]
pub struct DeptAddArgs {
    pub id: String,
    #[arg(long)]
    pub name: String,
    /// Create the department inactive.
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Args, Debug)]
pub struct ListInactiveArgs {
    /// Include inactive entries.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct TeamAddArgs {
    pub id: String,
    #[arg(long)]
    pub department: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Args, Debug)]
pub struct TeamListArgs {
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct StaffAddArgs {
    pub id: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    /// agent, team_lead or admin.
    #[arg(long, default_value = "agent")]
    pub role: StaffRole,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub team: Option<String>,
}

#[derive(Args, Debug)]
pub struct StaffListArgs {
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub team: Option<String>,
    #[arg(long)]
    pub role: Option<StaffRole>,
    /// Only active staff.
    #[arg(long)]
    pub active: bool,
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct StaffIdArgs {
    pub id: String,
}

fn blank(field: &str) -> CliError {
    CliError::with_details(
        format!("{field} must not be blank"),
        format!("Pass a non-empty --{field}"),
        "invalid_argument",
    )
}

/// Roster writes bypass the engines; surface duplicates as friendly errors.
fn roster_write(app: &App, result: Result<(), StoreError>) -> Result<()> {
    match result {
        Err(StoreError::Duplicate { entity, id }) => app.fail(CliError::with_details(
            format!("{entity} '{id}' already exists"),
            "Pick a different id or email",
            "duplicate",
        )),
        Err(other) => Err(other.into()),
        Ok(()) => Ok(()),
    }
}

/// # Errors
///
/// Returns an error for blank fields, unknown parents, duplicates, or store
/// failures.
pub fn run_org(app: &App, command: &OrgCommand) -> Result<()> {
    let now = Utc::now().trunc_subsecs(6);
    match command {
        OrgCommand::Dept(DeptCommand::Add(args)) => {
            if args.name.trim().is_empty() {
                return app.fail(blank("name"));
            }
            let department = Department {
                id: args.id.clone(),
                name: args.name.trim().to_string(),
                active: !args.inactive,
                created_at: now,
            };
            roster_write(app, app.store.insert_department(&department))?;
            tracing::info!(department_id = %department.id, "department added");
            render_success(app.output, &format!("Added department {}", department.id))
        }
        OrgCommand::Dept(DeptCommand::List(args)) => {
            let departments = app.store.list_departments(args.all)?;
            Ok(render_list(&departments, app.output)?)
        }
        OrgCommand::Team(TeamCommand::Add(args)) => {
            if args.name.trim().is_empty() {
                return app.fail(blank("name"));
            }
            if app.store.department_by_id(&args.department)?.is_none() {
                return app.fail(CliError::with_details(
                    format!("department '{}' not found", args.department),
                    "List departments with `hd org dept list --all`",
                    "unknown_department",
                ));
            }
            let team = Team {
                id: args.id.clone(),
                department_id: args.department.clone(),
                name: args.name.trim().to_string(),
                active: !args.inactive,
                created_at: now,
            };
            roster_write(app, app.store.insert_team(&team))?;
            tracing::info!(team_id = %team.id, department_id = %team.department_id, "team added");
            render_success(app.output, &format!("Added team {}", team.id))
        }
        OrgCommand::Team(TeamCommand::List(args)) => {
            let teams = app.store.list_teams(args.department.as_deref(), args.all)?;
            Ok(render_list(&teams, app.output)?)
        }
        OrgCommand::Staff(StaffCommand::Add(args)) => {
            if args.name.trim().is_empty() {
                return app.fail(blank("name"));
            }
            if args.email.trim().is_empty() {
                return app.fail(blank("email"));
            }
            let department_id = match (&args.department, &args.team) {
                (Some(dept), _) => Some(dept.clone()),
                (None, Some(team)) => app.store.team_by_id(team)?.map(|t| t.department_id),
                (None, None) => None,
            };
            let staff = StaffMember {
                id: args.id.clone(),
                name: args.name.trim().to_string(),
                email: args.email.trim().to_string(),
                role: args.role,
                department_id,
                team_id: args.team.clone(),
                active: true,
                created_at: now,
            };
            roster_write(app, app.store.insert_staff(&staff))?;
            tracing::info!(staff_id = %staff.id, role = %staff.role, "staff added");
            render_success(app.output, &format!("Added {} {}", staff.role, staff.id))
        }
        OrgCommand::Staff(StaffCommand::List(args)) => {
            let staff = app.store.list_staff(&StaffFilter {
                department_id: args.department.clone(),
                team_id: args.team.clone(),
                role: args.role,
                active_only: args.active,
                page: Page::new(args.limit, args.offset),
            })?;
            Ok(render_list(&staff, app.output)?)
        }
        OrgCommand::Staff(StaffCommand::Deactivate(args)) => set_active(app, &args.id, false),
        OrgCommand::Staff(StaffCommand::Activate(args)) => set_active(app, &args.id, true),
    }
}

fn set_active(app: &App, id: &str, active: bool) -> Result<()> {
    if !app.store.set_staff_active(id, active)? {
        return app.fail(CliError::with_details(
            format!("staff member '{id}' not found"),
            "List staff with `hd org staff list`",
            "unknown_staff",
        ));
    }
    tracing::info!(staff_id = %id, active, "staff activity changed");
    let verb = if active { "Activated" } else { "Deactivated" };
    render_success(app.output, &format!("{verb} {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: OrgCommand,
    }

    #[test]
    fn staff_add_parses_role() {
        let w = Wrapper::parse_from([
            "test", "staff", "add", "s-1", "--name", "Sam", "--email", "sam@x.io", "--role",
            "team-lead", "--team", "net",
        ]);
        match w.command {
            OrgCommand::Staff(StaffCommand::Add(args)) => {
                assert_eq!(args.role, StaffRole::TeamLead);
                assert_eq!(args.team.as_deref(), Some("net"));
                assert!(args.department.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn staff_role_defaults_to_agent() {
        let w = Wrapper::parse_from([
            "test", "staff", "add", "s-1", "--name", "Sam", "--email", "sam@x.io",
        ]);
        assert!(matches!(
            w.command,
            OrgCommand::Staff(StaffCommand::Add(StaffAddArgs {
                role: StaffRole::Agent,
                ..
            }))
        ));
    }

    #[test]
    fn bad_role_is_rejected() {
        let result = Wrapper::try_parse_from([
            "test", "staff", "add", "s-1", "--name", "Sam", "--email", "e", "--role", "boss",
        ]);
        assert!(result.is_err());
    }
}
