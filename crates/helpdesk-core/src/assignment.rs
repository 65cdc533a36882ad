//! Binding tickets to staff and teams.
//!
//! Auto-assignment is deterministic: the same ticket id against the same
//! roster always picks the same staff member. See [`select_index`].

use crate::access::AccessScopeGuard;
use crate::audit::{self, ChangeSet};
use crate::config::EngineSettings;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::event::{AssignedData, EventActor, EventBus, EventPayload, TicketEvent};
use crate::lifecycle::require_staff;
use crate::model::history::HistoryChange;
use crate::model::message::AuthorType;
use crate::model::org::{StaffMember, Team};
use crate::model::ticket::Ticket;
use crate::store::{Page, Repositories, StaffFilter};
use std::sync::Arc;

/// Roster position chosen for `ticket_id` among `len` eligible staff.
///
/// The sum of the id's Unicode scalar values, modulo `len`. Returns 0 for an
/// empty roster.
#[must_use]
pub fn select_index(ticket_id: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let sum = ticket_id
        .chars()
        .fold(0usize, |acc, c| acc.wrapping_add(c as usize));
    sum % len
}

pub struct AssignmentEngine {
    repos: Repositories,
    events: Arc<dyn EventBus>,
    settings: EngineSettings,
}

impl std::fmt::Debug for AssignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn require_assign_privilege(actor: Option<&StaffMember>) -> Result<&StaffMember> {
    let actor = require_staff(actor)?;
    if actor.role.can_assign_others() {
        Ok(actor)
    } else {
        Err(Error::access_denied("insufficient role for assignment"))
    }
}

fn ensure_access(staff: &StaffMember, ticket: &Ticket) -> Result<()> {
    if AccessScopeGuard::can_access(staff, ticket) {
        Ok(())
    } else {
        Err(Error::access_denied("access denied"))
    }
}

/// Move `ticket` onto `team`, returning the team and department history
/// entries that apply. The department entry is only produced when the
/// department actually changes.
fn rehome(ticket: &mut Ticket, team: &Team) -> Vec<HistoryChange> {
    let mut changes = vec![HistoryChange::TeamChange {
        old: ticket.team_id.replace(team.id.clone()),
        new: Some(team.id.clone()),
    }];
    if ticket.department_id != team.department_id {
        let old = std::mem::replace(&mut ticket.department_id, team.department_id.clone());
        changes.push(HistoryChange::DepartmentChange {
            old,
            new: team.department_id.clone(),
        });
    }
    changes
}

impl AssignmentEngine {
    #[must_use]
    pub fn new(repos: Repositories, events: Arc<dyn EventBus>, settings: EngineSettings) -> Self {
        Self {
            repos,
            events,
            settings,
        }
    }

    fn active_team(&self, team_id: &str) -> Result<Team> {
        let team = self.repos.team(team_id)?;
        if team.active {
            Ok(team)
        } else {
            Err(Error::conflict("team inactive"))
        }
    }

    fn publish_assigned(&self, ctx: &RequestContext, ticket: &Ticket, actor: EventActor) {
        let event = TicketEvent::new(
            ticket.id.clone(),
            actor,
            audit::now(),
            EventPayload::Assigned(AssignedData {
                assignee_staff_id: ticket.assignee_id.clone(),
                team_id: ticket.team_id.clone(),
            }),
        );
        audit::publish_best_effort(self.events.as_ref(), ctx, &event);
    }

    /// Take a ticket within the caller's own scope.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without staff, `NotFound`, or `AccessDenied`.
    pub fn self_assign(
        &self,
        ctx: &RequestContext,
        staff: Option<&StaffMember>,
        ticket_id: &str,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let staff = require_staff(staff)?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(staff, &ticket)?;

        let now = audit::now();
        let old = ticket.assignee_id.replace(staff.id.clone());
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&staff.id), now);
        changes.record(HistoryChange::AssigneeChange {
            old,
            new: Some(staff.id.clone()),
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        self.publish_assigned(ctx, &ticket, EventActor::staff(&staff.id));
        Ok(ticket)
    }

    /// Hand a ticket to a specific staff member.
    ///
    /// Non-admin actors may only pick assignees who share the ticket's team
    /// or department.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without staff, `AccessDenied` for agents
    /// - `NotFound` for an unknown assignee or ticket
    /// - `Conflict` for an inactive assignee
    /// - `AccessDenied` when the actor lacks scope or the assignee is
    ///   outside the ticket's scope
    pub fn assign_to_staff(
        &self,
        ctx: &RequestContext,
        actor: Option<&StaffMember>,
        ticket_id: &str,
        assignee_id: &str,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let actor = require_assign_privilege(actor)?;
        let assignee = self.repos.staff(assignee_id)?;
        if !assignee.active {
            return Err(Error::conflict("assignee inactive"));
        }
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(actor, &ticket)?;
        if !actor.is_admin() && !AccessScopeGuard::matches_assignment_scope(&assignee, &ticket) {
            return Err(Error::access_denied("assignee outside ticket scope"));
        }

        let now = audit::now();
        let old = ticket.assignee_id.replace(assignee.id.clone());
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&actor.id), now);
        changes.record(HistoryChange::AssigneeChange {
            old,
            new: Some(assignee.id.clone()),
        });
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        tracing::info!(
            ticket_id = %ticket.id,
            assignee_id = %assignee.id,
            actor_id = %actor.id,
            "ticket assigned to staff"
        );
        self.publish_assigned(ctx, &ticket, EventActor::staff(&actor.id));
        Ok(ticket)
    }

    /// Route a ticket to a team. The department follows the team and the
    /// current assignee is cleared.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without staff, `AccessDenied` for agents
    /// - `NotFound` for an unknown team or ticket
    /// - `Conflict` for an inactive team
    /// - `AccessDenied` when the actor lacks scope on the ticket as it
    ///   stands before the move
    pub fn assign_to_team(
        &self,
        ctx: &RequestContext,
        actor: Option<&StaffMember>,
        ticket_id: &str,
        team_id: &str,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let actor = require_assign_privilege(actor)?;
        let team = self.active_team(team_id)?;
        let mut ticket = self.repos.ticket(ticket_id)?;
        ensure_access(actor, &ticket)?;

        let now = audit::now();
        let moves = rehome(&mut ticket, &team);
        ticket.assignee_id = None;
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&actor.id), now);
        for change in moves {
            changes.record(change);
        }
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        tracing::info!(
            ticket_id = %ticket.id,
            team_id = %team.id,
            actor_id = %actor.id,
            "ticket routed to team"
        );
        self.publish_assigned(ctx, &ticket, EventActor::staff(&actor.id));
        Ok(ticket)
    }

    /// Route a ticket to `team_id` and assign it to a roster member chosen
    /// by [`select_index`] over active team staff ordered by join time.
    ///
    /// History entries and the event are attributed to the chosen assignee.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown team or ticket, `Conflict` for an inactive
    /// team or an empty roster. An empty roster leaves the ticket untouched.
    pub fn auto_assign(
        &self,
        ctx: &RequestContext,
        ticket_id: &str,
        team_id: &str,
    ) -> Result<Ticket> {
        ctx.checkpoint()?;
        let team = self.active_team(team_id)?;
        let mut roster = self.repos.directory.list_staff(&StaffFilter {
            team_id: Some(team.id.clone()),
            active_only: true,
            page: Page::new(self.settings.auto_assign_roster_limit, 0),
            ..StaffFilter::default()
        })?;
        if roster.is_empty() {
            return Err(Error::conflict("no eligible staff for team"));
        }
        roster.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut ticket = self.repos.ticket(ticket_id)?;
        let index = select_index(&ticket.id, roster.len());
        let assignee = roster.swap_remove(index);

        let now = audit::now();
        let mut moves = rehome(&mut ticket, &team);
        moves.push(HistoryChange::AssigneeChange {
            old: ticket.assignee_id.replace(assignee.id.clone()),
            new: Some(assignee.id.clone()),
        });
        ticket.updated_at = now;

        let mut changes = ChangeSet::new(&ticket, AuthorType::Staff, Some(&assignee.id), now);
        for change in moves {
            changes.record(change);
        }
        changes.commit(ctx, self.repos.tickets.as_ref(), &ticket)?;

        tracing::info!(
            ticket_id = %ticket.id,
            team_id = %team.id,
            assignee_id = %assignee.id,
            roster_size = roster.len() + 1,
            index,
            "ticket auto-assigned"
        );
        self.publish_assigned(ctx, &ticket, EventActor::staff(&assignee.id));
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::history::ChangeType;
    use crate::model::org::StaffRole;
    use crate::store::{OrgRoster, StaffDirectory, TicketStore};
    use crate::test_support::Fixture;
    use proptest::prelude::*;

    fn bg() -> RequestContext {
        RequestContext::background()
    }

    fn history_types(fx: &Fixture, ticket_id: &str) -> Vec<ChangeType> {
        let admin = fx
            .store
            .staff_by_id("s-root")
            .unwrap()
            .unwrap_or_else(|| fx.staff("s-root", StaffRole::Admin, None, None, 99));
        let mut entries = fx
            .lifecycle
            .list_history_for_staff(&bg(), Some(&admin), ticket_id, Page::new(100, 0))
            .unwrap();
        entries.reverse();
        entries.iter().map(|h| h.change_type()).collect()
    }

    #[test]
    fn select_index_is_code_point_sum() {
        assert_eq!(select_index("ab", 2), (97 + 98) % 2);
        assert_eq!(select_index("é", 7), 0xE9 % 7);
        assert_eq!(select_index("anything", 1), 0);
        assert_eq!(select_index("x", 0), 0);
    }

    #[test]
    fn self_assign_records_change() {
        let fx = Fixture::new();
        let agent = fx.staff("s-1", StaffRole::Agent, Some("d-1"), Some("team-a"), 0);
        let ticket = fx.ticket("u-1", Some("team-a"));

        let assigned = fx
            .assignment
            .self_assign(&bg(), Some(&agent), &ticket.id)
            .unwrap();
        assert_eq!(assigned.assignee_id.as_deref(), Some("s-1"));
        assert_eq!(history_types(&fx, &ticket.id), vec![ChangeType::AssigneeChange]);
        assert_eq!(fx.last_event().actor, EventActor::staff("s-1"));

        let err = fx.assignment.self_assign(&bg(), None, &ticket.id).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn self_assign_respects_scope() {
        let fx = Fixture::new();
        let outsider = fx.staff("s-x", StaffRole::Agent, Some("d-2"), Some("team-x"), 0);
        let ticket = fx.ticket("u-1", Some("team-a"));
        let err = fx
            .assignment
            .self_assign(&bg(), Some(&outsider), &ticket.id)
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
        assert_eq!(fx.store.history_len().unwrap(), 0);
    }

    #[test]
    fn agents_cannot_assign_others() {
        let fx = Fixture::new();
        let agent = fx.staff("s-1", StaffRole::Agent, Some("d-1"), Some("team-a"), 0);
        fx.staff("s-2", StaffRole::Agent, Some("d-1"), Some("team-a"), 1);
        let ticket = fx.ticket("u-1", Some("team-a"));

        let err = fx
            .assignment
            .assign_to_staff(&bg(), Some(&agent), &ticket.id, "s-2")
            .unwrap_err();
        assert_eq!(err.to_string(), Error::access_denied("insufficient role for assignment").to_string());
    }

    #[test]
    fn lead_assigns_within_scope_only() {
        let fx = Fixture::new();
        let lead = fx.staff("s-lead", StaffRole::TeamLead, Some("d-1"), Some("team-a"), 0);
        fx.staff("s-2", StaffRole::Agent, None, Some("team-a"), 1);
        fx.staff("s-far", StaffRole::Agent, Some("d-2"), Some("team-x"), 2);
        let ticket = fx.ticket("u-1", Some("team-a"));

        let assigned = fx
            .assignment
            .assign_to_staff(&bg(), Some(&lead), &ticket.id, "s-2")
            .unwrap();
        assert_eq!(assigned.assignee_id.as_deref(), Some("s-2"));

        let err = fx
            .assignment
            .assign_to_staff(&bg(), Some(&lead), &ticket.id, "s-far")
            .unwrap_err();
        assert_eq!(err.to_string(), Error::access_denied("assignee outside ticket scope").to_string());

        let admin = fx.staff("s-a", StaffRole::Admin, None, None, 3);
        let assigned = fx
            .assignment
            .assign_to_staff(&bg(), Some(&admin), &ticket.id, "s-far")
            .unwrap();
        assert_eq!(assigned.assignee_id.as_deref(), Some("s-far"));
    }

    #[test]
    fn inactive_or_missing_assignee() {
        let fx = Fixture::new();
        let admin = fx.staff("s-a", StaffRole::Admin, None, None, 0);
        fx.staff("s-gone", StaffRole::Agent, Some("d-1"), None, 1);
        fx.store.set_staff_active("s-gone", false).unwrap();
        let ticket = fx.ticket("u-1", None);

        let err = fx
            .assignment
            .assign_to_staff(&bg(), Some(&admin), &ticket.id, "s-gone")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = fx
            .assignment
            .assign_to_staff(&bg(), Some(&admin), &ticket.id, "s-404")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn team_move_across_departments() {
        let fx = Fixture::new();
        let admin = fx.staff("s-a", StaffRole::Admin, None, None, 0);
        let ticket = fx.ticket("u-1", Some("team-a"));
        fx.assignment
            .self_assign(&bg(), Some(&admin), &ticket.id)
            .unwrap();

        let moved = fx
            .assignment
            .assign_to_team(&bg(), Some(&admin), &ticket.id, "team-x")
            .unwrap();
        assert_eq!(moved.team_id.as_deref(), Some("team-x"));
        assert_eq!(moved.department_id, "d-2");
        assert!(moved.assignee_id.is_none());
        assert_eq!(
            history_types(&fx, &ticket.id),
            vec![
                ChangeType::AssigneeChange,
                ChangeType::TeamChange,
                ChangeType::DepartmentChange,
            ]
        );
        match fx.last_event().payload {
            EventPayload::Assigned(data) => {
                assert!(data.assignee_staff_id.is_none());
                assert_eq!(data.team_id.as_deref(), Some("team-x"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn team_move_within_department_skips_department_entry() {
        let fx = Fixture::new();
        let lead = fx.staff("s-lead", StaffRole::TeamLead, Some("d-1"), None, 0);
        let ticket = fx.ticket("u-1", Some("team-a"));
        fx.assignment
            .assign_to_team(&bg(), Some(&lead), &ticket.id, "team-b")
            .unwrap();
        assert_eq!(history_types(&fx, &ticket.id), vec![ChangeType::TeamChange]);
    }

    #[test]
    fn inactive_team_is_rejected() {
        let fx = Fixture::new();
        let admin = fx.staff("s-a", StaffRole::Admin, None, None, 0);
        fx.team("team-off", "d-1", false);
        let ticket = fx.ticket("u-1", None);
        let err = fx
            .assignment
            .assign_to_team(&bg(), Some(&admin), &ticket.id, "team-off")
            .unwrap_err();
        assert_eq!(err.to_string(), Error::conflict("team inactive").to_string());
        let err = fx
            .assignment
            .auto_assign(&bg(), &ticket.id, "team-off")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn auto_assign_picks_by_id_and_join_order() {
        let fx = Fixture::new();
        // Inserted out of join order on purpose.
        fx.staff("s-late", StaffRole::Agent, Some("d-2"), Some("team-x"), 5);
        fx.staff("s-early", StaffRole::Agent, Some("d-2"), Some("team-x"), 1);
        fx.staff("s-mid", StaffRole::Agent, Some("d-2"), Some("team-x"), 3);
        let ticket = fx.ticket("u-1", Some("team-a"));

        let ordered = ["s-early", "s-mid", "s-late"];
        let expected = ordered[select_index(&ticket.id, 3)];

        let assigned = fx
            .assignment
            .auto_assign(&bg(), &ticket.id, "team-x")
            .unwrap();
        assert_eq!(assigned.assignee_id.as_deref(), Some(expected));
        assert_eq!(assigned.department_id, "d-2");
        assert_eq!(
            history_types(&fx, &ticket.id),
            vec![
                ChangeType::TeamChange,
                ChangeType::DepartmentChange,
                ChangeType::AssigneeChange,
            ]
        );
        assert_eq!(fx.last_event().actor, EventActor::staff(expected));

        let again = fx
            .assignment
            .auto_assign(&bg(), &ticket.id, "team-x")
            .unwrap();
        assert_eq!(again.assignee_id, assigned.assignee_id);
    }

    #[test]
    fn auto_assign_empty_roster_leaves_ticket_alone() {
        let fx = Fixture::new();
        let inactive = fx.staff("s-off", StaffRole::Agent, Some("d-1"), Some("team-b"), 0);
        fx.store.set_staff_active(&inactive.id, false).unwrap();
        let ticket = fx.ticket("u-1", Some("team-a"));
        let events_before = fx.event_types().len();

        let err = fx
            .assignment
            .auto_assign(&bg(), &ticket.id, "team-b")
            .unwrap_err();
        assert_eq!(err.to_string(), Error::conflict("no eligible staff for team").to_string());

        let stored = fx.store.get_by_id(&ticket.id).unwrap().unwrap();
        assert_eq!(stored, ticket);
        assert_eq!(fx.store.history_len().unwrap(), 0);
        assert_eq!(fx.event_types().len(), events_before);
    }

    proptest! {
        #[test]
        fn select_index_in_bounds_and_stable(id in "\\PC{1,40}", len in 1usize..50) {
            let first = select_index(&id, len);
            prop_assert!(first < len);
            prop_assert_eq!(first, select_index(&id, len));
        }
    }
}
