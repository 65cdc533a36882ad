//! Staff scope checks.
//!
//! A non-admin staff member reaches a ticket through its team or its
//! department. A department match alone is enough, so department-level
//! staff can act on every team's tickets in that department.

use crate::model::org::StaffMember;
use crate::model::ticket::Ticket;
use crate::store::{ListScope, TicketFilter};

/// Stateless scope decisions shared by both engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessScopeGuard;

impl AccessScopeGuard {
    /// May `staff` view or mutate `ticket`?
    #[must_use]
    pub fn can_access(staff: &StaffMember, ticket: &Ticket) -> bool {
        staff.is_admin() || Self::matches_assignment_scope(staff, ticket)
    }

    /// Is `candidate` within `ticket`'s team or department, ignoring role?
    ///
    /// Used to vet a directed assignee. Admin actors skip this check.
    #[must_use]
    pub fn matches_assignment_scope(candidate: &StaffMember, ticket: &Ticket) -> bool {
        let same_team = candidate
            .team_id
            .as_ref()
            .is_some_and(|team| ticket.team_id.as_ref() == Some(team));
        let same_department = candidate
            .department_id
            .as_ref()
            .is_some_and(|dept| *dept == ticket.department_id);
        same_team || same_department
    }

    /// Restrict `filter` to what `staff` may see.
    ///
    /// Admins get the filter unchanged. Everyone else gets a
    /// [`ListScope::Restricted`] built from whichever of their department and
    /// team are set, AND-combined with the caller's criteria. A non-admin
    /// with neither keeps the filter as given.
    #[must_use]
    pub fn narrow_list_filter(mut filter: TicketFilter, staff: &StaffMember) -> TicketFilter {
        if staff.is_admin() || (staff.department_id.is_none() && staff.team_id.is_none()) {
            return filter;
        }
        filter.scope = ListScope::Restricted {
            department_id: staff.department_id.clone(),
            team_id: staff.team_id.clone(),
        };
        filter
    }
}
