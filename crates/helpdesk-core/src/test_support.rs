//! Shared fixtures for engine unit tests.

use crate::assignment::AssignmentEngine;
use crate::config::EngineSettings;
use crate::event::{InMemoryEventBus, TicketEvent};
use crate::lifecycle::{CreateTicketInput, TicketLifecycleEngine};
use crate::model::org::{Department, StaffMember, StaffRole, Team};
use crate::model::ticket::Ticket;
use crate::store::{MemoryStore, OrgRoster, Repositories};
use crate::RequestContext;
use chrono::{Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub events: Arc<Mutex<Vec<TicketEvent>>>,
    pub lifecycle: TicketLifecycleEngine,
    pub assignment: AssignmentEngine,
}

impl Fixture {
    /// Departments `d-1` and `d-2`; teams `team-a` (d-1), `team-b` (d-1)
    /// and `team-x` (d-2).
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe_all(move |_, event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let repos = Repositories::from_store(Arc::clone(&store));
        let fixture = Self {
            lifecycle: TicketLifecycleEngine::new(
                repos.clone(),
                bus.clone(),
                EngineSettings::default(),
            ),
            assignment: AssignmentEngine::new(repos, bus, EngineSettings::default()),
            store,
            events,
        };
        fixture.department("d-1", true);
        fixture.department("d-2", true);
        fixture.team("team-a", "d-1", true);
        fixture.team("team-b", "d-1", true);
        fixture.team("team-x", "d-2", true);
        fixture
    }

    pub fn department(&self, id: &str, active: bool) {
        self.store
            .insert_department(&Department {
                id: id.into(),
                name: format!("Dept {id}"),
                active,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    pub fn team(&self, id: &str, department_id: &str, active: bool) {
        self.store
            .insert_team(&Team {
                id: id.into(),
                department_id: department_id.into(),
                name: format!("Team {id}"),
                active,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    /// Staff created `joined_day` days after a fixed epoch, so roster order
    /// is predictable.
    pub fn staff(
        &self,
        id: &str,
        role: StaffRole,
        department_id: Option<&str>,
        team_id: Option<&str>,
        joined_day: i64,
    ) -> StaffMember {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let staff = StaffMember {
            id: id.into(),
            name: format!("Staff {id}"),
            email: format!("{id}@example.com"),
            role,
            department_id: department_id.map(Into::into),
            team_id: team_id.map(Into::into),
            active: true,
            created_at: epoch + Duration::days(joined_day),
        };
        self.store.insert_staff(&staff).unwrap();
        staff
    }

    pub fn ticket(&self, requester: &str, team_id: Option<&str>) -> Ticket {
        self.lifecycle
            .create_ticket(
                &RequestContext::background(),
                requester,
                CreateTicketInput {
                    department_id: "d-1".into(),
                    team_id: team_id.map(Into::into),
                    title: "VPN drops every hour".into(),
                    description: "Since Monday".into(),
                    ..CreateTicketInput::default()
                },
            )
            .unwrap()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.to_string())
            .collect()
    }

    pub fn last_event(&self) -> TicketEvent {
        self.events.lock().unwrap().last().cloned().unwrap()
    }
}
