//! Shared harness for helpdesk-core integration tests.

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use helpdesk_core::event::EventType;
use helpdesk_core::model::org::{Department, StaffMember, StaffRole, Team};
use helpdesk_core::store::{
    AttachmentStore, OrgRoster, StaffDirectory, TicketHistoryStore, TicketMessageStore,
    TicketStore,
};
use helpdesk_core::{
    AssignmentEngine, CreateTicketInput, EngineSettings, InMemoryEventBus, MemoryStore,
    Repositories, RequestContext, SqliteStore, TicketEvent, TicketLifecycleEngine,
};
use std::sync::{Arc, Mutex};

pub trait FullStore:
    TicketStore
    + TicketHistoryStore
    + TicketMessageStore
    + AttachmentStore
    + StaffDirectory
    + OrgRoster
    + 'static
{
}

impl<T> FullStore for T where
    T: TicketStore
        + TicketHistoryStore
        + TicketMessageStore
        + AttachmentStore
        + StaffDirectory
        + OrgRoster
        + 'static
{
}

pub struct Desk<S> {
    pub store: Arc<S>,
    pub events: Arc<Mutex<Vec<TicketEvent>>>,
    pub lifecycle: TicketLifecycleEngine,
    pub assignment: AssignmentEngine,
}

pub fn memory_desk() -> Desk<MemoryStore> {
    Desk::new(Arc::new(MemoryStore::new()))
}

pub fn sqlite_desk() -> Desk<SqliteStore> {
    Desk::new(Arc::new(
        SqliteStore::open_in_memory().expect("open in-memory sqlite store"),
    ))
}

pub fn ctx() -> RequestContext {
    RequestContext::background()
}

impl<S: FullStore> Desk<S> {
    /// IT (`d-it`) with teams `net` and `apps`; HR (`d-hr`) with `payroll`.
    pub fn new(store: Arc<S>) -> Self {
        let bus = Arc::new(InMemoryEventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe_all(move |_, event| {
            sink.lock().expect("event sink").push(event.clone());
            Ok(())
        });

        let repos = Repositories::from_store(Arc::clone(&store));
        let desk = Self {
            lifecycle: TicketLifecycleEngine::new(
                repos.clone(),
                bus.clone(),
                EngineSettings::default(),
            ),
            assignment: AssignmentEngine::new(repos, bus, EngineSettings::default()),
            store,
            events,
        };
        desk.department("d-it", true);
        desk.department("d-hr", true);
        desk.team("net", "d-it", true);
        desk.team("apps", "d-it", true);
        desk.team("payroll", "d-hr", true);
        desk
    }

    pub fn department(&self, id: &str, active: bool) {
        self.store
            .insert_department(&Department {
                id: id.into(),
                name: id.to_uppercase(),
                active,
                created_at: Utc::now(),
            })
            .expect("insert department");
    }

    pub fn team(&self, id: &str, department_id: &str, active: bool) {
        self.store
            .insert_team(&Team {
                id: id.into(),
                department_id: department_id.into(),
                name: id.to_uppercase(),
                active,
                created_at: Utc::now(),
            })
            .expect("insert team");
    }

    pub fn staff(
        &self,
        id: &str,
        role: StaffRole,
        department_id: Option<&str>,
        team_id: Option<&str>,
        joined_day: i64,
    ) -> StaffMember {
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid epoch");
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
        self.store.insert_staff(&staff).expect("insert staff");
        staff
    }

    pub fn open_ticket(&self, requester: &str, department: &str, team: Option<&str>) -> String {
        self.lifecycle
            .create_ticket(
                &ctx(),
                requester,
                CreateTicketInput {
                    department_id: department.into(),
                    team_id: team.map(Into::into),
                    title: "Cannot reach the wiki".into(),
                    description: "Times out from the office network".into(),
                    ..CreateTicketInput::default()
                },
            )
            .expect("create ticket")
            .id
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events
            .lock()
            .expect("event sink")
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}
