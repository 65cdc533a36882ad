//! Per-invocation wiring: config, store, engines and caller identity.

use crate::identity;
use crate::output::{CliError, OutputMode, render_error};
use anyhow::Context as _;
use helpdesk_core::model::org::StaffMember;
use helpdesk_core::model::ticket::Ticket;
use helpdesk_core::store::{StaffDirectory, TicketStore};
use helpdesk_core::{
    AssignmentEngine, HelpdeskConfig, InMemoryEventBus, Repositories, RequestContext, SqliteStore,
    TicketLifecycleEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Flags shared by every command that touches the database.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub db: Option<PathBuf>,
    pub as_staff: Option<String>,
    pub as_user: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub struct App {
    pub store: Arc<SqliteStore>,
    pub lifecycle: TicketLifecycleEngine,
    pub assignment: AssignmentEngine,
    pub output: OutputMode,
    opts: GlobalOpts,
}

/// `--db` wins over the configured path.
pub fn database_path(opts: &GlobalOpts, config: &HelpdeskConfig) -> PathBuf {
    opts.db
        .clone()
        .unwrap_or_else(|| config.database.path.clone())
}

/// Every published event goes to the log; there is no other consumer here.
fn event_bus() -> Arc<InMemoryEventBus> {
    let bus = InMemoryEventBus::new();
    bus.subscribe_all(|_, event| {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            ticket_id = %event.ticket_id,
            "event"
        );
        Ok(())
    });
    Arc::new(bus)
}

impl App {
    pub fn open(opts: GlobalOpts, config: &HelpdeskConfig, output: OutputMode) -> anyhow::Result<Self> {
        let path = database_path(&opts, config);
        Self::open_at(&path, opts, config, output)
    }

    fn open_at(
        path: &Path,
        opts: GlobalOpts,
        config: &HelpdeskConfig,
        output: OutputMode,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::open(path, config.database.busy_timeout())
                .with_context(|| format!("Failed to open helpdesk database {}", path.display()))?,
        );
        let repos = Repositories::from_store(Arc::clone(&store));
        let bus = event_bus();
        let settings = config.engine_settings();
        Ok(Self {
            lifecycle: TicketLifecycleEngine::new(repos.clone(), bus.clone(), settings),
            assignment: AssignmentEngine::new(repos, bus, settings),
            store,
            output,
            opts,
        })
    }

    pub fn context(&self) -> RequestContext {
        self.opts.timeout_ms.map_or_else(RequestContext::background, |ms| {
            RequestContext::with_timeout(Duration::from_millis(ms))
        })
    }

    /// The staff member named by `--as-staff`/`HELPDESK_STAFF`, if any.
    pub fn staff(&self) -> anyhow::Result<Option<StaffMember>> {
        let Some(id) = identity::resolve_staff(self.opts.as_staff.as_deref()) else {
            return Ok(None);
        };
        match self.store.staff_by_id(&id)? {
            Some(staff) => Ok(Some(staff)),
            None => self.fail(CliError::with_details(
                format!("staff member '{id}' not found"),
                "Add them with `hd org staff add` or pick another --as-staff",
                "unknown_staff",
            )),
        }
    }

    pub fn user(&self) -> anyhow::Result<String> {
        identity::require_user(self.opts.as_user.as_deref()).or_else(|e| {
            self.fail(CliError::with_details(
                &e.message,
                "Set --as-user or HELPDESK_USER",
                e.code,
            ))
        })
    }

    /// Accept either a ticket id or its `TCK-` key.
    pub fn ticket_id(&self, reference: &str) -> anyhow::Result<String> {
        if reference.to_ascii_uppercase().starts_with("TCK-") {
            let key = reference.to_ascii_uppercase();
            if let Some(Ticket { id, .. }) = self.store.get_by_external_key(&key)? {
                return Ok(id);
            }
        }
        Ok(reference.to_string())
    }

    /// Print `error` and bail with its message.
    pub fn fail<T>(&self, error: CliError) -> anyhow::Result<T> {
        render_error(self.output, &error)?;
        anyhow::bail!("{}", error.message)
    }

    /// Print an engine error and bail, or pass the value through.
    pub fn check<T>(&self, result: helpdesk_core::Result<T>) -> anyhow::Result<T> {
        result.or_else(|err| self.fail(CliError::from(&err)))
    }
}
