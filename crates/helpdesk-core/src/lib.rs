//! helpdesk-core library.
//!
//! Two synchronous engines sit on top of pluggable stores:
//!
//! - [`TicketLifecycleEngine`]: creation, status and priority changes,
//!   messages, requester and staff read paths.
//! - [`AssignmentEngine`]: self-assignment, directed assignment, team
//!   routing and deterministic auto-assignment.
//!
//! Every mutation writes the ticket and its history entries atomically, then
//! publishes a best-effort [`TicketEvent`].
//!
//! # Conventions
//!
//! - **Errors**: engine operations return [`Result`] with a typed [`Error`];
//!   setup and config code uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod access;
pub mod assignment;
pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod store;

#[cfg(test)]
mod test_support;

pub use access::AccessScopeGuard;
pub use assignment::AssignmentEngine;
pub use config::{EngineSettings, HelpdeskConfig};
pub use context::{CancelHandle, RequestContext};
pub use db::SqliteStore;
pub use error::{Error, ErrorKind, Resource, Result};
pub use event::{EventBus, InMemoryEventBus, TicketEvent};
pub use lifecycle::{
    CreateTicketInput, MessageActor, NewMessage, StaffTicketQuery, TicketLifecycleEngine,
    TicketView, UserTicketQuery,
};
pub use store::{MemoryStore, Page, Repositories};
