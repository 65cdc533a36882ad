//! Event publication.

use super::{EventType, TicketEvent};
use crate::context::RequestContext;
use crate::error::Error;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

/// Error a handler may return. The bus logs it and moves on.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriber callback.
pub type EventHandler =
    Arc<dyn Fn(&RequestContext, &TicketEvent) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish refused: request cancelled")]
    Cancelled,

    #[error("publish refused: request deadline exceeded")]
    DeadlineExceeded,

    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget publication. Callers treat any error as advisory.
pub trait EventBus: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the event could not be handed off. The
    /// mutation it describes is already committed either way.
    fn publish(&self, ctx: &RequestContext, event: &TicketEvent) -> Result<(), PublishError>;
}

/// Synchronous in-process dispatcher keyed by [`EventType`].
///
/// Handlers run on the publishing thread in subscription order. A handler
/// that fails or panics is logged and does not stop later handlers. Builds
/// with `panic = "abort"` still abort on a handler panic.
#[derive(Default)]
pub struct InMemoryEventBus {
    listeners: RwLock<HashMap<EventType, Vec<EventHandler>>>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F)
    where
        F: Fn(&RequestContext, &TicketEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners
            .entry(event_type)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register `handler` for every event type.
    pub fn subscribe_all<F>(&self, handler: F)
    where
        F: Fn(&RequestContext, &TicketEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        for event_type in EventType::ALL {
            let handler = Arc::clone(&handler);
            self.subscribe(event_type, move |ctx, event| handler(ctx, event));
        }
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus").finish_non_exhaustive()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, ctx: &RequestContext, event: &TicketEvent) -> Result<(), PublishError> {
        match ctx.checkpoint() {
            Err(Error::DeadlineExceeded) => return Err(PublishError::DeadlineExceeded),
            Err(_) => return Err(PublishError::Cancelled),
            Ok(()) => {}
        }

        let handlers: Vec<EventHandler> = self
            .listeners
            .read()
            .map_err(|_| PublishError::Unavailable("listener registry poisoned".into()))?
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(ctx, event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(
                        event_type = %event.event_type,
                        ticket_id = %event.ticket_id,
                        %error,
                        "event handler failed"
                    );
                }
                Err(payload) => {
                    tracing::error!(
                        event_type = %event.event_type,
                        ticket_id = %event.ticket_id,
                        panic = %panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
