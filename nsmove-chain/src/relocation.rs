//! Chain element that moves a connection's interface into its namespace
//!
//! On Request the interface named by the connection's mechanism parameters
//! is moved from the home namespace into the connection's namespace before
//! the rest of the chain runs. If the rest of the chain fails, the interface
//! is moved back, and likewise if the Request is abandoned (its future
//! dropped, e.g. by a timeout) after the move. On Close it is moved back
//! before the rest of the chain tears down.
//!
//! ```text
//!   Idle ─► Resolving ─► Relocated ─► Delegated ─┬─► Committed ───┬─► Done
//!              │             │                   └─► Compensating ┘
//!              └─────────────┴──────────────────────────────────────► Done
//! ```

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use nsmove_core::events::now;
use nsmove_core::{
    Connection, ConnectionId, Direction, Error, EventSink, InterfaceName, NetNsRef,
    RelocationEvent, Result, TracingSink,
};
use nsmove_netns::{InterfaceRelocator, NetNsWorker, RelocationConfig};

use crate::context::RequestContext;
use crate::service::NetworkService;

/// Where a Request is in its relocation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocationState {
    /// Nothing started
    Idle,
    /// Reading parameters and opening handles
    Resolving,
    /// Interface is in the connection's namespace
    Relocated,
    /// Rest of the chain is running
    Delegated,
    /// Rest of the chain succeeded; handles released
    Committed,
    /// Rest of the chain failed; moving the interface back
    Compensating,
    /// Finished
    Done,
}

impl fmt::Display for RelocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Relocated => "relocated",
            Self::Delegated => "delegated",
            Self::Committed => "committed",
            Self::Compensating => "compensating",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(state: RelocationState) {
    debug!(state = %state, "Relocation state");
}

/// Moves a connection's kernel interface into the connection's namespace
pub struct RelocationElement {
    worker: Arc<NetNsWorker>,
    netns_dir: PathBuf,
    events: Arc<dyn EventSink>,
    next: Arc<dyn NetworkService>,
}

impl RelocationElement {
    /// Create an element in front of `next`
    ///
    /// Events go to [`TracingSink`] until replaced with
    /// [`with_events`](Self::with_events).
    #[must_use]
    pub fn new(
        worker: Arc<NetNsWorker>,
        config: &RelocationConfig,
        next: Arc<dyn NetworkService>,
    ) -> Self {
        Self {
            worker,
            netns_dir: config.netns_dir.clone(),
            events: Arc::new(TracingSink),
            next,
        }
    }

    /// Replace the event sink
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn resolve(&self, conn: &Connection) -> Result<(InterfaceName, NetNsRef)> {
        let interface = conn.interface_name()?;
        let netns = conn.netns_ref(&self.netns_dir)?;
        Ok((interface, netns))
    }

    fn record(&self, event: RelocationEvent) {
        self.events.record(event);
    }

    fn observe(&self, err: &Error) {
        if err.is_fatal() {
            self.record(RelocationEvent::WorkerPoisoned {
                message: err.to_string(),
                timestamp: now(),
            });
        }
    }

    fn moved(&self, id: &ConnectionId, interface: &InterfaceName, direction: Direction) {
        self.record(RelocationEvent::Moved {
            id: id.clone(),
            interface: interface.to_string(),
            direction,
            timestamp: now(),
        });
    }

    async fn relocate(
        &self,
        id: &ConnectionId,
        interface: InterfaceName,
        netns: NetNsRef,
    ) -> Result<PendingRelocation> {
        let id = id.clone();
        let worker = Arc::clone(&self.worker);
        let events = Arc::clone(&self.events);
        let outcome = self
            .worker
            .run(move |provider| {
                let relocator = InterfaceRelocator::open(Arc::clone(provider), &netns, interface)?;
                if let Err(e) = relocator.move_to_target() {
                    relocator.release();
                    return Err(e);
                }
                // Dropped right here if the caller has stopped waiting
                Ok(PendingRelocation::armed(id, relocator, worker, events))
            })
            .await;

        if let Err(e) = &outcome {
            self.observe(e);
        }
        outcome
    }

    async fn handle_request(&self, ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        enter(RelocationState::Resolving);
        let (interface, netns) = self.resolve(&conn)?;
        if ctx.is_cancelled() {
            enter(RelocationState::Done);
            return Err(Error::Cancelled);
        }

        let pending = match self.relocate(&conn.id, interface.clone(), netns.clone()).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(
                    interface = %interface,
                    netns = %netns,
                    error = %e,
                    "Failed to move interface into connection namespace"
                );
                enter(RelocationState::Done);
                return Err(e);
            }
        };
        enter(RelocationState::Relocated);
        self.moved(&conn.id, &interface, Direction::ToTarget);

        enter(RelocationState::Delegated);
        match self.next.request(ctx, conn).await {
            Ok(conn) => {
                enter(RelocationState::Committed);
                pending.commit();
                enter(RelocationState::Done);
                Ok(conn)
            }
            Err(err) => {
                enter(RelocationState::Compensating);
                info!(
                    interface = %interface,
                    error = %err,
                    "Next element failed, moving interface back"
                );
                // The job reports its own outcome to the event sink
                if let Err(e) = self.worker.run(move |_| pending.compensate()).await {
                    debug!(error = %e, "Compensation did not complete");
                }
                enter(RelocationState::Done);
                Err(Error::delegation(err))
            }
        }
    }

    async fn handle_close(&self, ctx: &RequestContext, conn: Connection) -> Result<()> {
        let (interface, netns) = self.resolve(&conn)?;
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let job_interface = interface.clone();
        let outcome = self
            .worker
            .run(move |provider| {
                let relocator =
                    InterfaceRelocator::open(Arc::clone(provider), &netns, job_interface)?;
                let moved = relocator.move_to_home();
                relocator.release();
                moved
            })
            .await;

        if let Err(e) = outcome {
            self.observe(&e);
            warn!(
                interface = %interface,
                error = %e,
                "Failed to move interface back to home namespace"
            );
            return Err(e);
        }
        self.moved(&conn.id, &interface, Direction::ToHome);

        self.next.close(ctx, conn).await
    }
}

/// Interface moved into a connection namespace whose Request has not finished
///
/// Dropped while still armed (the Request future was abandoned, or the
/// worker's reply found nobody waiting), it queues the move back home on the
/// worker.
struct PendingRelocation {
    relocator: Option<InterfaceRelocator>,
    id: ConnectionId,
    worker: Arc<NetNsWorker>,
    events: Arc<dyn EventSink>,
    requeue: bool,
}

impl PendingRelocation {
    fn armed(
        id: ConnectionId,
        relocator: InterfaceRelocator,
        worker: Arc<NetNsWorker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            relocator: Some(relocator),
            id,
            worker,
            events,
            requeue: true,
        }
    }

    /// Keep the interface where it is and release the handles
    fn commit(mut self) {
        if let Some(relocator) = self.relocator.take() {
            relocator.release();
        }
    }

    /// Move the interface home; must run on the worker thread
    fn compensate(mut self) -> Result<()> {
        let Some(relocator) = self.relocator.take() else {
            return Ok(());
        };
        let interface = relocator.interface().to_string();
        let moved = relocator.move_to_home();
        relocator.release();

        match &moved {
            Ok(()) => {
                info!(connection = %self.id, interface = %interface, "Moved interface back");
                self.events.record(RelocationEvent::Compensated {
                    id: self.id.clone(),
                    interface,
                    timestamp: now(),
                });
            }
            Err(e) => {
                warn!(
                    connection = %self.id,
                    interface = %interface,
                    error = %e,
                    "Failed to move interface back"
                );
                if e.is_fatal() {
                    self.events.record(RelocationEvent::WorkerPoisoned {
                        message: e.to_string(),
                        timestamp: now(),
                    });
                }
                self.events.record(RelocationEvent::CompensationFailed {
                    id: self.id.clone(),
                    interface,
                    message: e.to_string(),
                    timestamp: now(),
                });
            }
        }
        moved
    }
}

impl Drop for PendingRelocation {
    fn drop(&mut self) {
        let Some(relocator) = self.relocator.take() else {
            return;
        };
        let interface = relocator.interface().to_string();

        if !self.requeue {
            error!(
                connection = %self.id,
                interface = %interface,
                "Move back was never run, interface left in connection namespace"
            );
            self.events.record(RelocationEvent::CompensationFailed {
                id: self.id.clone(),
                interface,
                message: "namespace worker did not run the move back".to_string(),
                timestamp: now(),
            });
            relocator.release();
            return;
        }

        warn!(
            connection = %self.id,
            interface = %interface,
            "Request abandoned after relocation, moving interface back"
        );
        let last_try = Self {
            relocator: Some(relocator),
            id: self.id.clone(),
            worker: Arc::clone(&self.worker),
            events: Arc::clone(&self.events),
            requeue: false,
        };
        // On failure the job is dropped unrun and last_try reports it
        if let Err(e) = self.worker.try_run(move |_| last_try.compensate()) {
            warn!(error = %e, "Could not queue move back");
        }
    }
}

impl fmt::Debug for RelocationElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocationElement")
            .field("worker", &self.worker)
            .field("netns_dir", &self.netns_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NetworkService for RelocationElement {
    async fn request(&self, ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        let span = tracing::info_span!(
            "relocation",
            op = "request",
            connection = %conn.id,
            role = %ctx.role()
        );
        self.handle_request(ctx, conn).instrument(span).await
    }

    async fn close(&self, ctx: &RequestContext, conn: Connection) -> Result<()> {
        let span = tracing::info_span!(
            "relocation",
            op = "close",
            connection = %conn.id,
            role = %ctx.role()
        );
        self.handle_close(ctx, conn).instrument(span).await
    }
}
