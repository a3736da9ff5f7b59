//! Request-scoped values passed down the chain

use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;

/// Which side of the connection this chain runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client side
    Client,
    /// Server side (endpoint or forwarder)
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Context for one Request or Close call
///
/// Carries the role, a cancellation flag and free-form metadata. It never
/// carries the chain itself: each element holds its successor directly.
#[derive(Debug, Clone)]
pub struct RequestContext {
    role: Role,
    cancel: Option<watch::Receiver<bool>>,
    metadata: BTreeMap<String, String>,
}

impl RequestContext {
    /// Context for a server-side chain
    #[must_use]
    pub const fn server() -> Self {
        Self {
            role: Role::Server,
            cancel: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Context for a client-side chain
    #[must_use]
    pub const fn client() -> Self {
        Self {
            role: Role::Client,
            cancel: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Make this context cancellable
    #[must_use]
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    /// Attach a metadata value
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Role of the chain
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Whether this is a client-side call
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Look up a metadata value
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::server()
    }
}

/// Cancels every clone of the context it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
