//! Explicit chain composition

use async_trait::async_trait;
use std::sync::Arc;

use nsmove_core::{Connection, Result};

use crate::context::RequestContext;
use crate::service::{NetworkService, Terminal};

type Layer = Box<dyn FnOnce(Arc<dyn NetworkService>) -> Arc<dyn NetworkService> + Send>;

/// Builds a chain from first element to last
///
/// # Example
/// ```
/// use nsmove_chain::{ChainBuilder, NetworkService, RequestContext};
/// use nsmove_core::{Connection, ConnectionId};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let chain = ChainBuilder::new().build();
/// let conn = Connection::new(ConnectionId::new("conn-1").unwrap());
///
/// let out = chain.request(&RequestContext::server(), conn.clone()).await.unwrap();
/// assert_eq!(out, conn);
/// # });
/// ```
#[derive(Default)]
pub struct ChainBuilder {
    layers: Vec<Layer>,
}

impl ChainBuilder {
    /// Start an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element; `make` receives the element that will follow it
    #[must_use]
    pub fn with<S, F>(mut self, make: F) -> Self
    where
        S: NetworkService + 'static,
        F: FnOnce(Arc<dyn NetworkService>) -> S + Send + 'static,
    {
        self.layers
            .push(Box::new(move |next| Arc::new(make(next)) as Arc<dyn NetworkService>));
        self
    }

    /// Number of elements added so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no element has been added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Finish the chain with [`Terminal`]
    #[must_use]
    pub fn build(self) -> Chain {
        self.build_with_tail(Arc::new(Terminal))
    }

    /// Finish the chain with a custom last element
    #[must_use]
    pub fn build_with_tail(self, tail: Arc<dyn NetworkService>) -> Chain {
        let len = self.layers.len();
        let head = self
            .layers
            .into_iter()
            .rev()
            .fold(tail, |next, layer| layer(next));

        tracing::debug!(elements = len, "Built chain");
        Chain { head, len }
    }
}

impl std::fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// A built chain; itself a [`NetworkService`]
#[derive(Clone)]
pub struct Chain {
    head: Arc<dyn NetworkService>,
    len: usize,
}

impl Chain {
    /// Number of elements, not counting the tail
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the chain is only its tail
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("len", &self.len).finish()
    }
}

#[async_trait]
impl NetworkService for Chain {
    async fn request(&self, ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        self.head.request(ctx, conn).await
    }

    async fn close(&self, ctx: &RequestContext, conn: Connection) -> Result<()> {
        self.head.close(ctx, conn).await
    }
}
