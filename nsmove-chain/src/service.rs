//! Chain element trait

use async_trait::async_trait;

use nsmove_core::{Connection, Result};

use crate::context::RequestContext;

/// A Request/Close processing element
///
/// Elements that delegate hold their successor as an
/// `Arc<dyn NetworkService>`, handed to them by the
/// [`ChainBuilder`](crate::ChainBuilder).
///
/// # Thread Safety
/// All implementations must be `Send + Sync`; one chain serves many
/// connections concurrently.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Set up a connection
    ///
    /// # Errors
    /// Returns error if this element or any element after it fails
    async fn request(&self, ctx: &RequestContext, conn: Connection) -> Result<Connection>;

    /// Tear a connection down
    ///
    /// # Errors
    /// Returns error if this element or any element after it fails
    async fn close(&self, ctx: &RequestContext, conn: Connection) -> Result<()>;
}

/// Last element of every chain: accepts everything unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

#[async_trait]
impl NetworkService for Terminal {
    async fn request(&self, _ctx: &RequestContext, conn: Connection) -> Result<Connection> {
        tracing::trace!(connection = %conn.id, "End of chain");
        Ok(conn)
    }

    async fn close(&self, _ctx: &RequestContext, conn: Connection) -> Result<()> {
        tracing::trace!(connection = %conn.id, "End of chain");
        Ok(())
    }
}
