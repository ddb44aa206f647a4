//! Core trait definitions for pluggable store backends

use crate::error::{ConnectionError, StoreError};
use crate::query::statement::BoundStatement;
use crate::types::Row;
use async_trait::async_trait;

// =============================================================================
// ConnectionProvider Trait
// =============================================================================

/// Source of store sessions
///
/// Implementations must be safe for concurrent acquisition; the pipeline may
/// request sessions for several days at once.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Unique identifier for this backend
    fn provider_id(&self) -> &str;

    /// Open a session
    ///
    /// Fails with [`ConnectionError::NotInitialized`] before the backend is
    /// ready and [`ConnectionError::Unavailable`] when the store is unreachable.
    async fn acquire_session(&self) -> Result<Box<dyn Session>, ConnectionError>;
}

// =============================================================================
// Session Trait
// =============================================================================

/// An open session against the store
#[async_trait]
pub trait Session: Send {
    /// Execute a group of bound statements as one logical request
    ///
    /// Rows come back in statement order. A statement may yield any number
    /// of rows, including none.
    async fn execute(&mut self, statements: &[BoundStatement]) -> Result<Vec<Row>, StoreError>;
}
