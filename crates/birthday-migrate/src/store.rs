use std::time::Duration;

use async_trait::async_trait;

use crate::descriptor::TableDescriptor;
use crate::errors::StoreError;

/// Table-management operations the reconciler needs from a backend.
///
/// `create` must report an existing table as [`StoreError::AlreadyExists`]
/// rather than as a generic failure, and must not wait for readiness.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Whether the table is known to the store, in any state.
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Issue creation of `table`.
    async fn create(&self, table: &TableDescriptor) -> Result<(), StoreError>;

    /// Block until the table is ready for reads and writes, or `timeout` elapses.
    async fn await_ready(&self, name: &str, timeout: Duration) -> Result<(), StoreError>;

    /// Names of all tables in the store.
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;
}
