use async_trait::async_trait;

use super::errors::ProgressStoreError;
use crate::models::{ProgressRecord, ProgressRow, SessionId};

/// Raw access to the remote progress table, keyed by (username, session_id)
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Insert or replace the row for `(row.username, row.session_id)`
    async fn upsert(&self, row: &ProgressRow) -> Result<(), ProgressStoreError>;

    async fn fetch(
        &self,
        username: &str,
        session_id: &SessionId,
    ) -> Result<Option<ProgressRecord>, ProgressStoreError>;

    /// Rows for several sessions of one user. Missing sessions are simply absent.
    async fn fetch_many(
        &self,
        username: &str,
        session_ids: &[SessionId],
    ) -> Result<Vec<ProgressRecord>, ProgressStoreError>;
}
