//! History store trait definition.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{RunRecord, ServiceRecord};

/// Trait for history journal backends.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a finished run.
    async fn append(&self, record: &RunRecord) -> Result<()>;

    /// Returns up to `limit` runs, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>>;

    /// Returns the newest recorded result for `service`.
    async fn last_service_record(&self, service: &str) -> Result<Option<ServiceRecord>> {
        Ok(self
            .recent(usize::MAX)
            .await?
            .into_iter()
            .find_map(|run| run.services.into_iter().find(|s| s.service == service)))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl HistoryStore for Box<dyn HistoryStore> {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        (**self).append(record).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        (**self).recent(limit).await
    }

    async fn last_service_record(&self, service: &str) -> Result<Option<ServiceRecord>> {
        (**self).last_service_record(service).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
