use std::sync::Arc;

use crate::domain::Report;
use crate::error::ServiceResult;
use crate::store::{Collection, DocumentStore};

/// Write-only sink for moderation reports
#[derive(Clone)]
pub struct ReportRepository {
    store: Arc<dyn DocumentStore>,
}

impl ReportRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, report: &Report) -> ServiceResult<String> {
        let data = serde_json::to_value(report)?;
        Ok(self.store.add(Collection::Reports, data).await?)
    }
}
