use std::sync::Arc;

use super::decode_all;
use crate::domain::NotificationEvent;
use crate::error::ServiceResult;
use crate::store::{Collection, Direction, DocumentStore, Query};

/// Repository for inbox records. Append-only: events are never updated or removed here.
#[derive(Clone)]
pub struct NotificationRepository {
    store: Arc<dyn DocumentStore>,
}

impl NotificationRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, event: &NotificationEvent) -> ServiceResult<String> {
        let data = serde_json::to_value(event)?;
        Ok(self.store.add(Collection::Notifications, data).await?)
    }

    /// Inbox of `receiver_id`, newest first
    pub fn inbox_query(receiver_id: &str) -> Query {
        Query::new(Collection::Notifications)
            .where_eq("receiverId", receiver_id)
            .order_by("createdAt", Direction::Descending)
    }

    pub async fn for_receiver(&self, receiver_id: &str) -> ServiceResult<Vec<NotificationEvent>> {
        let docs = self.store.query(&Self::inbox_query(receiver_id)).await?;
        Ok(decode_all(docs))
    }
}
