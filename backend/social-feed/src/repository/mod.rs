//! Typed access to the document store collections
//!
//! The serialization boundary: repositories are the only place where domain
//! records are encoded to and decoded from store documents.

pub mod comments;
pub mod edges;
pub mod notifications;
pub mod posts;
pub mod reports;
pub mod users;

pub use comments::CommentRepository;
pub use edges::{edge_key, EdgeRepository};
pub use notifications::NotificationRepository;
pub use posts::{PostPage, PostRepository};
pub use reports::ReportRepository;
pub use users::UserRepository;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::domain::{Comment, NotificationEvent, Post, UserProfile};
use crate::error::ServiceResult;
use crate::store::Document;

/// A record whose identity is the id of the document holding it
pub trait StoredRecord: DeserializeOwned {
    fn assign_id(&mut self, id: String);
}

impl StoredRecord for Post {
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

impl StoredRecord for NotificationEvent {
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

impl StoredRecord for Comment {
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

impl StoredRecord for UserProfile {
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

pub fn decode<T: StoredRecord>(doc: Document) -> ServiceResult<T> {
    let mut record: T = serde_json::from_value(doc.data)?;
    record.assign_id(doc.id);
    Ok(record)
}

/// Decode every document, skipping (and logging) the malformed ones
pub fn decode_all<T: StoredRecord>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match decode(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(document = %id, error = %e, "Skipping malformed document");
                    None
                }
            }
        })
        .collect()
}
