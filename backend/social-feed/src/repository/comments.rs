use std::sync::Arc;

use super::decode;
use crate::domain::Comment;
use crate::error::ServiceResult;
use crate::store::{Collection, Direction, DocumentStore, Query};

/// Repository for Comment operations
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn DocumentStore>,
}

impl CommentRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, comment: &Comment) -> ServiceResult<String> {
        let data = serde_json::to_value(comment)?;
        Ok(self.store.add(Collection::Comments, data).await?)
    }

    pub async fn get(&self, comment_id: &str) -> ServiceResult<Option<Comment>> {
        match self.store.get(Collection::Comments, comment_id).await? {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, comment_id: &str) -> ServiceResult<()> {
        self.store.delete(Collection::Comments, comment_id).await?;
        Ok(())
    }

    /// Comments on `post_id`, oldest first
    pub fn thread_query(post_id: &str) -> Query {
        Query::new(Collection::Comments)
            .where_eq("postId", post_id)
            .order_by("createdAt", Direction::Ascending)
    }
}
