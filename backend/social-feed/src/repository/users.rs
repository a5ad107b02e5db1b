use std::sync::Arc;

use super::{decode, decode_all};
use crate::domain::UserProfile;
use crate::error::ServiceResult;
use crate::store::{Collection, Direction, DocumentStore, Query};

/// Upper bound appended to a prefix to make a range query match "starts with"
const PREFIX_SENTINEL: char = '\u{f8ff}';

/// Read-only access to user profiles; profile editing lives outside the core
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str) -> ServiceResult<Option<UserProfile>> {
        match self.store.get(Collection::Users, user_id).await? {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Users whose username starts with `prefix`, alphabetically
    pub async fn search_by_username_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> ServiceResult<Vec<UserProfile>> {
        let upper = format!("{}{}", prefix, PREFIX_SENTINEL);
        let query = Query::new(Collection::Users)
            .where_gte("username", prefix)
            .where_lt("username", upper)
            .order_by("username", Direction::Ascending)
            .limit(limit);
        let docs = self.store.query(&query).await?;
        Ok(decode_all(docs))
    }
}
