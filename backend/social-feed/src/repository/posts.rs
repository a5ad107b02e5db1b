use std::sync::Arc;

use super::{decode, decode_all};
use crate::domain::{CounterField, Post};
use crate::error::ServiceResult;
use crate::store::{Collection, Cursor, Direction, DocumentStore, Query};

const AUTHOR_FIELD: &str = "authorId";
const SORT_FIELD: &str = "createdAt";

/// One page of the global feed ordering
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    /// Decoded posts, newest first
    pub posts: Vec<Post>,
    /// Position of the last document returned by the store, whether or not it decoded
    pub last: Option<Cursor>,
    /// Documents returned by the store
    pub fetched: usize,
}

/// Repository for Post operations
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn DocumentStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store a new post and return its id
    pub async fn create(&self, post: &Post) -> ServiceResult<String> {
        let data = serde_json::to_value(post)?;
        Ok(self.store.add(Collection::Posts, data).await?)
    }

    pub async fn get(&self, post_id: &str) -> ServiceResult<Option<Post>> {
        match self.store.get(Collection::Posts, post_id).await? {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, post_id: &str) -> ServiceResult<()> {
        self.store.delete(Collection::Posts, post_id).await?;
        Ok(())
    }

    /// Fetch up to `limit` posts ordered by createdAt descending, strictly after `after`
    pub async fn page(&self, after: Option<Cursor>, limit: usize) -> ServiceResult<PostPage> {
        let mut query = Query::new(Collection::Posts)
            .order_by(SORT_FIELD, Direction::Descending)
            .limit(limit);
        if let Some(cursor) = after {
            query = query.start_after(cursor);
        }

        let docs = self.store.query(&query).await?;
        let last = docs.last().and_then(|doc| Cursor::at(doc, SORT_FIELD));
        let fetched = docs.len();

        Ok(PostPage {
            posts: decode_all(docs),
            last,
            fetched,
        })
    }

    /// Every post by `author_id`, newest first
    pub async fn by_author(&self, author_id: &str) -> ServiceResult<Vec<Post>> {
        let query = Query::new(Collection::Posts)
            .where_eq(AUTHOR_FIELD, author_id)
            .order_by(SORT_FIELD, Direction::Descending);
        let docs = self.store.query(&query).await?;
        Ok(decode_all(docs))
    }

    /// Atomically add `delta` to one of the post's counters
    pub async fn increment(&self, post_id: &str, field: CounterField, delta: i64) -> ServiceResult<()> {
        self.store
            .increment(Collection::Posts, post_id, field.as_str(), delta)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn post(author: &str, millis: i64) -> Post {
        Post::new(author, format!("img://{}", millis), "", Utc.timestamp_millis_opt(millis).unwrap())
    }

    #[tokio::test]
    async fn test_page_cursor_tracks_undecodable_tail() {
        let store = Arc::new(MemoryStore::new());
        let posts = PostRepository::new(store.clone());

        posts.create(&post("u1", 30)).await.unwrap();
        posts.create(&post("u2", 20)).await.unwrap();
        // Missing authorId: cannot decode, but still occupies a slot in the ordering.
        store
            .add(Collection::Posts, json!({ "createdAt": 10 }))
            .await
            .unwrap();

        let page = posts.page(None, 3).await.unwrap();
        assert_eq!(page.fetched, 3);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.last.unwrap().sort_value, json!(10));
    }

    #[tokio::test]
    async fn test_increment_and_get() {
        let store = Arc::new(MemoryStore::new());
        let posts = PostRepository::new(store);

        let id = posts.create(&post("u1", 1)).await.unwrap();
        posts.increment(&id, CounterField::LikeCount, 1).await.unwrap();
        posts.increment(&id, CounterField::CommentCount, 2).await.unwrap();

        let stored = posts.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.like_count, 1);
        assert_eq!(stored.comment_count, 2);
    }

    #[tokio::test]
    async fn test_by_author_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let posts = PostRepository::new(store);

        posts.create(&post("u1", 1)).await.unwrap();
        posts.create(&post("u2", 2)).await.unwrap();
        posts.create(&post("u1", 3)).await.unwrap();

        let mine = posts.by_author("u1").await.unwrap();
        let stamps: Vec<i64> = mine.iter().map(|p| p.created_at.timestamp_millis()).collect();
        assert_eq!(stamps, vec![3, 1]);
    }
}
