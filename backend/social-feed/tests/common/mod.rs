use cache_invalidation::InvalidationBus;
use chrono::{TimeZone, Utc};
use serde_json::json;
use social_feed::config::Config;
use social_feed::domain::Post;
use social_feed::repository::{
    EdgeRepository, NotificationRepository, PostRepository, UserRepository,
};
use social_feed::services::{
    EdgeToggleEngine, FeedSession, NotificationFanout, ProfileDirectory, StaticSession,
};
use social_feed::store::{Collection, DocumentStore, MemoryBlobStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One in-process store, blob store and bus shared by every session of a test
#[allow(dead_code)]
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub bus: InvalidationBus,
    pub config: Config,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        Self::with_page_size(10)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let mut config = Config::default();
        config.feed.page_size = page_size;
        Self {
            store: Arc::new(MemoryStore::new()),
            blobs: Arc::new(MemoryBlobStore::default()),
            bus: InvalidationBus::default(),
            config,
        }
    }

    pub async fn user(&self, id: &str, name: &str) {
        self.store
            .set(
                Collection::Users,
                id,
                json!({ "username": name, "profileImageUrl": format!("icon://{}", id) }),
            )
            .await
            .unwrap();
    }

    /// Post by `author` created at `millis` since the epoch
    pub async fn post(&self, author: &str, millis: i64) -> String {
        let post = Post::new(
            author,
            format!("blob://{}/{}.jpg", author, millis),
            format!("{} at {}", author, millis),
            Utc.timestamp_millis_opt(millis).unwrap(),
        );
        PostRepository::new(self.store.clone())
            .create(&post)
            .await
            .unwrap()
    }

    pub async fn get_post(&self, post_id: &str) -> Post {
        PostRepository::new(self.store.clone())
            .get(post_id)
            .await
            .unwrap()
            .expect("post exists")
    }

    pub fn session(&self, user_id: Option<&str>) -> FeedSession {
        let auth = match user_id {
            Some(id) => StaticSession::signed_in(id),
            None => StaticSession::signed_out(),
        };
        FeedSession::new(
            &self.config,
            self.store.clone(),
            self.blobs.clone(),
            Arc::new(auth),
            self.bus.clone(),
        )
    }

    pub fn profiles(&self) -> Arc<ProfileDirectory> {
        Arc::new(ProfileDirectory::new(
            UserRepository::new(self.store.clone()),
            EdgeRepository::new(self.store.clone()),
            self.config.notifications.default_display_name.clone(),
        ))
    }

    pub fn fanout(&self) -> Arc<NotificationFanout> {
        Arc::new(NotificationFanout::new(
            NotificationRepository::new(self.store.clone()),
            self.profiles(),
        ))
    }

    pub fn engine(&self) -> EdgeToggleEngine {
        EdgeToggleEngine::new(
            EdgeRepository::new(self.store.clone()),
            PostRepository::new(self.store.clone()),
            self.fanout(),
        )
    }

    pub fn edges(&self) -> EdgeRepository {
        EdgeRepository::new(self.store.clone())
    }

    pub async fn inbox(&self, receiver: &str) -> Vec<social_feed::domain::NotificationEvent> {
        NotificationRepository::new(self.store.clone())
            .for_receiver(receiver)
            .await
            .unwrap()
    }
}

/// Wait until the watched value satisfies `predicate`, failing the test after 2s
#[allow(dead_code)]
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, predicate: F)
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for update")
        .expect("sender dropped");
}
