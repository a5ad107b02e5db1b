//! Per-session wiring of the feed core
//!
//! A [`FeedSession`] owns everything one signed-in user needs: the Like and
//! Follow monitors, the block list cache, the paginator listening for block
//! changes, and the write paths (toggles, posts, comments, reports). Nothing in
//! here is process-global; two sessions over the same store share nothing but
//! the store and the invalidation bus.

use cache_invalidation::{InvalidationBus, InvalidationSubscriber};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::block_list::BlockListCache;
use super::comments::CommentService;
use super::fanout::NotificationFanout;
use super::feed::{FeedPaginator, PageOutcome};
use super::live_query::LiveQuery;
use super::profiles::ProfileDirectory;
use super::relation_monitor::RelationMonitor;
use super::session::SessionContext;
use super::toggle::{EdgeToggleEngine, ToggleOutcome};
use crate::config::Config;
use crate::domain::{FeedItem, NotificationEvent, Post, Relation, Report, ReportReason};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{
    decode_all, EdgeRepository, NotificationRepository, PostRepository, ReportRepository,
    UserRepository,
};
use crate::store::{BlobStore, DocumentStore};

pub struct FeedSession {
    session: Arc<dyn SessionContext>,
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    posts: PostRepository,
    reports: ReportRepository,
    profiles: Arc<ProfileDirectory>,
    engine: Arc<EdgeToggleEngine>,
    block_list: Arc<BlockListCache>,
    paginator: Arc<FeedPaginator>,
    comments: CommentService,
    likes: RelationMonitor,
    follows: RelationMonitor,
    block_listener: Option<JoinHandle<()>>,
}

impl FeedSession {
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        session: Arc<dyn SessionContext>,
        bus: InvalidationBus,
    ) -> Self {
        let edges = EdgeRepository::new(store.clone());
        let posts = PostRepository::new(store.clone());

        let profiles = Arc::new(ProfileDirectory::new(
            UserRepository::new(store.clone()),
            edges.clone(),
            config.notifications.default_display_name.clone(),
        ));
        let fanout = Arc::new(NotificationFanout::new(
            NotificationRepository::new(store.clone()),
            profiles.clone(),
        ));
        let engine = Arc::new(EdgeToggleEngine::new(
            edges.clone(),
            posts.clone(),
            fanout.clone(),
        ));
        let block_list = Arc::new(BlockListCache::new(
            session.clone(),
            edges,
            engine.clone(),
            bus,
            &config.app.service_name,
        ));
        let paginator = Arc::new(FeedPaginator::new(
            session.clone(),
            posts.clone(),
            block_list.clone(),
            config.feed.page_size,
        ));
        let comments = CommentService::new(session.clone(), store.clone(), profiles.clone(), fanout);

        Self {
            session,
            reports: ReportRepository::new(store.clone()),
            store,
            blobs,
            posts,
            profiles,
            engine,
            block_list,
            paginator,
            comments,
            likes: RelationMonitor::idle(Relation::Like),
            follows: RelationMonitor::idle(Relation::Follow),
            block_listener: None,
        }
    }

    /// Open the monitors, load the block list and fetch the first page
    ///
    /// Signed out, the session stays idle and the feed stays empty.
    pub async fn start(&mut self) -> ServiceResult<PageOutcome> {
        let Some(me) = self.session.current_user_id() else {
            debug!("No signed-in user; feed session stays idle");
            return Ok(PageOutcome::Unauthenticated);
        };
        self.end();

        self.likes = RelationMonitor::start(self.store.clone(), Relation::Like, &me).await?;
        self.follows = RelationMonitor::start(self.store.clone(), Relation::Follow, &me).await?;
        self.block_list.refresh().await?;
        self.block_listener = Some(self.paginator.attach_to_block_list());

        info!(user_id = %me, "Feed session started");
        self.paginator.refresh().await
    }

    /// Tear down every subscription and listener owned by the session
    pub fn end(&mut self) {
        self.likes.stop();
        self.follows.stop();
        if let Some(handle) = self.block_listener.take() {
            InvalidationSubscriber::unsubscribe(handle);
            info!("Feed session ended");
        }
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.session.current_user_id()
    }

    /// The materialized feed annotated for the current user
    ///
    /// With `friends_only`, only posts by followed authors are kept. Author
    /// display info comes from the session profile cache.
    pub async fn items(&self, friends_only: bool) -> ServiceResult<Vec<FeedItem>> {
        let liked = self.likes.snapshot();
        let following = self.follows.snapshot();
        let posts: Vec<Post> = self
            .paginator
            .posts()
            .into_iter()
            .filter(|post| !friends_only || following.contains(&post.author_id))
            .collect();

        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            let author = self.profiles.display_info(&post.author_id).await?;
            items.push(FeedItem {
                liked_by_me: liked.contains(&post.id),
                author_followed_by_me: following.contains(&post.author_id),
                author,
                post,
            });
        }
        Ok(items)
    }

    pub async fn refresh(&self) -> ServiceResult<PageOutcome> {
        self.paginator.refresh().await
    }

    pub async fn load_more(&self) -> ServiceResult<PageOutcome> {
        self.paginator.load_more().await
    }

    pub async fn toggle_like(&self, post_id: &str) -> ServiceResult<Option<ToggleOutcome>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        Ok(Some(self.engine.toggle(Relation::Like, &me, post_id).await?))
    }

    /// Follow or unfollow `user_id`; following yourself is a no-op
    pub async fn toggle_follow(&self, user_id: &str) -> ServiceResult<Option<ToggleOutcome>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        if me == user_id {
            debug!(user_id = %me, "Ignoring self-follow");
            return Ok(None);
        }
        Ok(Some(self.engine.toggle(Relation::Follow, &me, user_id).await?))
    }

    pub async fn block_user(&self, user_id: &str) -> ServiceResult<Option<ToggleOutcome>> {
        self.block_list.block_user(user_id).await
    }

    pub async fn unblock_user(&self, user_id: &str) -> ServiceResult<Option<ToggleOutcome>> {
        self.block_list.unblock_user(user_id).await
    }

    /// Upload the image and publish a post; returns the new post id
    pub async fn create_post(&self, image: Vec<u8>, caption: &str) -> ServiceResult<Option<String>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        let key = format!("posts/{}/{}.jpg", me, Uuid::new_v4().simple());
        let image_ref = self.blobs.upload(&key, image).await?;

        let post = Post::new(me.clone(), image_ref.clone(), caption, Utc::now());
        match self.posts.create(&post).await {
            Ok(post_id) => {
                info!(post_id = %post_id, author = %me, "Post created");
                Ok(Some(post_id))
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&image_ref).await {
                    warn!(image_ref = %image_ref, error = %cleanup, "Orphaned image after failed post write");
                }
                Err(e)
            }
        }
    }

    /// Delete one of the current user's posts
    ///
    /// The image is released best-effort; a failed blob delete is logged and
    /// does not keep the post alive.
    pub async fn delete_post(&self, post_id: &str) -> ServiceResult<bool> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(false);
        };
        let post = self
            .posts
            .get(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;
        if post.author_id != me {
            return Err(ServiceError::Forbidden(
                "only the author can delete a post".to_string(),
            ));
        }

        if let Err(e) = self.blobs.delete(&post.image_ref).await {
            warn!(post_id = %post_id, image_ref = %post.image_ref, error = %e, "Image delete failed");
        }
        self.posts.delete(post_id).await?;
        self.paginator.remove_post(post_id);

        info!(post_id = %post_id, "Post deleted");
        Ok(true)
    }

    pub async fn report_post(&self, post_id: &str, reason: ReportReason) -> ServiceResult<Option<String>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        let post = self
            .posts
            .get(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;

        let report = Report {
            reporter_id: me,
            post_id: post_id.to_string(),
            target_user_id: post.author_id,
            reason,
            created_at: Utc::now(),
        };
        let report_id = self.reports.add(&report).await?;
        info!(post_id = %post_id, report_id = %report_id, "Post reported");
        Ok(Some(report_id))
    }

    pub async fn posts_by_author(&self, user_id: &str) -> ServiceResult<Vec<Post>> {
        self.posts.by_author(user_id).await
    }

    /// Live inbox for the current user, newest first
    pub async fn watch_notifications(&self) -> ServiceResult<LiveQuery<Vec<NotificationEvent>>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(LiveQuery::idle(Vec::new()));
        };
        let query = NotificationRepository::inbox_query(&me);
        Ok(LiveQuery::start(self.store.clone(), query, Vec::new(), decode_all::<NotificationEvent>).await?)
    }

    pub fn comments(&self) -> &CommentService {
        &self.comments
    }

    pub fn profiles(&self) -> &ProfileDirectory {
        &self.profiles
    }

    pub fn block_list(&self) -> &BlockListCache {
        &self.block_list
    }

    pub fn paginator(&self) -> &Arc<FeedPaginator> {
        &self.paginator
    }

    pub fn likes(&self) -> &RelationMonitor {
        &self.likes
    }

    pub fn follows(&self) -> &RelationMonitor {
        &self.follows
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        if let Some(handle) = self.block_listener.take() {
            handle.abort();
        }
    }
}
