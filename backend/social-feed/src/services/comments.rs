use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::fanout::NotificationFanout;
use super::live_query::LiveQuery;
use super::profiles::ProfileDirectory;
use super::session::SessionContext;
use super::toggle::{cascade_failure, CascadeReport, StepStatus};
use crate::domain::{Comment, CounterField, NotificationKind};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{decode_all, CommentRepository, PostRepository};
use crate::store::DocumentStore;

const SCOPE: &str = "comment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentOutcome {
    pub comment_id: String,
    pub cascade: CascadeReport,
}

/// Comment threads: the comment document is the primary write, the post's
/// commentCount and the author's notification are dependent writes.
pub struct CommentService {
    session: Arc<dyn SessionContext>,
    store: Arc<dyn DocumentStore>,
    comments: CommentRepository,
    posts: PostRepository,
    profiles: Arc<ProfileDirectory>,
    fanout: Arc<NotificationFanout>,
}

impl CommentService {
    pub fn new(
        session: Arc<dyn SessionContext>,
        store: Arc<dyn DocumentStore>,
        profiles: Arc<ProfileDirectory>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self {
            session,
            comments: CommentRepository::new(store.clone()),
            posts: PostRepository::new(store.clone()),
            store,
            profiles,
            fanout,
        }
    }

    /// Comment on `post_id`; `Ok(None)` when signed out or `text` is blank
    pub async fn add_comment(&self, post_id: &str, text: &str) -> ServiceResult<Option<CommentOutcome>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let post = self
            .posts
            .get(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;
        let author = self.profiles.fresh_display_info(&me).await?;

        let comment = Comment {
            id: String::new(),
            post_id: post_id.to_string(),
            author_id: me.clone(),
            author_name: author.display_name,
            author_icon_ref: author.icon_ref,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let comment_id = self.comments.add(&comment).await?;
        info!(post_id = %post_id, comment_id = %comment_id, author = %me, "Comment added");

        let counter = match self.posts.increment(post_id, CounterField::CommentCount, 1).await {
            Ok(()) => StepStatus::Applied,
            Err(e) => cascade_failure(SCOPE, &me, post_id, "counter", &e),
        };
        let notification = match self
            .fanout
            .emit(
                NotificationKind::Comment,
                &me,
                &post.author_id,
                Some(&post),
                Some(text.to_string()),
            )
            .await
        {
            Ok(Some(_)) => StepStatus::Applied,
            Ok(None) => StepStatus::Suppressed,
            Err(e) => cascade_failure(SCOPE, &me, post_id, "notification", &e),
        };

        Ok(Some(CommentOutcome {
            comment_id,
            cascade: CascadeReport {
                counter,
                notification,
            },
        }))
    }

    /// Delete one of the current user's comments
    pub async fn delete_comment(&self, comment_id: &str) -> ServiceResult<Option<CommentOutcome>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        let comment = self
            .comments
            .get(comment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("comment {}", comment_id)))?;
        if comment.author_id != me {
            return Err(ServiceError::Forbidden(
                "only the author can delete a comment".to_string(),
            ));
        }

        self.comments.delete(comment_id).await?;
        info!(post_id = %comment.post_id, comment_id = %comment_id, "Comment deleted");

        let counter = match self
            .posts
            .increment(&comment.post_id, CounterField::CommentCount, -1)
            .await
        {
            Ok(()) => StepStatus::Applied,
            Err(e) => cascade_failure(SCOPE, &me, &comment.post_id, "counter", &e),
        };

        Ok(Some(CommentOutcome {
            comment_id: comment_id.to_string(),
            cascade: CascadeReport {
                counter,
                notification: StepStatus::NotApplicable,
            },
        }))
    }

    /// Live thread for `post_id`, oldest first
    pub async fn watch_comments(&self, post_id: &str) -> ServiceResult<LiveQuery<Vec<Comment>>> {
        let query = CommentRepository::thread_query(post_id);
        Ok(LiveQuery::start(self.store.clone(), query, Vec::new(), decode_all::<Comment>).await?)
    }
}
