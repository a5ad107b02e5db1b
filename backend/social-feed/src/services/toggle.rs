//! Edge toggle engine
//!
//! One logical operation per toggle, run as a sequence of awaited steps:
//!
//! ```text
//! 1. exists?            failure -> Err, nothing written
//! 2. create | delete    failure -> Err, no counter, no notification
//! 3. counter ±delta     failure -> logged partial cascade, Ok(outcome)
//! 4. notification       failure -> logged partial cascade, Ok(outcome)
//! ```
//!
//! Steps 3 and 4 run only after the edge write succeeded. Counters are a
//! best-effort denormalized cache; the edge is the source of truth.

use std::sync::Arc;
use tracing::{info, warn};

use super::fanout::NotificationFanout;
use crate::domain::{CounterDelta, Edge, NotificationKind, Relation};
use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::repository::{EdgeRepository, PostRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    Created,
    Deleted,
    /// Already in the requested state; no cascade ran
    Unchanged,
}

/// Result of one dependent write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepStatus {
    /// The step does not apply to this relation/direction
    #[default]
    NotApplicable,
    Applied,
    /// Notification skipped because sender and receiver are the same user
    Suppressed,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub counter: StepStatus,
    pub notification: StepStatus,
}

impl CascadeReport {
    /// Edge written but a dependent write failed
    pub fn is_partial_failure(&self) -> bool {
        matches!(self.counter, StepStatus::Failed(_))
            || matches!(self.notification, StepStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub relation: Relation,
    pub subject: String,
    pub object: String,
    pub change: EdgeChange,
    /// Whether the edge exists after the operation
    pub present: bool,
    pub cascade: CascadeReport,
}

pub struct EdgeToggleEngine {
    edges: EdgeRepository,
    posts: PostRepository,
    fanout: Arc<NotificationFanout>,
}

impl EdgeToggleEngine {
    pub fn new(edges: EdgeRepository, posts: PostRepository, fanout: Arc<NotificationFanout>) -> Self {
        Self {
            edges,
            posts,
            fanout,
        }
    }

    /// Flip the edge using the relation's own counter (likeCount for Like, none otherwise)
    pub async fn toggle(&self, relation: Relation, subject: &str, object: &str) -> ServiceResult<ToggleOutcome> {
        self.toggle_with_counter(relation, subject, object, relation.counter())
            .await
    }

    /// Create the edge if absent or delete it if present, adjusting `counter` on the object post
    pub async fn toggle_with_counter(
        &self,
        relation: Relation,
        subject: &str,
        object: &str,
        counter: Option<CounterDelta>,
    ) -> ServiceResult<ToggleOutcome> {
        let exists = self.edges.exists(relation, subject, object).await?;
        self.apply(relation, subject, object, !exists, counter).await
    }

    /// Drive the edge to `present`; a no-op when it is already there
    pub async fn ensure(
        &self,
        relation: Relation,
        subject: &str,
        object: &str,
        present: bool,
    ) -> ServiceResult<ToggleOutcome> {
        let exists = self.edges.exists(relation, subject, object).await?;
        if exists == present {
            return Ok(ToggleOutcome {
                relation,
                subject: subject.to_string(),
                object: object.to_string(),
                change: EdgeChange::Unchanged,
                present,
                cascade: CascadeReport::default(),
            });
        }
        self.apply(relation, subject, object, present, relation.counter())
            .await
    }

    async fn apply(
        &self,
        relation: Relation,
        subject: &str,
        object: &str,
        create: bool,
        counter: Option<CounterDelta>,
    ) -> ServiceResult<ToggleOutcome> {
        let action = if create { "create" } else { "delete" };
        if create {
            self.edges
                .create(relation, &Edge::new(subject, object))
                .await?;
        } else {
            self.edges.delete(relation, subject, object).await?;
        }
        metrics::record_edge_write(relation.as_str(), action);
        info!(relation = %relation, subject = %subject, object = %object, action, "Edge written");

        let mut cascade = CascadeReport::default();

        if let Some(counter) = counter {
            let delta = if create { counter.delta } else { -counter.delta };
            cascade.counter = match self.posts.increment(object, counter.field, delta).await {
                Ok(()) => StepStatus::Applied,
                Err(e) => partial_failure(relation, subject, object, "counter", &e),
            };
        }

        if create {
            if let Some(kind) = relation.notification_kind() {
                cascade.notification = self.notify(kind, relation, subject, object).await;
            }
        }

        Ok(ToggleOutcome {
            relation,
            subject: subject.to_string(),
            object: object.to_string(),
            change: if create {
                EdgeChange::Created
            } else {
                EdgeChange::Deleted
            },
            present: create,
            cascade,
        })
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        relation: Relation,
        subject: &str,
        object: &str,
    ) -> StepStatus {
        // Likes notify the post's author; follows notify the followed user.
        let (receiver, post) = match relation {
            Relation::Like => match self.posts.get(object).await {
                Ok(Some(post)) => (post.author_id.clone(), Some(post)),
                Ok(None) => {
                    let e = ServiceError::NotFound(format!("post {}", object));
                    return partial_failure(relation, subject, object, "notification", &e);
                }
                Err(e) => return partial_failure(relation, subject, object, "notification", &e),
            },
            Relation::Follow | Relation::Block => (object.to_string(), None),
        };

        match self
            .fanout
            .emit(kind, subject, &receiver, post.as_ref(), None)
            .await
        {
            Ok(Some(_)) => StepStatus::Applied,
            Ok(None) => StepStatus::Suppressed,
            Err(e) => partial_failure(relation, subject, object, "notification", &e),
        }
    }
}

/// Log and count a dependent write that failed after its primary write succeeded
pub(crate) fn cascade_failure(
    scope: &str,
    subject: &str,
    object: &str,
    step: &str,
    error: &ServiceError,
) -> StepStatus {
    warn!(
        scope,
        subject = %subject,
        object = %object,
        step,
        error = %error,
        "Partial cascade failure: primary write succeeded, dependent write failed"
    );
    metrics::record_cascade_failure(scope, step);
    StepStatus::Failed(error.to_string())
}

fn partial_failure(
    relation: Relation,
    subject: &str,
    object: &str,
    step: &str,
    error: &ServiceError,
) -> StepStatus {
    cascade_failure(relation.as_str(), subject, object, step, error)
}
