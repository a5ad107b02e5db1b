use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::live_query::LiveQuery;
use crate::domain::Relation;
use crate::error::ServiceResult;
use crate::repository::EdgeRepository;
use crate::store::DocumentStore;

pub type RelationSet = HashSet<String>;

/// Live "my likes" / "my follows" set for one session.
///
/// Holds the subscription `queryBySubject(relation, me)` open and republishes the
/// complete object-id set on every change. One instance per relation per session;
/// dropping it tears the subscription down.
pub struct RelationMonitor {
    relation: Relation,
    live: LiveQuery<RelationSet>,
}

impl RelationMonitor {
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        relation: Relation,
        subject: &str,
    ) -> ServiceResult<Self> {
        let query = EdgeRepository::subject_query(relation, subject);
        let live = LiveQuery::start(store, query, RelationSet::new(), EdgeRepository::object_ids).await?;
        info!(relation = %relation, subject = %subject, "Relation monitor started");
        Ok(Self { relation, live })
    }

    /// Monitor for a signed-out session: always empty
    pub fn idle(relation: Relation) -> Self {
        Self {
            relation,
            live: LiveQuery::idle(RelationSet::new()),
        }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn snapshot(&self) -> Arc<RelationSet> {
        self.live.current()
    }

    pub fn contains(&self, object_id: &str) -> bool {
        self.live.current().contains(object_id)
    }

    pub fn watch(&self) -> watch::Receiver<Arc<RelationSet>> {
        self.live.watch()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_live()
    }

    pub fn stop(&mut self) {
        self.live.stop();
    }
}
