use cache_invalidation::{
    InvalidationBus, InvalidationError, InvalidationMessage, InvalidationPublisher, Topic,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::profiles::ProfileDirectory;
use super::session::SessionContext;
use super::toggle::{EdgeChange, EdgeToggleEngine, ToggleOutcome};
use crate::domain::{DisplayInfo, Relation};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::EdgeRepository;

pub type BlockSet = HashSet<String>;

/// Users the current user has blocked
///
/// Owns the session's block set. Every other component reads it through
/// [`BlockListCache::get`]; it only changes through `refresh` and the
/// block/unblock writes below. A successful block change publishes a
/// [`Topic::BlockList`] signal so views built from the old set can rebuild.
pub struct BlockListCache {
    session: Arc<dyn SessionContext>,
    edges: EdgeRepository,
    engine: Arc<EdgeToggleEngine>,
    blocked: RwLock<Arc<BlockSet>>,
    bus: InvalidationBus,
    publisher: InvalidationPublisher,
}

impl BlockListCache {
    pub fn new(
        session: Arc<dyn SessionContext>,
        edges: EdgeRepository,
        engine: Arc<EdgeToggleEngine>,
        bus: InvalidationBus,
        service_name: &str,
    ) -> Self {
        let publisher = bus.publisher(service_name);
        Self {
            session,
            edges,
            engine,
            blocked: RwLock::new(Arc::new(BlockSet::new())),
            bus,
            publisher,
        }
    }

    /// Re-read every Block edge whose subject is the current user
    ///
    /// Signed out, the set is empty.
    pub async fn refresh(&self) -> ServiceResult<Arc<BlockSet>> {
        let set = match self.session.current_user_id() {
            Some(me) => self.edges.query_by_subject(Relation::Block, &me).await?,
            None => BlockSet::new(),
        };
        debug!(blocked = set.len(), "Block list refreshed");
        let set = Arc::new(set);
        self.replace(set.clone());
        Ok(set)
    }

    /// Last known block set; may be stale until the next refresh
    pub fn get(&self) -> Arc<BlockSet> {
        self.blocked
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.get().contains(user_id)
    }

    /// Run `callback` on every block-list change signal until the handle is aborted
    pub fn on_change<F, Fut>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(InvalidationMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InvalidationError>> + Send + 'static,
    {
        self.bus.subscriber(Topic::BlockList).subscribe(callback)
    }

    /// Block `target`; `Ok(None)` when nobody is signed in
    pub async fn block_user(&self, target: &str) -> ServiceResult<Option<ToggleOutcome>> {
        self.set_blocked(target, true).await
    }

    /// Unblock `target`; `Ok(None)` when nobody is signed in
    pub async fn unblock_user(&self, target: &str) -> ServiceResult<Option<ToggleOutcome>> {
        self.set_blocked(target, false).await
    }

    async fn set_blocked(&self, target: &str, blocked: bool) -> ServiceResult<Option<ToggleOutcome>> {
        let Some(me) = self.session.current_user_id() else {
            return Ok(None);
        };
        if me == target {
            return Err(ServiceError::InvalidInput(
                "users cannot block themselves".to_string(),
            ));
        }

        let outcome = self
            .engine
            .ensure(Relation::Block, &me, target, blocked)
            .await?;

        let mut next = (*self.get()).clone();
        if blocked {
            next.insert(target.to_string());
        } else {
            next.remove(target);
        }
        self.replace(Arc::new(next));

        if outcome.change != EdgeChange::Unchanged {
            let listeners = self.publisher.invalidate_block_list();
            info!(
                subject = %me,
                object = %target,
                blocked,
                listeners,
                "Block list changed"
            );
        }
        Ok(Some(outcome))
    }

    /// Display info for everyone currently blocked, sorted by name
    pub async fn blocked_profiles(&self, profiles: &ProfileDirectory) -> ServiceResult<Vec<DisplayInfo>> {
        let ids: Vec<String> = self.get().iter().cloned().collect();
        let mut infos = profiles.display_infos(&ids).await?;
        infos.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(infos)
    }

    fn replace(&self, set: Arc<BlockSet>) {
        *self.blocked.write().unwrap_or_else(|e| e.into_inner()) = set;
    }
}
