//! Feed paginator
//!
//! Two states, Idle and Fetching, guarded by one mutex that is never held
//! across an await. Each fetch carries the generation it started in:
//!
//! ```text
//! refresh()        Idle only; same generation; replaces the sequence
//! load_more()      Idle + cursor only; same generation; appends
//! force_refresh()  always; bumps the generation; replaces the sequence
//! ```
//!
//! A fetch that completes after the generation moved on is discarded
//! ([`PageOutcome::Superseded`]). The cursor always comes from the last
//! unfiltered document of a page, so a page whose posts are all blocked still
//! advances pagination.

use cache_invalidation::InvalidationError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::block_list::{BlockListCache, BlockSet};
use super::session::SessionContext;
use crate::domain::Post;
use crate::error::ServiceResult;
use crate::metrics;
use crate::repository::{PostPage, PostRepository};
use crate::store::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Page applied; `added` posts survived filtering and de-duplication
    Loaded { added: usize, fetched: usize },
    /// Another fetch is in flight
    Busy,
    /// Nothing fetched yet, so there is nothing to continue from
    NoCursor,
    Unauthenticated,
    /// A newer refresh started while this fetch was in flight; results dropped
    Superseded,
}

/// Published after every applied change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub posts: Vec<Post>,
    pub has_cursor: bool,
    pub fetching: bool,
}

#[derive(Clone, Copy)]
enum FetchKind {
    Refresh,
    ForceRefresh,
    LoadMore,
}

impl FetchKind {
    fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Refresh => "refresh",
            FetchKind::ForceRefresh => "force_refresh",
            FetchKind::LoadMore => "load_more",
        }
    }
}

#[derive(Default)]
struct FeedState {
    cursor: Option<Cursor>,
    posts: Vec<Post>,
    seen: HashSet<String>,
    fetching: bool,
    generation: u64,
}

impl FeedState {
    fn absorb(&mut self, posts: Vec<Post>, blocked: &BlockSet) -> usize {
        let mut added = 0;
        for post in posts {
            if blocked.contains(&post.author_id) || !self.seen.insert(post.id.clone()) {
                continue;
            }
            self.posts.push(post);
            added += 1;
        }
        added
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            posts: self.posts.clone(),
            has_cursor: self.cursor.is_some(),
            fetching: self.fetching,
        }
    }
}

pub struct FeedPaginator {
    session: Arc<dyn SessionContext>,
    posts: PostRepository,
    block_list: Arc<BlockListCache>,
    page_size: usize,
    state: Mutex<FeedState>,
    updates: watch::Sender<FeedSnapshot>,
}

impl FeedPaginator {
    pub fn new(
        session: Arc<dyn SessionContext>,
        posts: PostRepository,
        block_list: Arc<BlockListCache>,
        page_size: usize,
    ) -> Self {
        let (updates, _) = watch::channel(FeedSnapshot::default());
        Self {
            session,
            posts,
            block_list,
            page_size: page_size.max(1),
            state: Mutex::new(FeedState::default()),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self) {
        let snapshot = self.lock().snapshot();
        self.updates.send_replace(snapshot);
    }

    /// Fetch the first page and replace the sequence; rejected while fetching
    pub async fn refresh(&self) -> ServiceResult<PageOutcome> {
        let kind = FetchKind::Refresh;
        if self.session.current_user_id().is_none() {
            return Ok(self.rejected(kind, PageOutcome::Unauthenticated));
        }
        let generation = {
            let mut state = self.lock();
            if state.fetching {
                drop(state);
                return Ok(self.rejected(kind, PageOutcome::Busy));
            }
            state.fetching = true;
            state.generation
        };
        self.publish();
        self.fetch(kind, generation, None).await
    }

    /// Start over unconditionally; any older in-flight fetch becomes a no-op
    pub async fn force_refresh(&self) -> ServiceResult<PageOutcome> {
        let kind = FetchKind::ForceRefresh;
        if self.session.current_user_id().is_none() {
            return Ok(self.rejected(kind, PageOutcome::Unauthenticated));
        }
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.fetching = true;
            state.generation
        };
        self.publish();
        self.fetch(kind, generation, None).await
    }

    /// Fetch the page after the cursor and append it
    pub async fn load_more(&self) -> ServiceResult<PageOutcome> {
        let kind = FetchKind::LoadMore;
        if self.session.current_user_id().is_none() {
            return Ok(self.rejected(kind, PageOutcome::Unauthenticated));
        }
        let (generation, cursor) = {
            let mut state = self.lock();
            if state.fetching {
                drop(state);
                return Ok(self.rejected(kind, PageOutcome::Busy));
            }
            let Some(cursor) = state.cursor.clone() else {
                drop(state);
                return Ok(self.rejected(kind, PageOutcome::NoCursor));
            };
            state.fetching = true;
            (state.generation, cursor)
        };
        self.publish();
        self.fetch(kind, generation, Some(cursor)).await
    }

    async fn fetch(
        &self,
        kind: FetchKind,
        generation: u64,
        after: Option<Cursor>,
    ) -> ServiceResult<PageOutcome> {
        let replace = after.is_none();
        let result = self.posts.page(after, self.page_size).await;
        let blocked = self.block_list.get();

        let outcome = {
            let mut state = self.lock();
            if state.generation != generation {
                None
            } else {
                state.fetching = false;
                Some(result.map(|page| Self::apply(&mut state, page, &blocked, replace)))
            }
        };

        match outcome {
            None => {
                debug!(kind = kind.as_str(), generation, "Stale page discarded");
                metrics::record_page_fetch(kind.as_str(), "superseded");
                Ok(PageOutcome::Superseded)
            }
            Some(Ok(loaded)) => {
                self.publish();
                if let PageOutcome::Loaded { added, fetched } = loaded {
                    debug!(kind = kind.as_str(), added, fetched, "Feed page applied");
                }
                metrics::record_page_fetch(kind.as_str(), "loaded");
                Ok(loaded)
            }
            Some(Err(e)) => {
                self.publish();
                warn!(kind = kind.as_str(), error = %e, "Feed page fetch failed");
                metrics::record_page_fetch(kind.as_str(), "failed");
                Err(e)
            }
        }
    }

    fn apply(state: &mut FeedState, page: PostPage, blocked: &BlockSet, replace: bool) -> PageOutcome {
        if replace {
            state.posts.clear();
            state.seen.clear();
            state.cursor = None;
        }
        let added = state.absorb(page.posts, blocked);
        // An empty page keeps the previous cursor.
        if let Some(last) = page.last {
            state.cursor = Some(last);
        }
        PageOutcome::Loaded {
            added,
            fetched: page.fetched,
        }
    }

    fn rejected(&self, kind: FetchKind, outcome: PageOutcome) -> PageOutcome {
        let label = match outcome {
            PageOutcome::Busy => "busy",
            PageOutcome::NoCursor => "no_cursor",
            PageOutcome::Unauthenticated => "unauthenticated",
            _ => "rejected",
        };
        debug!(kind = kind.as_str(), outcome = label, "Feed fetch rejected");
        metrics::record_page_fetch(kind.as_str(), label);
        outcome
    }

    /// Re-read the block list and force a refresh on every block-list change
///
/// The refresh runs even when the re-read fails; the error is reported after it.
    ///
    /// The listener holds a weak reference; once the paginator is dropped the
    /// signals are ignored.
    pub fn attach_to_block_list(self: &Arc<Self>) -> JoinHandle<()> {
        let paginator = Arc::downgrade(self);
        self.block_list.on_change(move |_signal| {
            let paginator = paginator.clone();
            async move {
                let Some(paginator) = paginator.upgrade() else {
                    return Ok(());
                };
                // A failed re-read keeps the local set, which already holds the
                // change made by this session, so the feed still refreshes.
                let reread = paginator.block_list.refresh().await;
                if let Err(e) = &reread {
                    warn!(error = %e, "Block list re-read failed; refreshing feed with cached set");
                    metrics::record_block_list_refresh_failure();
                }
                paginator
                    .force_refresh()
                    .await
                    .map_err(|e| InvalidationError::CallbackFailed(e.to_string()))?;
                reread
                    .map(|_| ())
                    .map_err(|e| InvalidationError::CallbackFailed(e.to_string()))
            }
        })
    }

    /// Drop a post from the materialized sequence (e.g. after it was deleted)
    pub fn remove_post(&self, post_id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.posts.len();
            state.posts.retain(|p| p.id != post_id);
            state.seen.remove(post_id);
            state.posts.len() != before
        };
        if removed {
            self.publish();
        }
        removed
    }

    pub fn posts(&self) -> Vec<Post> {
        self.lock().posts.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.lock().fetching
    }

    pub fn has_cursor(&self) -> bool {
        self.lock().cursor.is_some()
    }

    pub fn updates(&self) -> watch::Receiver<FeedSnapshot> {
        self.updates.subscribe()
    }
}
