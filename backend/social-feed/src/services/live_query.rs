//! Long-lived store subscriptions republished as complete values
//!
//! Each [`LiveQuery`] owns one store subscription and one background task. Every
//! snapshot the store delivers is projected into a `T` and published through a
//! `watch` channel, so observers always see a complete current value and never a
//! delta. Dropping the live query cancels the task and the subscription with it.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{Document, DocumentStore, Query, StoreResult};

pub struct LiveQuery<T> {
    receiver: watch::Receiver<Arc<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveQuery<T>
where
    T: Send + Sync + 'static,
{
    /// Subscribe to `query` and publish `project(snapshot)` on every delivery
    ///
    /// Waits for the store's initial snapshot, so the live query is current when
    /// it is returned. `initial` is only used if that first delivery fails.
    pub async fn start<F>(
        store: Arc<dyn DocumentStore>,
        query: Query,
        initial: T,
        project: F,
    ) -> StoreResult<Self>
    where
        F: Fn(Vec<Document>) -> T + Send + 'static,
    {
        let collection = query.collection;
        let mut snapshots = store.subscribe(query).await?;
        let first = match snapshots.next().await {
            Some(Ok(docs)) => project(docs),
            Some(Err(e)) => {
                warn!(collection = %collection, error = %e, "Initial live query snapshot failed");
                initial
            }
            None => initial,
        };
        let (sender, receiver) = watch::channel(Arc::new(first));

        let task = tokio::spawn(async move {
            while let Some(delivery) = snapshots.next().await {
                match delivery {
                    Ok(docs) => {
                        debug!(collection = %collection, documents = docs.len(), "Live query snapshot");
                        if sender.send(Arc::new(project(docs))).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "Live query delivery failed");
                    }
                }
            }
            debug!(collection = %collection, "Live query ended");
        });

        Ok(Self {
            receiver,
            task: Some(task),
        })
    }

    /// A live query that never changes (e.g. nobody is signed in)
    pub fn idle(value: T) -> Self {
        let (_sender, receiver) = watch::channel(Arc::new(value));
        Self {
            receiver,
            task: None,
        }
    }

    pub fn current(&self) -> Arc<T> {
        self.receiver.borrow().clone()
    }

    /// Observer handle; `changed()` resolves on every republication
    pub fn watch(&self) -> watch::Receiver<Arc<T>> {
        self.receiver.clone()
    }

    pub fn is_live(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Cancel the subscription; the last published value stays readable
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
