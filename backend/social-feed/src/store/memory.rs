//! In-process [`DocumentStore`]
//!
//! Backs the smoke runner and every test. Besides the store contract it offers
//! two test hooks:
//! - fault injection: make an operation (optionally scoped to one collection) fail
//! - gates: hold an operation in flight until the test releases it, so races
//!   between fetches can be driven deterministically

use super::{
    compare_values, Collection, Direction, Document, DocumentStore, Query, Snapshots, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Add,
    Delete,
    Increment,
    Query,
    Subscribe,
}

/// Holds operations of one kind until permits are released
#[derive(Clone)]
pub struct StoreGate {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
}

impl StoreGate {
    fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `n` held operations proceed, in arrival order
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Number of operations currently held
    pub fn waiting(&self) -> usize {
        self.waiting.load(AtomicOrdering::SeqCst)
    }

    /// Yield until at least `n` operations are held at this gate
    pub async fn wait_for_waiters(&self, n: usize) {
        while self.waiting() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        self.waiting.fetch_add(1, AtomicOrdering::SeqCst);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        self.waiting.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

struct Listener {
    query: Query,
    sender: mpsc::UnboundedSender<StoreResult<Vec<Document>>>,
    last: Option<Vec<Document>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<String, Value>>,
    listeners: Vec<Listener>,
}

impl Inner {
    fn docs(&self, collection: Collection) -> Option<&BTreeMap<String, Value>> {
        self.collections.get(&collection)
    }

    fn docs_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, Value> {
        self.collections.entry(collection).or_default()
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        let Some(docs) = self.docs(query.collection) else {
            return Vec::new();
        };

        let mut results: Vec<Document> = docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(order) = &query.order_by {
            results.retain(|doc| doc.field(&order.field).is_some());

            let key_order = |doc: &Document, value: &Value, id: &str| {
                let by_value = doc
                    .field(&order.field)
                    .map(|v| compare_values(v, value))
                    .unwrap_or(Ordering::Less);
                by_value.then_with(|| doc.id.as_str().cmp(id))
            };

            results.sort_by(|a, b| {
                let ordering = match b.field(&order.field) {
                    Some(value) => key_order(a, value, &b.id),
                    None => Ordering::Equal,
                };
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });

            if let Some(cursor) = &query.start_after {
                let wanted = match order.direction {
                    Direction::Ascending => Ordering::Greater,
                    Direction::Descending => Ordering::Less,
                };
                results.retain(|doc| {
                    key_order(doc, &cursor.sort_value, &cursor.document_id) == wanted
                });
            }
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        results
    }

    /// Redeliver every live query on `collection` whose result set changed
    fn notify(&mut self, collection: Collection) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.retain_mut(|listener| {
            if listener.query.collection != collection {
                return !listener.sender.is_closed();
            }
            let snapshot = self.run_query(&listener.query);
            if listener.last.as_ref() == Some(&snapshot) {
                return true;
            }
            listener.last = Some(snapshot.clone());
            listener.sender.send(Ok(snapshot)).is_ok()
        });
        self.listeners = listeners;
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    faults: Mutex<HashSet<(StoreOp, Option<Collection>)>>,
    gates: Mutex<HashMap<StoreOp, StoreGate>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` fail until [`MemoryStore::clear_faults`]
    pub fn fail(&self, op: StoreOp) {
        guard(&self.faults).insert((op, None));
    }

    /// Make `op` fail for one collection only
    pub fn fail_on(&self, op: StoreOp, collection: Collection) {
        guard(&self.faults).insert((op, Some(collection)));
    }

    pub fn clear_faults(&self) {
        guard(&self.faults).clear();
    }

    /// Install a gate holding every subsequent `op`
    pub fn gate(&self, op: StoreOp) -> StoreGate {
        guard(&self.gates).entry(op).or_insert_with(StoreGate::new).clone()
    }

    /// Remove the gate for `op`, releasing anything it holds
    pub fn open_gate(&self, op: StoreOp) {
        if let Some(gate) = guard(&self.gates).remove(&op) {
            gate.release(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Documents currently in `collection`, ordered by id
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        guard(&self.inner)
            .docs(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, collection: Collection) -> usize {
        guard(&self.inner)
            .docs(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Live queries still attached
    pub fn listener_count(&self) -> usize {
        let inner = guard(&self.inner);
        inner
            .listeners
            .iter()
            .filter(|listener| !listener.sender.is_closed())
            .count()
    }

    async fn pass(&self, op: StoreOp, collection: Collection) -> StoreResult<()> {
        let gate = guard(&self.gates).get(&op).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let faults = guard(&self.faults);
        if faults.contains(&(op, None)) || faults.contains(&(op, Some(collection))) {
            return Err(StoreError::Unavailable(format!(
                "injected {:?} fault on {}",
                op, collection
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.pass(StoreOp::Get, collection).await?;
        let inner = guard(&self.inner);
        Ok(inner
            .docs(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(&self, collection: Collection, id: &str, data: Value) -> StoreResult<()> {
        self.pass(StoreOp::Set, collection).await?;
        let mut inner = guard(&self.inner);
        inner.docs_mut(collection).insert(id.to_string(), data);
        inner.notify(collection);
        Ok(())
    }

    async fn add(&self, collection: Collection, data: Value) -> StoreResult<String> {
        self.pass(StoreOp::Add, collection).await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut inner = guard(&self.inner);
        inner.docs_mut(collection).insert(id.clone(), data);
        inner.notify(collection);
        Ok(id)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        self.pass(StoreOp::Delete, collection).await?;
        let mut inner = guard(&self.inner);
        if inner.docs_mut(collection).remove(id).is_some() {
            inner.notify(collection);
        }
        Ok(())
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<()> {
        self.pass(StoreOp::Increment, collection).await?;
        let mut inner = guard(&self.inner);
        let doc = inner
            .docs_mut(collection)
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        let Some(object) = doc.as_object_mut() else {
            return Err(StoreError::Serialization(format!(
                "{}/{} is not an object",
                collection, id
            )));
        };
        let current = object.get(field).and_then(Value::as_i64).unwrap_or(0);
        object.insert(field.to_string(), Value::from(current + delta));
        inner.notify(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.pass(StoreOp::Query, query.collection).await?;
        Ok(guard(&self.inner).run_query(query))
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Snapshots> {
        self.pass(StoreOp::Subscribe, query.collection).await?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut inner = guard(&self.inner);
        let initial = inner.run_query(&query);
        // Receiver is still in scope, so the initial send cannot fail.
        let _ = sender.send(Ok(initial.clone()));
        debug!(collection = %query.collection, "Live query attached");
        inner.listeners.push(Listener {
            query,
            sender,
            last: Some(initial),
        });

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}
