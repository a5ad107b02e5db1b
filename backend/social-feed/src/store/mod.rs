//! Document store client abstraction
//!
//! The core never talks to a concrete backend. Every read, write and change
//! subscription goes through [`DocumentStore`], whose documents are untyped JSON
//! objects; typed records are encoded and decoded in the repository layer only.

pub mod blob;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

pub use blob::{BlobStore, MemoryBlobStore};
pub use memory::{MemoryStore, StoreGate, StoreOp};

/// Collections the core addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Posts,
    Likes,
    Follows,
    Blocks,
    Notifications,
    Comments,
    Users,
    Reports,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Likes => "likes",
            Collection::Follows => "follows",
            Collection::Blocks => "blocks",
            Collection::Notifications => "notifications",
            Collection::Comments => "comments",
            Collection::Users => "users",
            Collection::Reports => "reports",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed document: {0}")]
    Serialization(String),

    #[error("blob {0} not found")]
    BlobNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document: its id plus the JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
}

impl Filter {
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq { field, value } => data.get(field) == Some(value),
            Filter::Gte { field, value } => data
                .get(field)
                .map(|v| compare_values(v, value) != Ordering::Less)
                .unwrap_or(false),
            Filter::Lt { field, value } => data
                .get(field)
                .map(|v| compare_values(v, value) == Ordering::Less)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Resume point for an ordered query: the sort key of the last document seen,
/// with the document id breaking ties between equal keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub sort_value: Value,
    pub document_id: String,
}

impl Cursor {
    /// Cursor positioned at `doc` for an ordering on `field`
    pub fn at(doc: &Document, field: &str) -> Option<Self> {
        doc.field(field).map(|value| Self {
            sort_value: value.clone(),
            document_id: doc.id.clone(),
        })
    }
}

/// Filtered, ordered, optionally paginated query over one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub start_after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            start_after: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn where_lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }
}

/// Complete result sets, one per change affecting a subscribed query
pub type Snapshots = BoxStream<'static, StoreResult<Vec<Document>>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Create or overwrite the document stored under `id`
    async fn set(&self, collection: Collection, id: &str, data: Value) -> StoreResult<()>;

    /// Append a document under a store-assigned id
    async fn add(&self, collection: Collection, data: Value) -> StoreResult<String>;

    /// Remove a document; removing an absent id succeeds
    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Atomically add `delta` to a numeric field (absent field counts as 0)
    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<()>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Live query: yields the initial result set, then the full set again after every change
    async fn subscribe(&self, query: Query) -> StoreResult<Snapshots>;
}

/// Total order over JSON values used for sorting and range filters
///
/// Numbers compare numerically and strings lexicographically; mixed types order
/// null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&y.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
