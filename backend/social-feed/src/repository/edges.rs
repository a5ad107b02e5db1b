use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{Edge, Relation};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Document, DocumentStore, Query};

const SUBJECT_FIELD: &str = "subjectId";

/// Composite document id for one (subject, object) pair: `subject_object`.
///
/// The subject must not contain `_`, so the first `_` always splits the key back
/// into its parts and two different pairs can never share a key.
pub fn edge_key(subject: &str, object: &str) -> ServiceResult<String> {
    if subject.is_empty() || object.is_empty() {
        return Err(ServiceError::InvalidInput(
            "edge endpoints must be non-empty".to_string(),
        ));
    }
    if subject.contains('_') {
        return Err(ServiceError::InvalidInput(format!(
            "subject id {:?} must not contain '_'",
            subject
        )));
    }
    Ok(format!("{}_{}", subject, object))
}

/// Repository for Like, Follow and Block edges
#[derive(Clone)]
pub struct EdgeRepository {
    store: Arc<dyn DocumentStore>,
}

impl EdgeRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Check if the edge exists
    pub async fn exists(&self, relation: Relation, subject: &str, object: &str) -> ServiceResult<bool> {
        let key = edge_key(subject, object)?;
        Ok(self.store.get(relation.collection(), &key).await?.is_some())
    }

    /// Create the edge (idempotent - an existing edge is overwritten in place)
    pub async fn create(&self, relation: Relation, edge: &Edge) -> ServiceResult<()> {
        let key = edge_key(&edge.subject_id, &edge.object_id)?;
        let data = serde_json::to_value(edge)?;
        self.store.set(relation.collection(), &key, data).await?;
        Ok(())
    }

    /// Delete the edge (idempotent - succeeds if it doesn't exist)
    pub async fn delete(&self, relation: Relation, subject: &str, object: &str) -> ServiceResult<()> {
        let key = edge_key(subject, object)?;
        self.store.delete(relation.collection(), &key).await?;
        Ok(())
    }

    /// Query matching every edge of `relation` whose subject is `subject`
    pub fn subject_query(relation: Relation, subject: &str) -> Query {
        Query::new(relation.collection()).where_eq(SUBJECT_FIELD, subject)
    }

    /// Object ids of every edge of `relation` from `subject`
    pub async fn query_by_subject(
        &self,
        relation: Relation,
        subject: &str,
    ) -> ServiceResult<HashSet<String>> {
        let docs = self
            .store
            .query(&Self::subject_query(relation, subject))
            .await?;
        Ok(Self::object_ids(docs))
    }

    pub async fn count_by_subject(&self, relation: Relation, subject: &str) -> ServiceResult<usize> {
        Ok(self.query_by_subject(relation, subject).await?.len())
    }

    /// Project edge documents onto their object ids, skipping malformed ones
    pub fn object_ids(docs: Vec<Document>) -> HashSet<String> {
        docs.into_iter()
            .filter_map(|doc| match serde_json::from_value::<Edge>(doc.data) {
                Ok(edge) => Some(edge.object_id),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "Skipping malformed edge");
                    None
                }
            })
            .collect()
    }
}
