use dashmap::DashMap;
use tracing::debug;

use crate::domain::{DisplayInfo, Relation, UserProfile};
use crate::error::ServiceResult;
use crate::repository::{EdgeRepository, UserRepository};

const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Display metadata and social-graph reads for profile screens
///
/// Keeps a session cache of resolved display info for feed headers. Notification
/// and comment snapshots go through [`ProfileDirectory::fresh_display_info`] so
/// they record the name as it is at write time.
pub struct ProfileDirectory {
    users: UserRepository,
    edges: EdgeRepository,
    cache: DashMap<String, DisplayInfo>,
    default_display_name: String,
}

impl ProfileDirectory {
    pub fn new(users: UserRepository, edges: EdgeRepository, default_display_name: String) -> Self {
        Self {
            users,
            edges,
            cache: DashMap::new(),
            default_display_name,
        }
    }

    fn to_display(&self, user_id: &str, profile: Option<UserProfile>) -> DisplayInfo {
        let (name, icon) = match profile {
            Some(p) => (p.username, p.profile_image_url),
            None => (None, None),
        };
        DisplayInfo {
            user_id: user_id.to_string(),
            display_name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.default_display_name.clone()),
            icon_ref: icon.unwrap_or_default(),
        }
    }

    /// Display info from the session cache, fetched on first use
    pub async fn display_info(&self, user_id: &str) -> ServiceResult<DisplayInfo> {
        if let Some(hit) = self.cache.get(user_id) {
            return Ok(hit.clone());
        }
        debug!(user_id = %user_id, "Profile cache miss");
        self.fresh_display_info(user_id).await
    }

    /// Display info read from the store now; refreshes the cache entry
    pub async fn fresh_display_info(&self, user_id: &str) -> ServiceResult<DisplayInfo> {
        let profile = self.users.get(user_id).await?;
        let info = self.to_display(user_id, profile);
        self.cache.insert(user_id.to_string(), info.clone());
        Ok(info)
    }

    pub async fn display_infos(&self, user_ids: &[String]) -> ServiceResult<Vec<DisplayInfo>> {
        let mut infos = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            infos.push(self.display_info(user_id).await?);
        }
        Ok(infos)
    }

    /// Users whose username starts with `prefix`
    pub async fn search(&self, prefix: &str) -> ServiceResult<Vec<DisplayInfo>> {
        if prefix.trim().is_empty() {
            return Ok(Vec::new());
        }
        let profiles = self
            .users
            .search_by_username_prefix(prefix, DEFAULT_SEARCH_LIMIT)
            .await?;
        Ok(profiles
            .into_iter()
            .map(|p| {
                let id = p.id.clone();
                self.to_display(&id, Some(p))
            })
            .collect())
    }

    /// Everyone `user_id` follows, sorted by display name
    pub async fn following(&self, user_id: &str) -> ServiceResult<Vec<DisplayInfo>> {
        let ids: Vec<String> = self
            .edges
            .query_by_subject(Relation::Follow, user_id)
            .await?
            .into_iter()
            .collect();
        let mut infos = self.display_infos(&ids).await?;
        infos.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(infos)
    }

    pub async fn follow_count(&self, user_id: &str) -> ServiceResult<usize> {
        self.edges.count_by_subject(Relation::Follow, user_id).await
    }

    pub async fn is_following(&self, subject: &str, object: &str) -> ServiceResult<bool> {
        self.edges.exists(Relation::Follow, subject, object).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Edge;
    use crate::store::{Collection, DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn directory() -> (Arc<MemoryStore>, ProfileDirectory) {
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [("u1", "hana"), ("u2", "haruto"), ("u3", "kai")] {
            store
                .set(Collection::Users, id, json!({ "username": name, "profileImageUrl": format!("icon://{}", id) }))
                .await
                .unwrap();
        }
        store.set(Collection::Users, "u4", json!({})).await.unwrap();
        let dir = ProfileDirectory::new(
            UserRepository::new(store.clone()),
            EdgeRepository::new(store.clone()),
            "Anonymous".to_string(),
        );
        (store, dir)
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back_to_default() {
        let (_store, dir) = directory().await;

        let info = dir.display_info("u4").await.unwrap();
        assert_eq!(info.display_name, "Anonymous");
        assert_eq!(info.icon_ref, "");

        let ghost = dir.display_info("nobody").await.unwrap();
        assert_eq!(ghost.display_name, "Anonymous");
    }

    #[tokio::test]
    async fn test_cache_versus_fresh_read() {
        let (store, dir) = directory().await;
        assert_eq!(dir.display_info("u1").await.unwrap().display_name, "hana");

        store
            .set(Collection::Users, "u1", json!({ "username": "hana2" }))
            .await
            .unwrap();

        assert_eq!(dir.display_info("u1").await.unwrap().display_name, "hana");
        assert_eq!(dir.fresh_display_info("u1").await.unwrap().display_name, "hana2");
        assert_eq!(dir.display_info("u1").await.unwrap().display_name, "hana2");
    }

    #[tokio::test]
    async fn test_prefix_search() {
        let (_store, dir) = directory().await;
        let names: Vec<String> = dir
            .search("ha")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        assert_eq!(names, vec!["hana", "haruto"]);
        assert!(dir.search("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_following_and_counts() {
        let (store, dir) = directory().await;
        let edges = EdgeRepository::new(store.clone());
        edges.create(Relation::Follow, &Edge::new("u1", "u3")).await.unwrap();
        edges.create(Relation::Follow, &Edge::new("u1", "u2")).await.unwrap();

        let names: Vec<String> = dir
            .following("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        assert_eq!(names, vec!["haruto", "kai"]);
        assert_eq!(dir.follow_count("u1").await.unwrap(), 2);
        assert!(dir.is_following("u1", "u2").await.unwrap());
        assert!(!dir.is_following("u2", "u1").await.unwrap());
    }
}
