//! Smoke runner: drives one session through the feed core against the
//! in-process store and prints the resulting metrics.

use anyhow::{Context, Result};
use cache_invalidation::InvalidationBus;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use social_feed::config::Config;
use social_feed::domain::Post;
use social_feed::metrics;
use social_feed::repository::PostRepository;
use social_feed::services::{FeedSession, StaticSession};
use social_feed::store::{Collection, DocumentStore, MemoryBlobStore, MemoryStore};

async fn seed(store: &Arc<MemoryStore>) -> Result<Vec<String>> {
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        store
            .set(Collection::Users, id, json!({ "username": name }))
            .await
            .context("Failed to seed users")?;
    }

    let posts = PostRepository::new(store.clone());
    let now = Utc::now();
    let mut ids = Vec::new();
    for i in 0..12 {
        let author = if i % 3 == 0 { "carol" } else { "bob" };
        let post = Post::new(
            author,
            format!("blob://seed/{}.jpg", i),
            format!("post #{}", i),
            now - ChronoDuration::minutes(i),
        );
        ids.push(posts.create(&post).await.context("Failed to seed posts")?);
    }
    Ok(ids)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🔧 Starting social-feed smoke run");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        page_size = config.feed.page_size,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let seeded = seed(&store).await?;
    info!(posts = seeded.len(), "✅ Store seeded");

    let bus = InvalidationBus::new(config.feed.broadcast_capacity)
        .context("Failed to create invalidation bus")?;
    let mut feed = FeedSession::new(
        &config,
        store.clone(),
        Arc::new(MemoryBlobStore::default()),
        Arc::new(StaticSession::signed_in("alice")),
        bus.clone(),
    );

    let first = feed.start().await?;
    info!(?first, items = feed.items(false).await?.len(), "✅ Feed session started");

    let more = feed.load_more().await?;
    let items = feed.items(false).await?;
    info!(?more, items = items.len(), "Loaded next page");

    let target = items
        .iter()
        .map(|item| item.post.id.clone())
        .find(|id| seeded.contains(id))
        .context("Feed is empty")?;
    let liked = feed.toggle_like(&target).await?;
    info!(post_id = %target, outcome = ?liked.map(|o| o.change), "Toggled like");

    feed.toggle_follow("bob").await?;

    let mut updates = feed.paginator().updates();
    feed.block_user("carol").await?;
    tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|s| !s.fetching && s.posts.iter().all(|p| p.author_id != "carol")),
    )
    .await
    .context("Timed out waiting for the feed to drop blocked posts")?
    .context("Feed updates closed")?;
    info!(items = feed.items(false).await?.len(), "✅ Blocked posts removed from feed");

    let friends = feed.items(true).await?;
    info!(friends = friends.len(), "Friends-only view");

    feed.unblock_user("carol").await?;
    feed.end();

    info!(stats = ?bus.stats(), "🚀 Smoke run complete");
    println!("{}", metrics::render());
    Ok(())
}
