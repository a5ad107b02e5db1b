/// Live relation monitors republish complete sets
mod common;

use common::{wait_until, Fixture};
use social_feed::domain::Relation;
use social_feed::services::RelationMonitor;
use std::time::Duration;

#[tokio::test]
async fn test_monitor_tracks_toggles() {
    let fx = Fixture::new();
    let post_id = fx.post("bob", 1).await;
    let engine = fx.engine();

    let monitor = RelationMonitor::start(fx.store.clone(), Relation::Like, "alice")
        .await
        .unwrap();
    assert!(monitor.snapshot().is_empty());
    let mut sets = monitor.watch();

    engine.toggle(Relation::Like, "alice", &post_id).await.unwrap();
    wait_until(&mut sets, |set| set.contains(&post_id)).await;
    assert!(monitor.contains(&post_id));

    engine.toggle(Relation::Like, "alice", &post_id).await.unwrap();
    wait_until(&mut sets, |set| set.is_empty()).await;
}

#[tokio::test]
async fn test_initial_snapshot_is_complete() {
    let fx = Fixture::new();
    let engine = fx.engine();
    engine.toggle(Relation::Follow, "alice", "bob").await.unwrap();
    engine.toggle(Relation::Follow, "alice", "carol").await.unwrap();
    engine.toggle(Relation::Follow, "bob", "carol").await.unwrap();

    let monitor = RelationMonitor::start(fx.store.clone(), Relation::Follow, "alice")
        .await
        .unwrap();
    let set = monitor.snapshot();
    assert_eq!(set.len(), 2);
    assert!(set.contains("bob") && set.contains("carol"));
    assert_eq!(monitor.relation(), Relation::Follow);
}

#[tokio::test]
async fn test_other_subjects_do_not_leak_in() {
    let fx = Fixture::new();
    let post_id = fx.post("carol", 1).await;
    let engine = fx.engine();

    let monitor = RelationMonitor::start(fx.store.clone(), Relation::Like, "alice")
        .await
        .unwrap();
    let mut sets = monitor.watch();

    engine.toggle(Relation::Like, "bob", &post_id).await.unwrap();
    engine.toggle(Relation::Like, "alice", &post_id).await.unwrap();
    wait_until(&mut sets, |set| set.contains(&post_id)).await;
    assert_eq!(monitor.snapshot().len(), 1);
}

#[tokio::test]
async fn test_stop_releases_the_subscription() {
    let fx = Fixture::new();
    let mut monitor = RelationMonitor::start(fx.store.clone(), Relation::Block, "alice")
        .await
        .unwrap();
    assert!(monitor.is_live());
    assert_eq!(fx.store.listener_count(), 1);

    monitor.stop();
    tokio::time::timeout(Duration::from_secs(2), async {
        while fx.store.listener_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscription still attached");
    assert!(!monitor.is_live());
}

#[tokio::test]
async fn test_idle_monitor_is_empty() {
    let monitor = RelationMonitor::idle(Relation::Like);
    assert!(monitor.snapshot().is_empty());
    assert!(!monitor.is_live());
}
