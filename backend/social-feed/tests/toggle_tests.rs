/// Edge toggle engine: idempotence, cascades and partial failures
mod common;

use common::Fixture;
use social_feed::domain::{NotificationKind, Relation};
use social_feed::services::{EdgeChange, StepStatus};
use social_feed::store::{Collection, DocumentStore, StoreOp};
use tokio_test::{assert_err, assert_ok};

async fn seeded() -> (Fixture, String) {
    let fx = Fixture::new();
    fx.user("alice", "Alice").await;
    fx.user("bob", "Bob").await;
    let post_id = fx.post("bob", 1_000).await;
    fx.store
        .increment(Collection::Posts, &post_id, "likeCount", 3)
        .await
        .unwrap();
    (fx, post_id)
}

// ==================== Like Scenario ====================

#[tokio::test]
async fn test_like_then_unlike_scenario() {
    let (fx, post_id) = seeded().await;
    let engine = fx.engine();

    let liked = engine.toggle(Relation::Like, "alice", &post_id).await.unwrap();
    assert_eq!(liked.change, EdgeChange::Created);
    assert!(liked.present);
    assert_eq!(liked.cascade.counter, StepStatus::Applied);
    assert_eq!(liked.cascade.notification, StepStatus::Applied);

    let key = format!("alice_{}", post_id);
    assert!(fx.store.get(Collection::Likes, &key).await.unwrap().is_some());
    assert_eq!(fx.get_post(&post_id).await.like_count, 4);

    let inbox = fx.inbox("bob").await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Like);
    assert_eq!(inbox[0].sender_id, "alice");
    assert_eq!(inbox[0].receiver_id, "bob");
    assert_eq!(inbox[0].related_post_id.as_deref(), Some(post_id.as_str()));

    let unliked = engine.toggle(Relation::Like, "alice", &post_id).await.unwrap();
    assert_eq!(unliked.change, EdgeChange::Deleted);
    assert_eq!(unliked.cascade.notification, StepStatus::NotApplicable);

    assert!(fx.store.get(Collection::Likes, &key).await.unwrap().is_none());
    assert_eq!(fx.get_post(&post_id).await.like_count, 3);
    assert_eq!(fx.store.count(Collection::Notifications), 1);
}

#[tokio::test]
async fn test_liking_own_post_suppresses_notification() {
    let (fx, post_id) = seeded().await;

    let outcome = fx.engine().toggle(Relation::Like, "bob", &post_id).await.unwrap();
    assert_eq!(outcome.cascade.counter, StepStatus::Applied);
    assert_eq!(outcome.cascade.notification, StepStatus::Suppressed);
    assert_eq!(fx.get_post(&post_id).await.like_count, 4);
    assert_eq!(fx.store.count(Collection::Notifications), 0);
}

// ==================== Follow / Block ====================

#[tokio::test]
async fn test_follow_notifies_followed_user_without_counter() {
    let (fx, _) = seeded().await;

    let outcome = fx.engine().toggle(Relation::Follow, "alice", "bob").await.unwrap();
    assert_eq!(outcome.cascade.counter, StepStatus::NotApplicable);
    assert_eq!(outcome.cascade.notification, StepStatus::Applied);

    let inbox = fx.inbox("bob").await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Follow);
    assert_eq!(inbox[0].related_post_id, None);
}

#[tokio::test]
async fn test_block_never_notifies() {
    let (fx, _) = seeded().await;
    let engine = fx.engine();

    let blocked = engine.toggle(Relation::Block, "alice", "bob").await.unwrap();
    assert_eq!(blocked.change, EdgeChange::Created);
    assert_eq!(blocked.cascade.notification, StepStatus::NotApplicable);

    engine.toggle(Relation::Block, "alice", "bob").await.unwrap();
    assert_eq!(fx.store.count(Collection::Blocks), 0);
    assert_eq!(fx.store.count(Collection::Notifications), 0);
}

#[tokio::test]
async fn test_ensure_is_a_noop_in_requested_state() {
    let (fx, _) = seeded().await;
    let engine = fx.engine();

    let first = engine.ensure(Relation::Block, "alice", "bob", true).await.unwrap();
    assert_eq!(first.change, EdgeChange::Created);

    let again = engine.ensure(Relation::Block, "alice", "bob", true).await.unwrap();
    assert_eq!(again.change, EdgeChange::Unchanged);
    assert!(again.present);

    let absent = engine.ensure(Relation::Block, "bob", "alice", false).await.unwrap();
    assert_eq!(absent.change, EdgeChange::Unchanged);
    assert!(!absent.present);
    assert_eq!(fx.store.count(Collection::Blocks), 1);
}

// ==================== Failure Semantics ====================

#[tokio::test]
async fn test_counter_failure_is_partial_cascade() {
    let (fx, post_id) = seeded().await;
    fx.store.fail_on(StoreOp::Increment, Collection::Posts);

    let outcome = fx.engine().toggle(Relation::Like, "alice", &post_id).await.unwrap();
    assert_eq!(outcome.change, EdgeChange::Created);
    assert!(matches!(outcome.cascade.counter, StepStatus::Failed(_)));
    assert_eq!(outcome.cascade.notification, StepStatus::Applied);
    assert!(outcome.cascade.is_partial_failure());

    // The edge is the source of truth; the counter is left stale.
    assert!(fx.edges().exists(Relation::Like, "alice", &post_id).await.unwrap());
    assert_eq!(fx.get_post(&post_id).await.like_count, 3);
}

#[tokio::test]
async fn test_notification_failure_is_partial_cascade() {
    let (fx, post_id) = seeded().await;
    fx.store.fail_on(StoreOp::Add, Collection::Notifications);

    let outcome = fx.engine().toggle(Relation::Like, "alice", &post_id).await.unwrap();
    assert_eq!(outcome.cascade.counter, StepStatus::Applied);
    assert!(matches!(outcome.cascade.notification, StepStatus::Failed(_)));
    assert_eq!(fx.get_post(&post_id).await.like_count, 4);
}

#[tokio::test]
async fn test_edge_write_failure_skips_cascade() {
    let (fx, post_id) = seeded().await;
    fx.store.fail_on(StoreOp::Set, Collection::Likes);

    let err = fx
        .engine()
        .toggle(Relation::Like, "alice", &post_id)
        .await
        .unwrap_err();
    assert!(err.is_store_failure());
    assert_eq!(fx.get_post(&post_id).await.like_count, 3);
    assert_eq!(fx.store.count(Collection::Notifications), 0);
}

#[tokio::test]
async fn test_existence_check_failure_has_no_side_effects() {
    let (fx, post_id) = seeded().await;
    fx.store.fail_on(StoreOp::Get, Collection::Likes);

    assert_err!(fx.engine().toggle(Relation::Like, "alice", &post_id).await);
    assert_eq!(fx.store.count(Collection::Likes), 0);
    assert_eq!(fx.get_post(&post_id).await.like_count, 3);
}

#[tokio::test]
async fn test_invalid_subject_rejected_before_any_write() {
    let (fx, post_id) = seeded().await;
    assert_err!(fx.engine().toggle(Relation::Like, "al_ice", &post_id).await);
    assert_eq!(fx.store.count(Collection::Likes), 0);
}

// ==================== Concurrency ====================

#[tokio::test]
async fn test_racing_block_creates_leave_one_edge() {
    let (fx, _) = seeded().await;
    let engine = fx.engine();
    let gate = fx.store.gate(StoreOp::Set);

    let (first, second, _) = tokio::join!(
        engine.ensure(Relation::Block, "alice", "bob", true),
        engine.ensure(Relation::Block, "alice", "bob", true),
        async {
            gate.wait_for_waiters(2).await;
            gate.release(2);
        }
    );

    assert!(assert_ok!(first).present);
    assert!(assert_ok!(second).present);
    assert_eq!(fx.store.count(Collection::Blocks), 1);
}
