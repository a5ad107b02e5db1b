/// Feed session facade: lifecycle, annotation and post lifecycle
mod common;

use common::{wait_until, Fixture};
use social_feed::domain::{Relation, ReportReason};
use social_feed::error::ServiceError;
use social_feed::services::PageOutcome;
use social_feed::store::Collection;

async fn seeded() -> Fixture {
    let fx = Fixture::new();
    fx.user("alice", "Alice").await;
    fx.user("bob", "Bob").await;
    fx.user("carol", "Carol").await;
    fx
}

// ==================== Unauthenticated ====================

#[tokio::test]
async fn test_signed_out_session_is_a_silent_noop() {
    let fx = seeded().await;
    let post_id = fx.post("bob", 1).await;
    let mut session = fx.session(None);

    assert_eq!(session.start().await.unwrap(), PageOutcome::Unauthenticated);
    assert_eq!(session.refresh().await.unwrap(), PageOutcome::Unauthenticated);
    assert_eq!(session.load_more().await.unwrap(), PageOutcome::Unauthenticated);
    assert!(session.items(false).await.unwrap().is_empty());

    assert!(session.toggle_like(&post_id).await.unwrap().is_none());
    assert!(session.toggle_follow("bob").await.unwrap().is_none());
    assert!(session.unblock_user("bob").await.unwrap().is_none());
    assert!(session.create_post(vec![1], "hi").await.unwrap().is_none());
    assert!(!session.delete_post(&post_id).await.unwrap());
    assert!(session
        .report_post(&post_id, ReportReason::Spam)
        .await
        .unwrap()
        .is_none());
    assert!(session.comments().add_comment(&post_id, "hi").await.unwrap().is_none());

    assert_eq!(fx.store.count(Collection::Likes), 0);
    assert_eq!(fx.store.count(Collection::Follows), 0);
    assert_eq!(fx.store.count(Collection::Reports), 0);
    assert_eq!(fx.store.count(Collection::Posts), 1);
}

// ==================== Annotation ====================

#[tokio::test]
async fn test_items_annotated_for_current_user() {
    let fx = seeded().await;
    let bobs = fx.post("bob", 20).await;
    let carols = fx.post("carol", 10).await;

    let mut session = fx.session(Some("alice"));
    session.toggle_follow("bob").await.unwrap();
    session.toggle_like(&carols).await.unwrap();
    session.start().await.unwrap();

    let items = session.items(false).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].post.id, bobs);
    assert!(items[0].author_followed_by_me && !items[0].liked_by_me);
    assert_eq!(items[1].post.id, carols);
    assert!(items[1].liked_by_me && !items[1].author_followed_by_me);
    assert_eq!(items[0].author.display_name, "Bob");
    assert_eq!(items[1].author.user_id, "carol");
    assert_eq!(items[1].author.display_name, "Carol");
    assert_eq!(items[1].post.like_count, 1);

    let friends = session.items(true).await.unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].post.author_id, "bob");
}

#[tokio::test]
async fn test_like_set_follows_toggles_after_start() {
    let fx = seeded().await;
    let post_id = fx.post("bob", 1).await;

    let mut session = fx.session(Some("alice"));
    session.start().await.unwrap();
    let mut likes = session.likes().watch();

    session.toggle_like(&post_id).await.unwrap();
    wait_until(&mut likes, |set| set.contains(&post_id)).await;
    assert!(session.items(false).await.unwrap()[0].liked_by_me);
}

#[tokio::test]
async fn test_self_follow_is_ignored() {
    let fx = seeded().await;
    let session = fx.session(Some("alice"));

    assert!(session.toggle_follow("alice").await.unwrap().is_none());
    assert_eq!(fx.store.count(Collection::Follows), 0);
}

#[tokio::test]
async fn test_end_stops_live_state() {
    let fx = seeded().await;
    let mut session = fx.session(Some("alice"));
    session.start().await.unwrap();
    assert!(session.likes().is_live());
    assert!(session.follows().is_live());

    session.end();
    assert!(!session.likes().is_live());
    assert!(!session.follows().is_live());
}

// ==================== Post Lifecycle ====================

#[tokio::test]
async fn test_create_and_delete_post() {
    let fx = seeded().await;
    let mut session = fx.session(Some("alice"));

    let post_id = session
        .create_post(vec![0xff, 0xd8], "first light")
        .await
        .unwrap()
        .unwrap();
    let post = fx.get_post(&post_id).await;
    assert_eq!(post.author_id, "alice");
    assert!(fx.blobs.contains(&post.image_ref));

    session.start().await.unwrap();
    assert_eq!(session.paginator().posts().len(), 1);

    assert!(session.delete_post(&post_id).await.unwrap());
    assert!(session.paginator().posts().is_empty());
    assert_eq!(fx.store.count(Collection::Posts), 0);
    assert!(fx.blobs.is_empty());
}

#[tokio::test]
async fn test_only_author_deletes_post() {
    let fx = seeded().await;
    let post_id = fx.post("bob", 1).await;
    let session = fx.session(Some("alice"));

    let err = session.delete_post(&post_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(fx.store.count(Collection::Posts), 1);
}

#[tokio::test]
async fn test_image_delete_failure_does_not_keep_post() {
    let fx = seeded().await;
    let session = fx.session(Some("alice"));
    let post_id = session.create_post(vec![1], "").await.unwrap().unwrap();

    fx.blobs.fail_deletes(true);
    assert!(session.delete_post(&post_id).await.unwrap());
    assert_eq!(fx.store.count(Collection::Posts), 0);
    assert_eq!(fx.blobs.len(), 1);
}

#[tokio::test]
async fn test_report_post_records_target() {
    let fx = seeded().await;
    let post_id = fx.post("bob", 1).await;
    let session = fx.session(Some("alice"));

    session
        .report_post(&post_id, ReportReason::Inappropriate)
        .await
        .unwrap()
        .unwrap();

    let reports = fx.store.documents(Collection::Reports);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].data["reporterId"], "alice");
    assert_eq!(reports[0].data["targetUserId"], "bob");
    assert_eq!(reports[0].data["reason"], "inappropriate");
}

#[tokio::test]
async fn test_posts_by_author_newest_first() {
    let fx = seeded().await;
    fx.post("bob", 1).await;
    fx.post("carol", 2).await;
    fx.post("bob", 3).await;
    let session = fx.session(Some("alice"));

    let posts = session.posts_by_author("bob").await.unwrap();
    let times: Vec<i64> = posts.iter().map(|p| p.created_at.timestamp_millis()).collect();
    assert_eq!(times, vec![3, 1]);
}

// ==================== Social Graph Reads ====================

#[tokio::test]
async fn test_following_and_search() {
    let fx = seeded().await;
    let session = fx.session(Some("alice"));
    session.toggle_follow("carol").await.unwrap();
    session.toggle_follow("bob").await.unwrap();

    let profiles = session.profiles();
    let following: Vec<String> = profiles
        .following("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.display_name)
        .collect();
    assert_eq!(following, vec!["Bob", "Carol"]);
    assert_eq!(profiles.follow_count("alice").await.unwrap(), 2);
    assert!(fx.edges().exists(Relation::Follow, "alice", "bob").await.unwrap());

    let found = profiles.search("Ca").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].user_id, "carol");
}
