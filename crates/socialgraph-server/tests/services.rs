//! Domain services driving the cache-aside layer.

mod common;

use common::Fixture;
use socialgraph_cache::{CacheError, PageRequest, StrategySetting};
use socialgraph_server::ServiceError;
use socialgraph_server::models::{CreatePostRequest, UpdatePostRequest};

fn post(title: &str) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        content: format!("{title} body"),
    }
}

#[tokio::test]
async fn feed_is_served_from_cache_until_an_author_posts() {
    for strategy in [StrategySetting::Pattern, StrategySetting::Version] {
        let fx = Fixture::new(strategy);
        let alice = fx.records.add_user("alice", "Alice", "Smith");
        let bob = fx.records.add_user("bob", "Bob", "Jones");
        fx.state.friends.add_friend(alice.id, bob.id).await.unwrap();
        fx.state.posts.create_post(bob.id, &post("one")).await.unwrap();

        let page = PageRequest::default();
        let first = fx.state.posts.feed(alice.id, page).await.unwrap();
        let reads = fx.records.reads();
        let second = fx.state.posts.feed(alice.id, page).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.records.reads(), reads, "second read hit the system of record");

        // A follower's feed is invalidated when the author writes.
        fx.state.posts.create_post(bob.id, &post("two")).await.unwrap();
        let third = fx.state.posts.feed(alice.id, page).await.unwrap();
        assert_eq!(third.total, 2, "strategy {strategy:?}");
        assert_eq!(third.posts[0].title, "two");
    }
}

#[tokio::test]
async fn every_cached_page_is_evicted_on_write() {
    let fx = Fixture::new(StrategySetting::Pattern);
    let bob = fx.records.add_user("bob", "Bob", "Jones");
    for i in 0..5 {
        fx.state
            .posts
            .create_post(bob.id, &post(&format!("p{i}")))
            .await
            .unwrap();
    }

    for (page, size) in [(1, 2), (2, 2), (3, 2), (1, 20)] {
        let resp = fx
            .state
            .posts
            .user_posts(bob.id, PageRequest::clamped(page, size))
            .await
            .unwrap();
        assert_eq!(resp.total, 5);
    }
    assert_eq!(fx.backend.len(), 4);

    let last = fx
        .state
        .posts
        .user_posts(bob.id, PageRequest::clamped(1, 20))
        .await
        .unwrap()
        .posts[0]
        .clone();
    fx.state.posts.delete_post(last.id, bob.id).await.unwrap();
    assert!(fx.backend.is_empty());

    let resp = fx
        .state
        .posts
        .user_posts(bob.id, PageRequest::clamped(3, 2))
        .await
        .unwrap();
    assert_eq!((resp.total, resp.pages, resp.posts.len()), (4, 2, 0));
}

#[tokio::test]
async fn update_invalidates_the_authors_pages() {
    let fx = Fixture::new(StrategySetting::Auto);
    let bob = fx.records.add_user("bob", "Bob", "Jones");
    let created = fx.state.posts.create_post(bob.id, &post("draft")).await.unwrap();
    let page = PageRequest::default();
    fx.state.posts.user_posts(bob.id, page).await.unwrap();

    let update = UpdatePostRequest {
        title: Some("final".into()),
        content: None,
    };
    fx.state
        .posts
        .update_post(created.id, bob.id, &update)
        .await
        .unwrap();

    let resp = fx.state.posts.user_posts(bob.id, page).await.unwrap();
    assert_eq!(resp.posts[0].title, "final");
}

#[tokio::test]
async fn invalid_writes_are_rejected_before_the_system_of_record() {
    let fx = Fixture::new(StrategySetting::Auto);
    let bob = fx.records.add_user("bob", "Bob", "Jones");

    let err = fx.state.posts.create_post(bob.id, &post("  ")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = fx
        .state
        .posts
        .update_post(1, bob.id, &UpdatePostRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = fx.state.friends.add_friend(bob.id, bob.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn profile_and_search_are_cached() {
    let fx = Fixture::new(StrategySetting::Auto);
    let ivan = fx.records.add_user("ivan", "Ivan", "Petrov");
    fx.records.add_user("olga", "Olga", "Petrova");

    let profile = fx.state.users.profile(ivan.id).await.unwrap();
    assert_eq!(profile.username, "ivan");
    let page = PageRequest::default();
    let found = fx.state.users.search("Iv", "Pet", page).await.unwrap();
    assert_eq!(found.total, 1);

    let reads = fx.records.reads();
    fx.state.users.profile(ivan.id).await.unwrap();
    fx.state.users.search("Iv", "Pet", page).await.unwrap();
    assert_eq!(fx.records.reads(), reads);

    assert!(matches!(
        fx.state.users.search("", "Pet", page).await,
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        fx.state.users.profile(999).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn removing_a_friend_refreshes_the_feed() {
    let fx = Fixture::new(StrategySetting::Version);
    let alice = fx.records.add_user("alice", "Alice", "Smith");
    let bob = fx.records.add_user("bob", "Bob", "Jones");
    fx.state.posts.create_post(bob.id, &post("hello")).await.unwrap();
    fx.state.friends.add_friend(alice.id, bob.id).await.unwrap();

    let page = PageRequest::default();
    assert_eq!(fx.state.posts.feed(alice.id, page).await.unwrap().total, 1);

    fx.state.friends.remove_friend(alice.id, bob.id).await.unwrap();
    assert_eq!(fx.state.posts.feed(alice.id, page).await.unwrap().total, 0);
}

#[tokio::test]
async fn reads_fail_open_when_the_cache_is_down() {
    let fx = Fixture::down();
    let bob = fx.records.add_user("bob", "Bob", "Jones");
    fx.state.posts.create_post(bob.id, &post("hello")).await.unwrap();

    let resp = fx
        .state
        .posts
        .user_posts(bob.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(fx.state.users.profile(bob.id).await.unwrap().id, bob.id);
}

#[tokio::test]
async fn force_refresh_reports_every_failed_scope() {
    let fx = Fixture::down();
    match fx.state.admin.force_refresh(7).await {
        Err(ServiceError::RefreshFailed { user_id, failures }) => {
            assert_eq!(user_id, 7);
            assert_eq!(failures.len(), 3);
            // paged scopes fail at the scan, the profile key at its delete batch
            assert!(failures[0].error.is_unavailable());
            assert!(matches!(
                failures[2].error,
                CacheError::PartialInvalidation { failed_batches: 1, .. }
            ));
        }
        other => panic!("expected refresh failure, got {other:?}"),
    }

    let fx = Fixture::new(StrategySetting::Auto);
    let report = fx.state.admin.force_refresh(7).await.unwrap();
    assert_eq!(report.scopes.len(), 3);
}
