//! Router-level tests driven through `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use common::Fixture;
use serde_json::{Value, json};
use socialgraph_cache::{BackendAdapter, LocalBackend, StrategySetting};
use socialgraph_server::services::InMemoryRecords;
use socialgraph_server::{AppConfig, CacheMode, build_router, build_state};
use tower::ServiceExt;

async fn send(fx: &Fixture, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = build_router(fx.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

#[tokio::test]
async fn health_without_redis_is_not_configured() {
    let fx = Fixture::new(StrategySetting::Auto);
    let (status, body) = send(&fx, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"]["status"], "not_configured");
    assert_eq!(body["cache"]["backend_type"], "local");
}

#[tokio::test]
async fn health_with_unreachable_redis_is_degraded() {
    let fx = Fixture::down();
    let (status, body) = send(&fx, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["cache"]["status"], "disconnected");
    assert!(body["cache"].get("stats").is_none());
}

#[tokio::test]
async fn cache_stats_report_backend_and_strategy() {
    let fx = Fixture::new(StrategySetting::Version);
    let (status, body) = send(&fx, Method::GET, "/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["backend_type"], "local");
    assert_eq!(body["strategy"], "version_bump");
    assert!(body["hits"].is_u64());
}

#[tokio::test]
async fn invalidate_requires_user_id() {
    let fx = Fixture::new(StrategySetting::Auto);
    let (status, body) = send(&fx, Method::POST, "/cache/invalidate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "user_id is required");
}

#[tokio::test]
async fn invalidate_evicts_the_users_scopes() {
    let fx = Fixture::new(StrategySetting::Pattern);
    let alice = fx.records.add_user("alice", "Alice", "Smith");

    let (status, _) = send(&fx, Method::GET, &format!("/users/{}", alice.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&fx, Method::GET, &format!("/users/{}/feed", alice.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fx.backend.len(), 2);

    let uri = format!("/cache/invalidate?user_id={}", alice.id);
    let (status, body) = send(&fx, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Cache invalidated successfully");
    assert_eq!(body["user_id"], alice.id);
    assert_eq!(body["scopes"].as_array().map(Vec::len), Some(3));
    assert!(fx.backend.is_empty());
}

#[tokio::test]
async fn invalidate_surfaces_backend_failures() {
    let fx = Fixture::down();
    let (status, body) = send(&fx, Method::POST, "/cache/invalidate?user_id=5", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["user_id"], 5);
    let failures = body["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 3);
    assert_eq!(failures[0]["scope"], "feed:user:5");
    assert_eq!(failures[0]["category"], "connectivity");
}

#[tokio::test]
async fn out_of_range_paging_is_clamped_before_keying() {
    let fx = Fixture::new(StrategySetting::Pattern);
    let bob = fx.records.add_user("bob", "Bob", "Jones");

    let uri = format!("/users/{}/posts?page=0&size=500", bob.id);
    let (status, body) = send(&fx, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);

    let key = format!("posts:user:{}:page:1:size:20", bob.id);
    assert!(fx.backend.exists(&key).await.unwrap());
}

#[tokio::test]
async fn post_lifecycle_over_http() {
    let fx = Fixture::new(StrategySetting::Auto);
    let alice = fx.records.add_user("alice", "Alice", "Smith");
    let bob = fx.records.add_user("bob", "Bob", "Jones");

    let (status, _) = send(
        &fx,
        Method::POST,
        &format!("/users/{}/friends", alice.id),
        Some(json!({ "friend_id": bob.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let feed_uri = format!("/users/{}/feed", alice.id);
    let (_, feed) = send(&fx, Method::GET, &feed_uri, None).await;
    assert_eq!(feed["total"], 0);

    let (status, created) = send(
        &fx,
        Method::POST,
        &format!("/users/{}/posts", bob.id),
        Some(json!({ "title": "hello", "content": "world" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = created["id"].as_i64().unwrap();

    let (_, feed) = send(&fx, Method::GET, &feed_uri, None).await;
    assert_eq!(feed["total"], 1);
    assert_eq!(feed["posts"][0]["title"], "hello");

    let (status, updated) = send(
        &fx,
        Method::PUT,
        &format!("/users/{}/posts/{post_id}", bob.id),
        Some(json!({ "title": "edited" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "edited");

    let (_, feed) = send(&fx, Method::GET, &feed_uri, None).await;
    assert_eq!(feed["posts"][0]["title"], "edited");

    let (status, _) = send(
        &fx,
        Method::DELETE,
        &format!("/users/{}/posts/{post_id}", bob.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, feed) = send(&fx, Method::GET, &feed_uri, None).await;
    assert_eq!(feed["total"], 0);
}

#[tokio::test]
async fn domain_errors_map_to_status_codes() {
    let fx = Fixture::new(StrategySetting::Auto);
    let alice = fx.records.add_user("alice", "Alice", "Smith");

    let (status, body) = send(&fx, Method::GET, "/users/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("404"));

    let (status, _) = send(&fx, Method::GET, "/users/search?first_name=Al", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &fx,
        Method::POST,
        &format!("/users/{}/friends", alice.id),
        Some(json!({ "friend_id": alice.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &fx,
        Method::GET,
        "/users/search?first_name=Al&last_name=Sm",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    socialgraph_server::metrics::init_metrics();
    let fx = Fixture::new(StrategySetting::Auto);
    let (status, body) = send(&fx, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_string() || body.is_null());
}

fn unreachable_redis() -> socialgraph_server::RedisConfig {
    socialgraph_server::RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".into(),
        timeout_ms: 500,
        ..Default::default()
    }
}

#[tokio::test]
async fn unreachable_redis_falls_back_to_local_cache() {
    let (backend, mode) = socialgraph_server::create_cache_backend(&unreachable_redis()).await;
    assert_eq!(mode, CacheMode::Fallback);
    assert_eq!(backend.backend_type(), "local");
    assert!(backend.ping().await.is_ok());
}

#[tokio::test]
async fn health_after_startup_fallback_is_degraded() {
    let config = AppConfig {
        redis: unreachable_redis(),
        ..Default::default()
    };
    let records = Arc::new(InMemoryRecords::new());
    let state = build_state(&config, records.clone()).await;
    assert_eq!(state.cache_mode, CacheMode::Fallback);
    let fx = Fixture {
        records,
        backend: LocalBackend::new(),
        state,
    };

    let (status, body) = send(&fx, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["cache"]["status"], "disconnected");
    assert_eq!(body["cache"]["backend_type"], "local");
    assert!(body["cache"].get("stats").is_none());
}
