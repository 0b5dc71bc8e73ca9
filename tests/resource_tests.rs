//! # Resource Facade Integration Tests
//!
//! The typed resources against a mocked storefront API: envelope handling,
//! error mapping, caching of reads and invalidation after mutations.

use data_provider::api::{ApiClient, Resources};
use data_provider::caching::DataProvider;
use data_provider::core::config::{ApiConfig, CacheConfig};
use data_provider::ProviderError;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestContext {
    server: MockServer,
    provider: DataProvider,
    resources: Resources,
}

async fn create_test_context() -> TestContext {
    let server = MockServer::start().await;
    let client = ApiClient::new(&ApiConfig {
        base_url: format!("{}/api/v1", server.uri()),
        timeout: Duration::from_secs(5),
        auth_token: Some("test-token".to_string()),
    })
    .unwrap();
    let provider: DataProvider = DataProvider::new(CacheConfig::default());
    let resources = Resources::new(client, provider.clone());

    TestContext {
        server,
        provider,
        resources,
    }
}

fn envelope(payload: Value) -> Value {
    json!({ "status": "success", "results": 1, "data": { "data": payload } })
}

fn tour(id: &str, name: &str) -> Value {
    json!({ "_id": id, "name": name, "price": 497, "ratingsAverage": 4.7 })
}

fn booking(id: &str, tour: &str, user: &str) -> Value {
    json!({ "_id": id, "tour": tour, "user": user, "price": 497, "paid": true })
}

fn review(id: &str, tour: &str, user: &str) -> Value {
    json!({ "_id": id, "review": "Loved it", "rating": 5, "tour": tour, "user": user })
}

/// Seed a cache key directly, as if an earlier read had fetched it
async fn seed(provider: &DataProvider, key: &str, value: Value) {
    provider
        .fetch_future(key, async move { Ok(value) }, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_unwraps_envelope_and_caches() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            tour("t1", "The Forest Hiker"),
            tour("t2", "The Sea Explorer"),
        ]))))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let tours = ctx.resources.tours.list(false).await.unwrap();
    assert_eq!(tours.len(), 2);
    assert_eq!(tours[0].id, "t1");
    assert_eq!(tours[1].name, "The Sea Explorer");

    // Second read is served from the cache
    let again = ctx.resources.tours.list(false).await.unwrap();
    assert_eq!(again, tours);
    assert!(ctx.provider.cached("tours/all").is_some());
}

#[tokio::test]
async fn test_get_and_nested_reads_use_their_own_keys() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(tour("t1", "The Forest Hiker"))))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours/t1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([review("r1", "t1", "u1")]))))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/u1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([booking("b1", "t1", "u1")]))))
        .mount(&ctx.server)
        .await;

    let tour = ctx.resources.tours.get("t1", false).await.unwrap();
    assert_eq!(tour.name, "The Forest Hiker");
    let reviews = ctx.resources.reviews.for_tour("t1", false).await.unwrap();
    assert_eq!(reviews[0].rating, 5.0);
    let bookings = ctx.resources.bookings.for_user("u1", false).await.unwrap();
    assert!(bookings[0].paid);

    let keys: Vec<String> = ctx
        .provider
        .cache_stats()
        .items_list
        .into_iter()
        .map(|item| item.key)
        .collect();
    assert_eq!(keys, vec!["bookings/user/u1", "reviews/tour/t1", "tours/t1"]);
}

#[tokio::test]
async fn test_dashboard_stats() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/admin/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "totalTours": 9,
            "totalUsers": 20,
            "totalBookings": 14,
            "totalReviews": 55,
            "totalRevenue": 6958.0
        }))))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let stats = ctx.resources.dashboard.stats(false).await.unwrap();
    assert_eq!(stats.total_tours, 9);
    assert_eq!(stats.total_revenue, 6958.0);
    assert_eq!(stats.average_rating, None);
    ctx.resources.dashboard.stats(false).await.unwrap();
}

#[tokio::test]
async fn test_authorization_errors_use_fixed_messages() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "fail",
            "message": "jwt expired"
        })))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/admin/stats"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&ctx.server)
        .await;

    let err = ctx.resources.users.list(false).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized { .. }));
    assert_eq!(
        ctx.provider.error("users/all").as_deref(),
        Some("You are not logged in. Please log in to get access.")
    );

    let err = ctx.resources.dashboard.stats(false).await.unwrap_err();
    assert_eq!(err.message(), "You do not have permission to perform this action.");
    assert!(ctx.provider.cached("dashboard").is_none());
}

#[tokio::test]
async fn test_api_errors_carry_backend_message() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": "fail",
            "message": "No tour found with that ID"
        })))
        .mount(&ctx.server)
        .await;

    let err = ctx.resources.tours.get("missing", false).await.unwrap_err();
    assert_eq!(err, ProviderError::api(404, "No tour found with that ID"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_create_booking_invalidates_dependent_views() {
    let ctx = create_test_context().await;
    for key in [
        "bookings/all",
        "bookings/user/u1",
        "dashboard",
        "tours/all",
        "tours/t1",
        "tours/t2",
        "users/u1",
        "reviews/all",
    ] {
        seed(&ctx.provider, key, json!([])).await;
    }

    let payload = json!({ "tour": "t1", "user": "u1", "price": 497 });
    Mock::given(method("POST"))
        .and(path("/api/v1/bookings"))
        .and(body_json(payload.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(envelope(booking("b9", "t1", "u1"))))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let created = ctx.resources.bookings.create(payload).await.unwrap();
    assert_eq!(created.id, "b9");

    for gone in ["bookings/all", "bookings/user/u1", "dashboard", "tours/t1", "users/u1"] {
        assert!(ctx.provider.cached(gone).is_none(), "{gone} should be invalidated");
    }
    for kept in ["tours/all", "tours/t2", "reviews/all"] {
        assert!(ctx.provider.cached(kept).is_some(), "{kept} should survive");
    }
}

/// Booking as the backend returns it: both id keys and populated references
fn populated_booking(id: &str, tour: &str, user: &str) -> Value {
    json!({
        "_id": id,
        "id": id,
        "tour": { "_id": tour, "id": tour, "name": "The Forest Hiker", "price": 397 },
        "user": { "_id": user, "id": user, "name": "Jonas", "email": "jonas@example.com" },
        "price": 397,
        "paid": true,
        "createdAt": "2024-04-01T10:00:00Z"
    })
}

#[tokio::test]
async fn test_reads_accept_dual_id_documents() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/bookings/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(populated_booking("b1", "t1", "u1"))))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "_id": "t1", "id": "t1", "name": "The Forest Hiker", "price": 397
        }))))
        .mount(&ctx.server)
        .await;

    let booking = ctx.resources.bookings.get("b1", false).await.unwrap();
    assert_eq!(booking.id, "b1");
    assert_eq!(booking.tour.id(), "t1");
    assert_eq!(booking.user.id(), "u1");

    let tour = ctx.resources.tours.get("t1", false).await.unwrap();
    assert_eq!(tour.id, "t1");
}

#[tokio::test]
async fn test_delete_booking_fans_out_and_next_read_refetches() {
    let ctx = create_test_context().await;
    seed(
        &ctx.provider,
        "bookings/all",
        json!([populated_booking("b1", "t1", "u1"), populated_booking("b2", "t2", "u2")]),
    )
    .await;
    seed(&ctx.provider, "bookings/b1", populated_booking("b1", "t1", "u1")).await;
    seed(&ctx.provider, "tours/t1", tour("t1", "The Forest Hiker")).await;
    seed(&ctx.provider, "users/u1", json!({ "_id": "u1", "id": "u1", "name": "Jonas", "email": "jonas@example.com" })).await;
    seed(&ctx.provider, "dashboard", json!({ "totalBookings": 2 })).await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/bookings/b1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([populated_booking("b2", "t2", "u2")]))))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.resources.bookings.delete("b1").await.unwrap();

    for gone in ["bookings/all", "bookings/b1", "tours/t1", "users/u1", "dashboard"] {
        assert!(ctx.provider.cached(gone).is_none(), "{gone} should be invalidated");
    }
    assert_eq!(ctx.provider.cache_stats().total_items, 0);

    let bookings = ctx.resources.bookings.list(false).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].id, "b2");
}

#[tokio::test]
async fn test_failed_mutation_does_not_invalidate() {
    let ctx = create_test_context().await;
    seed(&ctx.provider, "tours/all", json!([tour("t1", "The Forest Hiker")])).await;
    seed(&ctx.provider, "tours/t1", tour("t1", "The Forest Hiker")).await;
    seed(&ctx.provider, "dashboard", json!({})).await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/tours/t1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "fail",
            "message": "A tour name must have less or equal then 40 characters"
        })))
        .mount(&ctx.server)
        .await;

    let err = ctx
        .resources
        .tours
        .update("t1", json!({ "name": "x".repeat(60) }))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProviderError::api(400, "A tour name must have less or equal then 40 characters")
    );
    assert_eq!(ctx.provider.cache_stats().total_items, 3);
}

#[tokio::test]
async fn test_delete_review_uses_cached_references() {
    let ctx = create_test_context().await;
    seed(&ctx.provider, "reviews/all", json!([review("r1", "t1", "u1")])).await;
    seed(&ctx.provider, "reviews/tour/t1", json!([review("r1", "t1", "u1")])).await;
    seed(&ctx.provider, "tours/t1", tour("t1", "The Forest Hiker")).await;
    seed(&ctx.provider, "tours/t2", tour("t2", "The Sea Explorer")).await;
    seed(&ctx.provider, "dashboard", json!({})).await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/reviews/r1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.resources.reviews.delete("r1").await.unwrap();

    let remaining: Vec<String> = ctx
        .provider
        .cache_stats()
        .items_list
        .into_iter()
        .map(|item| item.key)
        .collect();
    assert_eq!(remaining, vec!["tours/t2"]);
}

#[tokio::test]
async fn test_update_refetch_after_invalidation() {
    let ctx = create_test_context().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([tour("t1", "The Forest Hiker")]))))
        .expect(2)
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tours/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(tour("t1", "The Forest Walker"))))
        .mount(&ctx.server)
        .await;

    ctx.resources.tours.list(false).await.unwrap();
    let updated = ctx
        .resources
        .tours
        .update("t1", json!({ "name": "The Forest Walker" }))
        .await
        .unwrap();
    assert_eq!(updated.name, "The Forest Walker");
    assert!(ctx.provider.cached("tours/all").is_none());

    // The next read goes back to the API
    ctx.resources.tours.list(false).await.unwrap();
}

#[tokio::test]
async fn test_network_errors_are_retryable() {
    let client = ApiClient::new(&ApiConfig {
        // Nothing listens on the discard port
        base_url: "http://127.0.0.1:9/api/v1".to_string(),
        timeout: Duration::from_millis(500),
        auth_token: None,
    })
    .unwrap();
    let resources = Resources::new(client, DataProvider::new(CacheConfig::default()));

    let err = resources.tours.list(false).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network { .. }));
    assert!(err.is_retryable());
}
