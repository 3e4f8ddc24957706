mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{
    body_json, body_text, get, get_from, router, router_with_allowlist, test_config,
    FakeDatabase, DEV_ORIGIN, EVIL_ORIGIN, PROD_ORIGIN,
};
use content_service::services::origins::DEV_ORIGINS;
use content_service::services::OriginAllowlist;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::util::ServiceExt;

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/api/health/db")
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "PUT")
        .header("Access-Control-Request-Headers", "content-type,authorization")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn every_listed_origin_is_allowed_and_echoed() {
    let db = Arc::new(FakeDatabase::connected());
    let app = router(&db);

    for origin in DEV_ORIGINS.iter().copied().chain([PROD_ORIGIN]) {
        let response = app
            .clone()
            .oneshot(get_from("/api/health", origin))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "origin {}", origin);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], origin);
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }
}

#[tokio::test]
async fn unlisted_origin_is_blocked_before_any_handler() {
    let db = Arc::new(FakeDatabase::connected());
    let response = router(&db)
        .oneshot(get_from("/api/health/db", EVIL_ORIGIN))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
    assert_eq!(
        body_text(response).await,
        format!("CORS blocked: {}", EVIL_ORIGIN)
    );
    assert_eq!(db.state_reads.load(Ordering::SeqCst), 0);
    assert_eq!(db.count_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn configured_trailing_slash_is_stripped_before_matching() {
    let db = Arc::new(FakeDatabase::connected());
    let app = router(&db);

    let bare = app
        .clone()
        .oneshot(get_from("/api/health", PROD_ORIGIN))
        .await
        .unwrap();
    assert_eq!(bare.status(), StatusCode::OK);

    let slashed = app
        .oneshot(get_from("/api/health", &format!("{}/", PROD_ORIGIN)))
        .await
        .unwrap();
    assert_eq!(slashed.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_origin_is_allowed_with_empty_allowlist() {
    let db = Arc::new(FakeDatabase::connected());
    let empty = Arc::new(OriginAllowlist::from_sources(Vec::<String>::new(), None));
    let app = router_with_allowlist(test_config(), &db, empty);

    let response = app.clone().oneshot(get("/api/health/db")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("access-control-allow-origin"));

    let blocked = app.oneshot(get_from("/api/health", DEV_ORIGIN)).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn preflight_from_listed_origin_advertises_policy() {
    let db = Arc::new(FakeDatabase::connected());
    let response = router(&db).oneshot(preflight(DEV_ORIGIN)).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], DEV_ORIGIN);
    assert_eq!(headers["access-control-allow-credentials"], "true");

    let methods = headers["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .to_ascii_uppercase();
    for method in ["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD"] {
        assert!(methods.contains(method), "missing {} in {}", method, methods);
    }

    let allowed_headers = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed_headers.contains("content-type"));
    assert!(allowed_headers.contains("authorization"));

    // Preflights are answered by the CORS layer, not by the probe.
    assert_eq!(db.state_reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn preflight_from_unlisted_origin_is_blocked() {
    let db = Arc::new(FakeDatabase::connected());
    let response = router(&db).oneshot(preflight(EVIL_ORIGIN)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains(EVIL_ORIGIN));
}

#[tokio::test]
async fn cors_echo_reports_seen_origin_and_allowlist() {
    let db = Arc::new(FakeDatabase::connected());
    let response = router(&db)
        .oneshot(get_from("/api/health/cors", DEV_ORIGIN))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-seen-origin"], DEV_ORIGIN);

    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["seenOrigin"], DEV_ORIGIN);

    let allowed: Vec<&str> = body["allowedOrigins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_str().unwrap())
        .collect();
    assert_eq!(allowed.len(), DEV_ORIGINS.len() + 1);
    assert!(allowed.contains(&PROD_ORIGIN));
    assert!(allowed.iter().all(|o| !o.ends_with('/')));
}

#[tokio::test]
async fn cors_echo_uses_sentinel_without_origin() {
    let db = Arc::new(FakeDatabase::connected());
    let response = router(&db).oneshot(get("/api/health/cors")).await.unwrap();

    assert_eq!(response.headers()["x-seen-origin"], "(none)");
    assert_eq!(body_json(response).await["seenOrigin"], "(none)");
}

#[tokio::test]
async fn empty_origin_header_is_treated_as_absent() {
    let db = Arc::new(FakeDatabase::connected());
    let app = router(&db);

    let response = app.clone().oneshot(get_from("/api/health", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("access-control-allow-origin"));

    let response = app.oneshot(get_from("/api/health/cors", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-seen-origin"], "(none)");
    assert_eq!(body_json(response).await["seenOrigin"], "(none)");
}
