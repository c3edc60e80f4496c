//! Registration, authentication and request counting over HTTP

mod common;

use http::header::COOKIE;
use http::{Method, StatusCode};
use serde_json::json;

use common::{reason, request, setup_test_app, BAD_ID_TOKEN, U1_TOKEN};

#[tokio::test]
async fn test_register_flow() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app
        .call(Method::GET, "/api/v0/register", Some(U1_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "registered": false }));

    let (status, body) = app
        .call(Method::POST, "/api/v0/register", Some(U1_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert!(app.u1_cloud().is_dir());

    let (_, body) = app
        .call(Method::GET, "/api/v0/register", Some(U1_TOKEN), None)
        .await;
    assert_eq!(body, json!({ "registered": true }));

    let (status, body) = app
        .call(Method::POST, "/api/v0/register", Some(U1_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "ALREADY_REGISTERED");
}

#[tokio::test]
async fn test_register_rejects_unusable_account_id() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app
        .call(Method::POST, "/api/v0/register", Some(BAD_ID_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "UNAVAILABLE_TOKEN");
}

#[tokio::test]
async fn test_missing_or_unknown_credentials() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app.call(Method::GET, "/api/v0/register", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "UNAVAILABLE_TOKEN");

    let (_, body) = app
        .call(Method::GET, "/api/v0/register", Some("nope"), None)
        .await;
    assert_eq!(reason(&body), "UNAVAILABLE_TOKEN");
}

#[tokio::test]
async fn test_unregistered_caller_is_refused() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app
        .call(Method::GET, "/api/v0/readdir?path=/", Some(U1_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "NOT_REGISTERED");
}

#[tokio::test]
async fn test_cookie_credential() {
    let app = setup_test_app(1000, 100).await;

    let mut req = request(Method::GET, "/api/v0/register", None, None);
    req.headers_mut()
        .insert(COOKIE, format!("access-token={U1_TOKEN}").parse().unwrap());
    let response = app.send(req).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_limit() {
    let app = setup_test_app(1000, 2).await;

    for _ in 0..2 {
        let (status, _) = app
            .call(Method::GET, "/api/v0/register", Some(U1_TOKEN), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .call(Method::GET, "/api/v0/register", Some(U1_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "TOO_MANY_REQUESTS");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app.call(Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reason(&body), "BAD_REQUEST");
}

#[tokio::test]
async fn test_liveness() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app.call(Method::GET, "/_status/livez", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_readiness() {
    let app = setup_test_app(1000, 100).await;

    let (status, body) = app.call(Method::GET, "/_status/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // uploads have nowhere to land without the sandbox root
    std::fs::remove_dir_all(app.state.sandbox().root()).unwrap();
    let (status, _) = app.call(Method::GET, "/_status/readyz", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
