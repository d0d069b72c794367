//! Router-level integration tests: the public composition path from feature
//! route contributions to a served response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use backend_template::{app, HttpServer, Settings};

fn request(method: Method, uri: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo::<SocketAddr>("127.0.0.1:40000".parse().unwrap()));
    req
}

#[tokio::test]
async fn healthz_returns_ok_payload() {
    let server = HttpServer::new(Arc::new(Settings::new()), app::routes());
    let router = server.build_router();

    let response = router
        .oneshot(request(Method::GET, "/healthz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], br#"{"status":"ok"}"#);
}

#[tokio::test]
async fn healthz_rejects_other_methods() {
    let server = HttpServer::new(Arc::new(Settings::new()), app::routes());
    let router = server.build_router();

    let response = router
        .oneshot(request(Method::POST, "/healthz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn no_other_endpoints_are_defined() {
    let server = HttpServer::new(Arc::new(Settings::new()), app::routes());
    let router = server.build_router();

    let response = router
        .oneshot(request(Method::GET, "/metrics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
