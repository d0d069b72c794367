//! Liveness endpoint.

use axum::http::Method;
use axum::Json;
use serde_json::{json, Value};

use crate::http::{Route, RouteGroup};

pub fn routes() -> RouteGroup {
    vec![Route::new(Method::GET, "/healthz", healthz)]
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
