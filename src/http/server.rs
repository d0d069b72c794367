//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the Axum router from aggregated feature routes
//! - Wire up the fixed middleware (CORS, access logging, panic recovery)
//! - Bind a TLS listener and serve until shutdown
//! - Graceful, deadline-bound stop
//!
//! # Lifecycle
//! ```text
//! Unstarted → Starting → Running → Stopping → Stopped
//! ```
//! `start()` drives Unstarted→Starting→Running and blocks until the listener
//! closes; `stop()` drives Stopping→Stopped. A stopped server cannot be
//! restarted; build a new instance instead.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::routing::MethodRouter;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tower_http::timeout::TimeoutLayer;

use crate::http::middleware::{access_log, AccessLogState};
use crate::http::routes::{self, Route, RouteGroup};
use crate::settings::Settings;

// Server configuration keys.
pub const SERVER_HOST: &str = "server.host";
pub const SERVER_PORT: &str = "server.port";
pub const SERVER_CERT_PATH: &str = "server.cert";
pub const SERVER_KEY_PATH: &str = "server.key";
pub const SERVER_READ_TIMEOUT: &str = "server.read_timeout";
pub const SERVER_WRITE_TIMEOUT: &str = "server.write_timeout";
pub const TRUSTED_PROXIES: &str = "server.trusted_proxies";

// CORS configuration keys.
pub const CORS_ALLOW_ORIGINS: &str = "cors.allow_origins";
pub const CORS_ALLOW_METHODS: &str = "cors.allow_methods";
pub const CORS_ALLOW_HEADERS: &str = "cors.allow_headers";
pub const CORS_EXPOSE_HEADERS: &str = "cors.expose_headers";
pub const CORS_ALLOW_CREDENTIALS: &str = "cors.allow_credentials";
pub const CORS_MAX_AGE: &str = "cors.max_age";

/// Listener lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,
    #[error("invalid listen address {addr}: {source}")]
    Address {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to load tls material: {0}")]
    Tls(#[source] std::io::Error),
    #[error("https server failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("graceful shutdown deadline exceeded")]
    ShutdownTimeout,
}

/// TLS HTTP server over the aggregated route registry.
pub struct HttpServer {
    settings: Arc<Settings>,
    routes: Vec<Route>,
    handle: Handle,
    state_tx: watch::Sender<ServerState>,
    // Kept so state broadcasts always have a live receiver.
    _state_rx: watch::Receiver<ServerState>,
}

impl HttpServer {
    /// Construct the server and establish its configuration defaults.
    pub fn new(settings: Arc<Settings>, groups: Vec<RouteGroup>) -> Self {
        settings.set_default(SERVER_HOST, "0.0.0.0");
        settings.set_default(SERVER_PORT, 8443_i64);
        settings.set_default(SERVER_CERT_PATH, "cert.pem");
        settings.set_default(SERVER_KEY_PATH, "key.pem");
        settings.set_default(SERVER_READ_TIMEOUT, "15s");
        settings.set_default(SERVER_WRITE_TIMEOUT, "15s");
        settings.set_default(TRUSTED_PROXIES, Vec::<String>::new());

        settings.set_default(CORS_ALLOW_ORIGINS, vec!["*".to_string()]);
        settings.set_default(
            CORS_ALLOW_METHODS,
            vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
        );
        settings.set_default(
            CORS_ALLOW_HEADERS,
            vec![
                "Origin".to_string(),
                "Content-Length".to_string(),
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Requested-With".to_string(),
            ],
        );
        settings.set_default(CORS_EXPOSE_HEADERS, vec!["Content-Length".to_string()]);
        settings.set_default(CORS_ALLOW_CREDENTIALS, false);
        settings.set_default(CORS_MAX_AGE, "12h");

        let (state_tx, state_rx) = watch::channel(ServerState::Unstarted);
        Self {
            settings,
            routes: routes::aggregate(groups),
            handle: Handle::new(),
            state_tx,
            _state_rx: state_rx,
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    /// Assemble the router: aggregated routes plus the fixed middleware.
    pub fn build_router(&self) -> Router {
        let trusted_proxies: Vec<IpAddr> = self
            .settings
            .get_string_slice(TRUSTED_PROXIES)
            .iter()
            .filter_map(|entry| entry.parse().ok())
            .collect();
        let access_state = Arc::new(AccessLogState { trusted_proxies });

        // The original stack bounds the read and write phases separately;
        // the listener here exposes no per-phase socket timeouts, so one
        // request deadline covers both.
        let deadline = self.settings.get_duration(SERVER_READ_TIMEOUT)
            + self.settings.get_duration(SERVER_WRITE_TIMEOUT);

        let mut router = Router::new();

        // Register every aggregated route, dispatching on its method.
        // Duplicate (method, path) pairs: last registration wins.
        let mut deduped: Vec<Route> = Vec::new();
        for route in self.routes.clone() {
            deduped.retain(|r| !(r.method == route.method && r.path == route.path));
            deduped.push(route);
        }
        let mut by_path: Vec<(String, MethodRouter)> = Vec::new();
        for route in deduped {
            let filter = routes::method_filter(&route.method);
            let path = route.path.clone();
            let service = route.into_service();
            match by_path.iter_mut().find(|(p, _)| *p == path) {
                Some((_, method_router)) => {
                    let chained = std::mem::take(method_router).on_service(filter, service);
                    *method_router = chained;
                }
                None => by_path.push((path, axum::routing::on_service(filter, service))),
            }
        }
        for (path, method_router) in by_path {
            router = router.route(&path, method_router);
        }

        // Layer order, outermost first at request time: CORS, access log,
        // request deadline, panic recovery.
        router = router.layer(CatchPanicLayer::new());
        if !deadline.is_zero() {
            router = router.layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                deadline,
            ));
        }
        router
            .layer(axum::middleware::from_fn_with_state(
                access_state,
                access_log,
            ))
            .layer(self.cors_layer())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins = self.settings.get_string_slice(CORS_ALLOW_ORIGINS);
        let allow_origin = if origins.iter().any(|origin| origin == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
            )
        };

        let methods: Vec<Method> = self
            .settings
            .get_string_slice(CORS_ALLOW_METHODS)
            .iter()
            .filter_map(|method| Method::from_bytes(method.as_bytes()).ok())
            .collect();
        let headers: Vec<HeaderName> = self
            .settings
            .get_string_slice(CORS_ALLOW_HEADERS)
            .iter()
            .filter_map(|header| HeaderName::from_bytes(header.as_bytes()).ok())
            .collect();
        let exposed: Vec<HeaderName> = self
            .settings
            .get_string_slice(CORS_EXPOSE_HEADERS)
            .iter()
            .filter_map(|header| HeaderName::from_bytes(header.as_bytes()).ok())
            .collect();

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
            .expose_headers(ExposeHeaders::list(exposed))
            .allow_credentials(self.settings.get_bool(CORS_ALLOW_CREDENTIALS))
            .max_age(self.settings.get_duration(CORS_MAX_AGE))
    }

    /// Bind the TLS listener and serve until it closes. Blocks; run on a
    /// background task. A graceful close is success, anything else is a
    /// start failure reported to the caller.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut claimed = false;
        self.state_tx.send_if_modified(|state| {
            if *state == ServerState::Unstarted {
                *state = ServerState::Starting;
                claimed = true;
                return true;
            }
            false
        });
        if !claimed {
            return Err(ServerError::AlreadyStarted);
        }

        let router = self.build_router();

        let host = self.settings.get_string(SERVER_HOST);
        let port = self.settings.get_int(SERVER_PORT);
        let raw_addr = format!("{host}:{port}");
        let addr: SocketAddr = raw_addr.parse().map_err(|source| {
            self.state_tx.send_replace(ServerState::Stopped);
            ServerError::Address {
                addr: raw_addr.clone(),
                source,
            }
        })?;

        let cert_path = self.settings.get_string(SERVER_CERT_PATH);
        let key_path = self.settings.get_string(SERVER_KEY_PATH);

        tracing::info!(
            address = %addr,
            cert = %cert_path,
            key = %key_path,
            "starting https server"
        );

        let tls = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|err| {
                self.state_tx.send_replace(ServerState::Stopped);
                ServerError::Tls(err)
            })?;

        // Flip to Running once the listener reports bound.
        let handle = self.handle.clone();
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            if let Some(bound) = handle.listening().await {
                state_tx.send_if_modified(|state| {
                    if *state == ServerState::Starting {
                        *state = ServerState::Running;
                        return true;
                    }
                    false
                });
                tracing::info!(address = %bound, "listening for connections");
            }
        });

        let result = axum_server::bind_rustls(addr, tls)
            .handle(self.handle.clone())
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await;

        self.state_tx.send_replace(ServerState::Stopped);
        match result {
            Ok(()) => {
                tracing::info!("https server stopped");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "https server failed");
                Err(ServerError::Serve(err))
            }
        }
    }

    /// Gracefully stop the listener, allowing in-flight requests up to
    /// `timeout` to drain; connections still open at the deadline are closed
    /// forcibly by the listener. Calling stop on a never-started server is a
    /// no-op success.
    pub async fn stop(&self, timeout: Duration) -> Result<(), ServerError> {
        match self.state() {
            ServerState::Unstarted | ServerState::Stopped => return Ok(()),
            _ => {}
        }

        tracing::info!("shutting down https server");
        self.state_tx.send_replace(ServerState::Stopping);
        self.handle.graceful_shutdown(Some(timeout));

        let mut state_rx = self.state_tx.subscribe();
        let wait = state_rx.wait_for(|state| *state == ServerState::Stopped);
        // Small margin past the drain deadline before declaring the stop hung.
        let stopped = tokio::time::timeout(timeout + Duration::from_secs(1), wait)
            .await
            .is_ok();
        if stopped {
            Ok(())
        } else {
            Err(ServerError::ShutdownTimeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_server(groups: Vec<RouteGroup>) -> HttpServer {
        HttpServer::new(Arc::new(Settings::new()), groups)
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        // The access log resolves the peer address from connect info, which
        // the real listener injects; tests provide it explicitly.
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("127.0.0.1:9999".parse().unwrap()));
        req
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_every_supported_method() {
        let methods = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ];
        let group: RouteGroup = methods
            .iter()
            .map(|m| Route::new(m.clone(), "/echo", || async { "hit" }))
            .collect();
        let router = test_server(vec![group]).build_router();

        for method in methods {
            let response = router
                .clone()
                .oneshot(request(method.clone(), "/echo"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "method {method}");
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = test_server(vec![]).build_router();
        let response = router.oneshot(request(Method::GET, "/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_route_last_registration_wins() {
        let group = vec![
            Route::new(Method::GET, "/dup", || async { "first" }),
            Route::new(Method::GET, "/dup", || async { "second" }),
        ];
        let router = test_server(vec![group]).build_router();

        let response = router.oneshot(request(Method::GET, "/dup")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "second");
    }

    async fn panicking_handler() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn handler_panic_becomes_server_error() {
        let group = vec![Route::new(Method::GET, "/boom", panicking_handler)];
        let router = test_server(vec![group]).build_router();

        let response = router.oneshot(request(Method::GET, "/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn default_cors_allows_any_origin() {
        let group = vec![Route::new(Method::GET, "/data", || async { "ok" })];
        let router = test_server(vec![group]).build_router();

        let mut req = request(Method::OPTIONS, "/data");
        req.headers_mut()
            .insert("origin", "https://site.example".parse().unwrap());
        req.headers_mut()
            .insert("access-control-request-method", "GET".parse().unwrap());

        let response = router.oneshot(req).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn restricted_cors_rejects_unlisted_origin() {
        let settings = Arc::new(Settings::new());
        settings.set_override(
            CORS_ALLOW_ORIGINS,
            vec!["https://good.example".to_string()],
        );
        let group = vec![Route::new(Method::GET, "/data", || async { "ok" })];
        let router = HttpServer::new(settings, vec![group]).build_router();

        let mut req = request(Method::OPTIONS, "/data");
        req.headers_mut()
            .insert("origin", "https://evil.example".parse().unwrap());
        req.headers_mut()
            .insert("access-control-request-method", "GET".parse().unwrap());

        let response = router.oneshot(req).await.unwrap();
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn stop_before_start_is_noop_success() {
        let server = test_server(vec![]);
        assert!(server.stop(Duration::from_secs(30)).await.is_ok());
        assert_eq!(server.state(), ServerState::Unstarted);
    }

    const TEST_CERT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/cert.pem");
    const TEST_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/key.pem");

    #[tokio::test]
    async fn stop_after_start_drains_within_deadline() {
        let settings = Arc::new(Settings::new());
        settings.set_override(SERVER_HOST, "127.0.0.1");
        // Ephemeral port so parallel tests never collide.
        settings.set_override(SERVER_PORT, 0_i64);
        settings.set_override(SERVER_CERT_PATH, TEST_CERT);
        settings.set_override(SERVER_KEY_PATH, TEST_KEY);
        let server = Arc::new(HttpServer::new(settings, vec![]));

        let start_server = server.clone();
        let start_task = tokio::spawn(async move { start_server.start().await });

        let mut state_rx = server.state_tx.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|state| *state == ServerState::Running),
        )
        .await
        .expect("server never reached running")
        .expect("state channel closed");

        let begin = std::time::Instant::now();
        let stop_timeout = Duration::from_secs(5);
        server.stop(stop_timeout).await.expect("graceful stop failed");
        assert!(begin.elapsed() < stop_timeout + Duration::from_secs(1));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(start_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn start_with_missing_tls_material_fails() {
        let settings = Arc::new(Settings::new());
        settings.set_override(SERVER_CERT_PATH, "/nonexistent/cert.pem");
        settings.set_override(SERVER_KEY_PATH, "/nonexistent/key.pem");
        let server = HttpServer::new(settings, vec![]);

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Tls(_)));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let settings = Arc::new(Settings::new());
        settings.set_override(SERVER_CERT_PATH, "/nonexistent/cert.pem");
        settings.set_override(SERVER_KEY_PATH, "/nonexistent/key.pem");
        let server = HttpServer::new(settings, vec![]);

        let _ = server.start().await;
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted));
    }
}
