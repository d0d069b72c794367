//! Route registry and aggregation.
//!
//! Feature modules expose a pure `routes()` function returning their
//! [`RouteGroup`]; the composition root collects the groups in declaration
//! order and hands them to the server, which flattens and registers them.
//! Route ownership stays local to each feature while registration order
//! remains deterministic.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::Response;
use axum::routing::MethodFilter;
use tower::util::BoxCloneSyncService;

/// Boxed handler service stored in the registry.
pub type RouteService = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// A single (method, path, handler) binding. Identity is `(method, path)`.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    service: RouteService,
}

impl Route {
    /// Build a route from any axum handler.
    pub fn new<H, T>(method: Method, path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self {
            method,
            path: path.into(),
            service: BoxCloneSyncService::new(handler.with_state(())),
        }
    }

    pub(crate) fn into_service(self) -> RouteService {
        self.service
    }
}

/// An ordered route contribution from one feature module.
pub type RouteGroup = Vec<Route>;

/// Flatten contributed groups into one ordered route list. Group order is
/// contribution order; within-group order is declaration order.
pub fn aggregate(groups: Vec<RouteGroup>) -> Vec<Route> {
    groups.into_iter().flatten().collect()
}

/// Map a route method onto the router's registration filter.
///
/// Routes are hard-coded declarations, so an unrecognized method is a
/// programming error caught at registration time, never a request-time
/// condition.
pub(crate) fn method_filter(method: &Method) -> MethodFilter {
    match method.as_str() {
        "GET" => MethodFilter::GET,
        "POST" => MethodFilter::POST,
        "PUT" => MethodFilter::PUT,
        "DELETE" => MethodFilter::DELETE,
        "PATCH" => MethodFilter::PATCH,
        "OPTIONS" => MethodFilter::OPTIONS,
        other => panic!("invalid method: {other} for route registration"),
    }
}
