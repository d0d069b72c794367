//! Feature modules contributing routes.
//!
//! Each feature exposes a pure `routes()` function; this aggregation point
//! lists the contributions in declaration order, which fixes registration
//! order without any shared mutable state.

pub mod healthz;

use crate::http::RouteGroup;

/// All route contributions, in registration order.
pub fn routes() -> Vec<RouteGroup> {
    vec![healthz::routes()]
}
