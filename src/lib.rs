//! Minimal backend service template.
//!
//! Wires a settings accessor, a structured logger with an optional alerting
//! sink, and a route registry into a TLS HTTP server with graceful shutdown.
//! Feature modules under [`app`] contribute routes; [`cmd`] is the
//! composition root.

pub mod app;
pub mod cmd;
pub mod http;
pub mod observability;
pub mod settings;

pub use http::server::{HttpServer, ServerError, ServerState};
pub use http::{Route, RouteGroup};
pub use settings::Settings;
