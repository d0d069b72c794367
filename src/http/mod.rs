//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → server.rs (router assembly, listener lifecycle)
//!     → middleware (CORS, access logging, panic recovery, timeouts)
//!     → routes.rs (aggregated feature routes)
//!     → handler response
//! ```

pub mod middleware;
pub mod routes;
pub mod server;

pub use routes::{Route, RouteGroup};
pub use server::HttpServer;
