//! Fixed cross-cutting middleware.
//!
//! Only two concerns are owned here: access logging (with trusted-proxy
//! aware client address resolution) and the wiring of the CORS / panic
//! recovery layers in `server.rs`. There is no extensible pipeline.

pub mod access_log;

pub use access_log::{access_log, AccessLogState};
