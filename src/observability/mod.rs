//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!         → console sink (JSON on stdout)
//!         → alert.rs (error-tracking sink, when configured)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Sinks are independent: a failing alert delivery never reaches the
//!   originating log call site
//! - Log level configurable via config file, environment, and CLI flag

pub mod alert;
pub mod logging;
