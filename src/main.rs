//! Process entrypoint.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                BACKEND TEMPLATE              │
//!                    │                                              │
//!   CLI / signals ───┼─▶ cmd (flags, composition root)              │
//!                    │        │                                     │
//!                    │        ▼                                     │
//!                    │   settings ──▶ observability (log + alert)   │
//!                    │        │                                     │
//!                    │        ▼                                     │
//!   HTTPS request ───┼─▶ http/server ◀── app (route contributions)  │
//!                    └──────────────────────────────────────────────┘
//! ```

use backend_template::cmd;

#[tokio::main]
async fn main() {
    eprintln!(
        "backend v{} build {} at {} for {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("BUILD_HASH").unwrap_or("dev"),
        option_env!("BUILD_TIME").unwrap_or("unknown"),
        option_env!("BUILD_PLATFORM").unwrap_or("unknown"),
    );

    if let Err(err) = cmd::execute().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
