//! Structured logger construction.
//!
//! The console sink is a JSON `fmt` layer on stdout. When an alerting API key
//! is configured, records at or above the alerting threshold are additionally
//! fanned out to the alert sink; the two sinks are independent and partial
//! delivery is accepted.

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::observability::alert::{self, AlertLayer, HttpNotifier};
use crate::settings::Settings;

// Logger configuration keys.
pub const ENV: &str = "env";
pub const DEBUG: &str = "debug";
pub const LOG_LEVEL: &str = "log_level";
pub const ALERT_API_KEY: &str = "alert.api_key";
pub const ALERT_ENDPOINT: &str = "alert.endpoint";
pub const ALERT_RELEASE_STAGE: &str = "alert.release_stage";
pub const ALERT_LOG_LEVEL: &str = "alert.log_level";

const DEFAULT_ALERT_ENDPOINT: &str = "https://notify.bugsnag.com";

/// Install the global subscriber. Called once from the composition root,
/// after the settings store is populated.
pub fn init(settings: &Settings) {
    settings.set_default(ENV, "dev");
    settings.set_default(LOG_LEVEL, "debug");
    settings.set_default(ALERT_LOG_LEVEL, "error");
    settings.set_default(ALERT_ENDPOINT, DEFAULT_ALERT_ENDPOINT);
    settings.set_default(ALERT_RELEASE_STAGE, settings.get_string(ENV));

    let level = parse_level(&settings.get_string(LOG_LEVEL), Level::INFO);

    let console = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stdout)
        .with_filter(LevelFilter::from_level(level));

    tracing_subscriber::registry()
        .with(console)
        .with(alert_layer(settings))
        .init();
}

/// Build the alerting layer when an API key is configured, spawning its
/// delivery task. Returns `None` otherwise.
fn alert_layer(settings: &Settings) -> Option<AlertLayer> {
    let api_key = settings.get_string(ALERT_API_KEY);
    if api_key.is_empty() {
        return None;
    }

    let threshold = parse_level(&settings.get_string(ALERT_LOG_LEVEL), Level::ERROR);
    let notifier = Arc::new(HttpNotifier::new(
        settings.get_string(ALERT_ENDPOINT),
        api_key,
        settings.get_string(ALERT_RELEASE_STAGE),
    ));

    let (layer, rx) = alert::channel(threshold);
    alert::spawn_dispatcher(notifier, rx);
    Some(layer)
}

/// Parse a log level name, falling back on unparseable input. `fatal` is
/// accepted as an alias for `error`.
pub fn parse_level(raw: &str, fallback: Level) -> Level {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "fatal" => Level::ERROR,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("debug", Level::INFO), Level::DEBUG);
        assert_eq!(parse_level("WARN", Level::INFO), Level::WARN);
        assert_eq!(parse_level(" error ", Level::INFO), Level::ERROR);
        assert_eq!(parse_level("fatal", Level::INFO), Level::ERROR);
    }

    #[test]
    fn bogus_log_level_falls_back_to_info() {
        assert_eq!(parse_level("bogus", Level::INFO), Level::INFO);
    }

    #[test]
    fn bogus_alert_level_falls_back_to_error() {
        assert_eq!(parse_level("bogus", Level::ERROR), Level::ERROR);
    }
}
