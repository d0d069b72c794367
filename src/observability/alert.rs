//! Alerting sink: forwards qualifying log records to an external
//! error-tracking service.
//!
//! The [`AlertLayer`] captures events at or above its severity threshold and
//! pushes them onto an unbounded channel. A dispatcher task drains the
//! channel and hands each event to a [`Notifier`]. Delivery failures are
//! logged through tracing itself under [`DELIVERY_TARGET`], which the layer
//! ignores, so a broken sink can never crash or recurse into a log call site.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target used for delivery-failure logging. Events with this target are
/// never forwarded to the sink, which breaks the feedback loop.
pub const DELIVERY_TARGET: &str = "alert::delivery";

/// Severity reported to the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::TRACE | Level::DEBUG | Level::INFO => Severity::Info,
            Level::WARN => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One log record translated into an external notification.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub message: String,
    pub severity: Severity,
    pub level: String,
    pub caller: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to deliver notification: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

/// A backend that can deliver alert events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: AlertEvent) -> Result<(), NotifyError>;
}

/// Delivers events as JSON over HTTP.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    release_stage: String,
}

#[derive(Serialize)]
struct NotifyPayload<'a> {
    api_key: &'a str,
    release_stage: &'a str,
    #[serde(flatten)]
    event: &'a AlertEvent,
}

impl HttpNotifier {
    pub fn new(endpoint: String, api_key: String, release_stage: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            release_stage,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, event: AlertEvent) -> Result<(), NotifyError> {
        let payload = NotifyPayload {
            api_key: &self.api_key,
            release_stage: &self.release_stage,
            event: &event,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Create an alert layer and the receiving end of its event channel.
///
/// The receiver is normally passed to [`spawn_dispatcher`]; tests can drain
/// it directly.
pub fn channel(threshold: Level) -> (AlertLayer, mpsc::UnboundedReceiver<AlertEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AlertLayer { threshold, tx }, rx)
}

/// Drain alert events and deliver them, logging (but never propagating)
/// per-event failures.
pub fn spawn_dispatcher(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::UnboundedReceiver<AlertEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(err) = notifier.notify(event).await {
                tracing::error!(target: DELIVERY_TARGET, error = %err, "alert delivery failed");
            }
        }
    })
}

/// Tracing layer that mirrors qualifying records into the alert channel.
pub struct AlertLayer {
    threshold: Level,
    tx: mpsc::UnboundedSender<AlertEvent>,
}

/// Structured fields recorded on a span, kept in its extensions so events can
/// inherit their scoped context.
struct FieldMap(BTreeMap<String, serde_json::Value>);

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        attrs.record(&mut JsonVisitor(&mut fields));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(FieldMap(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == DELIVERY_TARGET {
            return;
        }
        // Level orders ERROR lowest, so "at or above threshold" is <=.
        if *meta.level() > self.threshold {
            return;
        }

        let mut metadata = BTreeMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<FieldMap>() {
                    metadata.extend(fields.0.clone());
                }
            }
        }
        event.record(&mut JsonVisitor(&mut metadata));

        let message = match metadata.remove("message") {
            Some(serde_json::Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let caller = meta
            .file()
            .zip(meta.line())
            .map(|(file, line)| format!("{file}:{line}"));

        let _ = self.tx.send(AlertEvent {
            message,
            severity: Severity::from_level(*meta.level()),
            level: meta.level().to_string().to_lowercase(),
            caller,
            timestamp: Utc::now(),
            metadata,
        });
    }
}

struct JsonVisitor<'a>(&'a mut BTreeMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.0
            .insert(field.name().to_string(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
