//! Telemetry helpers for the virtual agent bridge.
//! Installs the tracing subscriber and exposes the counters the bridge records through the
//! `metrics` facade. No recorder is installed here; the host decides where metrics go.

mod config;
mod counters;
mod tracing_init;

pub use config::TelemetryConfig;
pub use counters::{
    DELIVERY_FAILURE_COUNTER, LINK_COUNTER, OAUTH_ERROR_COUNTER, REMOTE_ERROR_COUNTER,
    RENDER_ISSUE_COUNTER, WEBHOOK_COUNTER, WebhookOutcome, record_delivery_failure, record_link,
    record_oauth_error, record_remote_error, record_render_issue, record_webhook,
};
pub use tracing_init::init_telemetry;

/// Installs the subscriber for `service_name`, reading the rest from the environment.
pub fn install(service_name: &str) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
