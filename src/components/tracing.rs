use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

const APP_NAME: &str = "voice-social";

/// Installs the global subscriber: JSON lines on stderr, filtered by `RUST_LOG` (default `info`).
/// `log` records from dependencies are forwarded into the same pipeline.
pub fn init_telemetry() {
    if LogTracer::init().is_err() {
        log::debug!("Log tracer already init")
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new(APP_NAME.to_string(), std::io::stderr);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);

    if set_global_default(subscriber).is_err() {
        log::debug!("Tracing subscriber already set")
    }
}
