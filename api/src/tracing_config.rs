use opentelemetry::sdk::trace::Tracer;
use opentelemetry_otlp::WithExportConfig;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::config::Config;

const HONEYCOMB_ENDPOINT: &str = "api.honeycomb.io:443";

pub struct HoneycombConfig {
    pub team: String,
    pub dataset: String,
}

pub struct TracingConfig {
    pub service_name: String,
    /// Spans are exported to Honeycomb when set.
    pub honeycomb: Option<HoneycombConfig>,
}

impl TracingConfig {
    pub fn from_config(config: &Config) -> TracingConfig {
        TracingConfig {
            service_name: "visuasort".to_string(),
            honeycomb: config.honeycomb_team.clone().map(|team| HoneycombConfig {
                team,
                dataset: config.honeycomb_dataset.clone(),
            }),
        }
    }
}

fn honeycomb_tracer(honeycomb: HoneycombConfig) -> Result<Tracer, eyre::Report> {
    let mut otlp_meta = tonic::metadata::MetadataMap::new();
    otlp_meta.insert("x-honeycomb-team", honeycomb.team.parse()?);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(HONEYCOMB_ENDPOINT)
        .with_metadata(otlp_meta);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                honeycomb.dataset,
            )]),
        ))
        .with_exporter(exporter)
        .install_batch(opentelemetry::runtime::TokioCurrentThread)?;
    Ok(tracer)
}

/// Install the global subscriber: bunyan JSON lines on stdout, filtered by the
/// `LOG` environment variable, plus optional OTLP export.
pub fn configure(config: TracingConfig) -> Result<(), eyre::Report> {
    LogTracer::builder()
        .ignore_crate("rustls")
        .with_max_level(log::LevelFilter::Debug)
        .init()?;

    let env_filter = EnvFilter::try_from_env("LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(
            config.service_name,
            std::io::stdout,
        ));

    match config.honeycomb {
        Some(honeycomb) => {
            let telemetry = tracing_opentelemetry::layer().with_tracer(honeycomb_tracer(honeycomb)?);
            set_global_default(subscriber.with(telemetry))?;
        }
        None => set_global_default(subscriber)?,
    }

    Ok(())
}

/// Flush any spans that have not been exported yet.
pub fn teardown() {
    opentelemetry::global::shutdown_tracer_provider();
}
