//! Log output and optional OpenTelemetry trace export.
//!
//! Console logs are always written, as text or JSON per `logging.format`.
//! `RUST_LOG` overrides `logging.filter`. Spans such as `notification.send`
//! are exported over OTLP/gRPC when `otel.enabled` is set.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig, OtelConfig};

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
    #[error("Failed to build OTLP exporter: {0}")]
    ExporterBuild(String),
}

/// Flushes and shuts down the tracer provider on drop.
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OpenTelemetry shutdown failed");
            }
        }
    }
}

/// Install the global subscriber. Keep the guard alive until exit.
pub fn init_telemetry(
    logging: &LoggingConfig,
    otel: &OtelConfig,
) -> TelemetryResult<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let provider = if otel.enabled {
        Some(build_provider(otel)?)
    } else {
        None
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(otel.service_name.clone()))
    });

    let (text_layer, json_layer) = match logging.format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        format = ?logging.format,
        otel_enabled = otel.enabled,
        otel_endpoint = %otel.endpoint,
        sampling_ratio = otel.sampling_ratio,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { provider })
}

fn build_provider(otel: &OtelConfig) -> TelemetryResult<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel.endpoint)
        .build()
        .map_err(|e| TelemetryError::ExporterBuild(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler(otel.sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(Resource::new([
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                otel.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ]))
        .build())
}

/// Ratio sampler for root spans; child spans follow their parent.
fn sampler(ratio: f64) -> Sampler {
    let root = match ratio {
        r if r >= 1.0 => Sampler::AlwaysOn,
        r if r <= 0.0 => Sampler::AlwaysOff,
        r => Sampler::TraceIdRatioBased(r),
    };
    Sampler::ParentBased(Box::new(root))
}
