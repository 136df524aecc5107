use opentelemetry::{global, trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod routes;

pub use routes::{app, ApiResponse, AppState};

/// Installs the global subscriber. The OTLP exporter is only set up when an
/// endpoint is given, the sentry layer only when sentry was initialized.
pub fn init_tracing(
    otlp_endpoint: Option<&str>,
    otlp_service_name: String,
    use_sentry: bool,
) -> anyhow::Result<()> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                .with_batch_exporter(
                    opentelemetry_otlp::SpanExporter::builder()
                        .with_tonic()
                        .with_endpoint(endpoint)
                        .build()?,
                    opentelemetry_sdk::runtime::Tokio,
                )
                .with_resource(Resource::new(vec![KeyValue::new(
                    SERVICE_NAME,
                    otlp_service_name,
                )]))
                .build();
            let tracer = provider.tracer("labscan-api");
            global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let sentry_layer = use_sentry.then(sentry_tracing::layer);

    let env_filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
        EnvFilter::new(
            "labscan_api=debug,labscan_core=debug,axum_tracing_opentelemetry=info,otel=debug",
        )
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_line_number(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(tracing_subscriber::fmt::time::uptime());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .with(sentry_layer)
        .try_init()?;
    Ok(())
}
