use anyhow::Context;
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use clap::Parser;
use labscan_api::{app, init_tracing, AppState};
use labscan_core::LabAnalyzer;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OpenTelemetry collector endpoint. Spans are only exported when set
    #[arg(long, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Sentry DSN
    #[arg(long, env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,

    /// Sentry environment
    #[arg(long, env = "SENTRY_ENVIRONMENT", default_value = "dev")]
    sentry_environment: String,

    /// Enable sentry debug output
    #[arg(long, env = "SENTRY_DEBUG", default_value = "false")]
    sentry_debug: bool,

    /// API listen address
    #[arg(long, env = "API_LISTEN_ADDR", default_value = "0.0.0.0:3002")]
    listen_addr: String,

    /// Maximum accepted upload size, in megabytes
    #[arg(long, env = "API_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // Initialize Sentry if DSN is provided
    let use_sentry = args.sentry_dsn.is_some();
    let _guard = args.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1f32,
                sample_rate: 1f32,
                debug: args.sentry_debug,
                environment: Some(args.sentry_environment.clone().into()),
                ..Default::default()
            },
        ))
    });

    init_tracing(
        args.otlp_endpoint.as_deref(),
        "labscan-api".into(),
        use_sentry,
    )
    .context("can't setup tracing for API")?;

    let app_state = AppState {
        analyzer: LabAnalyzer::new(),
    };
    let app = app(app_state, args.max_upload_mb * 1024 * 1024).layer(OtelAxumLayer::default());

    let listener = TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("can't bind {}", args.listen_addr))?;
    tracing::info!(
        "Starting labscan service listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}
