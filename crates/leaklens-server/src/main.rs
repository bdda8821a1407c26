mod upstream;

use std::sync::Arc;

use clap::Parser;
use leaklens_api::LeakLensSys;
use leaklens_batch::{BatchConfig, CredentialClassifier, maintenance::spawn_maintenance};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::upstream::HttpClassifier;

const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:9090/v1/check";

#[derive(Parser)]
#[command(name = "leaklens", about = "Batch credential leak-check service")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "8000")]
    port: u16,

    /// Breach lookup endpoint; falls back to LEAKLENS_UPSTREAM_URL.
    #[arg(long)]
    upstream_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("leaklens=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    let upstream_url = cli
        .upstream_url
        .or_else(|| std::env::var("LEAKLENS_UPSTREAM_URL").ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

    let config = BatchConfig::from_env();
    info!(
        max_tasks = config.max_tasks,
        workers = config.workers,
        idle_threshold_secs = config.idle_threshold.as_secs(),
        retention_secs = config.retention.as_secs(),
        "batch engine configured"
    );

    let classifier: Arc<dyn CredentialClassifier> =
        Arc::new(HttpClassifier::new(upstream_url.clone(), config.classify_timeout));
    match classifier.check_connection().await {
        Ok(()) => info!(upstream = %upstream_url, "lookup service reachable"),
        Err(err) => warn!(upstream = %upstream_url, error = %err, "lookup service not reachable yet"),
    }

    let sys = Arc::new(LeakLensSys::new(config, classifier));
    let shutdown = CancellationToken::new();
    let maintenance = spawn_maintenance(sys.store(), sys.config(), shutdown.clone());
    info!("job maintenance enabled");

    let app = leaklens_api::router::api_router(Arc::clone(&sys));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("leaklens server listening on {addr}");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    maintenance.await?;
    info!(jobs = sys.store().len(), "leaklens server stopped");

    Ok(())
}
