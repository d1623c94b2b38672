use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use mail_relay::config::RelayConfig;
use mail_relay::relay::Relay;
use mail_relay::webhook::{WebhookState, webhook_routes};

/// Added to the endpoint timeout when draining dispatches on shutdown.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = RelayConfig::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config);

    if let Err(e) = config.endpoint.validate() {
        tracing::error!(error = %e, "AI endpoint configuration is invalid");
        return Err(e.into());
    }

    let endpoint = Arc::new(config.endpoint.clone());
    let relay = Relay::new(Arc::clone(&endpoint));
    let app = webhook_routes(WebhookState {
        relay: relay.clone(),
    });

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    eprintln!("📬 Mail Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://{addr}/webhook");
    eprintln!("   Health:  http://{addr}/health");

    tracing::info!(
        address = %addr,
        input_field = %endpoint.input_field,
        session_field = %endpoint.session_field,
        timeout_secs = endpoint.timeout.as_secs(),
        max_body_chars = endpoint.max_body_chars,
        api_key = endpoint.api_key.is_some(),
        "Webhook server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight dispatches get one full request timeout to finish
    let grace = endpoint.timeout + SHUTDOWN_SLACK;
    if !relay.shutdown(grace).await {
        tracing::warn!(in_flight = relay.in_flight(), "Exiting with dispatches still running");
    }

    tracing::info!("Webhook server stopped");
    Ok(())
}

/// Stdout logging plus an optional non-blocking file writer.
fn init_tracing(config: &RelayConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (file_layer, guard) = match config.log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .map(Path::new)
                .unwrap_or(Path::new("webhook.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
