use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pathserve::{AppState, Config, FileRequestLog, NoopRequestLog, RequestLog, routes};

#[derive(Parser, Debug)]
#[command(name = "pathserve")]
#[command(about = "Serve a file verbatim or a directory as a zip archive over HTTP")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PATHSERVE_PORT", default_value = "8080")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "PATHSERVE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Enable verbose logging
    #[arg(short, long, env = "PATHSERVE_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "PATHSERVE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fixes the request log name for the life of the process.
    let started = chrono::Local::now();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "pathserve=debug,tower_http=debug"
    } else {
        "pathserve=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    let request_log: Arc<dyn RequestLog> = if config.request_log {
        let log = FileRequestLog::at_startup(&config.log_dir, &started);
        info!("Request log: {}", log.path().display());
        Arc::new(log)
    } else {
        Arc::new(NoopRequestLog)
    };

    match &config.allowed_root {
        Some(root) => info!("Serving paths under: {}", root.display()),
        None => warn!("No allowed_root configured; any path readable by this process can be fetched"),
    }
    info!("Scratch archives in: {}", config.scratch_dir().display());

    let state = AppState::new(config, request_log)?;

    let app = routes::fetch_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Error starting server on {}: {}", addr, err);
            return Err(err.into());
        }
    };
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
