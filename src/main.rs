use anyhow::Context;
use clap::Parser;
use pdf_query::{api, config, logging, processing::PdfQueryService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "pdf-query",
    about = "Upload PDFs, embed them, and ask grounded questions over HTTP"
)]
struct Cli {
    /// Bind host (overrides SERVER_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides SERVER_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Document store directory (overrides DOCUMENT_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Persisted index path (overrides VECTOR_STORE_PATH).
    #[arg(long)]
    index_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load_config().context("invalid configuration")?;
    if let Some(host) = cli.host {
        settings.server_host = host;
    }
    if let Some(port) = cli.port {
        settings.server_port = Some(port);
    }
    if let Some(dir) = cli.data_dir {
        settings.document_dir = dir;
    }
    if let Some(path) = cli.index_path {
        settings.vector_store_path = path;
    }
    logging::init_tracing(&settings);
    config::install_config(settings)?;
    let config = config::get_config();

    let service = Arc::new(
        PdfQueryService::from_config(config).context("failed to initialize providers")?,
    );
    service.start().await.context("failed to prepare document store")?;
    let app = api::create_router(Arc::clone(&service), &api::RouterOptions::from_config(config));

    let (listener, port) = bind_listener(&config.server_host, config.server_port).await?;
    tracing::info!("Listening on http://{}:{}", config.server_host, port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown().await?;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn bind_listener(host: &str, port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = port {
        return TcpListener::bind((host, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
