use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use novelvoice::server::{DEFAULT_ALLOWED_ORIGIN, ServerConfig, router};

#[derive(Debug, Parser)]
#[command(author, version, about = "Chapter storage endpoints for novelvoice")]
struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[arg(long, default_value = "novelvoice-data")]
    data_dir: PathBuf,

    /// Origin sent in `Access-Control-Allow-Origin`.
    #[arg(long, default_value = DEFAULT_ALLOWED_ORIGIN)]
    allowed_origin: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelvoice::logging::init()?;

    let args = ServerArgs::parse();
    tracing::info!(?args, "starting novelvoice-server");

    let app = router(&ServerConfig {
        data_dir: args.data_dir,
        allowed_origin: args.allowed_origin,
    })?;

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
