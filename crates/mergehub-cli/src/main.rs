use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mergehub::Hub;
use mergehub_cli::args::{Cli, Command};
use mergehub_cli::{inspect, open_database, run_client, run_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mergehub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let store = Arc::new(open_database(&args.database)?);
            let hub = Arc::new(Hub::open(store, args.hub_config()?).await?);
            let listener = tokio::net::TcpListener::bind(args.addr).await?;
            run_server(listener, hub, args.scheduler_config(), shutdown_signal()).await?;
        }
        Command::Client(args) => {
            let config = args.client_config()?;
            run_client(config, args.actor_bytes()?, shutdown_signal()).await?;
        }
        Command::Inspect { file } => {
            print!("{}", inspect::inspect_file(&file)?.render());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
}
