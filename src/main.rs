use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use game_importer::config::GlobalConfig;
use game_importer::control::ControlServer;
use game_importer::importer::GameImporter;
use game_importer::utils::{init_tracing, shutdown_signal};

#[derive(Parser, Debug)]
#[command(name = "game-importer", version, about = "Import, detect and launch games over a JSON control API")]
struct Cli {
    /// Config file (default: config/global.toml or $GAME_IMPORTER_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control API listen address, e.g. 127.0.0.1:5000
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => GlobalConfig::load_path(path)?,
        None => GlobalConfig::load()?,
    };
    if let Some(listen) = cli.listen {
        cfg.control.listen_addr = listen;
    }
    cfg.resolve_paths()?;
    tracing::info!(
        "Game importer starting (game dir: {})",
        cfg.importer.game_dir.display()
    );

    let importer = Arc::new(GameImporter::from_config(&cfg));
    let shutdown = CancellationToken::new();

    // Graceful shutdown: Ctrl+C / SIGTERM
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, cleaning up...");
            shutdown.cancel();
        });
    }

    let server = ControlServer::new(importer.clone(), &cfg.control.listen_addr);
    let mut server_task = tokio::spawn(server.start(shutdown.clone()));

    let result = tokio::select! {
        joined = &mut server_task => Some(joined),
        _ = shutdown.cancelled() => None,
    };

    let result = match result {
        Some(joined) => joined.map_err(anyhow::Error::from).and_then(|r| r),
        None => {
            let drain = cfg.launch.drain_timeout();
            match tokio::time::timeout(drain, &mut server_task).await {
                Ok(joined) => joined.map_err(anyhow::Error::from).and_then(|r| r),
                Err(_) => {
                    tracing::warn!(
                        "In-flight requests did not finish within {}s, aborting",
                        drain.as_secs()
                    );
                    server_task.abort();
                    Ok(())
                }
            }
        }
    };

    importer.shutdown().await;
    if let Err(e) = &result {
        tracing::error!("Control API error: {}", e);
    }
    tracing::info!("Game importer shutting down");
    result
}
