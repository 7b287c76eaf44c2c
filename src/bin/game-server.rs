//! Standalone runner: detect the game in a directory and run it in the
//! foreground until it exits or Ctrl+C.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use game_importer::collaborators::CommandInstaller;
use game_importer::config::GlobalConfig;
use game_importer::detector::Detector;
use game_importer::launcher::{self, ForegroundExit, ForegroundOptions, LaunchStrategy};
use game_importer::utils::{init_tracing, shutdown_signal};

#[derive(Parser, Debug)]
#[command(name = "game-server", version, about = "Run an imported game directory")]
struct Cli {
    /// Game directory
    game_dir: PathBuf,

    /// Port for web games
    #[arg(default_value_t = 8000)]
    port: u16,

    /// Open the game in a browser once it is served
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = GlobalConfig::load()?;

    println!("=== game-server ===");
    println!("Game directory: {}", cli.game_dir.display());
    if !cli.game_dir.is_dir() {
        eprintln!("Error: game directory does not exist");
        return Ok(ExitCode::FAILURE);
    }
    let game_dir = cli.game_dir.canonicalize()?;

    let detector = Detector::from_config(&cfg.launch);
    let descriptor = detector.detect(&game_dir);
    println!("Detected type: {}", descriptor.runtime_type);
    println!(
        "Main file: {}",
        descriptor.main_file.as_deref().unwrap_or("not detected")
    );
    println!();

    let strategy = launcher::select(&descriptor, &game_dir);
    if let LaunchStrategy::Unsupported { reason } = &strategy {
        println!("Unsupported or undetected game type ({})", reason);
        println!("Files in the directory:");
        for file in &descriptor.structure {
            println!("  - {}", file);
        }
        return Ok(ExitCode::FAILURE);
    }

    let options = ForegroundOptions {
        port: cli.port,
        drain_timeout: cfg.launch.drain_timeout(),
        open_browser: cli.open,
    };
    let installer = CommandInstaller::from_config(&cfg.launch);

    match launcher::run_foreground(&strategy, &options, &installer, shutdown_signal()).await? {
        ForegroundExit::Interrupted => {
            println!("\nStopped by user");
            Ok(ExitCode::SUCCESS)
        }
        ForegroundExit::ServerStopped => Ok(ExitCode::SUCCESS),
        ForegroundExit::ProcessExited(code) => {
            println!("Game exited (code {:?})", code);
            Ok(match code {
                Some(0) => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
    }
}
