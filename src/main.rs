mod cli;
mod control;

use clap::Parser;
use cli::{Cli, Command};
use pastebridged::orchestrator::{self, launcher::SurfaceGeometry};
use pastebridged::surface::{self, SurfaceOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Orchestrator {
            surface_width,
            surface_height,
        } => {
            let geometry = SurfaceGeometry {
                width: surface_width,
                height: surface_height,
            };
            if let Err(e) = orchestrator::run(geometry).await {
                tracing::error!(error = %e, "orchestrator failed");
                eprintln!("pastebridged orchestrator: {e}");
                std::process::exit(1);
            }
        }
        Command::Surface { width, height } => {
            if let Err(e) = surface::run(SurfaceOptions { width, height }).await {
                tracing::error!(error = %e, "surface failed");
                eprintln!("pastebridged surface: {e}");
                std::process::exit(1);
            }
        }
        Command::Pref { action } => {
            if let Err(e) = control::run(action).await {
                tracing::error!(error = %e, "pref failed");
                eprintln!("pastebridged pref: {e}");
                std::process::exit(1);
            }
        }
    }
}
