//! Preflight CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `metrics` — Fetch and print the gateway metrics (JSON form)
//! - `models`  — Print the loaded model capability table
//! - `doctor`  — Diagnose configuration health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "preflight",
    about = "Preflight — conversation preparation and model dispatch",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Fetch gateway metrics and print them as JSON
    Metrics {
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,

        /// Bearer token for guarded gateways
        #[arg(long, env = "PREFLIGHT_BEARER_SECRET")]
        token: Option<String>,
    },

    /// Print the loaded model capability table
    Models,

    /// Diagnose configuration health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Metrics { url, token } => commands::metrics::run(&url, token.as_deref()).await?,
        Commands::Models => commands::models::run()?,
        Commands::Doctor => commands::doctor::run()?,
    }

    Ok(())
}
