use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod client;
mod config;
mod error;
mod llm;
mod retry;
mod server;
mod storage;
mod time;
mod transcript;
mod video;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let default_level = match cli.verbose {
        0 => config::loader::load_config()
            .map(|cfg| cfg.server.log_level)
            .unwrap_or_else(|_| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = cli::handle_command(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
