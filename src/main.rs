use clap::Parser;
use tracing_subscriber::EnvFilter;

use archon_api::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT secrets, etc.
    let _ = dotenvy::dotenv();

    let default_filter = match std::env::var("APP_ENV").as_deref() {
        Ok("production") | Ok("prod") => "info",
        _ => "archon_api=debug,tower_http=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    if let Err(e) = cli::run(Cli::parse()).await {
        match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}
