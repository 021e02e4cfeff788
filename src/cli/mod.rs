use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::auth::password::PasswordService;
use crate::config::AppConfig;
use crate::database::manager::{create_pool, run_migrations};
use crate::routes;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "archon-api")]
#[command(about = "Archon API - content backend for insights, topics and covers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Encrypt a plaintext password the way clients must send it")]
    EncryptPassword {
        #[arg(help = "Plaintext password")]
        plaintext: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env();

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Migrate => {
            let pool = create_pool(&config)?;
            run_migrations(&pool).await?;
            Ok(())
        }
        Commands::EncryptPassword { plaintext } => {
            let passwords = PasswordService::new(&config.security);
            println!("{}", passwords.encrypt(&plaintext)?);
            Ok(())
        }
    }
}

/// Outside development the server must not sign tokens with an empty key or
/// run without a usable transport key.
fn ensure_secrets(config: &AppConfig) -> anyhow::Result<()> {
    if config.is_development() {
        return Ok(());
    }
    let security = &config.security;
    if security.jwt_access_secret.is_empty() {
        anyhow::bail!("JWT_ACCESS_SECRET must be set in {:?} mode", config.environment);
    }
    if security.jwt_refresh_secret.is_empty() {
        anyhow::bail!("JWT_REFRESH_SECRET must be set in {:?} mode", config.environment);
    }
    if security.aes_secret.len() != 32 {
        anyhow::bail!(
            "AES_SECRET must be exactly 32 bytes in {:?} mode (got {})",
            config.environment,
            security.aes_secret.len()
        );
    }
    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Archon API in {:?} mode", config.environment);
    ensure_secrets(&config)?;

    let pool = create_pool(&config)?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let blobs = AppState::blob_store_for(&config)?;
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let state = AppState::new(config, pool, blobs);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Archon API listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
