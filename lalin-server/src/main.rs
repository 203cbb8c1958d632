/**
 * LALIN SERVER - Point d'entrée
 *
 * RÔLE : Bootstrap : .env, logging, config, provider (TomTom ou BMKG selon
 * `mode`), bind UDP, puis les deux boucles jusqu'à Ctrl+C.
 *
 * Seuls une config invalide ou un bind impossible arrêtent le process.
 */

use anyhow::{Context, Result};
use lalin_server::{load_config, BmkgProvider, Server, ServerMode, TomTomProvider};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel (TOMTOM_API_KEY, LALIN_*)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await.context("failed to load configuration")?;
    let bind_addr = cfg.bind_addr();
    let bound = match cfg.mode {
        ServerMode::Traffic => {
            cfg.require_api_key()?;
            let provider =
                TomTomProvider::new(&cfg.provider).context("failed to build TomTom client")?;
            Server::bind(cfg, Arc::new(provider)).await
        }
        ServerMode::Weather => {
            let source = BmkgProvider::new(&cfg.weather, cfg.provider_timeout())
                .context("failed to build BMKG client")?;
            Server::bind_weather(cfg, Arc::new(source)).await
        }
    };
    let server = match bound {
        Ok(server) => server,
        Err(e) => {
            error!("cannot bind UDP socket on {bind_addr}: {e}");
            return Err(e).context("UDP bind failed");
        }
    };
    info!("listening on udp://{}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
