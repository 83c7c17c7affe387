use std::time::Duration;

use anyhow::{Context, Result};
use sharebuddy::{
    config::Config,
    db::{self, recommendation},
    moderation::{ModerationQueue, ModerationWorker, Screener},
    payments::StripeClient,
    routes, utils, AppState,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sharebuddy=info,tower_http=info")),
        )
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
    let config = Config::load(&config_path)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to postgres")?;
    db::prepare_db(&pool)
        .await
        .context("Failed to apply database schema")?;

    let private_key = std::fs::read(&config.jwt.private_key_path)
        .with_context(|| format!("Failed to read {}", config.jwt.private_key_path))?;
    let public_key = std::fs::read(&config.jwt.public_key_path)
        .with_context(|| format!("Failed to read {}", config.jwt.public_key_path))?;
    let (encoding_key, decoding_key) = utils::jwt::load_keys(&private_key, &public_key)
        .map_err(|err| anyhow::anyhow!("Invalid JWT key pair: {err}"))?;

    let queue = ModerationQueue::new(&config.redis.url, &config.moderation)
        .map_err(|err| anyhow::anyhow!("Invalid redis url: {err}"))?;
    let screener =
        Screener::from_config(&config.moderation).context("Invalid banned word list")?;
    let stripe = StripeClient::new(reqwest::Client::new(), &config.stripe);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ModerationWorker::new(
        pool.clone(),
        queue.clone(),
        screener,
        config.credits.clone(),
        &config.moderation,
    );
    let worker = tokio::spawn(worker.run(shutdown_rx.clone()));

    let refresher = tokio::spawn(refresh_recommendations(
        pool.clone(),
        Duration::from_secs(config.recommendations.refresh_interval_secs.max(60)),
        shutdown_rx,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    let state = AppState::new(pool, config, queue, stripe, encoding_key, decoding_key);
    axum::serve(listener, routes::generate_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_tx.send(true).ok();
    let _ = tokio::join!(worker, refresher);
    tracing::info!("shut down cleanly");

    Ok(())
}

/// Rebuilds the co-download similarity view on a fixed interval.
async fn refresh_recommendations(
    pool: PgPool,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(err) = recommendation::refresh_similarity(&pool).await {
                    tracing::warn!(error = ?err, "failed to refresh document similarity");
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = ?err, "failed to install SIGTERM handler");
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

    tracing::info!("shutdown signal received");
}
