use anyhow::{bail, Context};
use leaderboard_service::{
    config::{LogFormat, StoreBackend},
    models::{LeaderboardQuery, TaskState},
    Config, LeaderboardApi, MemoryStore, RedisClusterStore, RedisStore, Store,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,leaderboard_service=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    init_tracing(config.service.log_format);

    info!(
        service = %config.service.service_name,
        store_backend = ?config.service.store_backend,
        redis_cluster = config.redis.redis_cluster,
        users = config.generation.generate_users,
        concurrency = config.generation.generate_concurrency,
        "Starting bulk generation run"
    );

    let store: Arc<dyn Store> = match config.service.store_backend {
        StoreBackend::Redis if config.redis.redis_cluster => Arc::new(
            RedisClusterStore::connect_cluster(&config.redis.redis_url)
                .await
                .context("Failed to connect to Redis cluster")?,
        ),
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(&config.redis.redis_url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let api = LeaderboardApi::new(store, config.leaderboard.clone(), &config.generation);

    let requested_at = Utc::now();
    let started = api
        .start_generation(
            config.generation.generate_users,
            config.generation.generate_concurrency,
        )
        .await
        .context("Failed to start generation")?;
    info!(
        status = %started.status,
        remaining_users = started.remaining_users,
        started_at = ?started.started_at,
        "Generation accepted"
    );
    if started.status == TaskState::Running && started.started_before(requested_at) {
        warn!(
            started_at = ?started.started_at,
            remaining_users = started.remaining_users,
            "A run started by another process is still marked RUNNING; no local workers were spawned. Stop it if that process is gone"
        );
    }

    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.generation.status_poll_interval_ms));
    let finished = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = api.query_generation_status().await?;
                info!(
                    status = %status.status,
                    remaining_users = status.remaining_users,
                    completed_percent = status.completed_percent,
                    "Generation progress"
                );
                if status.status.is_terminal() {
                    break status;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                warn!("Shutdown signal received, stopping generation");
                api.stop_generation().await?;
                break api.query_generation_status().await?;
            }
        }
    };

    let page = api
        .get_leaderboard_page(&LeaderboardQuery::default())
        .await
        .context("Failed to read the GLOBAL leaderboard")?;
    for row in &page {
        info!(
            rank = row.rank,
            points = row.points,
            display_name = %row.display_name,
            country = %row.country,
            "Leaderboard row"
        );
    }

    if finished.status == TaskState::Error {
        bail!(
            "generation ended in ERROR with {} users remaining",
            finished.remaining_users
        );
    }

    info!(status = %finished.status, "Generation run finished");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Plain => registry.with(fmt::layer()).init(),
    }
}
