use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    chain::{ChainApi, ForeignChainApi, ForeignGateway, GatewayClient, HomeChainApi, HomeGateway},
    config::Config,
    error::AppResult,
    reconcile::{EventFetcher, ForeignAcceptedFeed, HomeAnsweredFeed, HomePendingFeed, Pipeline},
    scheduler::Scheduler,
    store::{CheckpointStore, MirrorStore, PgCheckpointStore, PgMirrorBackend},
};

/// Wire stores, chain gateways and the three feed pipelines into a scheduler
pub async fn initialize_scheduler(config: &Config) -> AppResult<Scheduler> {
    info!("Initializing reconciler components ...");

    // Database pool
    let pool = initialize_database(config).await?;

    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(PgCheckpointStore::new(pool.clone()));
    let mirror = Arc::new(
        MirrorStore::new(Arc::new(PgMirrorBackend::new(pool)))
            .with_batch_limit(config.batch_write_limit),
    );
    info!(
        "✅ Mirror store initialized ({} records per batch write)",
        mirror.batch_limit()
    );

    // Chain gateways
    info!("⚙️  Connecting chain gateways...");
    let home: Arc<dyn HomeChainApi> = Arc::new(HomeGateway::new(GatewayClient::new(
        config.home_rpc_url.clone(),
        config.rpc_timeout(),
    )?));
    let foreign: Arc<dyn ForeignChainApi> = Arc::new(ForeignGateway::new(GatewayClient::new(
        config.foreign_rpc_url.clone(),
        config.rpc_timeout(),
    )?));

    let (home_chain_id, foreign_chain_id) =
        tokio::try_join!(home.chain_id(), foreign.chain_id())?;
    info!("✅ Home chain gateway ready (chain id {})", home_chain_id);
    info!("✅ Foreign chain gateway ready (chain id {})", foreign_chain_id);

    let fetcher = EventFetcher::new(config.retry_policy());

    let mut scheduler = Scheduler::new(config.poll_interval());
    scheduler.register(Arc::new(Pipeline::new(
        HomePendingFeed::new(home.clone(), home_chain_id),
        checkpoints.clone(),
        mirror.clone(),
        fetcher.clone(),
    )));
    scheduler.register(Arc::new(Pipeline::new(
        HomeAnsweredFeed::new(home, home_chain_id),
        checkpoints.clone(),
        mirror.clone(),
        fetcher.clone(),
    )));
    scheduler.register(Arc::new(Pipeline::new(
        ForeignAcceptedFeed::new(foreign, foreign_chain_id),
        checkpoints,
        mirror,
        fetcher,
    )));

    info!("📋 Registered feeds: {:?}", scheduler.feeds());
    Ok(scheduler)
}

async fn initialize_database(config: &Config) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await?;

    info!(
        "✓ Database pool configured: {} max connections",
        config.db_max_connections
    );

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
