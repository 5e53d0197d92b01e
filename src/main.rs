use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reconciler::{bootstrap, config::Config};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("🚀 Starting cross-chain arbitration request reconciler");

    let config = Config::from_env().context("failed to load configuration")?;

    let scheduler = bootstrap::initialize_scheduler(&config)
        .await
        .context("failed to initialize reconciler")?;

    if config.run_once {
        let failed = scheduler
            .run_once()
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();
        if failed > 0 {
            anyhow::bail!("{} feed pass(es) failed", failed);
        }
        info!("✓ Single pass completed");
        return Ok(());
    }

    let handles = scheduler.start();
    info!("🌐 Reconciler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("🛑 Shutting down");
    for handle in handles {
        handle.abort();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("Feed task ended abnormally: {}", e);
            }
        }
    }

    Ok(())
}
