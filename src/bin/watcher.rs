use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use wallet_watcher::bot::run_bot;
use wallet_watcher::classifier::TokenClassifier;
use wallet_watcher::config::Config;
use wallet_watcher::cursor_worker::{CHECKPOINT_QUEUE_SIZE, run_cursor_worker};
use wallet_watcher::dispatcher::Dispatcher;
use wallet_watcher::names::{EnsNameResolver, NameResolver, ShortNameResolver};
use wallet_watcher::registry::SubscriptionRegistry;
use wallet_watcher::repository::{CursorStore, Database};
use wallet_watcher::rpc::RpcClient;
use wallet_watcher::scanner::{NetworkScanner, initial_cursor};
use wallet_watcher::telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    wallet_watcher::init_tracing();

    info!("Starting wallet watcher");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: {} network(s), batch size {}, tick every {:?}",
        config.networks.len(),
        config.batch_size,
        config.scan_interval
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let registry = Arc::new(SubscriptionRegistry::new(Arc::new(db.clone())));
    registry
        .load_all()
        .context("Refusing to scan without the subscription set")?;

    let telegram = TelegramClient::new(&config.telegram_api_url, &config.bot_token)?;
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        Arc::new(telegram.clone()),
    ));
    let classifier = Arc::new(TokenClassifier::default());

    let (checkpoint_tx, checkpoint_rx) = mpsc::channel(CHECKPOINT_QUEUE_SIZE);
    let worker_store = Arc::new(db.clone());
    tokio::spawn(async move {
        if let Err(e) = run_cursor_worker(worker_store, checkpoint_rx).await {
            error!("Cursor worker stopped: {:#}", e);
        }
    });

    let mut names: Arc<dyn NameResolver> = Arc::new(ShortNameResolver);

    for network in &config.networks {
        let client = RpcClient::new(&network.name, &network.rpc_urls)?;

        let head = client
            .get_latest_block()
            .await
            .with_context(|| format!("Failed to connect to {}", network.name))?;
        let stored = db.load_cursor(&network.name)?;
        let cursor = initial_cursor(head, stored, config.max_resume_gap);
        info!(
            "Connected to {} at block {}, scanning after block {}",
            network.name, head, cursor
        );

        if network.name == "ethereum" {
            names = Arc::new(EnsNameResolver::new(client.clone()));
        }

        let scanner = NetworkScanner::new(
            Arc::new(network.clone()),
            Arc::new(client),
            registry.clone(),
            classifier.clone(),
            dispatcher.clone(),
            cursor,
        )
        .with_batch_size(config.batch_size)
        .with_checkpoints(checkpoint_tx.clone());

        tokio::spawn(scanner.run(config.scan_interval));
    }
    drop(checkpoint_tx);

    tokio::select! {
        _ = run_bot(telegram, registry, names) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
