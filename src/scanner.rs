use crate::classifier::TokenClassifier;
use crate::config::NetworkConfig;
use crate::cursor_worker::CursorCheckpoint;
use crate::dispatcher::Dispatcher;
use crate::events::TransferEvent;
use crate::registry::SubscriptionRegistry;
use crate::rpc::ChainClient;
use alloy::rpc::types::Log;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nobody tracks anything; the cursor was left where it was.
    Skipped,
    UpToDate { head: u64 },
    Scanned {
        from: u64,
        to: u64,
        logs: usize,
        matched: usize,
    },
}

/// Where scanning starts after a restart. A stored cursor is trusted only if
/// it is behind the head by at most `max_resume_gap` blocks.
pub fn initial_cursor(head: u64, stored: Option<u64>, max_resume_gap: u64) -> u64 {
    match stored {
        Some(block) if block <= head && head - block <= max_resume_gap => block,
        _ => head,
    }
}

pub struct NetworkScanner {
    network: Arc<NetworkConfig>,
    chain: Arc<dyn ChainClient>,
    registry: Arc<SubscriptionRegistry>,
    classifier: Arc<TokenClassifier>,
    dispatcher: Arc<Dispatcher>,
    checkpoints: Option<mpsc::Sender<CursorCheckpoint>>,
    batch_size: u64,
    cursor: u64,
}

impl NetworkScanner {
    pub fn new(
        network: Arc<NetworkConfig>,
        chain: Arc<dyn ChainClient>,
        registry: Arc<SubscriptionRegistry>,
        classifier: Arc<TokenClassifier>,
        dispatcher: Arc<Dispatcher>,
        cursor: u64,
    ) -> Self {
        NetworkScanner {
            network,
            chain,
            registry,
            classifier,
            dispatcher,
            checkpoints: None,
            batch_size: DEFAULT_BATCH_SIZE,
            cursor,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: mpsc::Sender<CursorCheckpoint>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Polls forever. Ticks never overlap: a slow tick pushes the next one back.
    pub async fn run(mut self, tick_interval: Duration) {
        info!(
            "Monitoring {} from block {} every {:?}",
            self.network.name, self.cursor, tick_interval
        );

        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.tick().await {
                Ok(TickOutcome::Scanned {
                    from,
                    to,
                    logs,
                    matched,
                }) => {
                    if matched > 0 {
                        info!(
                            "{}: blocks {}-{} had {} transfer(s), {} touching tracked wallets",
                            self.network.name, from, to, logs, matched
                        );
                    }
                }
                Ok(outcome) => debug!("{}: {:?}", self.network.name, outcome),
                Err(e) => warn!(
                    "Tick on {} failed, retrying from block {}: {:#}",
                    self.network.name,
                    self.cursor + 1,
                    e
                ),
            }
        }
    }

    /// One pass over `[cursor + 1, head]`. A head or log fetch failure aborts the
    /// tick and leaves the cursor untouched; per-log failures do not.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if self.registry.is_empty() {
            return Ok(TickOutcome::Skipped);
        }

        let head = self
            .chain
            .latest_block()
            .await
            .with_context(|| format!("Failed to fetch head of {}", self.network.name))?;

        if head <= self.cursor {
            return Ok(TickOutcome::UpToDate { head });
        }

        let from = self.cursor + 1;
        let mut batch_from = from;
        let mut total_logs = 0;
        let mut matched = 0;

        while batch_from <= head {
            let batch_to = batch_from.saturating_add(self.batch_size - 1).min(head);
            debug!(
                "Fetching logs for blocks {} to {} on {}",
                batch_from, batch_to, self.network.name
            );

            let logs = self
                .chain
                .transfer_logs(batch_from, batch_to)
                .await
                .with_context(|| {
                    format!(
                        "Failed to fetch logs {}-{} on {}",
                        batch_from, batch_to, self.network.name
                    )
                })?;

            total_logs += logs.len();
            let handled = join_all(logs.iter().map(|log| self.handle_log(log))).await;
            matched += handled.into_iter().filter(|m| *m).count();

            batch_from = batch_to + 1;
        }

        self.cursor = head;
        self.checkpoint(head);

        Ok(TickOutcome::Scanned {
            from,
            to: head,
            logs: total_logs,
            matched,
        })
    }

    /// Returns whether the log touched a tracked wallet. Never fails the batch.
    async fn handle_log(&self, log: &Log) -> bool {
        let event = match TransferEvent::from_log(&self.network.name, log) {
            Ok(event) => event,
            Err(e) => {
                debug!(
                    "Skipping undecodable Transfer log {:?} on {}: {}",
                    log.transaction_hash, self.network.name, e
                );
                return false;
            }
        };

        if !self.registry.is_watched(&event.from) && !self.registry.is_watched(&event.to) {
            return false;
        }

        match self.classifier.classify(self.chain.as_ref(), &event).await {
            Ok(details) => {
                self.dispatcher
                    .dispatch(&self.network, &event, &details)
                    .await;
            }
            Err(e) => warn!(
                "Failed to process transfer {} on {}: {:#}",
                event.transaction_hash_hex(),
                self.network.name,
                e
            ),
        }

        true
    }

    fn checkpoint(&self, block: u64) {
        let Some(checkpoints) = &self.checkpoints else {
            return;
        };

        let checkpoint = CursorCheckpoint {
            network: self.network.name.clone(),
            block,
        };
        if let Err(e) = checkpoints.try_send(checkpoint) {
            warn!(
                "Dropping cursor checkpoint {} for {}: {}",
                block, self.network.name, e
            );
        }
    }
}
