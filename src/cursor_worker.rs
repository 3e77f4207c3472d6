use crate::repository::CursorStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const CHECKPOINT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorCheckpoint {
    pub network: String,
    pub block: u64,
}

/// Writes scanner checkpoints to the store off the scanning tasks. A failed
/// write is logged and the next checkpoint for that network supersedes it.
pub async fn run_cursor_worker(
    store: Arc<dyn CursorStore>,
    mut rx: mpsc::Receiver<CursorCheckpoint>,
) -> Result<()> {
    while let Some(checkpoint) = rx.recv().await {
        let store = store.clone();

        // rusqlite is blocking
        let result =
            tokio::task::spawn_blocking(move || persist_checkpoint(store.as_ref(), checkpoint))
                .await?;

        if let Err(e) = result {
            warn!("Failed to persist cursor: {:#}", e);
        }
    }
    Ok(())
}

fn persist_checkpoint(store: &dyn CursorStore, checkpoint: CursorCheckpoint) -> Result<()> {
    let start = Instant::now();

    store.save_cursor(&checkpoint.network, checkpoint.block)?;
    debug!(
        "Stored cursor {} for {} in {:?}",
        checkpoint.block,
        checkpoint.network,
        start.elapsed()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[tokio::test]
    async fn persists_checkpoints_until_channel_closes() {
        let db = Database::new(":memory:").unwrap();
        let (tx, rx) = mpsc::channel(CHECKPOINT_QUEUE_SIZE);
        let worker = tokio::spawn(run_cursor_worker(Arc::new(db.clone()), rx));

        for block in [10, 20] {
            tx.send(CursorCheckpoint {
                network: "scroll".to_string(),
                block,
            })
            .await
            .unwrap();
        }
        drop(tx);
        worker.await.unwrap().unwrap();

        assert_eq!(db.load_cursor("scroll").unwrap(), Some(20));
    }
}
