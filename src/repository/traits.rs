use super::models::TrackingRecord;
use alloy_primitives::Address;
use anyhow::Result;

/// Durable mirror of the in-memory subscription registry.
pub trait SubscriptionStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<TrackingRecord>>;
    fn upsert(&self, record: &TrackingRecord) -> Result<()>;
    fn delete(&self, subscriber_id: &str, wallet: &Address) -> Result<()>;
}

pub trait CursorStore: Send + Sync {
    fn load_cursor(&self, network: &str) -> Result<Option<u64>>;
    fn save_cursor(&self, network: &str, block: u64) -> Result<()>;
}
