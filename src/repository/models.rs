use alloy_primitives::Address;

/// One row of the tracking table: a subscriber watching a wallet under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRecord {
    pub subscriber_id: String,
    pub wallet: Address,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRecord {
    pub network: String,
    pub last_scanned_block: u64,
    pub updated_at: i64,
}
