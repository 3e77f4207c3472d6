//! In-memory subscription registry mirrored to a [`SubscriptionStore`].
//!
//! Two indexes are kept in lockstep under one lock: subscriber → wallets (with
//! display names) and wallet → subscribers. The keys of the second index are the
//! global tracked-address set the scanners use as their fast filter.

use crate::repository::{SubscriptionStore, TrackingRecord};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

const FALLBACK_NAME_LEN: usize = 6;
const DEFAULT_RETIRED_NAME_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    pub name: String,
}

#[derive(Default)]
struct RegistryState {
    by_subscriber: HashMap<String, HashMap<Address, String>>,
    by_wallet: HashMap<Address, BTreeSet<String>>,
    /// Names of pairs that were removed, reused if the same pair is added back.
    /// Keyed by pair with a retirement sequence number; the oldest goes first
    /// once the registry's limit is reached.
    retired_names: HashMap<(String, Address), (u64, String)>,
    retired_seq: u64,
}

impl RegistryState {
    fn insert(&mut self, subscriber_id: &str, wallet: Address, name: String) {
        self.by_subscriber
            .entry(subscriber_id.to_string())
            .or_default()
            .insert(wallet, name);
        self.by_wallet
            .entry(wallet)
            .or_default()
            .insert(subscriber_id.to_string());
    }

    fn remove(&mut self, subscriber_id: &str, wallet: &Address) -> Option<String> {
        let wallets = self.by_subscriber.get_mut(subscriber_id)?;
        let name = wallets.remove(wallet)?;
        if wallets.is_empty() {
            self.by_subscriber.remove(subscriber_id);
        }

        if let Some(subscribers) = self.by_wallet.get_mut(wallet) {
            subscribers.remove(subscriber_id);
            if subscribers.is_empty() {
                self.by_wallet.remove(wallet);
            }
        }

        Some(name)
    }

    fn name_of(&self, subscriber_id: &str, wallet: &Address) -> Option<&String> {
        self.by_subscriber.get(subscriber_id)?.get(wallet)
    }

    fn retire(&mut self, key: (String, Address), name: String, limit: usize) {
        self.retired_seq += 1;
        self.retired_names.insert(key, (self.retired_seq, name));

        while self.retired_names.len() > limit {
            let Some(oldest) = self
                .retired_names
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.retired_names.remove(&oldest);
        }
    }
}

pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
    state: RwLock<RegistryState>,
    retired_name_limit: usize,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        SubscriptionRegistry {
            store,
            state: RwLock::new(RegistryState::default()),
            retired_name_limit: DEFAULT_RETIRED_NAME_LIMIT,
        }
    }

    /// How many names of removed pairs are remembered for re-adds.
    pub fn with_retired_name_limit(mut self, limit: usize) -> Self {
        self.retired_name_limit = limit;
        self
    }

    /// Replaces the in-memory state with everything in the store. Must finish
    /// before any scanner starts, since the tracked set gates all scanning work.
    pub fn load_all(&self) -> Result<()> {
        let records = self
            .store
            .load_all()
            .context("Failed to load tracked wallets from store")?;

        let mut state = RegistryState::default();
        for record in records {
            state.insert(&record.subscriber_id, record.wallet, record.name);
        }

        info!(
            "Loaded {} tracked wallet(s) for {} subscriber(s)",
            state.by_wallet.len(),
            state.by_subscriber.len()
        );

        *self.write() = state;
        Ok(())
    }

    pub fn is_tracked(&self, subscriber_id: &str, wallet: &Address) -> bool {
        self.read().name_of(subscriber_id, wallet).is_some()
    }

    pub fn name_for(&self, subscriber_id: &str, wallet: &Address) -> Option<String> {
        self.read().name_of(subscriber_id, wallet).cloned()
    }

    /// Whether any subscriber at all tracks `wallet`.
    pub fn is_watched(&self, wallet: &Address) -> bool {
        self.read().by_wallet.contains_key(wallet)
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_wallet.is_empty()
    }

    pub fn tracked_wallet_count(&self) -> usize {
        self.read().by_wallet.len()
    }

    /// Every `(subscriber, display name)` tracking `wallet`, ordered by subscriber.
    pub fn subscribers_tracking(&self, wallet: &Address) -> Vec<(String, String)> {
        let state = self.read();
        let Some(subscribers) = state.by_wallet.get(wallet) else {
            return Vec::new();
        };

        subscribers
            .iter()
            .filter_map(|id| {
                state
                    .name_of(id, wallet)
                    .map(|name| (id.clone(), name.clone()))
            })
            .collect()
    }

    pub fn wallets_of(&self, subscriber_id: &str) -> Vec<(Address, String)> {
        let state = self.read();
        let mut wallets: Vec<(Address, String)> = state
            .by_subscriber
            .get(subscriber_id)
            .map(|w| w.iter().map(|(a, n)| (*a, n.clone())).collect())
            .unwrap_or_default();
        wallets.sort_by(|a, b| a.0.cmp(&b.0));
        wallets
    }

    /// Adds the pair if absent, removes it if present. The store is written
    /// first; memory only changes once the store accepted the change.
    pub fn toggle(
        &self,
        subscriber_id: &str,
        wallet: Address,
        proposed_name: Option<String>,
    ) -> Result<ToggleOutcome> {
        let mut state = self.write();

        if let Some(existing) = state.name_of(subscriber_id, &wallet).cloned() {
            self.store
                .delete(subscriber_id, &wallet)
                .with_context(|| format!("Failed to delete {wallet} for {subscriber_id}"))?;

            state.remove(subscriber_id, &wallet);
            state.retire(
                (subscriber_id.to_string(), wallet),
                existing.clone(),
                self.retired_name_limit,
            );

            debug!("{} stopped tracking {}", subscriber_id, wallet);
            return Ok(ToggleOutcome {
                action: ToggleAction::Removed,
                name: existing,
            });
        }

        let key = (subscriber_id.to_string(), wallet);
        let name = proposed_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| state.retired_names.get(&key).map(|(_, name)| name.clone()))
            .unwrap_or_else(|| fallback_name(&wallet));

        self.store
            .upsert(&TrackingRecord {
                subscriber_id: subscriber_id.to_string(),
                wallet,
                name: name.clone(),
            })
            .with_context(|| format!("Failed to store {wallet} for {subscriber_id}"))?;

        state.retired_names.remove(&key);
        state.insert(subscriber_id, wallet, name.clone());

        debug!("{} started tracking {} as {}", subscriber_id, wallet, name);
        Ok(ToggleOutcome {
            action: ToggleAction::Added,
            name,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// First six characters of the checksummed address, e.g. `0xAbC1`.
pub fn fallback_name(wallet: &Address) -> String {
    wallet
        .to_checksum(None)
        .chars()
        .take(FALLBACK_NAME_LEN)
        .collect()
}
