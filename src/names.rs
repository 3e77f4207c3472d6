use crate::events::{IEnsRegistry, IEnsResolver};
use crate::registry::fallback_name;
use crate::rpc::RpcClient;
use alloy_primitives::{Address, B256, address, keccak256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

pub const ENS_REGISTRY: Address = address!("0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

/// Best-effort human label for a wallet. Never fails: callers get the short
/// address when nothing better is known.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn display_name(&self, wallet: Address) -> String;
}

pub struct ShortNameResolver;

#[async_trait]
impl NameResolver for ShortNameResolver {
    async fn display_name(&self, wallet: Address) -> String {
        fallback_name(&wallet)
    }
}

/// Reverse ENS lookup on Ethereum mainnet, forward-verified.
pub struct EnsNameResolver {
    client: RpcClient,
}

impl EnsNameResolver {
    pub fn new(client: RpcClient) -> Self {
        EnsNameResolver { client }
    }

    async fn lookup(&self, wallet: Address) -> Result<Option<String>> {
        let reverse_node = namehash(&reverse_name(&wallet));
        let Some(resolver) = self.resolver_of(reverse_node).await? else {
            return Ok(None);
        };

        let name = self
            .client
            .call_contract(resolver, IEnsResolver::nameCall { node: reverse_node })
            .await
            .context("Reverse resolver name() failed")?;
        if name.is_empty() {
            return Ok(None);
        }

        // A reverse record is only a claim; the name must point back at the wallet.
        let forward_node = namehash(&name);
        let Some(forward_resolver) = self.resolver_of(forward_node).await? else {
            return Ok(None);
        };
        let resolved = self
            .client
            .call_contract(forward_resolver, IEnsResolver::addrCall { node: forward_node })
            .await
            .context("Forward resolver addr() failed")?;

        Ok((resolved == wallet).then_some(name))
    }

    async fn resolver_of(&self, node: B256) -> Result<Option<Address>> {
        let resolver = self
            .client
            .call_contract(ENS_REGISTRY, IEnsRegistry::resolverCall { node })
            .await
            .context("ENS registry resolver() failed")?;
        Ok((!resolver.is_zero()).then_some(resolver))
    }
}

#[async_trait]
impl NameResolver for EnsNameResolver {
    async fn display_name(&self, wallet: Address) -> String {
        match self.lookup(wallet).await {
            Ok(Some(name)) => name,
            Ok(None) => fallback_name(&wallet),
            Err(e) => {
                debug!("ENS lookup for {} failed: {:#}", wallet, e);
                fallback_name(&wallet)
            }
        }
    }
}

pub fn reverse_name(wallet: &Address) -> String {
    format!("{}.addr.reverse", alloy_primitives::hex::encode(wallet))
}

/// EIP-137 namehash.
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }

    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }

    node
}
