//! Best-effort token standard detection by probing the emitting contract.
//!
//! Strategies run in order and the first one that succeeds wins. A contract
//! that reverts for unrelated reasons falls down the chain and is reported as a
//! less specific kind; that imprecision is accepted.

use crate::events::TransferEvent;
use crate::rpc::ChainClient;
use alloy_primitives::U256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDetails {
    Fungible { amount: String, symbol: String },
    UniqueNonFungible { token_id: String },
    SemiFungible { token_id: String, quantity: String },
}

impl TokenDetails {
    pub fn kind_label(&self) -> &'static str {
        match self {
            TokenDetails::Fungible { .. } => "ERC-20",
            TokenDetails::UniqueNonFungible { .. } => "ERC-721",
            TokenDetails::SemiFungible { .. } => "ERC-1155",
        }
    }
}

#[async_trait]
pub trait ClassifyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, chain: &dyn ChainClient, event: &TransferEvent) -> Result<TokenDetails>;
}

/// `decimals()` and `symbol()` both answer: an ERC-20 style token.
pub struct FungibleProbe;

#[async_trait]
impl ClassifyStrategy for FungibleProbe {
    fn name(&self) -> &'static str {
        "fungible"
    }

    async fn probe(&self, chain: &dyn ChainClient, event: &TransferEvent) -> Result<TokenDetails> {
        let (decimals, symbol) = tokio::try_join!(
            chain.token_decimals(event.contract_address),
            chain.token_symbol(event.contract_address)
        )?;

        let raw = payload_value(&event.data)?;
        Ok(TokenDetails::Fungible {
            amount: format_amount(raw, decimals)?,
            symbol,
        })
    }
}

/// `ownerOf(tokenId)` answers for the id in the fourth topic: an ERC-721 token.
pub struct UniqueOwnershipProbe;

#[async_trait]
impl ClassifyStrategy for UniqueOwnershipProbe {
    fn name(&self) -> &'static str {
        "unique-ownership"
    }

    async fn probe(&self, chain: &dyn ChainClient, event: &TransferEvent) -> Result<TokenDetails> {
        let token_id = token_id(event)?;
        chain.owner_of(event.contract_address, token_id).await?;

        Ok(TokenDetails::UniqueNonFungible {
            token_id: token_id.to_string(),
        })
    }
}

/// Last resort. No ownership check: semi-fungible balances are per holder.
pub struct SemiFungibleFallback;

#[async_trait]
impl ClassifyStrategy for SemiFungibleFallback {
    fn name(&self) -> &'static str {
        "semi-fungible"
    }

    async fn probe(&self, _chain: &dyn ChainClient, event: &TransferEvent) -> Result<TokenDetails> {
        let token_id = token_id(event)?;
        let quantity = payload_value(&event.data)?;

        Ok(TokenDetails::SemiFungible {
            token_id: token_id.to_string(),
            quantity: quantity.to_string(),
        })
    }
}

pub struct TokenClassifier {
    strategies: Vec<Box<dyn ClassifyStrategy>>,
}

impl Default for TokenClassifier {
    fn default() -> Self {
        TokenClassifier::new(vec![
            Box::new(FungibleProbe),
            Box::new(UniqueOwnershipProbe),
            Box::new(SemiFungibleFallback),
        ])
    }
}

impl TokenClassifier {
    pub fn new(strategies: Vec<Box<dyn ClassifyStrategy>>) -> Self {
        TokenClassifier { strategies }
    }

    pub async fn classify(
        &self,
        chain: &dyn ChainClient,
        event: &TransferEvent,
    ) -> Result<TokenDetails> {
        let mut last_error = None;

        for strategy in &self.strategies {
            match strategy.probe(chain, event).await {
                Ok(details) => {
                    debug!(
                        "Classified {:?} on {} as {} via {} probe",
                        event.contract_address,
                        event.network,
                        details.kind_label(),
                        strategy.name()
                    );
                    return Ok(details);
                }
                Err(e) => {
                    debug!(
                        "{} probe failed for {:?} on {}: {}",
                        strategy.name(),
                        event.contract_address,
                        event.network,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No classification strategy configured")))
            .with_context(|| format!("Could not classify token {:?}", event.contract_address))
    }
}

fn token_id(event: &TransferEvent) -> Result<U256> {
    let topic = event
        .token_id_topic()
        .context("Transfer log carries no token id topic")?;
    Ok(U256::from_be_bytes(topic.0))
}

fn payload_value(data: &[u8]) -> Result<U256> {
    U256::try_from_be_slice(data)
        .with_context(|| format!("Payload of {} bytes does not fit in uint256", data.len()))
}

/// Scales `raw` down by `10^decimals`, keeping at least one fractional digit:
/// `1000000` at 6 decimals renders as `1.0`, `1500` at 3 as `1.5`.
pub fn format_amount(raw: U256, decimals: u8) -> Result<String> {
    let scale = U256::from(10u8)
        .checked_pow(U256::from(decimals))
        .with_context(|| format!("10^{decimals} overflows uint256"))?;

    let integer = raw / scale;
    let fraction = raw % scale;

    if decimals == 0 || fraction.is_zero() {
        return Ok(format!("{integer}.0"));
    }

    let digits = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    Ok(format!("{integer}.{}", digits.trim_end_matches('0')))
}


#[cfg(test)]
mod tests {
    use super::test_chain::FakeChain;
    use super::*;
    use crate::events::test_logs::{amount_data, transfer_log};
    use alloy_primitives::{Address, address};
    use std::collections::HashMap;

    const TOKEN: Address = address!("0x1111111111111111111111111111111111111111");
    const FROM: Address = address!("0x00000000000000000000000000000000000000aa");
    const TO: Address = address!("0x00000000000000000000000000000000000000bb");

    fn event(token_id: Option<u64>, data: Vec<u8>) -> TransferEvent {
        let log = transfer_log(TOKEN, FROM, TO, token_id.map(U256::from), data);
        TransferEvent::from_log("ethereum", &log).unwrap()
    }

    #[test]
    fn formats_scaled_amounts() {
        assert_eq!(format_amount(U256::from(1_000_000u64), 6).unwrap(), "1.0");
        assert_eq!(format_amount(U256::from(1_500u64), 3).unwrap(), "1.5");
        assert_eq!(format_amount(U256::from(1u64), 6).unwrap(), "0.000001");
        assert_eq!(format_amount(U256::from(42u64), 0).unwrap(), "42.0");
        assert!(format_amount(U256::from(1u64), 80).is_err());
    }

    #[tokio::test]
    async fn fungible_contract_yields_amount_and_symbol() {
        let chain = FakeChain {
            erc20: HashMap::from([(TOKEN, (6, "USDC".to_string()))]),
            ..Default::default()
        };

        let details = TokenClassifier::default()
            .classify(&chain, &event(None, amount_data(1_000_000)))
            .await
            .unwrap();

        assert_eq!(
            details,
            TokenDetails::Fungible {
                amount: "1.0".to_string(),
                symbol: "USDC".to_string()
            }
        );
    }

    #[tokio::test]
    async fn falls_back_to_unique_when_ownership_confirms() {
        let chain = FakeChain {
            erc721_owners: HashMap::from([((TOKEN, U256::from(42)), TO)]),
            ..Default::default()
        };

        let details = TokenClassifier::default()
            .classify(&chain, &event(Some(42), Vec::new()))
            .await
            .unwrap();

        assert_eq!(
            details,
            TokenDetails::UniqueNonFungible {
                token_id: "42".to_string()
            }
        );
    }

    #[tokio::test]
    async fn falls_back_to_semi_fungible_when_every_probe_reverts() {
        let chain = FakeChain::default();

        let details = TokenClassifier::default()
            .classify(&chain, &event(Some(7), amount_data(3)))
            .await
            .unwrap();

        assert_eq!(
            details,
            TokenDetails::SemiFungible {
                token_id: "7".to_string(),
                quantity: "3".to_string()
            }
        );
        assert_eq!(details.kind_label(), "ERC-1155");
    }

    #[tokio::test]
    async fn fails_when_no_token_id_is_available() {
        let chain = FakeChain::default();

        let result = TokenClassifier::default()
            .classify(&chain, &event(None, amount_data(3)))
            .await;

        assert!(result.is_err());
    }
}
