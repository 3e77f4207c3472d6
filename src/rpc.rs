use crate::events::{IERC20Metadata, IERC721, Transfer};
use alloy::network::TransactionBuilder;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything the scanner and classifier need from one network.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;

    /// All Transfer-signature logs in `[from_block, to_block]`, from any contract.
    async fn transfer_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    async fn owner_of(&self, token: Address, token_id: U256) -> Result<Address>;
}

#[derive(Clone)]
pub struct RpcClient {
    network: String,
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(network: &str, rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one RPC URL must be provided for {}",
                network
            ));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL for {}: {}", network, url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            network: network.to_string(),
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating {} to RPC provider #{}", self.network, next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {} ({}): {}, rotating provider",
            self.network, current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {} ({}), rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            self.network,
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(block_number)) => Ok(block_number),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    /// Single `eth_call` with no retry: a revert is an answer, not a transient fault.
    pub async fn call_contract<C: SolCall>(&self, address: Address, call: C) -> Result<C::Return> {
        let request = TransactionRequest::default()
            .with_to(address)
            .with_input(call.abi_encode());

        let output = match timeout(REQUEST_TIMEOUT, self.get_provider().call(request)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(anyhow::anyhow!("eth_call to {:?} failed: {}", address, e)),
            Err(_) => return Err(self.handle_timeout()),
        };

        C::abi_decode_returns(&output)
            .map_err(|e| anyhow::anyhow!("Undecodable return from {:?}: {}", address, e))
    }

    async fn get_logs_internal(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let filter = Filter::new()
                    .event_signature(Transfer::SIGNATURE_HASH)
                    .from_block(from_block)
                    .to_block(to_block);

                match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();

                        if error_str.contains("exceeds max results") {
                            debug!(
                                "Max results exceeded on {} for blocks {}-{}, will split range",
                                client.network, from_block, to_block
                            );
                            // surfaced as a non-retryable inner error so the caller can split
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    pub async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self.get_logs_internal(current_from, to_block).await {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();

                    if !error_str.contains("exceeds max results") {
                        return Err(e);
                    }

                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&error_str)
                    else {
                        return Err(e);
                    };

                    // A suggestion that does not move forward would loop forever.
                    if suggested_from != current_from || suggested_to < suggested_from {
                        return Err(e);
                    }

                    info!(
                        "Hit max results limit on {} for blocks {}-{}, splitting at block {}",
                        self.network, current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(suggested_from, suggested_to)
                        .await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn latest_block(&self) -> Result<u64> {
        self.get_latest_block().await
    }

    async fn transfer_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        self.get_logs(from_block, to_block).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.call_contract(token, IERC20Metadata::decimalsCall {})
            .await
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        self.call_contract(token, IERC20Metadata::symbolCall {}).await
    }

    async fn owner_of(&self, token: Address, token_id: U256) -> Result<Address> {
        self.call_contract(token, IERC721::ownerOfCall { tokenId: token_id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggested_range_from_provider_error() {
        let error = "query exceeds max results 10000, retry with the range 19000000-19000042";
        assert_eq!(
            RpcClient::parse_max_results_error(error),
            Some((19000000, 19000042))
        );
        assert_eq!(RpcClient::parse_max_results_error("rate limited"), None);
    }

    #[test]
    fn rejects_empty_url_list() {
        assert!(RpcClient::new("base", &[]).is_err());
        assert!(RpcClient::new("base", &["not a url".to_string()]).is_err());
    }

    #[test]
    fn rotates_through_configured_urls() {
        let urls = vec![
            "http://127.0.0.1:8545".to_string(),
            "http://127.0.0.1:8546".to_string(),
        ];
        let client = RpcClient::new("ethereum", &urls).unwrap();

        assert_eq!(client.get_current_url(), "http://127.0.0.1:8545");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://127.0.0.1:8546");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://127.0.0.1:8545");
    }
}
