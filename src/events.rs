use alloy::rpc::types::Log;
use alloy::sol;
use alloy_primitives::{Address, B256, Bytes};
use thiserror::Error;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    interface IERC20Metadata {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }

    interface IERC721 {
        function ownerOf(uint256 tokenId) external view returns (address);
    }

    interface IEnsRegistry {
        function resolver(bytes32 node) external view returns (address);
    }

    interface IEnsResolver {
        function name(bytes32 node) external view returns (string);
        function addr(bytes32 node) external view returns (address);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicDecodeError {
    #[error("log has {0} topics, expected at least 3")]
    MissingTopics(usize),
    #[error("topic {0} is not a left-padded address")]
    NotAnAddress(usize),
}

/// One Transfer log, decoded just far enough to decide whether anyone cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub network: String,
    pub contract_address: Address,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub topics: Vec<B256>,
    pub transaction_hash: Option<B256>,
}

impl TransferEvent {
    pub fn from_log(network: &str, log: &Log) -> Result<Self, TopicDecodeError> {
        let topics = log.topics();
        if topics.len() < 3 {
            return Err(TopicDecodeError::MissingTopics(topics.len()));
        }

        Ok(TransferEvent {
            network: network.to_string(),
            contract_address: log.address(),
            from: topic_to_address(&topics[1]).ok_or(TopicDecodeError::NotAnAddress(1))?,
            to: topic_to_address(&topics[2]).ok_or(TopicDecodeError::NotAnAddress(2))?,
            data: log.data().data.clone(),
            topics: topics.to_vec(),
            transaction_hash: log.transaction_hash,
        })
    }

    /// Third indexed topic, where ERC-721 style transfers carry the token id.
    pub fn token_id_topic(&self) -> Option<&B256> {
        self.topics.get(3)
    }

    pub fn transaction_hash_hex(&self) -> String {
        self.transaction_hash
            .map(|hash| format!("{hash:?}"))
            .unwrap_or_default()
    }
}

pub fn topic_to_address(topic: &B256) -> Option<Address> {
    if topic[..12].iter().any(|byte| *byte != 0) {
        return None;
    }
    Some(Address::from_word(*topic))
}

pub fn address_to_topic(address: &Address) -> B256 {
    address.into_word()
}
