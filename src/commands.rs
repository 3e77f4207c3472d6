use crate::dispatcher::escape_markdown;
use crate::names::NameResolver;
use crate::registry::{SubscriptionRegistry, ToggleAction};
use alloy_primitives::Address;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task;
use tracing::warn;

pub const START_TEXT: &str = "Chào bạn! Hãy gửi cho tôi địa chỉ ví cùng tên (nếu có) theo định dạng:\n\naddress1,name1\naddress2,name2\n\nNếu không có tên, bot sẽ kiểm tra tên ENS hoặc đặt mặc định là 6 ký tự đầu của địa chỉ.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    pub address: Address,
    pub name: Option<String>,
}

/// Accepts `0x` + 40 hex digits. All-lowercase and all-uppercase input is taken
/// as is; mixed case must be a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Result<Address, InputError> {
    let invalid = || InputError::InvalidAddress(raw.to_string());

    let hex = raw.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let address = Address::from_str(raw).map_err(|_| invalid())?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && address.to_checksum(None) != raw {
        return Err(invalid());
    }

    Ok(address)
}

/// One `address[,name]` line. The name is everything after the first comma.
pub fn parse_entry(line: &str) -> Result<WalletEntry, InputError> {
    let (raw_address, raw_name) = match line.split_once(',') {
        Some((address, name)) => (address.trim(), Some(name.trim())),
        None => (line.trim(), None),
    };

    Ok(WalletEntry {
        address: parse_address(raw_address)?,
        name: raw_name.filter(|n| !n.is_empty()).map(str::to_string),
    })
}

/// Toggles every line of `input` for `subscriber_id` and returns the reply,
/// one line per non-blank input line, in input order. A line whose store write
/// fails gets its own failure line; lines before and after it still apply.
pub async fn process_wallet_input(
    registry: &Arc<SubscriptionRegistry>,
    names: &dyn NameResolver,
    subscriber_id: &str,
    input: &str,
) -> String {
    let mut replies = Vec::new();

    for line in input.lines().filter(|l| !l.trim().is_empty()) {
        let entry = match parse_entry(line) {
            Ok(entry) => entry,
            Err(InputError::InvalidAddress(raw)) => {
                replies.push(format!(
                    "⚠️ Địa chỉ không hợp lệ: {}",
                    escape_markdown(&raw)
                ));
                continue;
            }
        };

        let wallet = entry.address;
        let proposed_name = if registry.is_tracked(subscriber_id, &wallet) {
            None
        } else {
            match entry.name {
                Some(name) => Some(name),
                None => Some(names.display_name(wallet).await),
            }
        };

        // rusqlite write under the registry lock, kept off the async workers
        let toggled = {
            let registry = Arc::clone(registry);
            let subscriber_id = subscriber_id.to_string();
            task::spawn_blocking(move || registry.toggle(&subscriber_id, wallet, proposed_name))
                .await
        };

        let checksummed = wallet.to_checksum(None);
        let outcome = match toggled.map_err(anyhow::Error::from).and_then(|r| r) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Failed to toggle {} for chat {}: {:#}",
                    checksummed, subscriber_id, e
                );
                replies.push(format!(
                    "❌ Không thể cập nhật ví `{checksummed}`, vui lòng thử lại sau\\."
                ));
                continue;
            }
        };

        replies.push(match outcome.action {
            ToggleAction::Added => format!(
                "🔔 Đã thêm ví `{}` với tên *{}* vào danh sách theo dõi",
                checksummed,
                escape_markdown(&outcome.name)
            ),
            ToggleAction::Removed => format!(
                "🔕 Ngừng theo dõi ví `{}` \\({}\\)",
                checksummed,
                escape_markdown(&outcome.name)
            ),
        });
    }

    replies.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::test_resolver::FixedNames;
    use crate::registry::test_store::MemoryStore;
    use alloy_primitives::address;
    use std::collections::{HashMap, HashSet};

    const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    fn registry() -> Arc<SubscriptionRegistry> {
        Arc::new(SubscriptionRegistry::new(Arc::new(MemoryStore::default())))
    }

    #[test]
    fn address_validation_follows_checksum_rules() {
        assert!(parse_address(USDT).is_ok());
        assert!(parse_address(&USDT.to_lowercase()).is_ok());
        assert!(parse_address(&format!("0x{}", USDT[2..].to_uppercase())).is_ok());
        assert!(parse_address("0xdAC17F958D2ee523a2206206994597C13D831Ec7").is_err());
        assert!(parse_address("dAC17F958D2ee523a2206206994597C13D831ec7").is_err());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn entry_name_is_optional_and_trimmed() {
        let entry = parse_entry(&format!(" {USDT} , Tether Treasury ")).unwrap();
        assert_eq!(entry.name.as_deref(), Some("Tether Treasury"));

        let bare = parse_entry(USDT).unwrap();
        assert_eq!(bare.name, None);

        let empty_name = parse_entry(&format!("{USDT},")).unwrap();
        assert_eq!(empty_name.name, None);
    }

    #[tokio::test]
    async fn same_line_twice_adds_then_removes() {
        let registry = registry();
        let names = FixedNames::default();
        let line = format!("{USDT},Alice");

        let added = process_wallet_input(&registry, &names, "U1", &line).await;
        assert!(added.starts_with("🔔 Đã thêm ví"));
        assert!(added.contains("*Alice*"));
        assert!(registry.is_tracked("U1", &parse_address(USDT).unwrap()));

        let removed = process_wallet_input(&registry, &names, "U1", &line).await;
        assert!(removed.starts_with("🔕 Ngừng theo dõi ví"));
        assert!(removed.contains("\\(Alice\\)"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invalid_lines_are_reported_without_aborting_batch() {
        let registry = registry();
        let vitalik = address!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        let names = FixedNames(HashMap::from([(vitalik, "vitalik.eth".to_string())]));
        let input = format!("not-an-address\n\n{}\n{USDT}", vitalik.to_checksum(None));

        let reply = process_wallet_input(&registry, &names, "U1", &input).await;
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "⚠️ Địa chỉ không hợp lệ: not\\-an\\-address");
        assert!(lines[1].contains("*vitalik\\.eth*"));
        assert!(lines[2].contains("*0xdAC1*"));
        assert_eq!(registry.tracked_wallet_count(), 2);
    }

    #[tokio::test]
    async fn names_and_echoed_input_are_escaped() {
        let registry = registry();
        let names = FixedNames::default();
        let input = format!("{USDT},cold_wallet\nbad_addr");

        let reply = process_wallet_input(&registry, &names, "U1", &input).await;
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(
            lines[0],
            format!("🔔 Đã thêm ví `{USDT}` với tên *cold\\_wallet* vào danh sách theo dõi")
        );
        assert_eq!(lines[1], "⚠️ Địa chỉ không hợp lệ: bad\\_addr");
        assert_eq!(
            registry.name_for("U1", &parse_address(USDT).unwrap()).as_deref(),
            Some("cold_wallet")
        );
    }

    #[tokio::test]
    async fn store_failure_is_reported_per_line() {
        let alice = address!("0x00000000000000000000000000000000000000aa");
        let bob = address!("0x00000000000000000000000000000000000000bb");
        let carol = address!("0x00000000000000000000000000000000000000cc");
        let store = MemoryStore {
            fail_wallets: HashSet::from([bob]),
            ..Default::default()
        };
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(store)));
        let names = FixedNames::default();
        let input = format!(
            "{},A\n{}\n{},C",
            alice.to_checksum(None),
            bob.to_checksum(None),
            carol.to_checksum(None)
        );

        let reply = process_wallet_input(&registry, &names, "U1", &input).await;
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("🔔 Đã thêm ví"));
        assert_eq!(
            lines[1],
            format!(
                "❌ Không thể cập nhật ví `{}`, vui lòng thử lại sau\\.",
                bob.to_checksum(None)
            )
        );
        assert!(lines[2].contains("*C*"));
        assert!(registry.is_tracked("U1", &alice));
        assert!(!registry.is_tracked("U1", &bob));
        assert!(registry.is_tracked("U1", &carol));
    }
}
