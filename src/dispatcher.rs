use crate::classifier::TokenDetails;
use crate::config::NetworkConfig;
use crate::events::TransferEvent;
use crate::registry::SubscriptionRegistry;
use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound text delivery to one recipient. Text is Telegram MarkdownV2 and
/// link previews are off.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Names a subscriber gave to the two sides of a transfer, if they track them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Participants {
    from_name: Option<String>,
    to_name: Option<String>,
}

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Dispatcher { registry, notifier }
    }

    /// Sends one message per interested subscriber and returns how many were delivered.
    pub async fn dispatch(
        &self,
        network: &NetworkConfig,
        event: &TransferEvent,
        details: &TokenDetails,
    ) -> usize {
        let recipients = self.recipients(event);
        if recipients.is_empty() {
            debug!(
                "No subscriber left for transfer {} on {}",
                event.transaction_hash_hex(),
                network.name
            );
            return 0;
        }

        let deliveries = recipients.into_iter().map(|(subscriber, participants)| {
            let text = format_message(network, event, details, &participants);
            async move {
                match self.notifier.send(&subscriber, &text).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "Failed to notify {} about {} on {}: {}",
                            subscriber,
                            event.transaction_hash_hex(),
                            network.name,
                            e
                        );
                        false
                    }
                }
            }
        });

        join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    /// Union of the subscribers tracking either side, one entry per subscriber.
    fn recipients(&self, event: &TransferEvent) -> BTreeMap<String, Participants> {
        let mut recipients: BTreeMap<String, Participants> = BTreeMap::new();

        for (subscriber, name) in self.registry.subscribers_tracking(&event.from) {
            recipients.entry(subscriber).or_default().from_name = Some(name);
        }
        for (subscriber, name) in self.registry.subscribers_tracking(&event.to) {
            recipients.entry(subscriber).or_default().to_name = Some(name);
        }

        recipients
    }
}

fn format_message(
    network: &NetworkConfig,
    event: &TransferEvent,
    details: &TokenDetails,
    participants: &Participants,
) -> String {
    let from = participant_link(network, &event.from, participants.from_name.as_deref());
    let to = participant_link(network, &event.to, participants.to_name.as_deref());
    let tx_url = network.tx_url(&event.transaction_hash_hex());

    let mut message = format!(
        "🔔 Giao dịch mới trên *{}*\n\\- Từ: {}\n\\- Đến: {}\n\\- Loại: *{}*\n",
        escape_markdown(&network.name),
        from,
        to,
        escape_markdown(details.kind_label())
    );

    match details {
        TokenDetails::Fungible { amount, symbol } => {
            message.push_str(&format!(
                "\\- Số lượng: *{} {}*\n",
                escape_markdown(amount),
                escape_markdown(symbol)
            ));
        }
        TokenDetails::UniqueNonFungible { token_id } => {
            message.push_str(&format!("\\- ID NFT: *{}*\n", escape_markdown(token_id)));
        }
        TokenDetails::SemiFungible { token_id, quantity } => {
            message.push_str(&format!(
                "\\- ID NFT: *{}*\n\\- Số lượng: *{}*\n",
                escape_markdown(token_id),
                escape_markdown(quantity)
            ));
        }
    }

    message.push_str(&format!(
        "\\- TxHash: [Click để xem chi tiết]({})",
        escape_link_url(&tx_url)
    ));
    message
}

fn participant_link(network: &NetworkConfig, address: &Address, name: Option<&str>) -> String {
    let checksummed = address.to_checksum(None);
    let label = name.unwrap_or(&checksummed);
    format!(
        "[{}]({})",
        escape_markdown(label),
        escape_link_url(&network.address_url(&checksummed))
    )
}

/// Escapes every character MarkdownV2 reserves, so `text` renders literally
/// anywhere outside code spans, including inside bold and link text.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*'
                | '['
                | ']'
                | '('
                | ')'
                | '~'
                | '`'
                | '>'
                | '#'
                | '+'
                | '-'
                | '='
                | '|'
                | '{'
                | '}'
                | '.'
                | '!'
                | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inside the `(...)` of an inline link only `)` and `\` must be escaped.
fn escape_link_url(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}


#[cfg(test)]
mod tests {
    use super::test_notifier::RecordingNotifier;
    use super::*;
    use crate::events::test_logs::{amount_data, transfer_log};
    use crate::registry::test_store::MemoryStore;
    use alloy_primitives::address;
    use std::collections::HashSet;

    const TOKEN: Address = address!("0x1111111111111111111111111111111111111111");
    const ALICE: Address = address!("0x00000000000000000000000000000000000000aa");
    const BOB: Address = address!("0x00000000000000000000000000000000000000bb");

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "base".to_string(),
            explorer_url: "https://basescan.org".to_string(),
            rpc_urls: vec![],
        }
    }

    fn event() -> TransferEvent {
        let log = transfer_log(TOKEN, ALICE, BOB, None, amount_data(1));
        TransferEvent::from_log("base", &log).unwrap()
    }

    fn fungible() -> TokenDetails {
        TokenDetails::Fungible {
            amount: "1.0".to_string(),
            symbol: "USDC".to_string(),
        }
    }

    fn registry() -> Arc<SubscriptionRegistry> {
        Arc::new(SubscriptionRegistry::new(Arc::new(MemoryStore::default())))
    }

    #[tokio::test]
    async fn subscriber_tracking_both_sides_gets_one_message() {
        let registry = registry();
        registry.toggle("U1", ALICE, Some("Alice".to_string())).unwrap();
        registry.toggle("U1", BOB, Some("Bob".to_string())).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(registry, notifier.clone());

        let delivered = dispatcher.dispatch(&network(), &event(), &fungible()).await;

        assert_eq!(delivered, 1);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("\\- Từ: [Alice](https://basescan.org/address/"));
        assert!(sent[0].1.contains("\\- Đến: [Bob](https://basescan.org/address/"));
    }

    #[tokio::test]
    async fn receiver_side_subscriber_sees_raw_sender_and_own_name() {
        let registry = registry();
        registry.toggle("U2", BOB, Some("Bob".to_string())).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(registry, notifier.clone());

        dispatcher.dispatch(&network(), &event(), &fungible()).await;

        let sent = notifier.sent.lock().unwrap();
        let text = &sent[0].1;
        assert_eq!(sent[0].0, "U2");
        assert!(text.contains(&format!("\\- Từ: [{}]", ALICE.to_checksum(None))));
        assert!(text.contains("\\- Đến: [Bob]"));
        assert!(text.contains("\\- Số lượng: *1\\.0 USDC*"));
        assert!(text.contains("https://basescan.org/tx/0xabab"));
    }

    #[tokio::test]
    async fn failed_delivery_does_not_block_other_subscribers() {
        let registry = registry();
        registry.toggle("U1", ALICE, None).unwrap();
        registry.toggle("U2", ALICE, None).unwrap();
        registry.toggle("U3", BOB, None).unwrap();
        let notifier = Arc::new(RecordingNotifier {
            failing: HashSet::from(["U2".to_string()]),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(registry, notifier.clone());

        let delivered = dispatcher.dispatch(&network(), &event(), &fungible()).await;

        assert_eq!(delivered, 2);
        let recipients: Vec<String> = notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect();
        assert_eq!(recipients, vec!["U1".to_string(), "U3".to_string()]);
    }

    #[test]
    fn message_lines_follow_token_kind() {
        let participants = Participants::default();

        let unique = format_message(
            &network(),
            &event(),
            &TokenDetails::UniqueNonFungible {
                token_id: "42".to_string(),
            },
            &participants,
        );
        assert!(unique.contains("\\- Loại: *ERC\\-721*\n\\- ID NFT: *42*\n"));

        let semi = format_message(
            &network(),
            &event(),
            &TokenDetails::SemiFungible {
                token_id: "7".to_string(),
                quantity: "3".to_string(),
            },
            &participants,
        );
        assert!(semi.contains("\\- ID NFT: *7*\n\\- Số lượng: *3*\n"));
        assert!(semi.starts_with("🔔 Giao dịch mới trên *base*\n"));
    }

    #[test]
    fn escapes_markdown_in_names() {
        assert_eq!(escape_markdown("my_wallet*1"), "my\\_wallet\\*1");
        assert_eq!(escape_markdown("a.b-c (d)!"), "a\\.b\\-c \\(d\\)\\!");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn labels_inside_links_and_bold_are_escaped() {
        let participants = Participants {
            from_name: Some("my_wallet".to_string()),
            to_name: None,
        };
        let details = TokenDetails::Fungible {
            amount: "0.5".to_string(),
            symbol: "W_ETH".to_string(),
        };

        let text = format_message(&network(), &event(), &details, &participants);

        assert!(text.contains("\\- Từ: [my\\_wallet](https://basescan.org/address/"));
        assert!(text.contains("*0\\.5 W\\_ETH*"));
        assert!(text.ends_with(&format!(
            "[Click để xem chi tiết](https://basescan.org/tx/0x{})",
            "ab".repeat(32)
        )));
    }
}
