use crate::commands::{START_TEXT, process_wallet_input};
use crate::dispatcher::escape_markdown;
use crate::names::NameResolver;
use crate::registry::SubscriptionRegistry;
use crate::telegram::{TelegramClient, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls Telegram for text messages and answers each one.
pub async fn run_bot(
    telegram: TelegramClient,
    registry: Arc<SubscriptionRegistry>,
    names: Arc<dyn NameResolver>,
) {
    info!("Chat front end started");
    let mut offset = 0;

    loop {
        let updates = match telegram.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to poll Telegram updates: {:#}", e);
                sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            handle_update(&telegram, &registry, names.as_ref(), update).await;
        }
    }
}

async fn handle_update(
    telegram: &TelegramClient,
    registry: &Arc<SubscriptionRegistry>,
    names: &dyn NameResolver,
    update: Update,
) {
    let Some(message) = update.message else {
        return;
    };
    let Some(text) = message.text.as_deref().map(str::trim) else {
        return;
    };
    let chat_id = message.chat.id.to_string();

    let reply = if text.starts_with("/start") {
        escape_markdown(START_TEXT)
    } else {
        process_wallet_input(registry, names, &chat_id, text).await
    };
    if reply.is_empty() {
        return;
    }

    if let Err(e) = telegram.send_message(&chat_id, &reply).await {
        warn!("Failed to reply to chat {}: {:#}", chat_id, e);
    }
}
