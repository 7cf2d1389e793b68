use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::Notify;

use group_chat_connector::config::Settings;
use group_chat_connector::protocol::{inbound, ChatMessage, ServerError, TypingNotice};
use group_chat_connector::telemetry::init_tracing;
use group_chat_connector::{ChatConnector, ConnectionEvent};

/// How long to wait for the close handshake on exit
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.logging)?;
    tracing::info!(
        server_url = %settings.connector.server_url,
        group_id = %settings.connector.group_id,
        "Configuration loaded"
    );

    let connector = ChatConnector::with_config(settings.connector_config());
    let closed = Arc::new(Notify::new());
    register_handlers(&connector, closed.clone());

    tracing::info!(
        endpoint = %connector.config().endpoint(),
        user_id = %connector.config().user_id,
        "Joining group chat"
    );
    connector.connect();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    connector.handle_typing();
                    if !connector.send_message(text) {
                        tracing::warn!("Not connected, message dropped");
                    }
                }
                None => {
                    tracing::info!("End of input");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    if connector.is_connected() {
        connector.disconnect();
        if tokio::time::timeout(CLOSE_TIMEOUT, closed.notified()).await.is_err() {
            tracing::warn!("Timed out waiting for the socket to close");
        }
    }

    tracing::info!("Client shutdown complete");
    Ok(())
}

fn register_handlers(connector: &ChatConnector, closed: Arc<Notify>) {
    connector.on_message_as(inbound::MESSAGE_HISTORY, |history: Vec<ChatMessage>| {
        tracing::info!(count = history.len(), "Received message history");
        for message in &history {
            print_message(message);
        }
    });

    connector.on_message_as(inbound::NEW_MESSAGE, |message: ChatMessage| {
        print_message(&message);
    });

    connector.on_message_as(inbound::MESSAGE_SENT, |message: ChatMessage| {
        tracing::debug!(message_id = %message.id, "Message stored by server");
    });

    connector.on_message_as(inbound::USER_TYPING, |notice: TypingNotice| {
        tracing::info!(user_id = %notice.user_id, "User is typing");
    });

    connector.on_message_as(inbound::USER_STOP_TYPING, |notice: TypingNotice| {
        tracing::info!(user_id = %notice.user_id, "User stopped typing");
    });

    connector.on_message_as(inbound::ERROR, |error: ServerError| {
        tracing::warn!(message = %error.message, "Server reported an error");
    });

    connector.on_connection(ConnectionEvent::Connected, |_| {
        tracing::info!("Chat session ready, type a message and press enter");
    });

    connector.on_connection(ConnectionEvent::Disconnected, move |_| {
        closed.notify_one();
    });

    connector.on_connection(ConnectionEvent::Error, |error| {
        if let Some(error) = error {
            tracing::error!(code = error.code(), "Chat connection error");
        }
    });
}

fn print_message(message: &ChatMessage) {
    let author = message.user_name.as_deref().unwrap_or(&message.user_id);
    println!("[{}] {}: {}", message.created_at, author, message.message);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, disconnecting");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, disconnecting");
        }
    }
}
