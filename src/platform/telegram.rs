use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use teloxide::dispatching::{DefaultKey, ShutdownToken};
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::update_listeners::webhooks;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::config::Transport;
use crate::platform::IncomingMessage;
use crate::router::Router;

/// Telegram rejects messages over 4096 chars
const MAX_REPLY_LEN: usize = 4000;

/// Sending a reply back through Telegram failed.
#[derive(Debug, Error)]
#[error("failed to reply to message {message_id} in chat {chat_id}")]
pub struct TransportError {
    chat_id: i64,
    message_id: i32,
    #[source]
    source: teloxide::RequestError,
}

/// Logs handler failures with their context. Users get no reply for these.
struct ReplyErrorHandler;

impl ErrorHandler<TransportError> for ReplyErrorHandler {
    fn handle_error(
        self: Arc<Self>,
        error: TransportError,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            error!("Update handling failed: {:#}", anyhow::Error::new(error));
        })
    }
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // Always take at least one char, even when max_len is narrower than it
        if end == start {
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

fn build_dispatcher(bot: Bot, router: Arc<Router>) -> Dispatcher<Bot, TransportError, DefaultKey> {
    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(Arc::new(ReplyErrorHandler))
        .build()
}

/// Run the Telegram bot until SIGINT or SIGTERM
pub async fn run(bot_token: &str, transport: &Transport, router: Arc<Router>) -> Result<()> {
    let bot = Bot::new(bot_token);

    match transport {
        Transport::Webhook { port, url } => run_webhook(bot, router, *port, url.clone()).await,
        Transport::Polling => {
            info!("Starting Telegram bot in polling mode...");
            let mut dispatcher = build_dispatcher(bot, router);
            spawn_shutdown_listener(dispatcher.shutdown_token());
            dispatcher.dispatch().await;
            info!("Dispatcher stopped");
            Ok(())
        }
    }
}

async fn run_webhook(bot: Bot, router: Arc<Router>, port: u16, url: Url) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener to {addr}"))?;
    info!("Webhook listener bound to {}", addr);

    // Registers `url` with Telegram; the route path is taken from the URL.
    let options = webhooks::Options::new(addr, url);
    let (listener, stop_flag, app) = webhooks::axum_to_router(bot.clone(), options)
        .await
        .context("Failed to register webhook with Telegram")?;
    let app = app.route("/health", get(|| async { "ok" }));

    let server = tokio::spawn(async move {
        axum::serve(tcp, app)
            .with_graceful_shutdown(stop_flag)
            .await
    });

    info!("Starting Telegram bot in webhook mode...");
    let mut dispatcher = build_dispatcher(bot, router);
    spawn_shutdown_listener(dispatcher.shutdown_token());
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    server
        .await
        .context("Webhook server task panicked")?
        .context("Webhook server error")?;
    info!("Webhook listener released");

    Ok(())
}

fn spawn_shutdown_listener(token: ShutdownToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping dispatcher...");
        match token.shutdown() {
            Ok(done) => done.await,
            Err(_) => warn!("Shutdown requested before the dispatcher was running"),
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    me: Me,
    router: Arc<Router>,
) -> Result<(), TransportError> {
    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    let incoming = IncomingMessage {
        chat_id: msg.chat.id.0.to_string(),
        user_id: msg.from.as_ref().map(|user| user.id.0.to_string()),
        text,
    };

    info!(
        "Telegram message in chat {} from {:?}: {}",
        incoming.chat_id, incoming.user_id, incoming.text
    );

    let reply = router.handle(&incoming, me.user.username.as_deref()).await;

    for chunk in split_message(&reply, MAX_REPLY_LEN) {
        bot.send_message(msg.chat.id, chunk)
            .await
            .map_err(|source| TransportError {
                chat_id: msg.chat.id.0,
                message_id: msg.id.0,
                source,
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hola", MAX_REPLY_LEN), vec!["hola"]);
    }

    #[test]
    fn test_split_prefers_whitespace() {
        let chunks = split_message("aaaa bbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa bbbb\n", "cccc"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_narrower_than_a_char_still_advances() {
        let chunks = split_message("日本", 1);
        assert_eq!(chunks, vec!["日", "本"]);
    }

    #[test]
    fn test_transport_error_names_the_chat() {
        let err = TransportError {
            chat_id: 42,
            message_id: 7,
            source: teloxide::RequestError::Io(std::io::Error::other("reset").into()),
        };
        assert_eq!(err.to_string(), "failed to reply to message 7 in chat 42");
        assert!(std::error::Error::source(&err).is_some());
    }
}
