//! Bot bootstrap: replay the conversation log into history, wire the responder and router to a
//! transport, and run until the transport finishes or the process is asked to stop.

use crate::channels::ChatTransport;
use crate::config::{self, Config, Responder};
use crate::dealer::{EchoGenerator, MessageDealer, ResponseGenerator};
use crate::history::HistoryStore;
use crate::llm::OllamaClient;
use crate::log_store::{group_by_chat, ConversationLog};
use crate::router::Router;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Open the log and rebuild per-chat history from it. A corrupt log is an error: the bot must
/// not run with history it could not reconstruct.
pub async fn open_log_and_history(config: &Config) -> Result<(Arc<ConversationLog>, HistoryStore)> {
    let path = config::resolve_log_file(config);
    let log = ConversationLog::open(&path)
        .await
        .with_context(|| format!("opening conversation log {}", path.display()))?;
    let messages = log
        .load_all()
        .await
        .with_context(|| format!("replaying conversation log {}", path.display()))?;
    let history = group_by_chat(messages);
    log::info!(
        "loaded history for {} chat(s) from {}",
        history.len(),
        path.display()
    );
    Ok((Arc::new(log), HistoryStore::from_history(history)))
}

/// Build the configured responder. The transport doubles as the name directory for prompts.
pub fn build_generator(
    config: &Config,
    history: HistoryStore,
    transport: Arc<dyn ChatTransport>,
) -> Result<Arc<dyn ResponseGenerator>> {
    let bot_name = config.bot.name.clone();
    match config.bot.responder {
        Responder::Echo => {
            log::info!("responder: echo");
            Ok(Arc::new(EchoGenerator::new(bot_name)))
        }
        Responder::Llm => {
            let client = OllamaClient::new(
                Some(config::resolve_llm_base_url(config)),
                config::resolve_model(config),
                Duration::from_secs(config.llm.timeout_secs.max(1)),
            )
            .context("building ollama client")?;
            log::info!("responder: llm (model {})", client.model());
            Ok(Arc::new(
                MessageDealer::new(bot_name, Arc::new(client), history).with_directory(transport),
            ))
        }
    }
}

/// Run the bot on `transport` until it stops delivering messages or Ctrl+C / SIGTERM.
/// Queued messages are answered when the transport finishes; a signal stops right away.
pub async fn run_bot(config: Config, transport: Arc<dyn ChatTransport>) -> Result<()> {
    let (log, history) = open_log_and_history(&config).await?;
    let generator = build_generator(&config, history, transport.clone())?;
    let router = Router::new(transport.clone(), log, generator)
        .with_poll_interval(Duration::from_millis(config.router.poll_interval_ms));

    for ev in &config.timed_events {
        match router
            .register_timed_event(ev.interval(), &ev.chat_id, &ev.sender_id, &ev.text)
            .await
        {
            Ok(handle) => log::info!("timed event {} for chat {}", handle, ev.chat_id),
            Err(e) => log::warn!("skipping timed event for chat {}: {}", ev.chat_id, e),
        }
    }

    router.start().await.context("starting router")?;

    let transport_finished = match transport.clone().start_inbound(router.inbox()) {
        Some(listener) => {
            tokio::select! {
                _ = shutdown_signal() => false,
                res = listener => {
                    if let Err(e) = res {
                        log::warn!("transport listener failed: {}", e);
                    }
                    log::info!("transport {} finished", transport.id());
                    true
                }
            }
        }
        None => {
            shutdown_signal().await;
            false
        }
    };

    transport.stop();
    if transport_finished {
        router.drain().await;
    } else {
        router.stop().await;
    }
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
