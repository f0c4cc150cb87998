//! Console channel: each stdin line is a direct message from one local user; replies go to stdout.

use crate::channels::transport::{ChatTransport, TransportError};
use crate::message::{ChatType, Message};
use crate::router::Inbox;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

pub const CONSOLE_CHAT_ID: &str = "console";
pub const CONSOLE_USER_ID: &str = "console-user";

/// Stdin/stdout connector that behaves like a single direct chat.
pub struct ConsoleChannel {
    id: String,
    chat_id: String,
    user_id: String,
    user_name: String,
    running: AtomicBool,
    shutdown: Notify,
}

impl ConsoleChannel {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            id: "console".to_string(),
            chat_id: CONSOLE_CHAT_ID.to_string(),
            user_id: CONSOLE_USER_ID.to_string(),
            user_name: user_name.into(),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Turn one input line into an inbound message; blank lines are skipped.
    fn inbound_from_line(&self, line: &str) -> Option<Message> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        Some(Message::text(
            self.chat_id.clone(),
            ChatType::Direct,
            self.user_id.clone(),
            text,
        ))
    }
}

/// Read stdin on a plain OS thread. A read blocked on the terminal never holds up runtime
/// shutdown; the thread ends with the process or when the receiver is dropped.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("kiwi-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("console: failed to spawn stdin reader: {}", e);
    }
    rx
}

async fn run_line_loop(
    channel: Arc<ConsoleChannel>,
    mut lines: mpsc::Receiver<std::io::Result<String>>,
    inbox: Inbox,
) {
    while channel.running() {
        let next = tokio::select! {
            _ = channel.shutdown.notified() => break,
            next = lines.recv() => next,
        };
        match next {
            Some(Ok(line)) => {
                if line.trim().eq_ignore_ascii_case("/quit") {
                    break;
                }
                let Some(msg) = channel.inbound_from_line(&line) else {
                    continue;
                };
                if let Err(e) = inbox.deliver(msg).await {
                    log::debug!("console: inbox closed, stopping loop: {}", e);
                    break;
                }
            }
            None => break,
            Some(Err(e)) => {
                log::warn!("console: reading stdin failed: {}", e);
                break;
            }
        }
    }
    channel.running.store(false, Ordering::SeqCst);
    log::info!("console channel: input loop stopped");
}

#[async_trait]
impl ChatTransport for ConsoleChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        let line = format!("< {}\n", message.text_or_placeholder());
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Send {
                chat_id: message.chat_id.clone(),
                reason: e.to_string(),
            })?;
        stdout.flush().await.map_err(|e| TransportError::Send {
            chat_id: message.chat_id.clone(),
            reason: e.to_string(),
        })
    }

    async fn display_name(&self, id: &str) -> Option<String> {
        (id == self.user_id).then(|| self.user_name.clone())
    }

    fn start_inbound(self: Arc<Self>, inbox: Inbox) -> Option<JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("console channel: reading messages from stdin");
        let lines = spawn_stdin_reader();
        Some(tokio::spawn(run_line_loop(self, lines, inbox)))
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}
