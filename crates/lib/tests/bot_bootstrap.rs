//! Integration tests for `run_bot`: log replay at startup and a full inbound/outbound pass with a
//! scripted transport that finishes on its own.

use async_trait::async_trait;
use kiwi::bot::{open_log_and_history, run_bot};
use kiwi::channels::{ChatTransport, TransportError};
use kiwi::config::{Config, Responder};
use kiwi::message::{ChatType, Message};
use kiwi::router::Inbox;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delivers a fixed script of direct messages, waits for one reply per message, then finishes.
struct ScriptedTransport {
    script: Vec<&'static str>,
    sent: Mutex<Vec<Message>>,
}

impl ScriptedTransport {
    fn new(script: Vec<&'static str>) -> Self {
        Self {
            script,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn start_inbound(self: Arc<Self>, inbox: Inbox) -> Option<JoinHandle<()>> {
        Some(tokio::spawn(async move {
            for (i, text) in self.script.iter().enumerate() {
                let msg = Message::text("oc_script", ChatType::Direct, "ou_tester", *text)
                    .with_message_id(format!("om_{}", i));
                inbox.deliver(msg).await.unwrap();
                for _ in 0..200 {
                    if self.sent_count() > i {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }))
    }
}

/// Delivers its messages back to back and finishes without waiting for any reply.
struct BurstTransport {
    count: usize,
    sent: Mutex<Vec<Message>>,
}

#[async_trait]
impl ChatTransport for BurstTransport {
    fn id(&self) -> &str {
        "burst"
    }

    async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn start_inbound(self: Arc<Self>, inbox: Inbox) -> Option<JoinHandle<()>> {
        Some(tokio::spawn(async move {
            for i in 0..self.count {
                let msg =
                    Message::text("oc_burst", ChatType::Direct, "ou_tester", format!("m{}", i));
                inbox.deliver(msg).await.unwrap();
            }
        }))
    }
}

fn temp_log_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("kiwi-bot-test-{}", uuid::Uuid::new_v4()))
        .join("log.json")
}

fn echo_config(log_file: PathBuf) -> Config {
    let mut config = Config::default();
    config.bot.responder = Responder::Echo;
    config.log.file = Some(log_file);
    config.router.poll_interval_ms = 20;
    config
}

#[tokio::test]
async fn run_bot_answers_and_persists_until_transport_finishes() {
    let log_file = temp_log_path();
    let transport = Arc::new(ScriptedTransport::new(vec!["hi", "again"]));

    run_bot(echo_config(log_file.clone()), transport.clone())
        .await
        .unwrap();

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].text_content(), Some("Received: hi"));
    assert_eq!(sent[1].text_content(), Some("Received: again"));

    let (_log, history) = open_log_and_history(&echo_config(log_file)).await.unwrap();
    let replayed = history.messages("oc_script").await;
    assert_eq!(replayed.len(), 4);
    assert_eq!(replayed[0].sender_id, "ou_tester");
    assert_eq!(replayed[1].sender_id, "Kiwi");
}

#[tokio::test]
async fn corrupt_log_aborts_startup() {
    let log_file = temp_log_path();
    std::fs::create_dir_all(log_file.parent().unwrap()).unwrap();
    std::fs::write(&log_file, "{\"chat_id\": \"oc_1\", oops").unwrap();

    let transport = Arc::new(ScriptedTransport::new(vec!["never delivered"]));
    let err = run_bot(echo_config(log_file), transport.clone())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("replaying conversation log"));
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn messages_queued_when_transport_finishes_are_still_answered() {
    for _ in 0..10 {
        let transport = Arc::new(BurstTransport {
            count: 5,
            sent: Mutex::new(Vec::new()),
        });
        run_bot(echo_config(temp_log_path()), transport.clone())
            .await
            .unwrap();

        let texts: Vec<String> = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text_or_placeholder().to_string())
            .collect();
        assert_eq!(
            texts,
            (0..5).map(|i| format!("Received: m{}", i)).collect::<Vec<_>>()
        );
    }
}
