//! Durable conversation log: every inbound and outbound message, appended as one JSON
//! document per line. Loading reads any run of whitespace-separated JSON objects, so older
//! logs written as pretty-printed objects back to back (`}\n{`) load too.

use crate::history::History;
use crate::message::Message;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("conversation log io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("conversation log {path} is corrupt (entry {entry}): {source}")]
    Parse {
        path: PathBuf,
        entry: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode message for the conversation log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only log file. One writer at a time: the file handle sits behind a mutex held for a
/// single append.
pub struct ConversationLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ConversationLog {
    /// Open (creating if missing) the log at `path` for appending. Parent directories are created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LogError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one message. Not retried on failure.
    pub async fn append(&self, message: &Message) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Read every logged message in file order.
    pub async fn load_all(&self) -> Result<Vec<Message>, LogError> {
        load_all(&self.path).await
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Read every message from the log at `path`. A missing file is an empty log.
pub async fn load_all(path: &Path) -> Result<Vec<Message>, LogError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("conversation log not found, starting empty: {}", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(LogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_log(&raw).map_err(|(entry, source)| LogError::Parse {
        path: path.to_path_buf(),
        entry,
        source,
    })
}

/// Parse concatenated JSON objects. On failure returns the zero-based index of the bad entry.
pub fn parse_log(raw: &str) -> Result<Vec<Message>, (usize, serde_json::Error)> {
    let mut messages = Vec::new();
    for item in serde_json::Deserializer::from_str(raw).into_iter::<Message>() {
        match item {
            Ok(m) => messages.push(m),
            Err(e) => return Err((messages.len(), e)),
        }
    }
    Ok(messages)
}

/// Partition a flat message list into per-chat history, keeping order within each chat.
pub fn group_by_chat(messages: Vec<Message>) -> History {
    let mut history = History::new();
    for m in messages {
        history.entry(m.chat_id.clone()).or_default().push(m);
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatType;
    use std::sync::Arc;

    fn temp_log_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("kiwi-log-test-{}", uuid::Uuid::new_v4()))
            .join("log.json")
    }

    #[tokio::test]
    async fn append_then_load_keeps_order() {
        let path = temp_log_path();
        let log = ConversationLog::open(&path).await.unwrap();
        let m1 = Message::text("oc_1", ChatType::Direct, "ou_1", "first");
        let m2 = Message::text("oc_1", ChatType::Direct, "Kiwi", "second");
        log.append(&m1).await.unwrap();
        log.append(&m2).await.unwrap();

        let history = group_by_chat(log.load_all().await.unwrap());
        assert_eq!(history.get("oc_1"), Some(&vec![m1, m2]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_never_interleave() {
        let log = Arc::new(ConversationLog::open(temp_log_path()).await.unwrap());
        let long = "x".repeat(4096);
        let mut tasks = Vec::new();
        for i in 0..32 {
            let log = log.clone();
            let text = format!("{}-{}", i, long);
            tasks.push(tokio::spawn(async move {
                let m = Message::text(format!("oc_{}", i % 4), ChatType::Direct, "ou_1", text);
                log.append(&m).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let messages = log.load_all().await.unwrap();
        assert_eq!(messages.len(), 32);
        let mut seen: Vec<usize> = messages
            .iter()
            .map(|m| {
                let (n, rest) = m.text_or_placeholder().split_once('-').unwrap();
                assert_eq!(rest, long);
                n.parse().unwrap()
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let path = temp_log_path();
        assert!(load_all(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_log_is_a_parse_error() {
        let path = temp_log_path();
        let log = ConversationLog::open(&path).await.unwrap();
        log.append(&Message::text("oc_1", ChatType::Direct, "ou_1", "ok"))
            .await
            .unwrap();
        tokio::fs::write(
            &path,
            format!(
                "{}{{\"chat_id\": \"oc_1\", \"chat_ty",
                tokio::fs::read_to_string(&path).await.unwrap()
            ),
        )
        .await
        .unwrap();
        match load_all(&path).await {
            Err(LogError::Parse { entry, .. }) => assert_eq!(entry, 1),
            other => panic!("expected parse error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn reads_pretty_printed_back_to_back_objects() {
        let raw = r#"{
    "timestamp": "2025-01-14T07:03:43.273",
    "chat_type": "p2p",
    "message_type": "text",
    "chat_id": "oc_1",
    "message_id": "om_1",
    "sender_id": "ou_1",
    "update_time": "2025-01-14T07:03:43.273",
    "content": {
        "text": "hello"
    }
}
{
    "timestamp": "2025-01-14T07:03:44.001",
    "chat_type": "group",
    "message_type": "text",
    "chat_id": "oc_2",
    "message_id": null,
    "sender_id": "Kiwi",
    "update_time": "2025-01-14T07:03:44.001",
    "content": {
        "text": "hi"
    }
}
"#;
        let messages = parse_log(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id.as_deref(), Some("om_1"));
        assert_eq!(messages[1].chat_type, ChatType::Group);
    }

    #[test]
    fn object_boundary_inside_text_does_not_break_loading() {
        let m = Message::text("oc_1", ChatType::Direct, "ou_1", "a}\n{b");
        let raw = format!("{}\n", serde_json::to_string(&m).unwrap());
        assert_eq!(parse_log(&raw).unwrap(), vec![m]);
    }

    #[test]
    fn group_by_chat_preserves_per_chat_order() {
        let a1 = Message::text("oc_a", ChatType::Direct, "ou_1", "a1");
        let b1 = Message::text("oc_b", ChatType::Group, "ou_2", "b1");
        let a2 = Message::text("oc_a", ChatType::Direct, "Kiwi", "a2");
        let history = group_by_chat(vec![a1.clone(), b1.clone(), a2.clone()]);
        assert_eq!(history.len(), 2);
        assert_eq!(history["oc_a"], vec![a1, a2]);
        assert_eq!(history["oc_b"], vec![b1]);
    }
}
