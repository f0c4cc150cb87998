//! Kiwi core library: chat message routing, reply policy, the conversation log and the LLM
//! backend used by the `kiwi` binary.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dealer;
pub mod history;
pub mod init;
pub mod llm;
pub mod log_store;
pub mod message;
pub mod router;
pub mod timestamp;
