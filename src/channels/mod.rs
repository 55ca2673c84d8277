//! Channel abstraction for patient message I/O.

pub mod cli;

pub use cli::CliChannel;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// A patient message arriving on a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub sender: String,
    pub content: String,
}

impl IncomingMessage {
    pub fn new(channel: &str, sender: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
        }
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the channel closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a reply to the sender of `msg`.
    async fn respond(&self, msg: &IncomingMessage, content: &str) -> Result<(), ChannelError>;
}
