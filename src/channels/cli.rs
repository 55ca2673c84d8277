//! CLI channel: stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::error::ChannelError;

/// Lines typed to leave the REPL.
const QUIT_COMMANDS: &[&str] = &["/quit", "/sair"];

/// Reads patient messages from stdin and prints Nina's replies to stdout.
pub struct CliChannel {
    assistant_name: String,
}

impl CliChannel {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
        }
    }
}

pub(crate) fn is_quit(line: &str) -> bool {
    QUIT_COMMANDS.iter().any(|q| line.eq_ignore_ascii_case(q))
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        if is_quit(line) {
                            break;
                        }
                        if tx.send(IncomingMessage::new("cli", "local-patient", line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(&self, _msg: &IncomingMessage, content: &str) -> Result<(), ChannelError> {
        let line = format!("\n{}: {}\n\n", self.assistant_name, content);
        let mut stdout = tokio::io::stdout();
        let written = match stdout.write_all(line.as_bytes()).await {
            Ok(()) => stdout.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| ChannelError::SendFailed {
            name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        eprint!("> ");
        Ok(())
    }
}
