//! Terminal transport.
//!
//! A minimal built-in adapter that reads lines from stdin and prints
//! replies to stdout, for local use and smoke-testing. Real chat
//! adapters (Telegram, Slack, ...) implement the same [`Transport`]
//! trait out of tree.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use adjutant_protocols::{
    InboundMessage, MessageHandler, OutboundMessage, SessionKey, Transport, TransportCommand,
    TransportError,
};

const TRANSPORT_ID: &str = "stdio";

/// Line-oriented terminal transport.
pub struct StdioTransport {
    shutdown: CancellationToken,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StdioTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shutdown: CancellationToken::new(),
            reader_task: Mutex::new(None),
        })
    }

    fn session_key() -> SessionKey {
        SessionKey::new(format!("{}:dm:local", TRANSPORT_ID))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn id(&self) -> &str {
        TRANSPORT_ID
    }

    async fn start(&self, handler: Arc<dyn MessageHandler>) -> Result<(), TransportError> {
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut stdout = tokio::io::stdout();

            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    line = lines.next_line() => line,
                };

                let Ok(Some(line)) = line else { return };
                let text = line.trim().to_string();
                if text.is_empty() {
                    continue;
                }

                let inbound = InboundMessage {
                    text: text.clone(),
                    session_key: Self::session_key(),
                    channel_id: "local".to_string(),
                    user_id: "local-user".to_string(),
                    user_name: None,
                    is_group: false,
                    images: Vec::new(),
                };

                // Only slash-prefixed lines are command candidates;
                // unknown commands fall through to the assistant.
                let reply = match text.strip_prefix('/').map(str::parse::<TransportCommand>) {
                    Some(Ok(command)) => handler.on_command(command, inbound).await,
                    _ => handler.on_message(inbound).await,
                };

                if let Some(out) = reply {
                    if !out.is_suppressed() {
                        let _ = stdout.write_all(format!("{}\n", out.text).as_bytes()).await;
                        let _ = stdout.flush().await;
                    }
                }
            }
        });

        *self.reader_task.lock().await = Some(task);
        info!("stdio transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    async fn send_to_channel(
        &self,
        _channel_id: &str,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        if message.is_suppressed() {
            return Ok(());
        }
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}\n", message.text).as_bytes())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }
}
