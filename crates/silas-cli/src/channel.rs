//! A [`ChannelAdapter`] over the process's own stdin/stdout, for running a
//! single interactive conversation directly in a terminal.

use async_trait::async_trait;
use silas_core::ports::{ChannelAdapter, ConnectionId, InboundMessage};
use silas_core::{CoreError, CoreResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// The connection id assigned to the one stdio conversation.
pub const STDIO_CONNECTION_ID: &str = "stdio";

/// Reads one line of input at a time from stdin and writes responses to
/// stdout. Streaming and suggestion/approval cards degrade to a plain
/// printed line since a terminal has no structured rendering here.
pub struct StdioChannel {
    reader: Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdioChannel {
    #[must_use]
    pub fn new() -> Self {
        StdioChannel { reader: Mutex::new(BufReader::new(tokio::io::stdin())) }
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for StdioChannel {
    async fn recv(&self) -> CoreResult<(InboundMessage, ConnectionId)> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let bytes_read =
                reader.read_line(&mut line).await.map_err(|e| CoreError::SystemFault(format!("stdin read failed: {e}")))?;
            if bytes_read == 0 {
                return Err(CoreError::SystemFault("stdin closed".to_string()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok((InboundMessage { text: trimmed.to_string(), reply_to: None }, STDIO_CONNECTION_ID.to_string()));
        }
    }

    async fn send(&self, _recipient: &ConnectionId, text: &str, _reply_to: Option<&str>) -> CoreResult<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{text}\n").as_bytes())
            .await
            .map_err(|e| CoreError::SystemFault(format!("stdout write failed: {e}")))?;
        stdout.flush().await.map_err(|e| CoreError::SystemFault(format!("stdout flush failed: {e}")))
    }

    async fn send_approval_request(&self, recipient: &ConnectionId, item: &silas_core::WorkItem) -> CoreResult<()> {
        self.send(recipient, &format!("[approval requested] {}: {}", item.id, item.title), None).await
    }
}
