//! Interactive line-based chat with one peer.
//!
//! Each input line is trimmed and sent as one message; `exit` ends the
//! session. Frames from anyone but the active peer are ignored, frames from
//! the peer are decrypted and printed as `<peer>: <text>`.

use crate::client::{ChatClient, ClientError};
use crate::crypto::CodecError;
use crate::transport::{Transport, TransportError};
use chat_types::OutboundFrame;
use rsa::RsaPublicKey;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Line that ends the session.
pub const EXIT_COMMAND: &str = "exit";

/// What happened to one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// The user asked to leave.
    Exit,
    /// The line was encrypted and handed to the transport.
    Sent,
}

/// A conversation with a single peer.
pub struct ChatSession<T: Transport> {
    client: ChatClient<T>,
    peer: String,
    peer_key: RsaPublicKey,
}

impl<T: Transport> ChatSession<T> {
    /// Start a session with `peer`, whose public key is `peer_key`.
    pub fn new(client: ChatClient<T>, peer: impl Into<String>, peer_key: RsaPublicKey) -> Self {
        Self {
            client,
            peer: peer.into(),
            peer_key,
        }
    }

    /// The peer's handle.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The underlying client.
    pub fn client(&self) -> &ChatClient<T> {
        &self.client
    }

    /// Handle one line of user input.
    pub async fn send_line(&self, line: &str) -> Result<LineOutcome, ClientError> {
        let text = line.trim();
        if text == EXIT_COMMAND {
            return Ok(LineOutcome::Exit);
        }
        self.client
            .send_to(&self.peer, &self.peer_key, text.as_bytes())
            .await?;
        Ok(LineOutcome::Sent)
    }

    /// Render an inbound frame for display.
    ///
    /// Returns `None` for frames from anyone other than the peer.
    pub fn render_inbound(&self, frame: &OutboundFrame) -> Option<Result<String, CodecError>> {
        if frame.sender_username != self.peer {
            return None;
        }
        Some(self.client.open(frame).map(|plain| {
            let text = String::from_utf8_lossy(&plain);
            let prefix = format!("{}: ", self.peer);
            let indent = " ".repeat(prefix.len());
            let mut out = String::new();
            for (i, line) in text.lines().enumerate() {
                out.push_str(if i == 0 { &prefix } else { &indent });
                out.push_str(line);
                out.push('\n');
            }
            if out.is_empty() {
                out = format!("{prefix}\n");
            }
            out
        }))
    }

    /// Run until `exit`, end of input, or a send failure.
    ///
    /// Inbound frames are printed as they arrive. When the relay connection
    /// drops the session keeps reading input so the failure surfaces on the
    /// next send.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut receiving = true;

        output
            .write_all(
                format!(
                    "Chatting with {}. Type '{EXIT_COMMAND}' to quit.\n",
                    self.peer
                )
                .as_bytes(),
            )
            .await?;
        output.flush().await?;

        loop {
            tokio::select! {
                biased;

                frame = self.client.recv(), if receiving => match frame {
                    Ok(frame) => match self.render_inbound(&frame) {
                        Some(Ok(text)) => output.write_all(text.as_bytes()).await?,
                        Some(Err(e)) => {
                            tracing::warn!(msg_id = %frame.id, kind = %e.kind(), "undecryptable message");
                            output
                                .write_all(format!("Failed to decrypt message from {}: {e}\n", self.peer).as_bytes())
                                .await?;
                        }
                        None => {
                            tracing::debug!(sender = %frame.sender_username, "ignoring message from non-peer");
                        }
                    },
                    // One bad frame does not end the connection
                    Err(ClientError::Transport(TransportError::Frame(e))) => {
                        tracing::warn!(error = %e, kind = %e.kind(), "skipping unparsable frame");
                        output
                            .write_all(format!("Ignored a malformed message from the relay: {e}\n").as_bytes())
                            .await?;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "receive loop ended");
                        receiving = false;
                    }
                },

                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match self.send_line(&line).await {
                        Ok(LineOutcome::Exit) => break,
                        Ok(LineOutcome::Sent) => {
                            output.write_all("✓ Message sent successfully\n".as_bytes()).await?;
                        }
                        Err(ClientError::Codec(e)) => {
                            output.write_all(format!("Error: {e}\n").as_bytes()).await?;
                        }
                        Err(e) => {
                            output.write_all(format!("Error: {e}\n").as_bytes()).await?;
                            output.flush().await?;
                            return Err(e);
                        }
                    }
                }
            }
            output.flush().await?;
        }

        output.flush().await?;
        self.client.disconnect().await
    }
}
