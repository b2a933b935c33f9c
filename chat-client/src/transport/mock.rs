//! Mock transport for testing.
//!
//! Allows queueing relay frames and capturing sent frames for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use chat_types::{FrameError, InboundFrame, OutboundFrame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while a session owns
/// another. `recv()` on an empty queue reports the connection as closed.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
enum Scripted {
    Frame(OutboundFrame),
    Unparsable(String),
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    sent: Vec<InboundFrame>,
    receive_queue: VecDeque<Scripted>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that is already connected.
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.lock().connected = true;
        transport
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockTransportInner> {
        // A panicking test thread is the only way to poison this
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a frame to be returned by a later `recv()` call.
    pub fn queue_frame(&self, frame: OutboundFrame) {
        self.lock().receive_queue.push_back(Scripted::Frame(frame));
    }

    /// Queue a relay message that fails to parse as a frame.
    ///
    /// The connection stays open; the following `recv()` moves on.
    pub fn queue_unparsable(&self, reason: &str) {
        self.lock()
            .receive_queue
            .push_back(Scripted::Unparsable(reason.to_string()));
    }

    /// All frames that were sent.
    pub fn sent_frames(&self) -> Vec<InboundFrame> {
        self.lock().sent.clone()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, frame: &InboundFrame) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent.push(frame.clone());
        Ok(())
    }

    async fn recv(&self) -> Result<OutboundFrame, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        match inner.receive_queue.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(frame),
            Some(Scripted::Unparsable(reason)) => {
                Err(FrameError::InvalidFormat { reason }.into())
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        Ok(())
    }
}
