//! Client-side transport plumbing.
//!
//! All writes to the client socket go through one writer task fed by an mpsc
//! channel. Relays hold a cloneable [`ClientSink`]; aborting a relay can drop
//! a queued message but never leaves a frame half-written on the socket.

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use liveagent_core::frame::Frame;
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::debug;

/// Close status sent when the server gives up on an unresponsive client.
pub const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("client writer has shut down")]
    WriterClosed,
    #[error("failed to write to client socket: {0}")]
    Send(String),
}

#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<Message>,
}

impl ClientSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.tx
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|_| TransportError::WriterClosed)
    }

    /// Queues a close frame. The writer stops after delivering it.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.tx
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|_| TransportError::WriterClosed)
    }
}

/// Drains queued messages into the socket until every [`ClientSink`] is
/// dropped or a close frame has been written.
pub async fn run_writer<S>(mut sink: S, mut rx: mpsc::Receiver<Message>) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        sink.send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        if closing {
            debug!("Close frame written, stopping writer");
            return Ok(());
        }
    }
    let _ = sink.close().await;
    Ok(())
}
