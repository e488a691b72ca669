//! The contract between a session and the agent runtime that serves it.
//!
//! The runtime is opaque: a session hands it a [`SessionContext`], pushes
//! user input through a [`LiveRequestQueue`], and reads [`AgentEvent`]s back
//! from an [`AgentEventStream`].

use crate::event::AgentEvent;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

/// Whether the pipeline should answer with speech or with text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Text,
    Audio,
}

impl ResponseMode {
    pub fn from_is_audio(is_audio: bool) -> Self {
        if is_audio { Self::Audio } else { Self::Text }
    }

    pub fn is_audio(self) -> bool {
        self == Self::Audio
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Text => f.write_str("text"),
            ResponseMode::Audio => f.write_str("audio"),
        }
    }
}

/// Everything a pipeline needs to know about the session it is serving.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub client_id: String,
    pub mode: ResponseMode,
}

/// A single request pushed into the pipeline's input queue.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveRequest {
    /// A complete user message. An empty string finalizes the current turn.
    Content(String),
    /// A realtime media chunk, forwarded byte for byte.
    Realtime { mime_type: String, data: Bytes },
    /// The client stopped streaming realtime audio.
    EndRealtime,
    /// No further requests will follow.
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline input queue is closed")]
    QueueClosed,
    #[error("failed to connect to the agent runtime: {0}")]
    Connect(String),
    #[error("agent runtime protocol error: {0}")]
    Protocol(String),
    #[error("agent runtime reported an error: {0}")]
    Remote(String),
}

/// The write side of a pipeline's input queue.
///
/// Cheap to clone; all clones feed the same pipeline.
#[derive(Debug, Clone)]
pub struct LiveRequestQueue {
    tx: mpsc::Sender<LiveRequest>,
}

impl LiveRequestQueue {
    /// Creates a bounded queue and returns its read side for the pipeline.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LiveRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send_content(&self, text: impl Into<String>) -> Result<(), PipelineError> {
        self.send(LiveRequest::Content(text.into())).await
    }

    pub async fn send_realtime(
        &self,
        mime_type: impl Into<String>,
        data: Bytes,
    ) -> Result<(), PipelineError> {
        self.send(LiveRequest::Realtime {
            mime_type: mime_type.into(),
            data,
        })
        .await
    }

    pub async fn end_realtime(&self) -> Result<(), PipelineError> {
        self.send(LiveRequest::EndRealtime).await
    }

    /// Signals the pipeline that the session is over, without waiting for
    /// queue space.
    ///
    /// A full queue skips the explicit close; the pipeline still sees the
    /// queue end once every handle is dropped. Closing a queue whose pipeline
    /// already went away is not an error.
    pub fn close(&self) {
        match self.tx.try_send(LiveRequest::Close) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Pipeline input queue is full, relying on drop to close it");
            }
        }
    }

    async fn send(&self, request: LiveRequest) -> Result<(), PipelineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| PipelineError::QueueClosed)
    }
}

/// The pipeline's output, read by exactly one consumer.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, PipelineError>> + Send>>;

/// A running pipeline attached to one session.
pub struct LiveSession {
    pub requests: LiveRequestQueue,
    pub events: AgentEventStream,
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

/// An agent runtime capable of serving live sessions.
#[async_trait]
pub trait AgentPipeline: Send + Sync {
    /// Whether the runtime detects the end of spoken turns on its own.
    fn supports_voice_activity_detection(&self) -> bool;

    /// Starts serving one session.
    async fn start(&self, ctx: SessionContext) -> Result<LiveSession, PipelineError>;
}
