//! A local pipeline that repeats user input back.
//!
//! Useful for exercising clients without model credentials. Text comes back
//! word by word as partial output followed by a finalizing event; audio
//! chunks are returned as they arrive.

use async_trait::async_trait;
use futures_util::StreamExt;
use liveagent_core::{
    event::AgentEvent,
    pipeline::{AgentPipeline, LiveRequest, LiveRequestQueue, LiveSession, PipelineError, SessionContext},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info_span};

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EchoPipeline {
    author: String,
}

impl EchoPipeline {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
        }
    }
}

impl Default for EchoPipeline {
    fn default() -> Self {
        Self::new("echo_agent")
    }
}

#[async_trait]
impl AgentPipeline for EchoPipeline {
    fn supports_voice_activity_detection(&self) -> bool {
        false
    }

    async fn start(&self, ctx: SessionContext) -> Result<LiveSession, PipelineError> {
        let (requests, mut rx) = LiveRequestQueue::channel(QUEUE_CAPACITY);
        let (tx, events) = mpsc::channel(QUEUE_CAPACITY);
        let author = self.author.clone();
        let span = info_span!("echo_pipeline", session_id = %ctx.session_id);

        tokio::spawn(
            async move {
                while let Some(request) = rx.recv().await {
                    let replies = match request {
                        LiveRequest::Content(text) if text.is_empty() => {
                            vec![AgentEvent::turn_complete(&author)]
                        }
                        LiveRequest::Content(text) => echo_text(&author, &text),
                        LiveRequest::Realtime { mime_type, data } => {
                            vec![AgentEvent::audio(&author, mime_type, data)]
                        }
                        LiveRequest::EndRealtime => vec![AgentEvent::turn_complete(&author)],
                        LiveRequest::Close => break,
                    };
                    for event in replies {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }
                debug!("Echo pipeline closed");
            }
            .instrument(span),
        );

        Ok(LiveSession {
            requests,
            events: ReceiverStream::new(events).boxed(),
        })
    }
}

fn echo_text(author: &str, text: &str) -> Vec<AgentEvent> {
    let mut events: Vec<AgentEvent> = text
        .split_inclusive(' ')
        .map(|word| AgentEvent::text(author, word, true))
        .collect();
    events.push(AgentEvent::text(author, "", false));
    events.push(AgentEvent::turn_complete(author));
    events
}
