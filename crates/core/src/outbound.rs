//! Shaping of agent events into client frames.
//!
//! [`OutboundShaper`] owns the per-producer text buffers for one session and
//! decides, event by event, which frames reach the client. It performs no I/O
//! so the relay task that drives it stays a thin loop.

use crate::accumulator::TextAccumulator;
use crate::audio::PCM_MIME_PREFIX;
use crate::event::{AgentEvent, ContentPart};
use crate::frame::{Frame, TextFrame};
use crate::pipeline::ResponseMode;
use crate::structured;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Which producers get special treatment once their text is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerRoles {
    /// Producers whose fenced JSON output is sent as structured data.
    pub structured: HashSet<String>,
    /// Producers whose final text is the spoken turn summary in audio mode.
    pub summary: HashSet<String>,
}

impl ProducerRoles {
    pub fn new<S, T>(structured: S, summary: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            structured: structured.into_iter().map(Into::into).collect(),
            summary: summary.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_structured(&self, producer: &str) -> bool {
        self.structured.contains(producer)
    }

    pub fn is_summary(&self, producer: &str) -> bool {
        self.summary.contains(producer)
    }
}

#[derive(Debug)]
pub struct OutboundShaper {
    mode: ResponseMode,
    roles: ProducerRoles,
    accumulator: TextAccumulator,
}

impl OutboundShaper {
    pub fn new(mode: ResponseMode, roles: ProducerRoles) -> Self {
        Self {
            mode,
            roles,
            accumulator: TextAccumulator::new(),
        }
    }

    pub fn accumulator(&self) -> &TextAccumulator {
        &self.accumulator
    }

    /// Maps one agent event to the frames the client should receive, in order.
    pub fn shape(&mut self, event: &AgentEvent) -> Vec<Frame> {
        if event.turn_complete || event.interrupted {
            self.accumulator.clear_all();
            return vec![Frame::Control {
                turn_complete: event.turn_complete,
                interrupted: event.interrupted,
            }];
        }

        match event.first_part() {
            None => Vec::new(),
            Some(ContentPart::InlineData { mime_type, data }) => {
                if mime_type.starts_with(PCM_MIME_PREFIX) && !data.is_empty() {
                    vec![Frame::Audio(data.clone())]
                } else {
                    debug!(author = %event.author, %mime_type, "Dropping unsupported inline data");
                    Vec::new()
                }
            }
            Some(ContentPart::Text(fragment)) => {
                if event.partial {
                    self.shape_fragment(&event.author, fragment)
                } else {
                    self.shape_final(&event.author, fragment)
                }
            }
        }
    }

    fn shape_fragment(&mut self, author: &str, fragment: &str) -> Vec<Frame> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.accumulator.push_partial(author, fragment);
        vec![Frame::Text(TextFrame::fragment(author, fragment))]
    }

    fn shape_final(&mut self, author: &str, fragment: &str) -> Vec<Frame> {
        let full = self.accumulator.finalize(author, fragment);
        if full.is_empty() {
            return Vec::new();
        }

        if self.roles.is_structured(author) && structured::is_fenced_json(&full) {
            match structured::extract_fenced_json(&full) {
                Ok(Some(payload)) => {
                    if self.mode.is_audio() {
                        debug!(%author, "Structured output will not be spoken");
                    }
                    return vec![Frame::StructuredOutput {
                        agent: author.to_string(),
                        payload,
                    }];
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%author, error = %e, "Structured output did not parse, sending as text");
                }
            }
        }

        let turn_summary = self.mode.is_audio() && self.roles.is_summary(author);
        vec![Frame::Text(TextFrame::message(author, full, turn_summary))]
    }
}
