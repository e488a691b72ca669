use bytes::Bytes;

/// One piece of content carried by an [`AgentEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: Bytes },
}

/// A single output unit produced by the agent pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentEvent {
    /// Identifier of the agent that produced the event.
    pub author: String,
    pub parts: Vec<ContentPart>,
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl AgentEvent {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Default::default()
        }
    }

    pub fn text(author: impl Into<String>, text: impl Into<String>, partial: bool) -> Self {
        Self {
            parts: vec![ContentPart::Text(text.into())],
            partial,
            ..Self::new(author)
        }
    }

    pub fn audio(author: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            parts: vec![ContentPart::InlineData {
                mime_type: mime_type.into(),
                data,
            }],
            ..Self::new(author)
        }
    }

    pub fn turn_complete(author: impl Into<String>) -> Self {
        Self {
            turn_complete: true,
            ..Self::new(author)
        }
    }

    pub fn interrupted(author: impl Into<String>) -> Self {
        Self {
            interrupted: true,
            ..Self::new(author)
        }
    }

    pub fn first_part(&self) -> Option<&ContentPart> {
        self.parts.first()
    }
}
