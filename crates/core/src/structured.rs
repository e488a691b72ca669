//! Detection of fenced JSON payloads in finalized agent text.

use serde_json::Value;

const OPENING_FENCE: &str = "```json";
const CLOSING_FENCE: &str = "```";

#[derive(Debug, thiserror::Error)]
pub enum StructuredPayloadError {
    #[error("fenced block has no closing fence")]
    Unterminated,
    #[error("fenced block is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Whether the message, ignoring surrounding whitespace, opens with a
/// ```` ```json ```` fence.
pub fn is_fenced_json(text: &str) -> bool {
    text.trim().starts_with(OPENING_FENCE)
}

/// Strips the fences from a fenced JSON message and parses the body.
///
/// Returns `Ok(None)` if the message is not fenced at all.
pub fn extract_fenced_json(text: &str) -> Result<Option<Value>, StructuredPayloadError> {
    let Some(rest) = text.trim().strip_prefix(OPENING_FENCE) else {
        return Ok(None);
    };
    let body = rest
        .strip_suffix(CLOSING_FENCE)
        .ok_or(StructuredPayloadError::Unterminated)?;
    Ok(Some(serde_json::from_str(body.trim())?))
}
