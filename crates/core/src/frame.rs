//! Wire Frame Codec
//!
//! Every message on the client channel is a UTF-8 text frame. Heartbeats are
//! bare sentinel strings; everything else is a flat JSON object whose
//! discriminant is one of `mime_type`, `command`, `type`, or the pair of
//! turn-control flags. [`Frame::decode`] turns that into a single tagged enum
//! in one strict step so the relays can match on it exhaustively.

use crate::audio;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub const PING_SENTINEL: &str = "__ping__";
pub const PONG_SENTINEL: &str = "__pong__";
pub const TEXT_MIME: &str = "text/plain";
pub const AUDIO_MIME: &str = audio::PCM_MIME_PREFIX;

const END_OF_AUDIO_COMMAND: &str = "endOfAudio";
const STRUCTURED_OUTPUT_TYPE: &str = "agent_structured_output";
const DISCONNECT_WARNING_TYPE: &str = "disconnect_warning";
const TURN_SUMMARY_TYPE: &str = "final_text_summary";

/// Errors produced while decoding a client or server frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame is not a valid JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame carries no recognized discriminant")]
    MissingDiscriminant,
    #[error("unrecognized frame discriminant: {0}")]
    UnknownDiscriminant(String),
    #[error("frame carries more than one discriminant: {0}")]
    AmbiguousDiscriminant(String),
    #[error("frame is missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a string")]
    NotAString(&'static str),
    #[error("audio payload is not valid base64: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

/// A text message, either typed by the user or produced by an agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextFrame {
    pub text: String,
    /// Producer that emitted the text. Absent on client-originated frames.
    pub agent: Option<String>,
    /// Whether more text from the same producer follows. Absent on
    /// client-originated frames.
    pub partial: Option<bool>,
    /// Marks the producer's final answer for client-side speech synthesis.
    pub turn_summary: bool,
}

impl TextFrame {
    /// A complete message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// An incremental caption fragment from a producer.
    pub fn fragment(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            agent: Some(agent.into()),
            partial: Some(true),
            turn_summary: false,
        }
    }

    /// A fully assembled message from a producer.
    pub fn message(agent: impl Into<String>, text: impl Into<String>, turn_summary: bool) -> Self {
        Self {
            text: text.into(),
            agent: Some(agent.into()),
            partial: Some(false),
            turn_summary,
        }
    }
}

/// A single message exchanged over the duplex channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(TextFrame),
    /// Raw PCM16 bytes; base64 only on the wire.
    Audio(Bytes),
    Control {
        turn_complete: bool,
        interrupted: bool,
    },
    /// Client signal that the current spoken utterance is over.
    EndOfAudio,
    Ping,
    Pong,
    StructuredOutput {
        agent: String,
        payload: Value,
    },
    DisconnectWarning {
        reason: String,
    },
}

/// Every key any frame shape may carry. Decoding picks the variant from the
/// single discriminant present.
#[derive(Deserialize)]
struct Envelope {
    mime_type: Option<String>,
    command: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<Value>,
    agent: Option<String>,
    partial: Option<bool>,
    turn_complete: Option<bool>,
    interrupted: Option<bool>,
    reason: Option<String>,
}

impl Envelope {
    /// Rejects envelopes that match more than one frame shape. A text frame's
    /// summary tag is part of the text shape, not a second discriminant.
    fn ensure_single_discriminant(&self) -> Result<(), CodecError> {
        let summary_tag = self.mime_type.as_deref() == Some(TEXT_MIME)
            && self.kind.as_deref() == Some(TURN_SUMMARY_TYPE);
        let present: Vec<&str> = [
            ("mime_type", self.mime_type.is_some()),
            ("command", self.command.is_some()),
            ("type", self.kind.is_some() && !summary_tag),
            (
                "turn_complete/interrupted",
                self.turn_complete.is_some() || self.interrupted.is_some(),
            ),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        if present.len() > 1 {
            return Err(CodecError::AmbiguousDiscriminant(present.join(", ")));
        }
        Ok(())
    }

    fn into_frame(self) -> Result<Frame, CodecError> {
        self.ensure_single_discriminant()?;
        if let Some(mime_type) = self.mime_type.as_deref() {
            if mime_type == TEXT_MIME {
                return Ok(Frame::Text(TextFrame {
                    text: string_field(self.data, "data")?,
                    agent: self.agent,
                    partial: self.partial,
                    turn_summary: self.kind.as_deref() == Some(TURN_SUMMARY_TYPE),
                }));
            }
            if mime_type.starts_with(AUDIO_MIME) {
                let encoded = string_field(self.data, "data")?;
                let bytes = audio::decode_base64(&encoded)?;
                return Ok(Frame::Audio(Bytes::from(bytes)));
            }
            return Err(CodecError::UnknownDiscriminant(format!(
                "mime_type={mime_type}"
            )));
        }

        if let Some(command) = self.command {
            return match command.as_str() {
                END_OF_AUDIO_COMMAND => Ok(Frame::EndOfAudio),
                other => Err(CodecError::UnknownDiscriminant(format!("command={other}"))),
            };
        }

        if let Some(kind) = self.kind {
            return match kind.as_str() {
                STRUCTURED_OUTPUT_TYPE => Ok(Frame::StructuredOutput {
                    agent: self.agent.ok_or(CodecError::MissingField("agent"))?,
                    payload: self.data.ok_or(CodecError::MissingField("data"))?,
                }),
                DISCONNECT_WARNING_TYPE => Ok(Frame::DisconnectWarning {
                    reason: self.reason.ok_or(CodecError::MissingField("reason"))?,
                }),
                other => Err(CodecError::UnknownDiscriminant(format!("type={other}"))),
            };
        }

        if self.turn_complete.is_some() || self.interrupted.is_some() {
            return Ok(Frame::Control {
                turn_complete: self.turn_complete.unwrap_or(false),
                interrupted: self.interrupted.unwrap_or(false),
            });
        }

        Err(CodecError::MissingDiscriminant)
    }
}

fn string_field(value: Option<Value>, field: &'static str) -> Result<String, CodecError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(CodecError::NotAString(field)),
        None => Err(CodecError::MissingField(field)),
    }
}

impl Frame {
    /// Decodes one raw text message.
    ///
    /// Returns `Ok(None)` for empty or whitespace-only input, which carries no
    /// frame and is not an error.
    pub fn decode(raw: &str) -> Result<Option<Frame>, CodecError> {
        let trimmed = raw.trim();
        match trimmed {
            "" => Ok(None),
            PING_SENTINEL => Ok(Some(Frame::Ping)),
            PONG_SENTINEL => Ok(Some(Frame::Pong)),
            _ => {
                let envelope: Envelope = serde_json::from_str(trimmed)?;
                envelope.into_frame().map(Some)
            }
        }
    }

    /// Encodes the frame into its wire representation.
    pub fn encode(&self) -> String {
        let value = match self {
            Frame::Ping => return PING_SENTINEL.to_string(),
            Frame::Pong => return PONG_SENTINEL.to_string(),
            Frame::Text(frame) => {
                let mut obj = Map::new();
                obj.insert("mime_type".into(), json!(TEXT_MIME));
                obj.insert("data".into(), json!(frame.text));
                if let Some(agent) = &frame.agent {
                    obj.insert("agent".into(), json!(agent));
                }
                if let Some(partial) = frame.partial {
                    obj.insert("partial".into(), json!(partial));
                }
                if frame.turn_summary {
                    obj.insert("type".into(), json!(TURN_SUMMARY_TYPE));
                }
                Value::Object(obj)
            }
            Frame::Audio(bytes) => json!({
                "mime_type": AUDIO_MIME,
                "data": audio::encode_base64(bytes),
            }),
            Frame::Control {
                turn_complete,
                interrupted,
            } => json!({
                "turn_complete": turn_complete,
                "interrupted": interrupted,
            }),
            Frame::EndOfAudio => json!({ "command": END_OF_AUDIO_COMMAND }),
            Frame::StructuredOutput { agent, payload } => json!({
                "type": STRUCTURED_OUTPUT_TYPE,
                "agent": agent,
                "data": payload,
            }),
            Frame::DisconnectWarning { reason } => json!({
                "type": DISCONNECT_WARNING_TYPE,
                "reason": reason,
            }),
        };
        value.to_string()
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Audio(_) => "audio",
            Frame::Control { .. } => "control",
            Frame::EndOfAudio => "end_of_audio",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::StructuredOutput { .. } => "structured_output",
            Frame::DisconnectWarning { .. } => "disconnect_warning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame: &Frame) -> Value {
        serde_json::from_str(&frame.encode()).unwrap()
    }

    #[test]
    fn test_decode_client_text() {
        let frame = Frame::decode(r#"{"mime_type":"text/plain","data":"find running shoes"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, Frame::Text(TextFrame::user("find running shoes")));
    }

    #[test]
    fn test_decode_client_audio() {
        let frame = Frame::decode(r#"{"mime_type":"audio/pcm","data":"AAEC/w=="}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, Frame::Audio(Bytes::from_static(&[0x00, 0x01, 0x02, 0xff])));
    }

    #[test]
    fn test_decode_audio_mime_with_parameters() {
        let frame = Frame::decode(r#"{"mime_type":"audio/pcm;rate=16000","data":"AAA="}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, Frame::Audio(Bytes::from_static(&[0, 0])));
    }

    #[test]
    fn test_decode_end_of_audio_and_sentinels() {
        assert_eq!(
            Frame::decode(r#"{"command":"endOfAudio"}"#).unwrap(),
            Some(Frame::EndOfAudio)
        );
        assert_eq!(Frame::decode("__pong__").unwrap(), Some(Frame::Pong));
        assert_eq!(Frame::decode("  __pong__\n").unwrap(), Some(Frame::Pong));
        assert_eq!(Frame::decode("__ping__").unwrap(), Some(Frame::Ping));
    }

    #[test]
    fn test_decode_blank_is_ignored() {
        assert!(Frame::decode("").unwrap().is_none());
        assert!(Frame::decode("   \n\t").unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = Frame::decode("not json{{").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson(_)));

        let err = Frame::decode("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_discriminants() {
        let err = Frame::decode(r#"{"mime_type":"image/png","data":""}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownDiscriminant(ref d) if d == "mime_type=image/png"));

        let err = Frame::decode(r#"{"command":"startVideo"}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownDiscriminant(_)));

        let err = Frame::decode(r#"{"type":"mystery"}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownDiscriminant(_)));

        let err = Frame::decode(r#"{"hello":"world"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingDiscriminant));
    }

    #[test]
    fn test_decode_rejects_ambiguous_envelopes() {
        let err = Frame::decode(r#"{"mime_type":"text/plain","data":"hi","command":"endOfAudio"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousDiscriminant(ref d) if d == "mime_type, command"));

        let err = Frame::decode(r#"{"command":"endOfAudio","type":"disconnect_warning","reason":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousDiscriminant(_)));

        let err = Frame::decode(r#"{"mime_type":"text/plain","data":"hi","turn_complete":true}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousDiscriminant(_)));

        // The summary tag belongs to the text shape.
        let frame = Frame::decode(
            r#"{"mime_type":"text/plain","data":"done","agent":"shop_agent","partial":false,"type":"final_text_summary"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            frame,
            Frame::Text(TextFrame::message("shop_agent", "done", true))
        );
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        let err = Frame::decode(r#"{"mime_type":"text/plain"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingField("data")));

        let err = Frame::decode(r#"{"mime_type":"text/plain","data":42}"#).unwrap_err();
        assert!(matches!(err, CodecError::NotAString("data")));

        let err = Frame::decode(r#"{"mime_type":"audio/pcm","data":"%%%"}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidAudio(_)));
    }

    #[test]
    fn test_audio_survives_the_wire_byte_exact() {
        let pcm: Vec<u8> = (0..=255u8).cycle().take(1031).collect();
        let frame = Frame::Audio(Bytes::from(pcm.clone()));
        match Frame::decode(&frame.encode()).unwrap().unwrap() {
            Frame::Audio(bytes) => assert_eq!(bytes.as_ref(), pcm.as_slice()),
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_outbound_shapes() {
        assert_eq!(Frame::Ping.encode(), "__ping__");

        assert_eq!(
            wire(&Frame::Text(TextFrame::fragment("P1", "Here "))),
            json!({"mime_type": "text/plain", "data": "Here ", "agent": "P1", "partial": true})
        );
        assert_eq!(
            wire(&Frame::Text(TextFrame::message("shop_agent", "Done.", true))),
            json!({
                "mime_type": "text/plain",
                "data": "Done.",
                "agent": "shop_agent",
                "partial": false,
                "type": "final_text_summary"
            })
        );
        assert_eq!(
            wire(&Frame::Control { turn_complete: true, interrupted: false }),
            json!({"turn_complete": true, "interrupted": false})
        );
        assert_eq!(
            wire(&Frame::StructuredOutput {
                agent: "shopping_worker_agent".into(),
                payload: json!({"status": "success", "items": []}),
            }),
            json!({
                "type": "agent_structured_output",
                "agent": "shopping_worker_agent",
                "data": {"status": "success", "items": []}
            })
        );
        assert_eq!(
            wire(&Frame::DisconnectWarning { reason: "bye".into() }),
            json!({"type": "disconnect_warning", "reason": "bye"})
        );
        assert_eq!(
            wire(&Frame::Audio(Bytes::from_static(&[1, 2, 3]))),
            json!({"mime_type": "audio/pcm", "data": "AQID"})
        );
    }

    #[test]
    fn test_decode_server_frames() {
        let frame = Frame::decode(r#"{"turn_complete":false,"interrupted":true}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, Frame::Control { turn_complete: false, interrupted: true });

        let summary = Frame::Text(TextFrame::message("shop_agent", "All set", true));
        assert_eq!(Frame::decode(&summary.encode()).unwrap().unwrap(), summary);

        let warning = Frame::DisconnectWarning { reason: "No pong".into() };
        assert_eq!(Frame::decode(&warning.encode()).unwrap().unwrap(), warning);
    }
}
