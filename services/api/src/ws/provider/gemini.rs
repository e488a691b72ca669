//! Serves sessions with the Gemini Live API over a realtime WebSocket.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use liveagent_core::{
    audio::{self, CLIENT_INPUT_SAMPLE_RATE},
    event::AgentEvent,
    pipeline::{
        AgentPipeline, LiveRequest, LiveRequestQueue, LiveSession, PipelineError, ResponseMode,
        SessionContext,
    },
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{Instrument, debug, error, info, info_span, warn};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
const QUEUE_CAPACITY: usize = 128;

/// Producer id attached to everything the model says.
pub const GEMINI_AUTHOR: &str = "gemini_live";

// --- Local Gemini Live wire types ---
mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) enum ClientMessage {
        Setup(Setup),
        RealtimeInput(RealtimeInput),
        ClientContent(ClientContent),
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Setup {
        pub model: String,
        pub generation_config: GenerationConfig,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system_instruction: Option<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub output_audio_transcription: Option<serde_json::Value>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
    }

    #[derive(Serialize, Debug, PartialEq)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Text,
        Audio,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ClientContent {
        pub turns: Vec<Content>,
        pub turn_complete: bool,
    }

    #[derive(Serialize, Debug)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        pub parts: Vec<Part>,
    }

    #[derive(Serialize, Debug)]
    pub(super) struct Part {
        pub text: String,
    }

    #[derive(Serialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct RealtimeInput {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub audio: Option<Blob>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub audio_stream_end: Option<bool>,
    }

    #[derive(Serialize, Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub setup_complete: Option<serde_json::Value>,
        pub server_content: Option<ServerContent>,
        pub go_away: Option<serde_json::Value>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerContent {
        pub model_turn: Option<ModelTurn>,
        pub output_transcription: Option<Transcription>,
        pub turn_complete: Option<bool>,
        pub interrupted: Option<bool>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ModelTurn {
        #[serde(default)]
        pub parts: Vec<ServerPart>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub text: Option<String>,
        pub inline_data: Option<Blob>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct Transcription {
        pub text: String,
    }
}

pub struct GeminiLivePipeline {
    api_key: SecretString,
    model: String,
    system_prompt: Option<String>,
}

impl GeminiLivePipeline {
    pub fn new(api_key: SecretString, model: String, system_prompt: Option<String>) -> Self {
        Self {
            api_key,
            model,
            system_prompt,
        }
    }
}

#[async_trait]
impl AgentPipeline for GeminiLivePipeline {
    fn supports_voice_activity_detection(&self) -> bool {
        true
    }

    async fn start(&self, ctx: SessionContext) -> Result<LiveSession, PipelineError> {
        let url = format!("{}?key={}", LIVE_ENDPOINT, self.api_key.expose_secret());
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| PipelineError::Connect(e.to_string()))?;
        info!(session_id = %ctx.session_id, model = %self.model, "Connected to Gemini Live");
        let (mut gemini_tx, mut gemini_rx) = ws_stream.split();

        let setup = setup_message(&self.model, ctx.mode, self.system_prompt.as_deref());
        gemini_tx
            .send(WsMessage::Text(to_json(&setup)?.into()))
            .await
            .map_err(|e| PipelineError::Connect(e.to_string()))?;

        // Nothing may be sent until the server acknowledges the setup.
        tokio::time::timeout(SETUP_TIMEOUT, async {
            while let Some(message) = gemini_rx.next().await {
                let message = message.map_err(|e| PipelineError::Connect(e.to_string()))?;
                match parse_server_message(&message) {
                    Some(Ok(parsed)) if parsed.setup_complete.is_some() => return Ok(()),
                    Some(Ok(parsed)) => warn!(?parsed, "Unexpected message during Gemini setup"),
                    Some(Err(e)) => warn!(error = %e, "Unparseable message during Gemini setup"),
                    None => {}
                }
            }
            Err(PipelineError::Connect(
                "connection closed before setup completed".to_string(),
            ))
        })
        .await
        .map_err(|_| PipelineError::Connect("timed out waiting for setup".to_string()))??;
        info!("Gemini session setup is complete");

        let (requests, mut request_rx) = LiveRequestQueue::channel(QUEUE_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(QUEUE_CAPACITY);
        let span = info_span!("gemini_live", session_id = %ctx.session_id);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        request = request_rx.recv() => {
                            let Some(request) = request else { break };
                            let Some(message) = encode_request(request) else {
                                let _ = gemini_tx.send(WsMessage::Close(None)).await;
                                break;
                            };
                            let sent = match to_json(&message) {
                                Ok(json) => gemini_tx
                                    .send(WsMessage::Text(json.into()))
                                    .await
                                    .map_err(|e| PipelineError::Protocol(e.to_string())),
                                Err(e) => Err(e),
                            };
                            if let Err(e) = sent {
                                error!(error = %e, "Failed to send to Gemini");
                                let _ = event_tx.send(Err(e)).await;
                                break;
                            }
                        }
                        message = gemini_rx.next() => {
                            let message = match message {
                                Some(Ok(WsMessage::Close(frame))) => {
                                    info!(?frame, "Gemini closed the connection");
                                    break;
                                }
                                None => {
                                    info!("Gemini connection ended");
                                    break;
                                }
                                Some(Ok(message)) => message,
                                Some(Err(e)) => {
                                    let _ = event_tx.send(Err(PipelineError::Remote(e.to_string()))).await;
                                    break;
                                }
                            };
                            let events = match parse_server_message(&message) {
                                Some(Ok(parsed)) => map_server_message(GEMINI_AUTHOR, parsed),
                                Some(Err(e)) => vec![Err(e)],
                                None => continue,
                            };
                            for event in events {
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                debug!("Gemini pump finished");
            }
            .instrument(span),
        );

        Ok(LiveSession {
            requests,
            events: ReceiverStream::new(event_rx).boxed(),
        })
    }
}

fn to_json(message: &wire::ClientMessage) -> Result<String, PipelineError> {
    serde_json::to_string(message).map_err(|e| PipelineError::Protocol(e.to_string()))
}

fn setup_message(model: &str, mode: ResponseMode, system_prompt: Option<&str>) -> wire::ClientMessage {
    let modality = match mode {
        ResponseMode::Audio => wire::ResponseModality::Audio,
        ResponseMode::Text => wire::ResponseModality::Text,
    };
    wire::ClientMessage::Setup(wire::Setup {
        model: model.to_string(),
        generation_config: wire::GenerationConfig {
            response_modalities: vec![modality],
        },
        system_instruction: system_prompt.map(|text| wire::Content {
            role: None,
            parts: vec![wire::Part {
                text: text.to_string(),
            }],
        }),
        // Captions for spoken answers.
        output_audio_transcription: mode.is_audio().then(|| serde_json::json!({})),
    })
}

/// Translates a queue request. `None` means the session is over.
fn encode_request(request: LiveRequest) -> Option<wire::ClientMessage> {
    let message = match request {
        LiveRequest::Content(text) => {
            let turns = if text.is_empty() {
                Vec::new()
            } else {
                vec![wire::Content {
                    role: Some("user".to_string()),
                    parts: vec![wire::Part { text }],
                }]
            };
            wire::ClientMessage::ClientContent(wire::ClientContent {
                turns,
                turn_complete: true,
            })
        }
        LiveRequest::Realtime { mime_type, data } => {
            let mime_type = if mime_type.contains(';') {
                mime_type
            } else {
                format!("{mime_type};rate={CLIENT_INPUT_SAMPLE_RATE}")
            };
            wire::ClientMessage::RealtimeInput(wire::RealtimeInput {
                audio: Some(wire::Blob {
                    mime_type,
                    data: audio::encode_base64(&data),
                }),
                ..Default::default()
            })
        }
        LiveRequest::EndRealtime => wire::ClientMessage::RealtimeInput(wire::RealtimeInput {
            audio_stream_end: Some(true),
            ..Default::default()
        }),
        LiveRequest::Close => return None,
    };
    Some(message)
}

/// Gemini delivers JSON in both text and binary frames.
fn parse_server_message(message: &WsMessage) -> Option<Result<wire::ServerMessage, PipelineError>> {
    let parsed = match message {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()),
        WsMessage::Binary(data) => serde_json::from_slice(data),
        _ => return None,
    };
    Some(parsed.map_err(|e| PipelineError::Protocol(e.to_string())))
}

fn map_server_message(
    author: &str,
    message: wire::ServerMessage,
) -> Vec<Result<AgentEvent, PipelineError>> {
    let mut events = Vec::new();
    if message.go_away.is_some() {
        warn!("Gemini announced it will close the connection soon");
    }
    let Some(content) = message.server_content else {
        return events;
    };

    if content.interrupted == Some(true) {
        events.push(Ok(AgentEvent::interrupted(author)));
    }

    for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            events.push(Ok(AgentEvent::text(author, text, true)));
        }
        if let Some(blob) = part.inline_data {
            events.push(
                audio::decode_base64(&blob.data)
                    .map(|pcm| AgentEvent::audio(author, blob.mime_type, Bytes::from(pcm)))
                    .map_err(|e| PipelineError::Protocol(format!("bad inline audio: {e}"))),
            );
        }
    }

    if let Some(transcription) = content.output_transcription {
        events.push(Ok(AgentEvent::text(author, transcription.text, true)));
    }

    if content.turn_complete == Some(true) {
        events.push(Ok(AgentEvent::text(author, "", false)));
        events.push(Ok(AgentEvent::turn_complete(author)));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn as_value(message: &wire::ClientMessage) -> Value {
        serde_json::from_str(&to_json(message).unwrap()).unwrap()
    }

    fn server(raw: Value) -> wire::ServerMessage {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_setup_message_shape() {
        let audio = as_value(&setup_message("models/x", ResponseMode::Audio, Some("Be brief.")));
        assert_eq!(
            audio,
            json!({
                "setup": {
                    "model": "models/x",
                    "generationConfig": {"responseModalities": ["AUDIO"]},
                    "systemInstruction": {"parts": [{"text": "Be brief."}]},
                    "outputAudioTranscription": {}
                }
            })
        );

        let text = as_value(&setup_message("models/x", ResponseMode::Text, None));
        assert_eq!(
            text,
            json!({"setup": {"model": "models/x", "generationConfig": {"responseModalities": ["TEXT"]}}})
        );
    }

    #[test]
    fn test_encode_requests() {
        let content = encode_request(LiveRequest::Content("hello".into())).unwrap();
        assert_eq!(
            as_value(&content),
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "hello"}]}], "turnComplete": true}})
        );

        let finalize = encode_request(LiveRequest::Content(String::new())).unwrap();
        assert_eq!(
            as_value(&finalize),
            json!({"clientContent": {"turns": [], "turnComplete": true}})
        );

        let audio = encode_request(LiveRequest::Realtime {
            mime_type: "audio/pcm".into(),
            data: Bytes::from_static(&[1, 2, 3]),
        })
        .unwrap();
        assert_eq!(
            as_value(&audio),
            json!({"realtimeInput": {"audio": {"mimeType": "audio/pcm;rate=16000", "data": "AQID"}}})
        );

        let end = encode_request(LiveRequest::EndRealtime).unwrap();
        assert_eq!(as_value(&end), json!({"realtimeInput": {"audioStreamEnd": true}}));

        assert!(encode_request(LiveRequest::Close).is_none());
    }

    #[test]
    fn test_map_model_turn_and_completion() {
        let events = map_server_message(
            "g",
            server(json!({
                "serverContent": {
                    "modelTurn": {"parts": [
                        {"text": "Hello"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAE="}}
                    ]},
                    "turnComplete": true
                }
            })),
        );
        let events: Vec<AgentEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                AgentEvent::text("g", "Hello", true),
                AgentEvent::audio("g", "audio/pcm;rate=24000", Bytes::from_static(&[0, 1])),
                AgentEvent::text("g", "", false),
                AgentEvent::turn_complete("g"),
            ]
        );
    }

    #[test]
    fn test_map_interruption_and_transcription() {
        let events: Vec<AgentEvent> = map_server_message(
            "g",
            server(json!({"serverContent": {"interrupted": true}})),
        )
        .into_iter()
        .map(Result::unwrap)
        .collect();
        assert_eq!(events, vec![AgentEvent::interrupted("g")]);

        let events: Vec<AgentEvent> = map_server_message(
            "g",
            server(json!({"serverContent": {"outputTranscription": {"text": "Hi there"}}})),
        )
        .into_iter()
        .map(Result::unwrap)
        .collect();
        assert_eq!(events, vec![AgentEvent::text("g", "Hi there", true)]);
    }

    #[test]
    fn test_map_bad_audio_is_an_event_error() {
        let events = map_server_message(
            "g",
            server(json!({"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm", "data": "%%%"}}
            ]}}})),
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(PipelineError::Protocol(_))));
    }

    #[test]
    fn test_parse_text_and_binary_frames() {
        let text = WsMessage::Text(r#"{"setupComplete": {}}"#.into());
        assert!(parse_server_message(&text).unwrap().unwrap().setup_complete.is_some());

        let binary = WsMessage::Binary(Bytes::from_static(br#"{"serverContent": {}}"#));
        assert!(parse_server_message(&binary).unwrap().unwrap().server_content.is_some());

        assert!(parse_server_message(&WsMessage::Ping(Bytes::new())).is_none());
        assert!(parse_server_message(&WsMessage::Text("nope".into())).unwrap().is_err());
    }
}
