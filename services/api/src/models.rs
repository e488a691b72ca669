//! API Models
//!
//! Data structures exposed over HTTP, documented for OpenAPI with `utoipa`.

use chrono::{DateTime, Utc};
use liveagent_core::{pipeline::ResponseMode, session::Session};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const APP_NAME: &str = "liveagent";

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "liveagent")]
    pub app: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            app: APP_NAME.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Text,
    Audio,
}

impl From<ResponseMode> for SessionMode {
    fn from(mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Text => SessionMode::Text,
            ResponseMode::Audio => SessionMode::Audio,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SessionSummary {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub client_id: String,
    #[schema(value_type = String, example = "audio")]
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Whether a live connection is currently serving the session.
    pub attached: bool,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            client_id: session.client_id,
            mode: session.mode.into(),
            created_at: session.created_at,
            last_seen: session.last_seen,
            attached: session.attached,
        }
    }
}

/// Query parameters of the generic WebSocket route.
#[derive(Deserialize, Debug, Default)]
pub struct ConnectQuery {
    /// Answer with speech instead of text.
    #[serde(default)]
    pub is_audio: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_health_response_serialization() {
        let json = serde_json::to_string(&HealthResponse::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok","app":"liveagent"}"#);
    }

    #[test]
    fn test_session_mode_serialization() {
        assert_eq!(serde_json::to_string(&SessionMode::Audio).unwrap(), "\"audio\"");
        let text: SessionMode = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(text, SessionMode::Text);
        assert!(serde_json::from_str::<SessionMode>("\"Video\"").is_err());
    }

    #[test]
    fn test_session_summary_from_record() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let mut session = Session::new("client-7", ResponseMode::Audio, created);
        session.detach(created + chrono::Duration::seconds(42));

        let summary = SessionSummary::from(session.clone());
        assert_eq!(summary.id, session.id);
        assert_eq!(summary.client_id, "client-7");
        assert_eq!(summary.mode, SessionMode::Audio);
        assert_eq!(summary.created_at, created);
        assert_eq!(summary.last_seen, created + chrono::Duration::seconds(42));
        assert!(!summary.attached);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"mode\":\"audio\""));
        assert!(json.contains("\"attached\":false"));
        let back: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_connect_query_defaults_to_text() {
        let query: ConnectQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.is_audio);
        let query: ConnectQuery = serde_json::from_str(r#"{"is_audio": true}"#).unwrap();
        assert!(query.is_audio);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
