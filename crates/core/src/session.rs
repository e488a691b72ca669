use crate::pipeline::ResponseMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The durable record of a client's conversation session.
///
/// Records outlive individual connections: a client that reconnects while
/// its record is still retained resumes the same session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub client_id: String,
    pub mode: ResponseMode,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Whether a live connection is currently serving this session.
    pub attached: bool,
    /// Identifies the connection that attached last. Only that connection
    /// may detach the record.
    pub attachment_id: Uuid,
}

impl Session {
    pub fn new(client_id: impl Into<String>, mode: ResponseMode, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            mode,
            created_at: now,
            last_seen: now,
            attached: true,
            attachment_id: Uuid::new_v4(),
        }
    }

    /// Hands the record to a new connection, replacing any previous owner.
    pub fn attach(&mut self, mode: ResponseMode, now: DateTime<Utc>) {
        self.mode = mode;
        self.attached = true;
        self.attachment_id = Uuid::new_v4();
        self.last_seen = now;
    }

    pub fn detach(&mut self, now: DateTime<Utc>) {
        self.attached = false;
        self.last_seen = now;
    }

    /// Whether a detached record has outlived `ttl`. Attached records never
    /// expire.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        !self.attached && now - self.last_seen >= ttl
    }
}

/// Lifecycle of one live connection serving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionPhase {
    /// The phase that follows this one. `Closed` is terminal.
    pub fn next(self) -> Self {
        match self {
            SessionPhase::Connecting => SessionPhase::Active,
            SessionPhase::Active => SessionPhase::Closing,
            SessionPhase::Closing | SessionPhase::Closed => SessionPhase::Closed,
        }
    }

    /// Enters teardown from wherever the session got to. A session that
    /// never became active still passes through `Closing`.
    pub fn begin_close(self) -> Self {
        match self {
            SessionPhase::Connecting | SessionPhase::Active | SessionPhase::Closing => {
                SessionPhase::Closing
            }
            SessionPhase::Closed => SessionPhase::Closed,
        }
    }
}
