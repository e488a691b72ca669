use liveagent_core::liveness::LivenessConfig;
use liveagent_core::outbound::ProducerRoles;
use liveagent_core::utterance::UtteranceDetectorConfig;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The agent runtime sessions are served by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    /// Local runtime that repeats user input back; needs no credentials.
    Echo,
}

/// How the end of a spoken user turn is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnDetection {
    /// The pipeline detects turn ends itself; `endOfAudio` is ignored.
    Pipeline,
    /// The client sends `endOfAudio` when the user stops talking.
    Explicit,
    /// `endOfAudio` is honoured, and a turn also ends after a run of quiet
    /// audio.
    Silence,
}

impl FromStr for TurnDetection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pipeline" | "vad" => Ok(Self::Pipeline),
            "explicit" => Ok(Self::Explicit),
            "silence" => Ok(Self::Silence),
            other => Err(format!(
                "'{other}' is not one of pipeline, explicit, silence"
            )),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub gemini_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub log_level: Level,
    pub heartbeat_interval: Duration,
    pub max_missed_pongs: u32,
    pub turn_detection: TurnDetection,
    pub silence_threshold: u16,
    pub silence_hang: Duration,
    pub session_ttl: Duration,
    pub greeting_prompt: Option<String>,
    pub structured_producers: Vec<String>,
    pub summary_producers: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub system_prompt_path: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn list_var(name: &str, default: &[&str]) -> Vec<String> {
    match var(name) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let provider = match var("PIPELINE_PROVIDER").map(|p| p.to_lowercase()).as_deref() {
            None | Some("gemini") => Provider::Gemini,
            Some("echo") => Provider::Echo,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "PIPELINE_PROVIDER".to_string(),
                    format!("'{other}' is not one of gemini, echo"),
                ));
            }
        };

        let gemini_api_key = var("GEMINI_API_KEY").map(SecretString::from);
        if provider == Provider::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
            ));
        }
        let gemini_model = var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let heartbeat_interval = Duration::from_secs(parse_var("HEARTBEAT_INTERVAL_SECS", 10u64)?);
        let max_missed_pongs = parse_var("MAX_MISSED_PONGS", 4u32)?;
        if heartbeat_interval.is_zero() || max_missed_pongs == 0 {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_INTERVAL_SECS/MAX_MISSED_PONGS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            provider,
            gemini_api_key,
            gemini_model,
            log_level,
            heartbeat_interval,
            max_missed_pongs,
            turn_detection: parse_var("TURN_DETECTION", TurnDetection::Explicit)?,
            silence_threshold: parse_var("SILENCE_THRESHOLD", 500u16)?,
            silence_hang: Duration::from_millis(parse_var("SILENCE_HANG_MS", 1000u64)?),
            session_ttl: Duration::from_secs(parse_var("SESSION_TTL_SECS", 300u64)?),
            greeting_prompt: var("GREETING_PROMPT"),
            structured_producers: list_var("STRUCTURED_PRODUCERS", &["shopping_worker_agent"]),
            summary_producers: list_var("SUMMARY_PRODUCERS", &["shop_agent"]),
            allowed_origins: list_var(
                "ALLOWED_ORIGINS",
                &["http://localhost:3000", "http://127.0.0.1:3000"],
            ),
            system_prompt_path: var("SYSTEM_PROMPT_PATH").map(PathBuf::from),
        })
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            period: self.heartbeat_interval,
            max_missed: self.max_missed_pongs,
        }
    }

    pub fn utterance(&self) -> UtteranceDetectorConfig {
        UtteranceDetectorConfig {
            threshold: self.silence_threshold,
            hang_time: self.silence_hang,
            ..Default::default()
        }
    }

    pub fn producer_roles(&self) -> ProducerRoles {
        ProducerRoles::new(
            self.structured_producers.iter().cloned(),
            self.summary_producers.iter().cloned(),
        )
    }

    /// Session record retention as a chrono duration, saturating on overflow.
    pub fn session_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// A configuration for the local echo pipeline, used by tests.
    pub fn for_echo() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            provider: Provider::Echo,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            log_level: Level::INFO,
            heartbeat_interval: Duration::from_secs(10),
            max_missed_pongs: 4,
            turn_detection: TurnDetection::Explicit,
            silence_threshold: 500,
            silence_hang: Duration::from_secs(1),
            session_ttl: Duration::from_secs(300),
            greeting_prompt: None,
            structured_producers: vec!["shopping_worker_agent".to_string()],
            summary_producers: vec!["shop_agent".to_string()],
            allowed_origins: Vec::new(),
            system_prompt_path: None,
        }
    }
}
