//! WebSocket Session Management
//!
//! Each connection is bridged to one agent pipeline session by three
//! cooperating relays under a supervisor:
//!
//! - `inbound`: client frames to pipeline requests, including turn handling.
//! - `outbound`: agent events to client frames.
//! - `liveness`: application-level heartbeat.
//! - `transport`: the single writer that owns the socket's sending half.
//! - `session`: connection handlers and the supervisor.
//! - `provider`: agent runtimes (Gemini Live, local echo).

pub mod inbound;
pub mod liveness;
pub mod outbound;
pub mod provider;
pub mod session;
pub mod transport;

pub use session::{audio_ws_handler, text_ws_handler, ws_handler};
