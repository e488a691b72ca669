//! Live Agent API Library Crate
//!
//! The web service that multiplexes client WebSocket sessions onto agent
//! pipeline sessions: configuration, application state, REST handlers,
//! WebSocket relays, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
