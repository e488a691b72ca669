//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! connection shares: the agent pipeline, the session store and the loaded
//! configuration.

use crate::config::Config;
use liveagent_core::{pipeline::AgentPipeline, store::SessionStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn AgentPipeline>,
    pub sessions: Arc<dyn SessionStore>,
    pub config: Arc<Config>,
}
