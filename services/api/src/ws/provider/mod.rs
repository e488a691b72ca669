//! Agent runtimes a session can be served by.

pub mod echo;
pub mod gemini;

use crate::config::{Config, Provider};
use anyhow::{Context, Result};
use liveagent_core::pipeline::AgentPipeline;
use std::sync::Arc;
use tracing::info;

/// Builds the pipeline selected by the configuration.
pub fn build_pipeline(config: &Config, system_prompt: Option<String>) -> Result<Arc<dyn AgentPipeline>> {
    match config.provider {
        Provider::Gemini => {
            info!(model = %config.gemini_model, "Using Gemini Live provider.");
            let api_key = config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY must be set for 'gemini' provider")?;
            Ok(Arc::new(gemini::GeminiLivePipeline::new(
                api_key,
                config.gemini_model.clone(),
                system_prompt,
            )))
        }
        Provider::Echo => {
            info!("Using local echo provider.");
            Ok(Arc::new(echo::EchoPipeline::default()))
        }
    }
}
