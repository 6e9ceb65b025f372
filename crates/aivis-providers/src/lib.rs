//! # Aivis Providers
//!
//! Answer-engine clients — the LLM chat/answer services the daily batch
//! queries about each organization's prompts.
//!
//! All engines currently speak OpenAI-compatible chat APIs and are handled
//! by a single `OpenAiCompatibleEngine`; the registry maps names to
//! endpoints and auth.

pub mod openai_compatible;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use aivis_core::config::EnginesConfig;
use aivis_core::error::{AivisError, Result};
use async_trait::async_trait;

/// One answer engine the batch can query.
#[async_trait]
pub trait AnswerEngine: Send + Sync + std::fmt::Debug {
    /// Engine identifier.
    fn name(&self) -> &str;

    /// Ask one prompt, get the raw answer text.
    async fn ask(&self, prompt: &str, model: &str) -> Result<String>;
}

/// Create an engine client by name.
pub fn create_engine(name: &str, config: &EnginesConfig) -> Result<Box<dyn AnswerEngine>> {
    let registry = registry::get_engine_config(name)
        .ok_or_else(|| AivisError::EngineNotFound(name.into()))?;
    Ok(Box::new(openai_compatible::OpenAiCompatibleEngine::from_registry(
        registry,
        &config.api_key,
        &config.endpoint,
    )))
}

/// Name → engine map built once at startup and shared by the fan-out.
pub struct EnginePool {
    engines: HashMap<String, Arc<dyn AnswerEngine>>,
}

impl EnginePool {
    /// Build a pool for the given engine names; unknown names are skipped
    /// with a warning so one bad catalog row can't take the batch down.
    pub fn build(names: &[String], config: &EnginesConfig) -> Self {
        let mut engines: HashMap<String, Arc<dyn AnswerEngine>> = HashMap::new();
        for name in names {
            match create_engine(name, config) {
                Ok(engine) => {
                    engines.insert(name.clone(), Arc::from(engine));
                }
                Err(e) => {
                    tracing::warn!("⚠️ Unknown answer engine '{}' skipped: {e}", name);
                }
            }
        }
        Self { engines }
    }

    /// Wrap pre-built engines (tests use this to inject stubs).
    pub fn from_engines(engines: Vec<Arc<dyn AnswerEngine>>) -> Self {
        Self {
            engines: engines
                .into_iter()
                .map(|e| (e.name().to_string(), e))
                .collect(),
        }
    }

    /// Look up an engine by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn AnswerEngine>> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| AivisError::EngineNotFound(name.into()))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
