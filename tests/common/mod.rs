//! Shared fixtures: a scripted model and a service over a temporary library
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tfgrpo::config::Config;
use tfgrpo::models::LanguageModel;
use tfgrpo::{ExperienceService, GrpoError, Result};

/// Replays canned replies in order and records every prompt it receives
pub struct ScriptedModel {
    replies: Mutex<Vec<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(GrpoError::ModelApi("no scripted reply left".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.library.path = temp.path().join("experiences.json");
    config.retry.backoff_ms = 0;
    config
}

pub fn service_with(temp: &TempDir, model: Arc<ScriptedModel>) -> ExperienceService {
    ExperienceService::open(&test_config(temp), model).unwrap()
}

pub const ASYNC_TIMEOUT_ADD: &str = r#"{"action":"add","pattern":"Wrap the awaited call in a timeout context manager","keywords":["timeout","async","asyncio"],"insight":"Bound slow awaits with a context manager instead of longer sleeps"}"#;
