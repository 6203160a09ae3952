//! Contrastive summarization of a finished episode
//!
//! Builds one compact prompt from the episode (task, attempt descriptions,
//! preprocessed error signals, outcome) plus the candidate experiences the
//! model may modify or delete, and asks the model for a single decision.
//! Raw error output never reaches the prompt.

use crate::errors::{GrpoError, Result};
use crate::memory::types::{Attempt, AttemptKind, Episode, ErrorSignal, Experience, ExperienceId};
use crate::models::client::LanguageModel;
use crate::models::retry::RetryManager;
use crate::summarizer::decision::{parse_decision, Decision};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Longest attempt description forwarded to the model
const MAX_DESC_CHARS: usize = 160;

const RESPONSE_FORMAT: &str = r#"Reply with ONE JSON object only, choosing one action:
{"action":"add","pattern":"what worked that the failures lacked (5-10 words)","keywords":["search","terms"],"insight":"actionable advice (10-15 words)"}
{"action":"modify","target_id":"<existing id>","pattern":"...","keywords":["..."],"insight":"..."}
{"action":"delete","target_id":"<existing id>"}
Use modify or delete only for an existing experience listed above."#;

/// Turns an ended episode into a library decision
pub struct ContrastSummarizer {
    model: Arc<dyn LanguageModel>,
    retry: RetryManager,
}

impl ContrastSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryManager) -> Self {
        Self { model, retry }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Ask the model for a decision, retrying malformed or failed calls
    ///
    /// Returns [`GrpoError::Extraction`] once the retry budget is spent.
    pub async fn summarize(&self, episode: &Episode, candidates: &[Experience]) -> Result<Decision> {
        let prompt = build_prompt(episode, candidates);
        let allowed: BTreeSet<ExperienceId> = candidates.iter().map(|e| e.id.clone()).collect();

        let model = &self.model;
        let prompt = prompt.as_str();
        let allowed = &allowed;

        self.retry
            .execute_with_retry(|| async move {
                let reply = model.complete(prompt).await?;
                parse_decision(&reply, allowed)
            })
            .await
            .map_err(|failure| GrpoError::Extraction {
                attempts: failure.attempts,
                reason: failure.last_error.to_string(),
            })
    }
}

/// Render the contrast prompt for `episode`
pub fn build_prompt(episode: &Episode, candidates: &[Experience]) -> String {
    let mut prompt = String::from(
        "Contrast the failed and successful attempts of this task and decide one update to the experience library.\n\n",
    );

    prompt.push_str(&format!("Task: {}\n", episode.task.trim()));
    if let Some(notes) = episode.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!("Notes: {}\n", clip(notes.trim())));
    }

    prompt.push_str("\nAttempts:\n");
    let steps: Vec<&Attempt> = episode
        .attempts
        .iter()
        .filter(|a| a.kind == AttemptKind::Step)
        .collect();
    if steps.is_empty() {
        prompt.push_str("- none\n");
    }
    for (i, attempt) in steps.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, render_attempt(attempt)));
    }

    if let Some(outcome) = episode.attempts.iter().rev().find(|a| a.kind == AttemptKind::Outcome) {
        prompt.push_str(&format!("\nOutcome: {}\n", render_attempt(outcome)));
    }

    prompt.push_str("\nExisting experiences:\n");
    if candidates.is_empty() {
        prompt.push_str("- none\n");
    }
    for experience in candidates {
        let keywords: Vec<&str> = experience.keywords.iter().map(String::as_str).collect();
        prompt.push_str(&format!(
            "- {}: {} | keywords: {} | insight: {}\n",
            experience.id,
            experience.pattern,
            keywords.join(", "),
            experience.insight
        ));
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

fn render_attempt(attempt: &Attempt) -> String {
    let status = if attempt.success { "ok" } else { "failed" };
    let signal = attempt
        .preprocessed_error
        .as_ref()
        .map(render_signal)
        .unwrap_or_else(|| "none".to_string());
    format!("[{}] {} (error: {})", status, clip(attempt.short_desc.trim()), signal)
}

fn render_signal(signal: &ErrorSignal) -> String {
    if signal.is_empty() {
        return "none".to_string();
    }

    let mut parts = Vec::new();
    if let Some(error_type) = &signal.error_type {
        parts.push(error_type.clone());
    }
    if let Some(line) = signal.line {
        parts.push(format!("line {}", line));
    }
    if let Some(file) = &signal.file {
        parts.push(format!("in {}", file));
    }
    parts.join(" ")
}

fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_DESC_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
