//! The four public operations
//!
//! [`ExperienceService`] wires the episode tracker, the contrast summarizer,
//! the experience store and the retriever together. It is what a tool host
//! (or the `tfgrpo` binary) calls.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::errors::Result;
use crate::memory::episodic::{AttemptAck, EpisodeTracker};
use crate::memory::experience::ExperienceStore;
use crate::memory::types::{EndOutcome, Episode, EpisodeId, ScoredExperience};
use crate::models::client::LanguageModel;
use crate::models::retry::RetryManager;
use crate::rag::retrieval::{Retriever, SearchParams};
use crate::summarizer::contrast::ContrastSummarizer;
use crate::summarizer::decision::Decision;
use crate::telemetry::{self, TelemetryCollector, TelemetryEvent, TelemetryStats};

/// Episode-to-experience pipeline
pub struct ExperienceService {
    tracker: EpisodeTracker,
    store: Arc<ExperienceStore>,
    summarizer: ContrastSummarizer,
    retriever: Retriever,
    telemetry: TelemetryCollector,
    candidate_limit: usize,
}

impl ExperienceService {
    /// Open the library named in `config` and build the pipeline around `model`
    pub fn open(config: &Config, model: Arc<dyn LanguageModel>) -> Result<Self> {
        config.validate()?;

        let telemetry = TelemetryCollector::new();
        let store = Arc::new(
            ExperienceStore::open(&config.library.path)?.with_telemetry(telemetry.clone()),
        );

        let retry = RetryManager::with_config(
            config.retry.max_attempts,
            config.retry.backoff_ms,
            Duration::from_secs(config.model.timeout_secs),
        )
        .with_telemetry(telemetry.clone());

        let retriever = Retriever::with_params(
            store.clone(),
            SearchParams {
                limit: config.retrieval.default_limit,
            },
        )
        .with_telemetry(telemetry.clone());

        Ok(Self {
            tracker: EpisodeTracker::new(),
            store,
            summarizer: ContrastSummarizer::new(model, retry),
            retriever,
            telemetry,
            candidate_limit: config.retrieval.candidate_limit,
        })
    }

    /// `start_episode(task)`
    pub fn start_episode(&self, task: &str) -> Result<EpisodeId> {
        let id = self.tracker.start(task)?;
        telemetry::emit_episode_started(&id, task.trim());
        self.telemetry.record(TelemetryEvent::EpisodeStarted);
        Ok(id)
    }

    /// `log_attempt(episode_id, short_desc, error_output?, success)`
    pub fn log_attempt(
        &self,
        episode_id: &str,
        short_desc: &str,
        error_output: Option<&str>,
        success: bool,
    ) -> Result<AttemptAck> {
        let ack = self
            .tracker
            .log_attempt(episode_id, short_desc, error_output, success)?;

        let error_type = ack
            .preprocessed_error
            .as_ref()
            .and_then(|s| s.error_type.as_deref());
        telemetry::emit_attempt_logged(episode_id, ack.index, success, error_type);
        self.telemetry.record(TelemetryEvent::AttemptLogged { success });
        Ok(ack)
    }

    /// `end_episode(episode_id, result, success)` with optional notes
    ///
    /// The episode is frozen before the model is called. If extraction fails
    /// it stays ended and the library is left untouched.
    pub async fn end_episode(
        &self,
        episode_id: &str,
        result: &str,
        success: bool,
        notes: Option<&str>,
    ) -> Result<EndOutcome> {
        let episode = self.tracker.end(episode_id, result, success, notes)?;
        telemetry::emit_episode_ended(&episode.id, episode.attempts.len(), success);
        self.telemetry.record(TelemetryEvent::EpisodeEnded);

        let candidates = self.retriever.candidates(&episode.task, self.candidate_limit);

        let decision = match self.summarizer.summarize(&episode, &candidates).await {
            Ok(decision) => decision,
            Err(e) => {
                telemetry::emit_extraction_failed(&episode.id, &e);
                self.telemetry.record(TelemetryEvent::ExtractionFailed);
                return Err(e);
            }
        };
        self.telemetry.record(TelemetryEvent::ExtractionSucceeded);

        let outcome = self.apply(&episode, decision).await?;
        telemetry::emit_decision_applied(
            &episode.id,
            &outcome.action.to_string(),
            outcome.experience_id.as_deref(),
        );
        Ok(outcome)
    }

    /// `pull_experiences(query, limit?)`
    pub fn pull_experiences(&self, query: &str, limit: Option<usize>) -> Result<Vec<ScoredExperience>> {
        self.retriever.pull(query, limit)
    }

    /// Snapshot of a tracked episode
    pub fn episode(&self, episode_id: &str) -> Option<Episode> {
        self.tracker.get(episode_id)
    }

    pub fn store(&self) -> &Arc<ExperienceStore> {
        &self.store
    }

    pub fn model_name(&self) -> &str {
        self.summarizer.model_name()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.telemetry.get_stats()
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Persist the committed library one last time
    pub async fn shutdown(&self) -> Result<()> {
        self.store.flush().await
    }

    async fn apply(&self, episode: &Episode, decision: Decision) -> Result<EndOutcome> {
        let action = decision.action();
        let experience_id = match decision {
            Decision::Add {
                pattern,
                keywords,
                insight,
            } => {
                self.store
                    .add(&pattern, &keywords, &insight, &episode.id)
                    .await?
            }
            Decision::Modify { target_id, patch } => {
                self.store.modify(&target_id, &patch).await?;
                target_id
            }
            Decision::Delete { target_id } => {
                self.store.delete(&target_id).await?;
                target_id
            }
        };

        Ok(EndOutcome {
            action,
            experience_id: Some(experience_id),
        })
    }
}
