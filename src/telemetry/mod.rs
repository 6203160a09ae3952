//! Telemetry for tfgrpo
//!
//! Structured lifecycle events go through `tracing` with a stable `event`
//! field. A [`TelemetryCollector`] additionally keeps per-process counters that
//! the service reports through `stats()`.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Telemetry event types
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    EpisodeStarted,
    AttemptLogged { success: bool },
    EpisodeEnded,
    ExtractionSucceeded,
    ExtractionFailed,
    ExtractionRetry,
    LibraryCommitted,
    LibraryRolledBack,
    QueryServed { hits: usize },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub episodes_started: usize,
    pub episodes_ended: usize,
    pub attempts_logged: usize,
    pub attempts_failed: usize,
    pub extractions_succeeded: usize,
    pub extractions_failed: usize,
    pub retry_attempts: usize,
    pub library_commits: usize,
    pub library_rollbacks: usize,
    pub queries_served: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            TelemetryEvent::EpisodeStarted => stats.episodes_started += 1,
            TelemetryEvent::AttemptLogged { success } => {
                stats.attempts_logged += 1;
                if !success {
                    stats.attempts_failed += 1;
                }
            }
            TelemetryEvent::EpisodeEnded => stats.episodes_ended += 1,
            TelemetryEvent::ExtractionSucceeded => stats.extractions_succeeded += 1,
            TelemetryEvent::ExtractionFailed => stats.extractions_failed += 1,
            TelemetryEvent::ExtractionRetry => stats.retry_attempts += 1,
            TelemetryEvent::LibraryCommitted => stats.library_commits += 1,
            TelemetryEvent::LibraryRolledBack => stats.library_rollbacks += 1,
            TelemetryEvent::QueryServed { .. } => stats.queries_served += 1,
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Share of finished extractions that produced a decision
    pub fn extraction_success_rate(&self) -> f64 {
        let stats = self.get_stats();
        let total = stats.extractions_succeeded + stats.extractions_failed;
        if total == 0 {
            1.0
        } else {
            stats.extractions_succeeded as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Output format for the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `TFGRPO_LOG_FORMAT=json` selects JSON lines
    pub fn from_env() -> Self {
        match std::env::var("TFGRPO_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber (stderr, filter from `TFGRPO_LOG`, default `default_level`)
pub fn init_logging(default_level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TFGRPO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // A second install (tests, embedding hosts) is not an error worth surfacing.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

pub fn emit_episode_started(episode_id: &str, task: &str) {
    info!(event = "episode.started", episode_id = %episode_id, task = %task);
}

pub fn emit_attempt_logged(episode_id: &str, index: usize, success: bool, error_type: Option<&str>) {
    info!(
        event = "attempt.logged",
        episode_id = %episode_id,
        index = index,
        success = success,
        error_type = error_type.unwrap_or("none"),
    );
}

pub fn emit_episode_ended(episode_id: &str, attempts: usize, success: bool) {
    info!(
        event = "episode.ended",
        episode_id = %episode_id,
        attempts = attempts,
        success = success,
    );
}

pub fn emit_extraction_retry(attempt: u32, delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(event = "extraction.retry", attempt = attempt, delay_ms = delay_ms, error = %error);
}

pub fn emit_extraction_failed(episode_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "extraction.failed", episode_id = %episode_id, error = %error);
}

pub fn emit_decision_applied(episode_id: &str, action: &str, experience_id: Option<&str>) {
    info!(
        event = "decision.applied",
        episode_id = %episode_id,
        action = %action,
        experience_id = experience_id.unwrap_or("none"),
    );
}

pub fn emit_library_committed(op: &str, size: usize) {
    info!(event = "library.committed", op = %op, size = size);
}

pub fn emit_library_rolled_back(op: &str, error: &dyn std::fmt::Display) {
    warn!(event = "library.rolled_back", op = %op, error = %error);
}

pub fn emit_retrieval_completed(query: &str, hits: usize, limit: usize) {
    info!(event = "retrieval.completed", query = %query, hits = hits, limit = limit);
}
