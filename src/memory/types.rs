//! Core data types for episodes and the experience library

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for episodes (`ep_<timestamp>_<seq>`)
pub type EpisodeId = String;

/// Unique identifier for experiences (`exp_<uuid>`)
pub type ExperienceId = String;

/// Episode lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Accepting attempts
    Active,
    /// Frozen by `end_episode` (terminal)
    Ended,
}

/// Compact error signal extracted from raw error output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSignal {
    /// Exception/error type token, e.g. `TimeoutError`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Source line number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Base file name of the first reported location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ErrorSignal {
    /// True when no rule matched
    pub fn is_empty(&self) -> bool {
        self.error_type.is_none() && self.line.is_none() && self.file.is_none()
    }
}

/// Whether an attempt was logged by the caller or synthesized at episode end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Step,
    Outcome,
}

/// One logged action within an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// What was tried
    pub short_desc: String,
    /// Raw error output as supplied; never forwarded to the model
    pub raw_error: Option<String>,
    /// Reduced error signal
    pub preprocessed_error: Option<ErrorSignal>,
    /// Whether this attempt worked
    pub success: bool,
    pub logged_at: DateTime<Utc>,
    pub kind: AttemptKind,
}

/// One tracked problem-solving session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    /// Natural language task description (non-empty)
    pub task: String,
    pub status: EpisodeStatus,
    /// Attempts in logging order
    pub attempts: Vec<Attempt>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Free-text context supplied at end
    pub notes: Option<String>,
}

impl Episode {
    /// Create a new active episode
    pub fn new(id: EpisodeId, task: String) -> Self {
        Self {
            id,
            task,
            status: EpisodeStatus::Active,
            attempts: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
            notes: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EpisodeStatus::Active
    }

    /// Number of failed attempts
    pub fn failure_count(&self) -> usize {
        self.attempts.iter().filter(|a| !a.success).count()
    }
}

/// A stored, reusable pattern derived from contrasting attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    /// Causal insight: what worked that the failures lacked
    pub pattern: String,
    /// Normalized search tokens (never empty)
    pub keywords: BTreeSet<String>,
    /// Actionable advice
    pub insight: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_episode_id: EpisodeId,
}

/// Partial update applied by a `modify` decision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperiencePatch {
    pub pattern: Option<String>,
    /// Replaces the prior set when present
    pub keywords: Option<BTreeSet<String>>,
    pub insight: Option<String>,
}

impl ExperiencePatch {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.keywords.is_none() && self.insight.is_none()
    }
}

/// Library update kind chosen by the summarizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Modify,
    Delete,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Add => "add",
            ActionKind::Modify => "modify",
            ActionKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Result of `end_episode`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOutcome {
    pub action: ActionKind,
    /// Experience created, updated or removed by the action
    pub experience_id: Option<ExperienceId>,
}

/// Retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredExperience {
    pub id: ExperienceId,
    pub pattern: String,
    pub keywords: BTreeSet<String>,
    pub insight: String,
    pub score: f64,
}

impl ScoredExperience {
    pub fn from_experience(experience: &Experience, score: f64) -> Self {
        Self {
            id: experience.id.clone(),
            pattern: experience.pattern.clone(),
            keywords: experience.keywords.clone(),
            insight: experience.insight.clone(),
            score,
        }
    }
}
