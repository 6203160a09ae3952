//! Keyword retrieval over the experience library
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::errors::{GrpoError, Result};
use crate::memory::experience::{ExperienceLibrary, ExperienceStore};
use crate::memory::types::{Experience, ScoredExperience};
use crate::rag::reranking::scorer::{tokenize, KeywordScorer};
use crate::telemetry::{self, TelemetryCollector, TelemetryEvent};

/// Result count used when the caller gives none
pub const DEFAULT_LIMIT: usize = 5;

/// Search parameters for retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of results to return (at least 1)
    pub limit: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Ranks stored experiences against free-text queries
pub struct Retriever {
    store: Arc<ExperienceStore>,
    default_params: SearchParams,
    telemetry: Option<TelemetryCollector>,
}

impl Retriever {
    pub fn new(store: Arc<ExperienceStore>) -> Self {
        Self::with_params(store, SearchParams::default())
    }

    pub fn with_params(store: Arc<ExperienceStore>, params: SearchParams) -> Self {
        Self {
            store,
            default_params: params,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, collector: TelemetryCollector) -> Self {
        self.telemetry = Some(collector);
        self
    }

    /// Top experiences for `query`, best first
    ///
    /// `limit` falls back to the default when `None`; `Some(0)` is rejected.
    pub fn pull(&self, query: &str, limit: Option<usize>) -> Result<Vec<ScoredExperience>> {
        let limit = limit.unwrap_or(self.default_params.limit);
        let library = self.store.snapshot();
        let hits = rank(&library, query, limit)?;

        telemetry::emit_retrieval_completed(query, hits.len(), limit);
        if let Some(collector) = &self.telemetry {
            collector.record(TelemetryEvent::QueryServed { hits: hits.len() });
        }
        Ok(hits)
    }

    /// Experiences worth offering to the summarizer for an episode task
    ///
    /// Unlike [`pull`](Self::pull) this is internal plumbing and records no query.
    pub fn candidates(&self, task: &str, limit: usize) -> Vec<Experience> {
        if limit == 0 {
            return Vec::new();
        }
        let library = self.store.snapshot();
        rank(&library, task, limit)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| library.get(&hit.id).cloned())
            .collect()
    }

    pub fn default_params(&self) -> &SearchParams {
        &self.default_params
    }
}

/// Score every experience, drop zero scores, order and truncate
///
/// Ordering: score descending, then `updated_at` descending, then id.
pub fn rank(library: &ExperienceLibrary, query: &str, limit: usize) -> Result<Vec<ScoredExperience>> {
    if limit == 0 {
        return Err(GrpoError::Validation("limit must be at least 1".to_string()));
    }

    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(f64, &Experience)> = library
        .iter()
        .map(|experience| (KeywordScorer::score(&tokens, experience), experience))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);

    Ok(scored
        .into_iter()
        .map(|(score, experience)| ScoredExperience::from_experience(experience, score))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn experience(id: &str, pattern: &str, words: &[&str], age_secs: i64) -> Experience {
        let at = Utc::now() - Duration::seconds(age_secs);
        Experience {
            id: id.to_string(),
            pattern: pattern.to_string(),
            keywords: keywords(words),
            insight: String::new(),
            created_at: at,
            updated_at: at,
            source_episode_id: "ep_test".to_string(),
        }
    }

    fn library(experiences: Vec<Experience>) -> ExperienceLibrary {
        let json = serde_json::json!({ "experiences": experiences });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_search_params_default() {
        assert_eq!(SearchParams::default().limit, 5);
    }

    #[test]
    fn test_keyword_match_outranks_substring() {
        let library = library(vec![
            experience("exp_sub", "handle async timeout in the event loop", &["loop"], 0),
            experience("exp_kw", "unrelated pattern", &["timeout"], 100),
        ]);

        let hits = rank(&library, "async timeout", 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exp_kw");
        assert_eq!(hits[1].id, "exp_sub");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_zero_scores_excluded() {
        let library = library(vec![experience("exp_a", "docker layer caching", &["docker"], 0)]);
        assert!(rank(&library, "async timeout", 5).unwrap().is_empty());
        assert!(rank(&library, "   ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_ties_prefer_recent_update() {
        let library = library(vec![
            experience("exp_old", "x", &["timeout"], 500),
            experience("exp_new", "y", &["timeout"], 5),
        ]);
        let hits = rank(&library, "timeout", 5).unwrap();
        assert_eq!(hits[0].id, "exp_new");
        assert_eq!(hits[1].id, "exp_old");
    }

    #[test]
    fn test_limit() {
        let library = library(
            (0..8)
                .map(|i| experience(&format!("exp_{}", i), "p", &["cache"], i))
                .collect(),
        );
        assert_eq!(rank(&library, "cache", 3).unwrap().len(), 3);
        assert_eq!(rank(&library, "cache", 50).unwrap().len(), 8);

        let err = rank(&library, "cache", 0).unwrap_err();
        assert!(matches!(err, GrpoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retriever_pull_and_candidates() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ExperienceStore::open(temp.path().join("lib.json")).unwrap());
        store
            .add("bound awaits", &keywords(&["async", "timeout"]), "use wait_for", "ep_1")
            .await
            .unwrap();

        let collector = TelemetryCollector::new();
        let retriever = Retriever::new(store.clone()).with_telemetry(collector.clone());

        let hits = retriever.pull("Async TIMEOUT", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].keywords, keywords(&["async", "timeout"]));
        assert_eq!(collector.get_stats().queries_served, 1);

        assert!(retriever.pull("async", Some(0)).is_err());
        assert_eq!(retriever.candidates("fix async bug", 3).len(), 1);
        assert!(retriever.candidates("fix async bug", 0).is_empty());
        assert_eq!(collector.get_stats().queries_served, 1);
    }
}
