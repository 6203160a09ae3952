//! Keyword relevance scoring
//!
//! A pure function of (query tokens, experience). Keyword-set membership is
//! worth a full point per token; substring hits in the pattern or insight text
//! share a pool that is capped below one point, so a single keyword hit always
//! outranks any number of substring-only hits.

use crate::memory::types::Experience;
use std::collections::BTreeSet;

/// Score contributed by each query token found in the keyword set
pub const KEYWORD_WEIGHT: f64 = 1.0;

/// Upper bound on the total substring contribution (strictly below `KEYWORD_WEIGHT`)
pub const SUBSTRING_WEIGHT: f64 = 0.5;

/// Shorter tokens are too noisy to count as substring evidence
pub const MIN_SUBSTRING_TOKEN_LEN: usize = 3;

/// Case-fold and split on non-word characters (word = alphanumeric or `_`)
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize free-form keywords into the token set stored on an experience
///
/// Multi-word keywords contribute each of their tokens.
pub fn normalize_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .flat_map(|k| tokenize(k.as_ref()))
        .collect()
}

/// Breakdown of a relevance score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub keyword_hits: usize,
    pub substring_hits: usize,
    pub score: f64,
}

/// Keyword scorer
pub struct KeywordScorer;

impl KeywordScorer {
    /// Score one experience against pre-tokenized query terms
    pub fn breakdown(query_tokens: &BTreeSet<String>, experience: &Experience) -> ScoreBreakdown {
        if query_tokens.is_empty() {
            return ScoreBreakdown {
                keyword_hits: 0,
                substring_hits: 0,
                score: 0.0,
            };
        }

        let keyword_hits = query_tokens
            .iter()
            .filter(|t| experience.keywords.contains(*t))
            .count();

        let text = format!("{} {}", experience.pattern, experience.insight).to_lowercase();
        let substring_hits = query_tokens
            .iter()
            .filter(|t| t.chars().count() >= MIN_SUBSTRING_TOKEN_LEN && text.contains(t.as_str()))
            .count();

        let substring_score = SUBSTRING_WEIGHT * substring_hits as f64 / query_tokens.len() as f64;

        ScoreBreakdown {
            keyword_hits,
            substring_hits,
            score: KEYWORD_WEIGHT * keyword_hits as f64 + substring_score,
        }
    }

    /// Relevance score only
    pub fn score(query_tokens: &BTreeSet<String>, experience: &Experience) -> f64 {
        Self::breakdown(query_tokens, experience).score
    }
}
