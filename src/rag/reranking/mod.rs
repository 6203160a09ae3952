// Relevance scoring
pub mod scorer;

pub use scorer::{normalize_keywords, tokenize, KeywordScorer, ScoreBreakdown};
