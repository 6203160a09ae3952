// Experience retrieval
//
// Components:
// - Retrieval Engine: ranks stored experiences against a query
// - Re-ranking: pure keyword relevance scoring

pub mod reranking;
pub mod retrieval;

pub use reranking::KeywordScorer;
pub use retrieval::{rank, Retriever, SearchParams};
