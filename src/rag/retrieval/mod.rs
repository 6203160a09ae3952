// Retrieval Engine Module
pub mod engine;

pub use engine::{rank, Retriever, SearchParams, DEFAULT_LIMIT};
