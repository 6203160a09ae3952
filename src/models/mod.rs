//! Language model access
//!
//! - `client`: the [`LanguageModel`] seam and its OpenRouter implementation
//! - `retry`: bounded retry with backoff and per-attempt timeout
//! - `types`: chat completion wire types

pub mod client;
pub mod retry;
pub mod types;

pub use client::{LanguageModel, OpenRouterClient};
pub use retry::{RetryFailure, RetryManager};
pub use types::{ChatMessage, ChatRequest, ChatResponse};
