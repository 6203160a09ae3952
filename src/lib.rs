//! tfgrpo - Training-free experience library for coding agents
//!
//! Records problem-solving episodes, contrasts failed and successful attempts
//! through a language model to extract a reusable pattern, and serves those
//! patterns back by keyword query.
//!
//! # Architecture
//!
//! - **memory**: error preprocessing, episode tracking, the durable experience store
//! - **summarizer**: contrastive prompt and decision parsing
//! - **models**: language model client and bounded retry
//! - **rag**: keyword scoring and retrieval
//! - **integration**: the four public operations as one service

pub mod errors;
pub mod config;
pub mod telemetry;

pub mod memory;
pub mod models;
pub mod rag;
pub mod summarizer;
pub mod integration;

pub mod cli;
pub mod doctor;

// Re-export commonly used types
pub use errors::{ErrorKind, GrpoError, Result};
pub use integration::ExperienceService;
pub use memory::types::{ActionKind, EndOutcome, ScoredExperience};
