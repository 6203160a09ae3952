// Service integration
//
// Exposes the episode lifecycle and retrieval as one object that a tool host
// or the CLI drives.

pub mod service;

pub use service::ExperienceService;
