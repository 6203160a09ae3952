//! Episodes and the experience library
//!
//! Components:
//! - Preprocessor: reduces raw error output to a compact signal
//! - Episode Tracker: in-memory lifecycle of task attempts
//! - Experience Store: durable, mutex-serialized experience library

pub mod episodic;
pub mod experience;
pub mod preprocess;
pub mod types;

pub use episodic::{AttemptAck, EpisodeTracker};
pub use experience::{ExperienceLibrary, ExperienceStore};
pub use preprocess::{preprocess_error, ErrorPreprocessor};
pub use types::{
    ActionKind, Attempt, EndOutcome, Episode, EpisodeId, EpisodeStatus, ErrorSignal, Experience,
    ExperienceId, ExperiencePatch, ScoredExperience,
};
