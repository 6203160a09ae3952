//! Recorded episode files
//!
//! A recorded episode is a JSON document replayed through the same three
//! calls an agent would make:
//!
//! ```json
//! {
//!   "task": "Fix async timeout bug",
//!   "attempts": [
//!     {"desc": "Added wait_for 10s", "error": "TimeoutError: timeout at line 42", "success": false},
//!     {"desc": "Used timeout context manager", "success": true}
//!   ],
//!   "result": "fixed",
//!   "success": true,
//!   "notes": "optional"
//! }
//! ```

use crate::errors::{GrpoError, Result};
use crate::integration::service::ExperienceService;
use crate::memory::types::{EndOutcome, EpisodeId};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAttempt {
    #[serde(alias = "short_desc")]
    pub desc: String,
    #[serde(default, alias = "error_output")]
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeScript {
    pub task: String,
    #[serde(default)]
    pub attempts: Vec<ScriptedAttempt>,
    pub result: String,
    pub success: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl EpisodeScript {
    /// Read a script from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            GrpoError::Validation(format!("cannot read episode file {}: {}", path.display(), e))
        })?;
        Self::parse(&json)
    }

    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| GrpoError::Validation(format!("invalid episode file: {}", e)))
    }

    /// Run the script through `service`
    pub async fn replay(&self, service: &ExperienceService) -> Result<(EpisodeId, EndOutcome)> {
        let id = service.start_episode(&self.task)?;
        for attempt in &self.attempts {
            service.log_attempt(&id, &attempt.desc, attempt.error.as_deref(), attempt.success)?;
        }
        let outcome = service
            .end_episode(&id, &self.result, self.success, self.notes.as_deref())
            .await?;
        Ok((id, outcome))
    }
}
