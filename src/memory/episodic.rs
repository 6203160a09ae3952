//! Episode tracking: lifecycle and attempt logging
//!
//! Episodes live in memory for the lifetime of the process. Each episode sits
//! behind its own lock, so calls on different episode ids never contend beyond
//! the brief map lookup. Only the most recently ended episodes keep their
//! attempt log; older ones are compacted to their id, task and status so a
//! repeated `end` is still rejected.

use crate::errors::{GrpoError, Result};
use crate::memory::preprocess::preprocess_error;
use crate::memory::types::{
    Attempt, AttemptKind, Episode, EpisodeId, EpisodeStatus, ErrorSignal,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Ended episodes that keep their full attempt log
pub const RETAINED_ENDED: usize = 1024;

/// Acknowledgement returned by `log_attempt`
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptAck {
    pub episode_id: EpisodeId,
    /// Zero-based position of the new attempt
    pub index: usize,
    pub success: bool,
    pub preprocessed_error: Option<ErrorSignal>,
}

/// Tracks episodes in memory
pub struct EpisodeTracker {
    episodes: RwLock<HashMap<EpisodeId, Arc<Mutex<Episode>>>>,
    /// Disambiguates ids created within the same microsecond
    sequence: AtomicU64,
    /// Ended ids, oldest first, whose attempts are still held
    ended: Mutex<VecDeque<EpisodeId>>,
    retain_ended: usize,
}

impl EpisodeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::with_retention(RETAINED_ENDED)
    }

    /// Create a tracker that keeps attempts for the last `retain_ended` ended episodes
    pub fn with_retention(retain_ended: usize) -> Self {
        Self {
            episodes: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            ended: Mutex::new(VecDeque::new()),
            retain_ended,
        }
    }

    /// Start a new episode and return its id
    pub fn start(&self, task: &str) -> Result<EpisodeId> {
        let task = task.trim();
        if task.is_empty() {
            return Err(GrpoError::Validation("task must not be empty".to_string()));
        }

        let id = self.next_id();
        let episode = Episode::new(id.clone(), task.to_string());

        self.episodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::new(Mutex::new(episode)));

        Ok(id)
    }

    /// Append an attempt to an active episode
    pub fn log_attempt(
        &self,
        episode_id: &str,
        short_desc: &str,
        error_output: Option<&str>,
        success: bool,
    ) -> Result<AttemptAck> {
        let handle = self.handle(episode_id)?;
        let mut episode = lock(&handle);

        if !episode.is_active() {
            return Err(GrpoError::Validation(format!(
                "episode {} has ended; no further attempts can be logged",
                episode_id
            )));
        }

        let raw_error = error_output
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let preprocessed_error = raw_error.as_deref().map(preprocess_error);

        episode.attempts.push(Attempt {
            short_desc: short_desc.trim().to_string(),
            raw_error,
            preprocessed_error: preprocessed_error.clone(),
            success,
            logged_at: Utc::now(),
            kind: AttemptKind::Step,
        });

        Ok(AttemptAck {
            episode_id: episode.id.clone(),
            index: episode.attempts.len() - 1,
            success,
            preprocessed_error,
        })
    }

    /// Freeze an episode, append its outcome, and return the final snapshot
    ///
    /// Fails on a second call for the same id: an ended episode carries no new
    /// information to extract.
    pub fn end(
        &self,
        episode_id: &str,
        result: &str,
        success: bool,
        notes: Option<&str>,
    ) -> Result<Episode> {
        let handle = self.handle(episode_id)?;
        let mut episode = lock(&handle);

        if episode.status == EpisodeStatus::Ended {
            return Err(GrpoError::Validation(format!(
                "episode {} has already ended",
                episode_id
            )));
        }

        let now = Utc::now();
        episode.attempts.push(Attempt {
            short_desc: result.trim().to_string(),
            raw_error: None,
            preprocessed_error: None,
            success,
            logged_at: now,
            kind: AttemptKind::Outcome,
        });
        episode.status = EpisodeStatus::Ended;
        episode.ended_at = Some(now);
        episode.notes = notes
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let snapshot = episode.clone();
        drop(episode);
        self.retire(snapshot.id.clone());

        Ok(snapshot)
    }

    /// Snapshot of an episode
    pub fn get(&self, episode_id: &str) -> Option<Episode> {
        let handle = self.handle(episode_id).ok()?;
        let episode = lock(&handle).clone();
        Some(episode)
    }

    /// Number of episodes still accepting attempts
    pub fn active_count(&self) -> usize {
        let episodes = self.episodes.read().unwrap_or_else(|e| e.into_inner());
        let active = episodes.values().filter(|h| lock(h).is_active()).count();
        active
    }

    /// Total tracked episodes
    pub fn len(&self) -> usize {
        self.episodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, episode_id: &str) -> Result<Arc<Mutex<Episode>>> {
        self.episodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(episode_id)
            .cloned()
            .ok_or_else(|| GrpoError::episode_not_found(episode_id))
    }

    /// Queue an ended episode and compact whatever falls out of the window
    fn retire(&self, episode_id: EpisodeId) {
        let expired: Vec<EpisodeId> = {
            let mut ended = self.ended.lock().unwrap_or_else(|e| e.into_inner());
            ended.push_back(episode_id);
            let excess = ended.len().saturating_sub(self.retain_ended);
            let expired: Vec<EpisodeId> = ended.drain(..excess).collect();
            expired
        };

        for id in expired {
            if let Ok(handle) = self.handle(&id) {
                let mut episode = lock(&handle);
                episode.attempts = Vec::new();
                episode.notes = None;
            }
        }
    }

    fn next_id(&self) -> EpisodeId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("ep_{}_{:04}", Utc::now().format("%Y%m%d_%H%M%S_%6f"), seq)
    }
}

impl Default for EpisodeTracker {
    fn default() -> Self {
        Self::new()
    }
}

// Every episode update leaves it whole, so state behind a poisoned lock is usable.
fn lock(handle: &Mutex<Episode>) -> MutexGuard<'_, Episode> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use quickcheck_macros::quickcheck;
    use std::collections::HashSet;

    #[test]
    fn test_start_rejects_blank_task() {
        let tracker = EpisodeTracker::new();
        let err = tracker.start("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_ids_are_distinct() {
        let tracker = EpisodeTracker::new();
        let ids: HashSet<_> = (0..200)
            .map(|i| tracker.start(&format!("task {}", i)).unwrap())
            .collect();
        assert_eq!(ids.len(), 200);
        assert!(ids.iter().all(|id| id.starts_with("ep_")));
    }

    #[quickcheck]
    fn prop_started_ids_are_pairwise_distinct(tasks: Vec<String>) -> bool {
        let tracker = EpisodeTracker::new();
        let ids: Vec<EpisodeId> = tasks
            .iter()
            .map(|task| format!("task {}", task))
            .map(|task| tracker.start(&task).unwrap())
            .collect();
        let distinct: HashSet<&EpisodeId> = ids.iter().collect();
        distinct.len() == ids.len() && tracker.len() == ids.len()
    }

    #[test]
    fn test_log_attempt_preprocesses_error() {
        let tracker = EpisodeTracker::new();
        let id = tracker.start("Fix async timeout bug").unwrap();

        let ack = tracker
            .log_attempt(&id, "Added wait_for 10s", Some("TimeoutError: timeout at line 42"), false)
            .unwrap();
        assert_eq!(ack.index, 0);
        let signal = ack.preprocessed_error.unwrap();
        assert_eq!(signal.error_type.as_deref(), Some("TimeoutError"));
        assert_eq!(signal.line, Some(42));

        let ack = tracker.log_attempt(&id, "Used timeout context manager", None, true).unwrap();
        assert_eq!(ack.index, 1);
        assert!(ack.preprocessed_error.is_none());

        let episode = tracker.get(&id).unwrap();
        assert_eq!(episode.attempts.len(), 2);
        assert_eq!(
            episode.attempts[0].raw_error.as_deref(),
            Some("TimeoutError: timeout at line 42")
        );
    }

    #[test]
    fn test_log_attempt_unknown_episode() {
        let tracker = EpisodeTracker::new();
        let err = tracker.log_attempt("ep_missing", "x", None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_end_freezes_episode() {
        let tracker = EpisodeTracker::new();
        let id = tracker.start("task").unwrap();
        tracker.log_attempt(&id, "first try", Some("boom"), false).unwrap();

        let ended = tracker.end(&id, "fixed", true, Some("  retry helped ")).unwrap();
        assert_eq!(ended.status, EpisodeStatus::Ended);
        assert_eq!(ended.attempts.len(), 2);
        let last = ended.attempts.last().unwrap();
        assert_eq!(last.kind, AttemptKind::Outcome);
        assert_eq!(last.short_desc, "fixed");
        assert!(last.success);
        assert_eq!(ended.notes.as_deref(), Some("retry helped"));

        let err = tracker.log_attempt(&id, "late", None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = tracker.end(&id, "again", true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(tracker.get(&id).unwrap().attempts.len(), 2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_old_ended_episodes_are_compacted() {
        let tracker = EpisodeTracker::with_retention(2);
        let ids: Vec<_> = (0..3)
            .map(|i| {
                let id = tracker.start(&format!("task {}", i)).unwrap();
                tracker.log_attempt(&id, "try", Some("ValueError: bad"), false).unwrap();
                tracker.end(&id, "done", true, Some("note")).unwrap();
                id
            })
            .collect();

        let oldest = tracker.get(&ids[0]).unwrap();
        assert!(oldest.attempts.is_empty());
        assert!(oldest.notes.is_none());
        assert_eq!(oldest.task, "task 0");
        assert_eq!(oldest.status, EpisodeStatus::Ended);

        let err = tracker.end(&ids[0], "again", true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = tracker.log_attempt(&ids[0], "late", None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        for id in &ids[1..] {
            assert_eq!(tracker.get(id).unwrap().attempts.len(), 2);
        }
    }

    #[test]
    fn test_active_episodes_are_never_compacted() {
        let tracker = EpisodeTracker::with_retention(0);
        let open = tracker.start("still running").unwrap();
        tracker.log_attempt(&open, "try", None, false).unwrap();

        let done = tracker.start("finished").unwrap();
        let ended = tracker.end(&done, "ok", true, None).unwrap();
        assert_eq!(ended.attempts.len(), 1);

        assert!(tracker.get(&done).unwrap().attempts.is_empty());
        assert_eq!(tracker.get(&open).unwrap().attempts.len(), 1);
    }

    #[test]
    fn test_end_unknown_episode() {
        let tracker = EpisodeTracker::new();
        let err = tracker.end("nope", "r", true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_concurrent_episodes() {
        let tracker = Arc::new(EpisodeTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let id = tracker.start(&format!("task {}", t)).unwrap();
                    for i in 0..25 {
                        tracker
                            .log_attempt(&id, &format!("attempt {}", i), None, i % 2 == 0)
                            .unwrap();
                    }
                    id
                })
            })
            .collect();

        for handle in handles {
            let id = handle.join().unwrap();
            let episode = tracker.get(&id).unwrap();
            assert_eq!(episode.attempts.len(), 25);
            assert_eq!(episode.attempts[7].short_desc, "attempt 7");
        }
        assert_eq!(tracker.active_count(), 8);
    }
}
