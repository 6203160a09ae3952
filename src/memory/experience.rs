//! Experience library: durable, mutation-serialized store
//!
//! The whole library is held in memory as an immutable snapshot. A mutation
//! clones the snapshot, applies the change, rewrites the durable record
//! (temporary file + rename), and only then publishes the new snapshot. A
//! failed write therefore leaves both memory and disk at the previous state.

use crate::errors::{GrpoError, Result};
use crate::memory::types::{EpisodeId, Experience, ExperienceId, ExperiencePatch};
use crate::rag::reranking::scorer::normalize_keywords;
use crate::telemetry::{self, TelemetryCollector, TelemetryEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// On-disk layout: `{"experiences": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryRecord {
    #[serde(default)]
    pub experiences: Vec<Experience>,
}

/// In-memory library keyed by experience id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LibraryRecord", into = "LibraryRecord")]
pub struct ExperienceLibrary {
    experiences: BTreeMap<ExperienceId, Experience>,
}

impl TryFrom<LibraryRecord> for ExperienceLibrary {
    type Error = String;

    fn try_from(record: LibraryRecord) -> std::result::Result<Self, Self::Error> {
        let mut experiences = BTreeMap::new();
        for experience in record.experiences {
            let id = experience.id.clone();
            if experiences.insert(id.clone(), experience).is_some() {
                return Err(format!("duplicate experience id {}", id));
            }
        }
        Ok(Self { experiences })
    }
}

impl From<ExperienceLibrary> for LibraryRecord {
    fn from(library: ExperienceLibrary) -> Self {
        Self {
            experiences: library.experiences.into_values().collect(),
        }
    }
}

impl ExperienceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Experience> {
        self.experiences.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.experiences.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.values()
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    /// Most recently updated first
    pub fn recent(&self, limit: usize) -> Vec<Experience> {
        let mut all: Vec<&Experience> = self.experiences.values().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        all.into_iter().take(limit).cloned().collect()
    }

    fn insert(&mut self, experience: Experience) {
        self.experiences.insert(experience.id.clone(), experience);
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Experience> {
        self.experiences.get_mut(id)
    }

    fn remove(&mut self, id: &str) -> Option<Experience> {
        self.experiences.remove(id)
    }
}

/// Durable experience store
pub struct ExperienceStore {
    path: PathBuf,
    /// Last committed state; replaced wholesale on commit
    snapshot: RwLock<Arc<ExperienceLibrary>>,
    /// Serializes mutations in arrival order (tokio's mutex is FIFO-fair)
    write_lock: Mutex<()>,
    telemetry: Option<TelemetryCollector>,
}

impl ExperienceStore {
    /// Load the durable record at `path`, or start empty if it does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                GrpoError::Storage(format!(
                    "failed to create library directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let library = if path.exists() {
            load_record(&path)?
        } else {
            ExperienceLibrary::new()
        };

        tracing::debug!(
            event = "library.opened",
            path = %path.display(),
            experiences = library.len()
        );

        Ok(Self {
            path,
            snapshot: RwLock::new(Arc::new(library)),
            write_lock: Mutex::new(()),
            telemetry: None,
        })
    }

    /// Count commits and rollbacks in `collector`
    pub fn with_telemetry(mut self, collector: TelemetryCollector) -> Self {
        self.telemetry = Some(collector);
        self
    }

    /// Consistent view of the last committed library
    pub fn snapshot(&self) -> Arc<ExperienceLibrary> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Insert a new experience and return its id
    pub async fn add(
        &self,
        pattern: &str,
        keywords: &BTreeSet<String>,
        insight: &str,
        source_episode_id: &str,
    ) -> Result<ExperienceId> {
        let pattern = non_blank("pattern", pattern)?;
        let keywords = non_empty_keywords(keywords)?;
        let insight = insight.trim().to_string();
        let source_episode_id: EpisodeId = source_episode_id.to_string();

        self.mutate("add", move |library| {
            let now = Utc::now();
            let id = format!("exp_{}", uuid::Uuid::new_v4().simple());
            library.insert(Experience {
                id: id.clone(),
                pattern,
                keywords,
                insight,
                created_at: now,
                updated_at: now,
                source_episode_id,
            });
            Ok(id)
        })
        .await
    }

    /// Overlay `patch` onto an existing experience
    ///
    /// Supplied keywords replace the previous set.
    pub async fn modify(&self, target_id: &str, patch: &ExperiencePatch) -> Result<()> {
        let pattern = patch
            .pattern
            .as_deref()
            .map(|p| non_blank("pattern", p))
            .transpose()?;
        let keywords = patch.keywords.as_ref().map(non_empty_keywords).transpose()?;
        let insight = patch.insight.as_deref().map(|i| i.trim().to_string());
        let target = target_id.to_string();

        self.mutate("modify", move |library| {
            let experience = library
                .get_mut(&target)
                .ok_or_else(|| GrpoError::experience_not_found(&target))?;

            if let Some(pattern) = pattern {
                experience.pattern = pattern;
            }
            if let Some(keywords) = keywords {
                experience.keywords = keywords;
            }
            if let Some(insight) = insight {
                experience.insight = insight;
            }
            experience.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    /// Remove an experience
    pub async fn delete(&self, target_id: &str) -> Result<()> {
        let target = target_id.to_string();
        self.mutate("delete", move |library| {
            library
                .remove(&target)
                .map(|_| ())
                .ok_or_else(|| GrpoError::experience_not_found(&target))
        })
        .await
    }

    /// Rewrite the durable record from the committed state
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let library = self.snapshot();
        write_record(&self.path, &library)
    }

    pub fn get(&self, id: &str) -> Option<Experience> {
        self.snapshot().get(id).cloned()
    }

    /// Most recently updated experiences
    pub fn recent(&self, limit: usize) -> Vec<Experience> {
        self.snapshot().recent(limit)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Location of the durable record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the library, persist it, then publish it
    async fn mutate<T, F>(&self, op: &'static str, change: F) -> Result<T>
    where
        F: FnOnce(&mut ExperienceLibrary) -> Result<T>,
    {
        let _guard = self.write_lock.lock().await;

        let mut next = (*self.snapshot()).clone();
        let value = change(&mut next)?;

        if let Err(e) = write_record(&self.path, &next) {
            telemetry::emit_library_rolled_back(op, &e);
            if let Some(collector) = &self.telemetry {
                collector.record(TelemetryEvent::LibraryRolledBack);
            }
            return Err(e);
        }

        let size = next.len();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);

        telemetry::emit_library_committed(op, size);
        if let Some(collector) = &self.telemetry {
            collector.record(TelemetryEvent::LibraryCommitted);
        }

        Ok(value)
    }
}

fn load_record(path: &Path) -> Result<ExperienceLibrary> {
    let json = fs::read_to_string(path).map_err(|e| {
        GrpoError::Storage(format!("failed to read library {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&json).map_err(|e| {
        GrpoError::Storage(format!("failed to parse library {}: {}", path.display(), e))
    })
}

/// Write to a sibling temporary file, fsync, then atomically rename over `path`
fn write_record(path: &Path, library: &ExperienceLibrary) -> Result<()> {
    let json = serde_json::to_string_pretty(library)
        .map_err(|e| GrpoError::Storage(format!("failed to serialize library: {}", e)))?;

    let tmp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    written.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        GrpoError::Storage(format!("failed to write library {}: {}", path.display(), e))
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "experiences.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn non_blank(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GrpoError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn non_empty_keywords(keywords: &BTreeSet<String>) -> Result<BTreeSet<String>> {
    let normalized = normalize_keywords(keywords);
    if normalized.is_empty() {
        return Err(GrpoError::Validation(
            "keywords must contain at least one token".to_string(),
        ));
    }
    Ok(normalized)
}
