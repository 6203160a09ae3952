//! Structured library-update decisions and their parser
//!
//! Model replies are expected to carry one JSON object:
//!
//! ```text
//! {"action": "add",    "pattern": "...", "keywords": ["..."], "insight": "..."}
//! {"action": "modify", "target_id": "exp_...", "pattern"?: ..., "keywords"?: ..., "insight"?: ...}
//! {"action": "delete", "target_id": "exp_..."}
//! ```
//!
//! Surrounding prose and Markdown code fences are tolerated: the balanced
//! `{...}` spans in the reply are tried in order and the first one shaped like
//! a decision is taken. Anything that does not validate is reported as
//! [`GrpoError::MalformedDecision`].

use crate::errors::{GrpoError, Result};
use crate::memory::types::{ActionKind, ExperienceId, ExperiencePatch};
use crate::rag::reranking::scorer::normalize_keywords;
use serde::Deserialize;
use std::collections::BTreeSet;

/// Validated library update
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Add {
        pattern: String,
        keywords: BTreeSet<String>,
        insight: String,
    },
    Modify {
        target_id: ExperienceId,
        patch: ExperiencePatch,
    },
    Delete {
        target_id: ExperienceId,
    },
}

impl Decision {
    pub fn action(&self) -> ActionKind {
        match self {
            Decision::Add { .. } => ActionKind::Add,
            Decision::Modify { .. } => ActionKind::Modify,
            Decision::Delete { .. } => ActionKind::Delete,
        }
    }

    /// Existing experience the decision refers to
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Decision::Add { .. } => None,
            Decision::Modify { target_id, .. } | Decision::Delete { target_id } => {
                Some(target_id.as_str())
            }
        }
    }
}

/// Keywords as either a JSON list or a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeywordsField {
    List(Vec<String>),
    Text(String),
}

impl KeywordsField {
    fn normalize(self) -> BTreeSet<String> {
        match self {
            KeywordsField::List(items) => normalize_keywords(items),
            KeywordsField::Text(text) => normalize_keywords(text.split(',')),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    action: Option<String>,
    #[serde(default, alias = "id", alias = "target")]
    target_id: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    keywords: Option<KeywordsField>,
    #[serde(default)]
    insight: Option<String>,
}

impl RawDecision {
    fn has_fields(&self) -> bool {
        self.action.is_some()
            || self.target_id.is_some()
            || self.pattern.is_some()
            || self.keywords.is_some()
            || self.insight.is_some()
    }
}

/// Parse and validate a model reply
///
/// `candidates` are the experience ids that were offered to the model; a
/// modify or delete must target one of them.
pub fn parse_decision(reply: &str, candidates: &BTreeSet<ExperienceId>) -> Result<Decision> {
    let raw = first_raw_decision(reply)?;

    // A reply without an action but with add fields is read as an add.
    let action = match raw.action.as_deref().map(|a| a.trim().to_lowercase()) {
        Some(action) => action,
        None if raw.target_id.is_none() => "add".to_string(),
        None => return Err(malformed("missing action")),
    };

    match action.as_str() {
        "add" => {
            let pattern = required_text("pattern", raw.pattern)?;
            let keywords = raw
                .keywords
                .map(KeywordsField::normalize)
                .unwrap_or_default();
            if keywords.is_empty() {
                return Err(malformed("add requires at least one keyword"));
            }
            let insight = raw.insight.map(|i| i.trim().to_string()).unwrap_or_default();
            Ok(Decision::Add {
                pattern,
                keywords,
                insight,
            })
        }
        "modify" => {
            let target_id = known_target(raw.target_id, candidates)?;
            let pattern = raw
                .pattern
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
            let keywords = match raw.keywords.map(KeywordsField::normalize) {
                Some(keywords) if keywords.is_empty() => {
                    return Err(malformed("modify keywords must not be empty"))
                }
                keywords => keywords,
            };
            let insight = raw
                .insight
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty());

            let patch = ExperiencePatch {
                pattern,
                keywords,
                insight,
            };
            if patch.is_empty() {
                return Err(malformed("modify changes nothing"));
            }
            Ok(Decision::Modify { target_id, patch })
        }
        "delete" => Ok(Decision::Delete {
            target_id: known_target(raw.target_id, candidates)?,
        }),
        other => Err(malformed(format!("unknown action '{}'", other))),
    }
}

/// First balanced object in the reply that deserializes as a decision
fn first_raw_decision(reply: &str) -> Result<RawDecision> {
    let mut offset = 0;
    let mut last_error = None;

    while let Some((start, end)) = next_json_object(&reply[offset..]) {
        match serde_json::from_str::<RawDecision>(&reply[offset + start..offset + end]) {
            Ok(raw) if raw.has_fields() => return Ok(raw),
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }
        offset += end;
    }

    Err(match last_error {
        Some(e) => malformed(format!("invalid decision JSON: {}", e)),
        None => malformed(format!("no JSON object in reply: {}", preview(reply))),
    })
}

/// Locate the first balanced JSON object, ignoring braces inside strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    next_json_object(text).map(|(start, end)| &text[start..end])
}

/// Byte range `start..end` of the first balanced `{...}` in `text`
fn next_json_object(text: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| (s, i + 1));
                }
            }
            _ => {}
        }
    }

    None
}

fn required_text(field: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| malformed(format!("add requires a non-empty {}", field)))
}

fn known_target(target: Option<String>, candidates: &BTreeSet<ExperienceId>) -> Result<ExperienceId> {
    let target = target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| malformed("target_id is required"))?;

    if !candidates.contains(&target) {
        return Err(malformed(format!("target_id '{}' was not offered", target)));
    }
    Ok(target)
}

fn malformed(reason: impl Into<String>) -> GrpoError {
    GrpoError::MalformedDecision(reason.into())
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        preview.push_str("...");
    }
    preview
}
