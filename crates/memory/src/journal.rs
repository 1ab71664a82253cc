//! Append-only structured journal.  Two whole-file JSON arrays on disk:
//! `evolution_history.json` for events and `dialogue_memory.json` for
//! conversation turns.  Entries are never mutated in place; the on-disk
//! window is bounded by the configured caps.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const EVOLUTION_FILE: &str = "evolution_history.json";
pub const DIALOGUE_FILE: &str = "dialogue_memory.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Evolution,
    Conversation,
    Reflection,
    Reflex,
    Journal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failed,
    Skipped,
}

/// The universal journaled record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub action: String,
    pub file: String,
    pub description: String,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        action: impl Into<String>,
        file: impl Into<String>,
        description: impl Into<String>,
        status: EventStatus,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            action: action.into(),
            file: file.into(),
            description: description.into(),
            status,
            error: None,
            embedding_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Text form embedded into the vector store on dual-write.
    pub fn vector_text(&self) -> String {
        let mut text = format!(
            "[{:?}] {} on {}: {}",
            self.kind, self.action, self.file, self.description
        );
        if let Some(error) = &self.error {
            text.push_str(&format!(" (Error: {error})"));
        }
        text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug)]
pub struct Journal {
    evolution_path: PathBuf,
    dialogue_path: PathBuf,
    evolution_cap: usize,
    dialogue_cap: usize,
    evolutions: Vec<Event>,
    conversations: Vec<ConversationRecord>,
}

impl Journal {
    /// Hydrate both caches from disk; missing or corrupt files start empty.
    pub fn open(base_path: impl AsRef<Path>, evolution_cap: usize, dialogue_cap: usize) -> Self {
        let base = base_path.as_ref();
        let evolution_path = base.join(EVOLUTION_FILE);
        let dialogue_path = base.join(DIALOGUE_FILE);

        let evolutions: Vec<Event> = load_array(&evolution_path);
        let conversations: Vec<ConversationRecord> = load_array(&dialogue_path);
        info!(
            evolutions = evolutions.len(),
            conversations = conversations.len(),
            "journal hydrated"
        );

        Self {
            evolution_path,
            dialogue_path,
            evolution_cap,
            dialogue_cap,
            evolutions,
            conversations,
        }
    }

    // ── append ────────────────────────────────────────────────────────────

    pub fn record_event(&mut self, event: Event) -> Event {
        self.evolutions.push(event.clone());
        if self.evolutions.len() > self.evolution_cap {
            let overflow = self.evolutions.len() - self.evolution_cap;
            self.evolutions.drain(..overflow);
        }
        if let Err(err) = save_array(&self.evolution_path, &self.evolutions) {
            warn!(%err, "journal save failed");
        }
        event
    }

    pub fn record_conversation(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        session_id: impl Into<String>,
    ) -> ConversationRecord {
        let record = ConversationRecord {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            role: role.into(),
            content: content.into(),
        };
        self.conversations.push(record.clone());
        if self.conversations.len() > self.dialogue_cap {
            let overflow = self.conversations.len() - self.dialogue_cap;
            self.conversations.drain(..overflow);
        }
        if let Err(err) = save_array(&self.dialogue_path, &self.conversations) {
            warn!(%err, "dialogue save failed");
        }
        record
    }

    // ── read ──────────────────────────────────────────────────────────────

    pub fn evolutions(&self) -> &[Event] {
        &self.evolutions
    }

    pub fn recent_events(&self, limit: usize) -> Vec<&Event> {
        self.evolutions.iter().rev().take(limit).collect()
    }

    pub fn recent_errors(&self, limit: usize) -> Vec<&Event> {
        self.evolutions
            .iter()
            .rev()
            .filter(|e| e.status == EventStatus::Failed || e.error.is_some())
            .take(limit)
            .collect()
    }

    /// Count of failed events inside the newest `window` records; the meta
    /// cycle's error signal.
    pub fn recent_error_count(&self, window: usize) -> usize {
        self.evolutions
            .iter()
            .rev()
            .take(window)
            .filter(|e| e.status == EventStatus::Failed)
            .count()
    }

    pub fn evolution_summary(&self, limit: usize) -> String {
        if self.evolutions.is_empty() {
            return "No evolution history yet.".to_string();
        }
        let mut summary = String::from("### 📜 Recent Evolution History\n");
        for event in self.evolutions.iter().rev().take(limit) {
            let icon = match event.status {
                EventStatus::Success => "✅",
                EventStatus::Failed => "❌",
                EventStatus::Skipped => "⏭️",
            };
            let description: String = event.description.chars().take(60).collect();
            summary.push_str(&format!(
                "- {icon} [{:?}] {}: {description}\n",
                event.kind, event.file
            ));
        }
        summary
    }

    pub fn lessons_learned(&self, limit: usize) -> String {
        let failures: Vec<&Event> = self
            .evolutions
            .iter()
            .filter(|e| e.status == EventStatus::Failed || e.error.is_some())
            .collect();
        if failures.is_empty() {
            return "No recorded failures yet.".to_string();
        }
        let mut lessons = String::from("### 📚 Lessons Learned (from failures)\n");
        for event in failures.iter().rev().take(limit) {
            let detail = event.error.as_deref().unwrap_or(&event.description);
            let detail: String = detail.chars().take(100).collect();
            lessons.push_str(&format!("- ❌ {}: {detail}\n", event.file));
        }
        lessons
    }

    /// Keyword search over both caches; the fallback when the vector store
    /// is unavailable.  Score = term hits, rendered as a pseudo-distance.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let keywords: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(String, f32)> = Vec::new();
        for event in self.evolutions.iter().rev() {
            let haystack =
                format!("{} {}", event.description, event.file).to_lowercase();
            let score = keywords.iter().filter(|k| haystack.contains(*k)).count();
            if score > 0 {
                hits.push((event.vector_text(), 1.0 / (score as f32 + 1.0)));
            }
        }
        for record in self.conversations.iter().rev() {
            let haystack = record.content.to_lowercase();
            let score = keywords.iter().filter(|k| haystack.contains(*k)).count();
            if score > 0 {
                hits.push((
                    format!("[{}] {}", record.role, record.content),
                    1.0 / (score as f32 + 1.0),
                ));
            }
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(limit);
        hits
    }
}

fn load_array<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(%err, path = %path.display(), "journal file corrupt; starting empty");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

fn save_array<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
