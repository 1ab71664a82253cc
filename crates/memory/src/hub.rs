//! Dual-write facade over the journal and the vector store.  Writes are
//! journal-first: a vector failure is logged and never invalidates the
//! journal entry.

use serde_json::json;
use tracing::warn;

use crate::embedding::EmbedClient;
use crate::journal::{ConversationRecord, Event, Journal};
use crate::vector::{MemoryHit, MemoryKind, VectorMemory};

pub struct MemoryHub {
    pub journal: Journal,
    vector: Option<VectorMemory>,
    embed: EmbedClient,
}

impl MemoryHub {
    pub fn new(journal: Journal, vector: Option<VectorMemory>, embed: EmbedClient) -> Self {
        Self { journal, vector, embed }
    }

    pub fn vector_connected(&self) -> bool {
        self.vector.is_some()
    }

    // ── dual writes ───────────────────────────────────────────────────────

    /// Journal an event, then best-effort embed + insert it into the vector
    /// store.  Returns the journaled event with `embedding_id` filled in
    /// when the vector write succeeded.
    pub async fn record_event(&mut self, event: Event) -> Event {
        let mut recorded = self.journal.record_event(event);

        if let Some(vector_store) = &self.vector {
            let text = recorded.vector_text();
            let embedding = self.embed.embed(&text).await;
            let metadata = json!({
                "timestamp": recorded.timestamp.to_rfc3339(),
                "file": recorded.file,
                "action": recorded.action,
                "status": recorded.status,
            });
            let kind = match recorded.kind {
                crate::journal::EventKind::Evolution => MemoryKind::Evolution,
                crate::journal::EventKind::Conversation => MemoryKind::Conversation,
                crate::journal::EventKind::Reflection => MemoryKind::MetaReflection,
                crate::journal::EventKind::Reflex => MemoryKind::Reflex,
                crate::journal::EventKind::Journal => MemoryKind::MetaJournal,
            };
            match vector_store
                .add(&text, &embedding, kind, "journal", &metadata)
                .await
            {
                Ok(id) => recorded.embedding_id = Some(id),
                Err(err) => warn!(%err, "vector dual-write failed; journal entry stands"),
            }
        }

        recorded
    }

    /// Journal a conversation turn and embed it when long enough to matter.
    pub async fn record_conversation(
        &mut self,
        role: &str,
        content: &str,
        session_id: &str,
    ) -> ConversationRecord {
        let record = self.journal.record_conversation(role, content, session_id);

        if content.len() > 10 {
            if let Some(vector_store) = &self.vector {
                let text = format!("[{role}] {content}");
                let embedding = self.embed.embed(&text).await;
                let metadata = json!({
                    "timestamp": record.timestamp.to_rfc3339(),
                    "session_id": record.session_id,
                    "role": record.role,
                });
                if let Err(err) = vector_store
                    .add(&text, &embedding, MemoryKind::Conversation, "dialogue", &metadata)
                    .await
                {
                    warn!(%err, "conversation vector write failed");
                }
            }
        }

        record
    }

    /// Store free-form text directly into the vector store (insights,
    /// monologues, meta narratives).  No journal row.
    pub async fn store_text(
        &self,
        text: &str,
        kind: MemoryKind,
        source: &str,
        metadata: serde_json::Value,
    ) -> bool {
        let Some(vector_store) = &self.vector else {
            return false;
        };
        let embedding = self.embed.embed(text).await;
        match vector_store.add(text, &embedding, kind, source, &metadata).await {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, source, "vector write failed");
                false
            }
        }
    }

    // ── retrieval ─────────────────────────────────────────────────────────

    /// Semantic recall; falls back to journal keyword search when the
    /// vector store is down.
    pub async fn search_relevant(&self, query: &str, limit: usize) -> Vec<MemoryHit> {
        if let Some(vector_store) = &self.vector {
            let embedding = self.embed.embed(query).await;
            match vector_store.search(&embedding, limit, None).await {
                Ok(hits) => return hits,
                Err(err) => warn!(%err, "vector search failed; using keyword fallback"),
            }
        }

        self.journal
            .keyword_search(query, limit)
            .into_iter()
            .map(|(text, distance)| MemoryHit {
                id: String::new(),
                text,
                memory_type: "journal".to_string(),
                source: "keyword_fallback".to_string(),
                timestamp: String::new(),
                metadata: "{}".to_string(),
                distance,
            })
            .collect()
    }

    pub async fn recent_memories(&self, limit: usize) -> Vec<MemoryHit> {
        if let Some(vector_store) = &self.vector {
            match vector_store.recent(limit).await {
                Ok(hits) => return hits,
                Err(err) => warn!(%err, "recent scan failed"),
            }
        }
        Vec::new()
    }

    pub async fn memory_count(&self) -> usize {
        match &self.vector {
            Some(vector_store) => vector_store.count().await.unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{EventKind, EventStatus};

    async fn hub_with_vector(dir: &std::path::Path) -> MemoryHub {
        let journal = Journal::open(dir, 100, 50);
        let vector_path = dir.join("lancedb");
        let vector = VectorMemory::open(&vector_path.to_string_lossy(), 32)
            .await
            .unwrap();
        let embed = EmbedClient::new("https://example.invalid", None, 32);
        MemoryHub::new(journal, Some(vector), embed)
    }

    #[tokio::test]
    async fn dual_write_journal_first_with_embedding_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = hub_with_vector(dir.path()).await;

        let event = Event::new(
            EventKind::Evolution,
            "Update",
            "nexus/ping.py",
            "added ping()",
            EventStatus::Success,
        );
        let recorded = hub.record_event(event).await;

        assert!(recorded.embedding_id.is_some());
        assert_eq!(hub.journal.evolutions().len(), 1);
        assert_eq!(hub.memory_count().await, 1);
    }

    #[tokio::test]
    async fn journal_survives_without_vector_store() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path(), 100, 50);
        let embed = EmbedClient::new("https://example.invalid", None, 32);
        let mut hub = MemoryHub::new(journal, None, embed);

        let recorded = hub
            .record_event(Event::new(
                EventKind::Evolution,
                "Update",
                "a.py",
                "change",
                EventStatus::Failed,
            ))
            .await;
        assert!(recorded.embedding_id.is_none());
        assert_eq!(hub.journal.evolutions().len(), 1);

        // Keyword fallback still retrieves it.
        let hits = hub.search_relevant("change", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "keyword_fallback");
    }

    #[tokio::test]
    async fn semantic_search_finds_related_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = hub_with_vector(dir.path()).await;

        hub.record_event(Event::new(
            EventKind::Evolution,
            "Update",
            "vector.py",
            "improved vector memory search",
            EventStatus::Success,
        ))
        .await;

        let hits = hub.search_relevant("improved vector memory search", 3).await;
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("vector.py"));
    }
}
