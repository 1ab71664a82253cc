//! LanceDB-backed vector memory: a local columnar table with a
//! fixed-size-list vector column.  The open store's dimension is enforced;
//! a table whose on-disk dimension disagrees with the configured one is
//! dropped and rebuilt on boot.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const TABLE_NAME: &str = "memory_bank";

/// Classification of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Evolution,
    Conversation,
    Semantic,
    Episodic,
    Procedural,
    Consciousness,
    MetaJournal,
    MetaReflection,
    Transcendence,
    Reflex,
}

impl MemoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Evolution => "evolution",
            MemoryKind::Conversation => "conversation",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Episodic => "episodic",
            MemoryKind::Procedural => "procedural",
            MemoryKind::Consciousness => "consciousness",
            MemoryKind::MetaJournal => "meta_journal",
            MemoryKind::MetaReflection => "meta_reflection",
            MemoryKind::Transcendence => "transcendence",
            MemoryKind::Reflex => "reflex",
        }
    }
}

/// One search result (or scan row) out of the store.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub memory_type: String,
    pub source: String,
    pub timestamp: String,
    pub metadata: String,
    /// Cosine distance for k-NN hits; 0.0 for plain scans.
    pub distance: f32,
}

pub struct VectorMemory {
    db: lancedb::Connection,
    table: lancedb::Table,
    dim: usize,
}

impl VectorMemory {
    /// Open or create the store at `path` with the deployment dimension.
    pub async fn open(path: &str, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating vector store dir {path}"))?;

        let db = lancedb::connect(path)
            .execute()
            .await
            .context("connecting to vector store")?;

        let names = db
            .table_names()
            .execute()
            .await
            .context("listing vector tables")?;

        let table = if names.iter().any(|n| n == TABLE_NAME) {
            let table = db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .context("opening memory table")?;
            match table_dimension(&table).await {
                Some(existing) if existing == dim => table,
                existing => {
                    warn!(
                        on_disk = ?existing,
                        configured = dim,
                        "vector dimension mismatch; dropping and rebuilding table"
                    );
                    drop(table);
                    db.drop_table(TABLE_NAME, &[])
                        .await
                        .context("dropping mismatched table")?;
                    create_table(&db, dim).await?
                }
            }
        } else {
            create_table(&db, dim).await?
        };

        let store = Self { db, table, dim };
        info!(path, dim, rows = store.count().await.unwrap_or(0), "vector store open");
        Ok(store)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Insert one memory row.  The vector must already match the store
    /// dimension (the embedder guarantees this).  Returns the row id.
    pub async fn add(
        &self,
        text: &str,
        vector: &[f32],
        kind: MemoryKind,
        source: &str,
        metadata: &serde_json::Value,
    ) -> Result<String> {
        anyhow::ensure!(
            vector.len() == self.dim,
            "vector length {} does not match store dimension {}",
            vector.len(),
            self.dim
        );

        let id = Uuid::new_v4().to_string();
        let schema = build_schema(self.dim);
        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            vec![Some(vector.iter().map(|v| Some(*v)).collect::<Vec<_>>())],
            self.dim as i32,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![id.as_str()])),
                Arc::new(StringArray::from(vec![text])),
                Arc::new(vector_array),
                Arc::new(StringArray::from(vec![kind.as_str()])),
                Arc::new(StringArray::from(vec![source])),
                Arc::new(StringArray::from(vec![Utc::now().to_rfc3339()])),
                Arc::new(StringArray::from(vec![metadata.to_string()])),
            ],
        )
        .context("building memory record batch")?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .context("appending memory row")?;

        Ok(id)
    }

    /// k-NN search by cosine distance, optionally restricted to one kind.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryHit>> {
        let mut query = self
            .table
            .vector_search(query_vector.to_vec())
            .context("building vector query")?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit);

        if let Some(kind) = kind {
            query = query.only_if(format!("memory_type = '{}'", kind.as_str()));
        }

        let batches = query
            .execute()
            .await
            .context("vector search")?
            .try_collect::<Vec<_>>()
            .await
            .context("collecting search results")?;

        Ok(collect_hits(&batches))
    }

    /// Newest rows by timestamp (full scan, sorted client-side).
    pub async fn recent(&self, limit: usize) -> Result<Vec<MemoryHit>> {
        let batches = self
            .table
            .query()
            .limit(4096)
            .execute()
            .await
            .context("scanning recent memories")?
            .try_collect::<Vec<_>>()
            .await?;

        let mut hits = collect_hits(&batches);
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.truncate(limit);
        Ok(hits)
    }

    pub async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.context("counting rows")
    }

    /// Drop everything and recreate the table.  Used by capacity policy,
    /// never by the tick loop.
    pub async fn reset(&mut self) -> Result<()> {
        self.db.drop_table(TABLE_NAME, &[]).await?;
        self.table = create_table(&self.db, self.dim).await?;
        Ok(())
    }
}

fn build_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
        Field::new("memory_type", DataType::Utf8, true),
        Field::new("source", DataType::Utf8, true),
        Field::new("timestamp", DataType::Utf8, true),
        Field::new("metadata", DataType::Utf8, true),
    ]))
}

async fn create_table(db: &lancedb::Connection, dim: usize) -> Result<lancedb::Table> {
    let schema = build_schema(dim);
    let empty = RecordBatch::new_empty(schema.clone());
    let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
    let table = db
        .create_table(TABLE_NAME, Box::new(batches))
        .execute()
        .await
        .context("creating memory table")?;
    info!(dim, "memory table created");
    Ok(table)
}

/// Read the fixed-size-list width out of an open table's schema.
async fn table_dimension(table: &lancedb::Table) -> Option<usize> {
    let schema = table.schema().await.ok()?;
    let field = schema.field_with_name("vector").ok()?;
    match field.data_type() {
        DataType::FixedSizeList(_, size) => Some(*size as usize),
        _ => None,
    }
}

fn collect_hits(batches: &[RecordBatch]) -> Vec<MemoryHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let column = |name: &str| -> Option<&StringArray> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        };
        let (Some(ids), Some(texts)) = (column("id"), column("text")) else {
            continue;
        };
        let kinds = column("memory_type");
        let sources = column("source");
        let timestamps = column("timestamp");
        let metadatas = column("metadata");
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>());

        for row in 0..batch.num_rows() {
            let str_at = |arr: Option<&StringArray>| {
                arr.filter(|a| !a.is_null(row))
                    .map(|a| a.value(row).to_string())
                    .unwrap_or_default()
            };
            hits.push(MemoryHit {
                id: ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                memory_type: str_at(kinds),
                source: str_at(sources),
                timestamp: str_at(timestamps),
                metadata: str_at(metadatas),
                distance: distances.map(|d| d.value(row)).unwrap_or(0.0),
            });
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash_embedding;

    #[tokio::test]
    async fn store_search_and_count_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let store = VectorMemory::open(&path, 64).await.unwrap();

        let v1 = hash_embedding("evolution added ping module", 64);
        let v2 = hash_embedding("conversation about the weather", 64);
        store
            .add("evolution added ping module", &v1, MemoryKind::Evolution, "test", &serde_json::json!({}))
            .await
            .unwrap();
        store
            .add("conversation about the weather", &v2, MemoryKind::Conversation, "test", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.search(&v1, 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "evolution added ping module");

        let filtered = store
            .search(&v1, 5, Some(MemoryKind::Conversation))
            .await
            .unwrap();
        assert!(filtered.iter().all(|h| h.memory_type == "conversation"));
    }

    #[tokio::test]
    async fn dimension_mismatch_rebuilds_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();

        {
            let store = VectorMemory::open(&path, 384).await.unwrap();
            let v = hash_embedding("seed row", 384);
            store
                .add("seed row", &v, MemoryKind::Semantic, "test", &serde_json::json!({}))
                .await
                .unwrap();
            assert_eq!(store.count().await.unwrap(), 1);
        }

        // Reopen at a different deployment dimension: drop + rebuild.
        let store = VectorMemory::open(&path, 768).await.unwrap();
        assert_eq!(store.dim(), 768);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_length_vector_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let store = VectorMemory::open(&path, 32).await.unwrap();
        let err = store
            .add("bad", &[0.0; 16], MemoryKind::Semantic, "test", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let store = VectorMemory::open(&path, 16).await.unwrap();
        for label in ["first", "second", "third"] {
            let v = hash_embedding(label, 16);
            store
                .add(label, &v, MemoryKind::Episodic, "test", &serde_json::json!({}))
                .await
                .unwrap();
        }
        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "third");
    }
}
