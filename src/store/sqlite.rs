//! Local vector store backed by SQLite.
//!
//! Embeddings are stored as little-endian f32 BLOBs; queries rank every
//! record in the collection by cosine similarity computed in process. The
//! collections are read-many/write-rare, so the full scan stays well within
//! interactive latency at this corpus scale.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{QueryHit, UpsertRecord, VectorStore};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store file and ensure the schema exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn open_collection(&self, name: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            bail!("Collection '{}' not found", name);
        }
        Ok(())
    }

    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[UpsertRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let blob = vec_to_blob(&record.embedding);
            let metadata_json = serde_json::to_string(&record.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO records (collection, id, embedding, metadata_json, document)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json,
                    document = excluded.document
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&blob)
            .bind(&metadata_json)
            .bind(&record.document)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        include_documents: bool,
    ) -> Result<Vec<QueryHit>> {
        self.open_collection(collection).await?;

        let rows = sqlx::query(
            "SELECT id, embedding, metadata_json, document FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let similarity = cosine_similarity(vector, &stored) as f64;

                let metadata_json: String = row.get("metadata_json");
                let metadata: Map<String, Value> =
                    serde_json::from_str(&metadata_json).unwrap_or_default();

                let document = if include_documents {
                    row.get::<Option<String>, _>("document")
                } else {
                    None
                };

                QueryHit {
                    id: row.get("id"),
                    metadata,
                    document,
                    distance: Some(1.0 - similarity),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }
}
