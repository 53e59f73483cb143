//! Vector collection storage abstraction.
//!
//! The [`VectorStore`] trait defines the operations the indexers and the
//! bridge need from a vector index, enabling pluggable backends: a local
//! SQLite store and a Chroma-compatible cloud store, selected by
//! `store.mode` at construction.
//!
//! The two hemispheres' collections live in the same backend but are held
//! through distinct handle types — [`OrientationCollection`] and
//! [`TextureCollection`] — so a query vector from one embedding space can
//! never reach the other collection.

pub mod chroma;
pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{Config, StoreMode};

/// One record staged for upsert into a collection.
#[derive(Debug, Clone)]
pub struct UpsertRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// Scalar-valued metadata; see [`sanitize_metadata`].
    pub metadata: Map<String, Value>,
    /// Raw text stored alongside the vector (texture records only).
    pub document: Option<String>,
}

/// A nearest-neighbor hit returned from a collection query.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub metadata: Map<String, Value>,
    pub document: Option<String>,
    /// Distance in the collection's own metric; smaller is closer. Never
    /// comparable across collections.
    pub distance: Option<f64>,
}

/// Abstract vector index backend.
///
/// Collections are keyed by name at this level; callers hold typed handles
/// instead of raw names.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Verify the collection exists; descriptive error if not.
    async fn open_collection(&self, name: &str) -> Result<()>;

    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite records by id.
    async fn upsert(&self, collection: &str, records: &[UpsertRecord]) -> Result<()>;

    /// Return the `top_k` nearest neighbors to `vector`, best first.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        include_documents: bool,
    ) -> Result<Vec<QueryHit>>;
}

/// Construct the backend selected by `store.mode`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.store.mode {
        StoreMode::Local => Ok(Arc::new(
            sqlite::SqliteStore::connect(&config.store.local_path).await?,
        )),
        StoreMode::Cloud => Ok(Arc::new(chroma::ChromaStore::new(&config.store)?)),
    }
}

// ============ Typed collection handles ============

struct CollectionHandle {
    store: Arc<dyn VectorStore>,
    name: String,
}

impl CollectionHandle {
    async fn open(store: Arc<dyn VectorStore>, name: &str, layer: &str) -> Result<Self> {
        store
            .open_collection(name)
            .await
            .with_context(|| format!("Failed to load {} collection '{}'", layer, name))?;
        Ok(Self {
            store,
            name: name.to_string(),
        })
    }

    async fn create(store: Arc<dyn VectorStore>, name: &str) -> Result<Self> {
        store.ensure_collection(name).await?;
        Ok(Self {
            store,
            name: name.to_string(),
        })
    }
}

/// Handle on the orientation (compass) collection. Written only by the
/// compass indexer; the bridge only reads.
pub struct OrientationCollection(CollectionHandle);

impl std::fmt::Debug for OrientationCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationCollection")
            .field("name", &self.0.name)
            .finish()
    }
}

impl OrientationCollection {
    /// Open an existing collection; fails fast when it is missing.
    pub async fn open(store: Arc<dyn VectorStore>, name: &str) -> Result<Self> {
        Ok(Self(CollectionHandle::open(store, name, "orientation").await?))
    }

    /// Open the collection for indexing, creating it if needed.
    pub async fn create(store: Arc<dyn VectorStore>, name: &str) -> Result<Self> {
        Ok(Self(CollectionHandle::create(store, name).await?))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub async fn upsert(&self, records: &[UpsertRecord]) -> Result<()> {
        self.0.store.upsert(&self.0.name, records).await
    }

    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>> {
        self.0.store.query(&self.0.name, vector, top_k, false).await
    }
}

/// Handle on the texture (fragment) collection. Written only by the
/// fragment indexer; the bridge only reads.
pub struct TextureCollection(CollectionHandle);

impl TextureCollection {
    /// Open an existing collection; fails fast when it is missing.
    pub async fn open(store: Arc<dyn VectorStore>, name: &str) -> Result<Self> {
        Ok(Self(CollectionHandle::open(store, name, "texture").await?))
    }

    /// Open the collection for indexing, creating it if needed.
    pub async fn create(store: Arc<dyn VectorStore>, name: &str) -> Result<Self> {
        Ok(Self(CollectionHandle::create(store, name).await?))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub async fn upsert(&self, records: &[UpsertRecord]) -> Result<()> {
        self.0.store.upsert(&self.0.name, records).await
    }

    /// Query with stored documents included.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>> {
        self.0.store.query(&self.0.name, vector, top_k, true).await
    }
}

// ============ Metadata sanitization ============

/// Restrict metadata to scalar values and drop empty entries.
///
/// Vector indexes accept only string/number/boolean metadata values.
/// Nulls and empty strings are dropped rather than stored as markers;
/// any remaining non-scalar value is stringified.
pub fn sanitize_metadata(meta: Map<String, Value>) -> Map<String, Value> {
    meta.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => {
                    if s.is_empty() {
                        return None;
                    }
                    Value::String(s)
                }
                Value::Bool(_) | Value::Number(_) => value,
                other => Value::String(other.to_string()),
            };
            Some((key, value))
        })
        .collect()
}

// ============ Query-response shape normalization ============

/// Flatten a possibly-nested query-response field to the entries for the
/// first query.
///
/// Vector-store query APIs return one nesting level per submitted query
/// vector (`ids: [[...]]`), while some responses arrive already flat.
/// Single-query callers always see a flat list.
pub fn flatten_query_field(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match items.first() {
            Some(Value::Array(inner)) => inner.clone(),
            _ => items.clone(),
        },
        Some(other) => vec![other.clone()],
    }
}

/// Normalize a raw query-response JSON body into hits matched by index.
pub fn parse_query_response(json: &Value) -> Result<Vec<QueryHit>> {
    let ids = flatten_query_field(json.get("ids"));
    let metadatas = flatten_query_field(json.get("metadatas"));
    let documents = flatten_query_field(json.get("documents"));
    let distances = flatten_query_field(json.get("distances"));

    let mut hits = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let id = id
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid query response: non-string id"))?;
        let metadata = metadatas
            .get(i)
            .and_then(|m| m.as_object())
            .cloned()
            .unwrap_or_default();
        let document = documents
            .get(i)
            .and_then(|d| d.as_str())
            .map(str::to_string);
        let distance = distances.get(i).and_then(|d| d.as_f64());

        hits.push(QueryHit {
            id: id.to_string(),
            metadata,
            document,
            distance,
        });
    }

    Ok(hits)
}
