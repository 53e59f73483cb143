//! Core record types flowing through the ingestion and retrieval pipeline.
//!
//! Fragment and compass records are serialized one-per-line (JSONL, UTF-8)
//! by the ingest stage and read back by the indexers. Records are created
//! once per ingestion run and never mutated; re-ingestion supersedes them
//! under the same deterministic ids.

use serde::{Deserialize, Serialize};

/// One paragraph-level unit of source prose (texture layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// Deterministic id derived from (codex_id, relpath, title, segment).
    pub id: String,
    pub codex_id: String,
    pub category: String,
    pub index: String,
    pub slug: String,
    pub title: String,
    /// Zero-based position within the source document, contiguous from 0.
    pub segment: i64,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One synthesized node/field pairing (orientation layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompassRecord {
    pub id: String,
    pub codex_id: String,
    /// Title of the geometry document the pairing was drawn from.
    pub source: String,
    /// 1-based node position.
    pub node_index: i64,
    pub node_label: String,
    pub node_summary: String,
    /// 1-based field position: `(node_index - 1) mod field_count + 1`.
    pub field_index: i64,
    pub field_label: String,
    pub field_paragraph: String,
    pub geometry_pair: String,
    /// Fused sentence combining node and field, embedded for retrieval.
    pub summary: String,
}

/// An orientation-collection hit as returned by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrientationHit {
    pub codex_id: String,
    pub node_label: String,
    pub field_label: String,
    pub geometry_pair: String,
    pub source: String,
}

/// A texture-collection hit as returned by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureHit {
    pub codex_id: String,
    pub title: String,
    pub segment: i64,
    /// The raw stored paragraph text; empty when the store held none.
    pub document: String,
}

/// The merged result of one bridge query. The two lists are independently
/// ranked best-first in their own similarity spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub query: String,
    pub orientation: Vec<OrientationHit>,
    pub texture: Vec<TextureHit>,
}
