//! Dual-hemisphere query bridge.
//!
//! Embeds one query string under both embedding spaces, searches each
//! collection in its native space, and merges the two ranked lists into a
//! single response. No cross-space rank fusion: the orientation and texture
//! lists stay independent, each ranked by its own collection's metric.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::models::{BridgeResponse, OrientationHit, TextureHit};
use crate::store::{self, OrientationCollection, QueryHit, TextureCollection};

pub struct Bridge {
    orientation: OrientationCollection,
    orientation_embedder: Box<dyn Embedder>,
    texture: TextureCollection,
    texture_embedder: Box<dyn Embedder>,
    top_k: usize,
}

impl Bridge {
    /// Assemble a bridge from explicit parts. Tests inject fake embedders
    /// and throwaway collections here.
    pub fn new(
        orientation: OrientationCollection,
        orientation_embedder: Box<dyn Embedder>,
        texture: TextureCollection,
        texture_embedder: Box<dyn Embedder>,
        top_k: usize,
    ) -> Self {
        Self {
            orientation,
            orientation_embedder,
            texture,
            texture_embedder,
            top_k,
        }
    }

    /// Open a bridge from configuration.
    ///
    /// Fails fast with a descriptive error if either backing collection is
    /// missing or an embedding provider cannot be constructed.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = store::open_store(config).await?;
        let orientation =
            OrientationCollection::open(store.clone(), &config.collections.orientation).await?;
        let texture = TextureCollection::open(store, &config.collections.texture).await?;

        Ok(Self::new(
            orientation,
            embedding::create_embedder(&config.embedding.orientation)?,
            texture,
            embedding::create_embedder(&config.embedding.texture)?,
            config.retrieval.top_k,
        ))
    }

    /// Run one dual-space query.
    ///
    /// A blank query is rejected before any embedding call is made. The two
    /// hemispheres are queried independently; nothing is shared between
    /// them except the final merge.
    pub async fn query(&self, query_text: &str) -> Result<BridgeResponse> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            bail!("empty query");
        }

        let orientation_vec =
            embedding::embed_query(self.orientation_embedder.as_ref(), query_text).await?;
        let orientation_hits = self.orientation.query(&orientation_vec, self.top_k).await?;

        let texture_vec =
            embedding::embed_query(self.texture_embedder.as_ref(), query_text).await?;
        let texture_hits = self.texture.query(&texture_vec, self.top_k).await?;

        Ok(BridgeResponse {
            query: query_text.to_string(),
            orientation: orientation_hits.iter().map(map_orientation_hit).collect(),
            texture: texture_hits.iter().map(map_texture_hit).collect(),
        })
    }
}

fn meta_str(hit: &QueryHit, key: &str) -> String {
    hit.metadata
        .get(key)
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

fn map_orientation_hit(hit: &QueryHit) -> OrientationHit {
    OrientationHit {
        codex_id: meta_str(hit, "codex_id"),
        node_label: meta_str(hit, "node_label"),
        field_label: meta_str(hit, "field_label"),
        geometry_pair: meta_str(hit, "geometry_pair"),
        source: meta_str(hit, "source"),
    }
}

fn map_texture_hit(hit: &QueryHit) -> TextureHit {
    TextureHit {
        codex_id: meta_str(hit, "codex_id"),
        title: meta_str(hit, "title"),
        segment: hit
            .metadata
            .get("segment")
            .and_then(|value| value.as_i64())
            .unwrap_or(0),
        // Stored text only, never regenerated; absence becomes an explicit
        // empty marker rather than failing the query.
        document: hit.document.clone().unwrap_or_default(),
    }
}
