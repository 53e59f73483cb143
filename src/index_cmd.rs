//! Batch embedding and collection upsert for both hemispheres.
//!
//! The two indexers share one shape: stream a JSONL record file, accumulate
//! a fixed-size batch, embed the batch's text field, upsert into the
//! hemisphere's collection, and flush the remainder at end of stream.
//! Records without text are skipped with a warning; an embedding failure
//! aborts the run (ids are idempotent, so a re-run overwrites cleanly).

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::models::{CompassRecord, FragmentRecord};
use crate::store::{
    self, sanitize_metadata, OrientationCollection, TextureCollection, UpsertRecord,
};

/// Counts reported by one indexing run.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub indexed: u64,
    pub skipped: u64,
}

struct Staged {
    id: String,
    text: String,
    metadata: Map<String, Value>,
    document: Option<String>,
}

async fn embed_staged(embedder: &dyn Embedder, staged: &[Staged]) -> Result<Vec<UpsertRecord>> {
    let texts: Vec<String> = staged.iter().map(|s| s.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != staged.len() {
        bail!(
            "Embedding count mismatch: {} texts, {} vectors",
            staged.len(),
            vectors.len()
        );
    }

    Ok(staged
        .iter()
        .zip(vectors)
        .map(|(s, embedding)| UpsertRecord {
            id: s.id.clone(),
            embedding,
            metadata: s.metadata.clone(),
            document: s.document.clone(),
        })
        .collect())
}

fn fragment_metadata(record: &FragmentRecord) -> Map<String, Value> {
    let meta = json!({
        "codex_id": record.codex_id,
        "category": record.category,
        "index": record.index,
        "slug": record.slug,
        "title": record.title,
        "segment": record.segment,
        "mood": record.mood,
        "voice": record.voice,
        "language": record.language,
    });
    sanitize_metadata(meta.as_object().cloned().unwrap_or_default())
}

fn compass_metadata(record: &CompassRecord) -> Map<String, Value> {
    let meta = json!({
        "codex_id": record.codex_id,
        "node_index": record.node_index,
        "node_label": record.node_label,
        "field_index": record.field_index,
        "field_label": record.field_label,
        "geometry_pair": record.geometry_pair,
        "source": record.source,
    });
    sanitize_metadata(meta.as_object().cloned().unwrap_or_default())
}

/// Embed fragment records and upsert them into the texture collection.
///
/// The raw paragraph is stored alongside the vector so query hits can
/// return the text without regeneration.
pub async fn index_fragments<R: BufRead>(
    reader: R,
    embedder: &dyn Embedder,
    collection: &TextureCollection,
    batch_size: usize,
) -> Result<IndexSummary> {
    let mut summary = IndexSummary::default();
    let mut batch: Vec<Staged> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FragmentRecord = serde_json::from_str(&line)
            .with_context(|| format!("Malformed fragment record at line {}", line_no + 1))?;

        let text = record.content.trim();
        if text.is_empty() {
            eprintln!("Warning: fragment {} has no content, skipped", record.id);
            summary.skipped += 1;
            continue;
        }

        batch.push(Staged {
            id: record.id.clone(),
            text: text.to_string(),
            metadata: fragment_metadata(&record),
            document: Some(text.to_string()),
        });

        if batch.len() >= batch_size {
            collection.upsert(&embed_staged(embedder, &batch).await?).await?;
            summary.indexed += batch.len() as u64;
            batch.clear();
            println!("  ↳ {} fragments indexed...", summary.indexed);
        }
    }

    if !batch.is_empty() {
        collection.upsert(&embed_staged(embedder, &batch).await?).await?;
        summary.indexed += batch.len() as u64;
    }

    Ok(summary)
}

/// Embed compass records and upsert them into the orientation collection.
pub async fn index_compasses<R: BufRead>(
    reader: R,
    embedder: &dyn Embedder,
    collection: &OrientationCollection,
    batch_size: usize,
) -> Result<IndexSummary> {
    let mut summary = IndexSummary::default();
    let mut batch: Vec<Staged> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CompassRecord = serde_json::from_str(&line)
            .with_context(|| format!("Malformed compass record at line {}", line_no + 1))?;

        // Prefer the fused summary; fall back to combining the raw parts.
        let mut text = record.summary.trim().to_string();
        if text.is_empty() {
            text = format!(
                "{} — {} :: {} — {}",
                record.node_label, record.node_summary, record.field_label, record.field_paragraph
            )
            .trim()
            .to_string();
        }
        if text.is_empty() {
            eprintln!("Warning: compass {} has no summary text, skipped", record.id);
            summary.skipped += 1;
            continue;
        }

        batch.push(Staged {
            id: record.id.clone(),
            text,
            metadata: compass_metadata(&record),
            document: None,
        });

        if batch.len() >= batch_size {
            collection.upsert(&embed_staged(embedder, &batch).await?).await?;
            summary.indexed += batch.len() as u64;
            batch.clear();
            println!("  ↳ {} compasses indexed...", summary.indexed);
        }
    }

    if !batch.is_empty() {
        collection.upsert(&embed_staged(embedder, &batch).await?).await?;
        summary.indexed += batch.len() as u64;
    }

    Ok(summary)
}

/// Index the fragments JSONL file into the texture collection.
pub async fn run_index_texture(config: &Config) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding.texture)?;
    let store = store::open_store(config).await?;
    let collection = TextureCollection::create(store, &config.collections.texture).await?;

    let path = &config.ingest.fragments_out;
    let file = File::open(path)
        .with_context(|| format!("Failed to open fragments file: {}", path.display()))?;

    let summary = index_fragments(
        BufReader::new(file),
        embedder.as_ref(),
        &collection,
        config.embedding.texture.batch_size,
    )
    .await?;

    println!("index texture");
    println!("  collection: {}", collection.name());
    println!("  model: {}", embedder.model_name());
    println!("  indexed: {}", summary.indexed);
    println!("  skipped: {}", summary.skipped);
    println!("ok");
    Ok(())
}

/// Index the compasses JSONL file into the orientation collection.
pub async fn run_index_orientation(config: &Config) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding.orientation)?;
    let store = store::open_store(config).await?;
    let collection = OrientationCollection::create(store, &config.collections.orientation).await?;

    let path = &config.ingest.compasses_out;
    let file = File::open(path)
        .with_context(|| format!("Failed to open compasses file: {}", path.display()))?;

    let summary = index_compasses(
        BufReader::new(file),
        embedder.as_ref(),
        &collection,
        config.embedding.orientation.batch_size,
    )
    .await?;

    println!("index orientation");
    println!("  collection: {}", collection.name());
    println!("  model: {}", embedder.model_name());
    println!("  indexed: {}", summary.indexed);
    println!("  skipped: {}", summary.skipped);
    println!("ok");
    Ok(())
}
