use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use mindfield::bridge::Bridge;
use mindfield::config::{self, Config};
use mindfield::embedding::Embedder;
use mindfield::index_cmd;
use mindfield::ingest;
use mindfield::models::{CompassRecord, FragmentRecord};
use mindfield::store::sqlite::SqliteStore;
use mindfield::store::{OrientationCollection, TextureCollection, UpsertRecord, VectorStore};

// ============ Fixtures ============

fn setup_test_env() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    for dir in ["raw_md", "geometry", "processed", "vectors"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }

    let config_content = format!(
        r#"[store]
mode = "local"
local_path = "{root}/vectors/mindfield.sqlite"

[ingest]
raw_dir = "{root}/raw_md"
geometry_dir = "{root}/geometry"
fragments_out = "{root}/processed/archive.jsonl"
compasses_out = "{root}/processed/abstracts.jsonl"

[server]
bind = "127.0.0.1:5050"
"#,
        root = root.display()
    );

    let config_path = root.join("mindfield.toml");
    fs::write(&config_path, config_content).unwrap();
    let config = config::load_config(&config_path).unwrap();

    (tmp, config)
}

fn store_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("vectors/mindfield.sqlite")
}

async fn open_store(tmp: &TempDir) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::connect(&store_path(tmp)).await.unwrap())
}

/// Deterministic toy embedding: byte histogram folded into `dims` buckets.
fn embed_text(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for (i, byte) in text.bytes().enumerate() {
        vector[(byte as usize + i) % dims] += 1.0;
    }
    vector
}

struct FakeEmbedder {
    dims: usize,
    calls: Arc<AtomicUsize>,
}

impl FakeEmbedder {
    fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| embed_text(t, self.dims)).collect())
    }
}

fn write_example_document(raw_dir: &Path) {
    let body = "\
The field opens before the walker arrives at the threshold of the enclosure. \
Every instrument reads a different weather inside the perimeter fence. \
Nobody agrees on the shape of the boundary line at dusk.

A second passage describes the slow drift of the survey markers over winter. \
The cartographers redraw the same contour every season without complaint. \
Their maps disagree politely about where the field ends.
";
    fs::write(raw_dir.join("FIELD.201_example.md"), body).unwrap();
}

fn read_fragments(path: &Path) -> Vec<FragmentRecord> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn read_compasses(path: &Path) -> Vec<CompassRecord> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============ Ingestion ============

#[test]
fn test_ingest_two_paragraph_document() {
    let (tmp, config) = setup_test_env();
    write_example_document(&tmp.path().join("raw_md"));

    ingest::run_ingest_fragments(&config).unwrap();

    let records = read_fragments(&config.ingest.fragments_out);
    assert_eq!(records.len(), 2);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.codex_id, "FIELD.201_example");
        assert_eq!(record.category, "FIELD");
        assert_eq!(record.index, "201");
        assert_eq!(record.title, "Example");
        assert_eq!(record.segment, i as i64);
        assert!(!record.content.is_empty());
    }
}

#[test]
fn test_ingest_is_deterministic() {
    let (tmp, config) = setup_test_env();
    write_example_document(&tmp.path().join("raw_md"));

    ingest::run_ingest_fragments(&config).unwrap();
    let first = read_fragments(&config.ingest.fragments_out);

    ingest::run_ingest_fragments(&config).unwrap();
    let second = read_fragments(&config.ingest.fragments_out);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.content, b.content);
    }
}

#[test]
fn test_ingest_front_matter_metadata() {
    let (tmp, config) = setup_test_env();
    let body = "\
---
title: Named In Front Matter
mood: liminal
---
The field opens before the walker arrives at the threshold of the enclosure. \
Every instrument reads a different weather inside the perimeter fence. \
Nobody agrees on the shape of the boundary line at dusk.
";
    fs::write(tmp.path().join("raw_md/FIELD.202_named.md"), body).unwrap();

    ingest::run_ingest_fragments(&config).unwrap();

    let records = read_fragments(&config.ingest.fragments_out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Named In Front Matter");
    assert_eq!(records[0].mood.as_deref(), Some("liminal"));
}

#[test]
fn test_ingest_compasses_cycles_fields() {
    let (tmp, config) = setup_test_env();
    let geometry = r#"{
        "metadata": { "id": "GEO.001_test", "title": "Test Geometry" },
        "ICOSA_MESH": {
            "nodes": [
                { "label": "N1", "summary": "first turning" },
                { "label": "N2", "summary": "second turning" },
                { "label": "N3", "summary": "third turning" }
            ]
        },
        "DODECA_FIELD": {
            "pentagonal_fields": [
                { "label": "F1", "paragraph": "ground one" },
                { "label": "F2", "paragraph": "ground two" }
            ]
        }
    }"#;
    fs::write(tmp.path().join("geometry/GEO.001_test.json"), geometry).unwrap();

    ingest::run_ingest_compasses(&config).unwrap();

    let records = read_compasses(&config.ingest.compasses_out);
    assert_eq!(records.len(), 3);
    let assignments: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.node_label.as_str(), r.field_label.as_str()))
        .collect();
    assert_eq!(
        assignments,
        vec![("N1", "F1"), ("N2", "F2"), ("N3", "F1")]
    );
    for record in &records {
        assert_eq!(record.field_index, (record.node_index - 1) % 2 + 1);
        assert_eq!(record.source, "Test Geometry");
    }
}

#[test]
fn test_ingest_compasses_skips_empty_geometry() {
    let (tmp, config) = setup_test_env();
    let geometry = r#"{ "metadata": { "id": "GEO.002_bare" } }"#;
    fs::write(tmp.path().join("geometry/GEO.002_bare.json"), geometry).unwrap();

    ingest::run_ingest_compasses(&config).unwrap();

    let content = fs::read_to_string(&config.ingest.compasses_out).unwrap();
    assert!(content.is_empty());
}

// ============ Store ============

#[tokio::test]
async fn test_store_query_ranks_by_similarity() {
    let (tmp, _config) = setup_test_env();
    let store = open_store(&tmp).await;
    let collection = TextureCollection::create(store, "texture_test")
        .await
        .unwrap();

    let records = vec![
        UpsertRecord {
            id: "aligned".to_string(),
            embedding: vec![1.0, 0.0],
            metadata: Default::default(),
            document: Some("aligned".to_string()),
        },
        UpsertRecord {
            id: "orthogonal".to_string(),
            embedding: vec![0.0, 1.0],
            metadata: Default::default(),
            document: Some("orthogonal".to_string()),
        },
        UpsertRecord {
            id: "near".to_string(),
            embedding: vec![0.9, 0.2],
            metadata: Default::default(),
            document: Some("near".to_string()),
        },
    ];
    collection.upsert(&records).await.unwrap();

    let hits = collection.query(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "aligned");
    assert_eq!(hits[1].id, "near");
    assert_eq!(hits[0].document.as_deref(), Some("aligned"));
}

#[tokio::test]
async fn test_store_upsert_overwrites_by_id() {
    let (tmp, _config) = setup_test_env();
    let store = open_store(&tmp).await;
    let collection = TextureCollection::create(store, "texture_test")
        .await
        .unwrap();

    let mut record = UpsertRecord {
        id: "one".to_string(),
        embedding: vec![1.0, 0.0],
        metadata: Default::default(),
        document: Some("first version".to_string()),
    };
    collection.upsert(std::slice::from_ref(&record)).await.unwrap();

    record.document = Some("second version".to_string());
    collection.upsert(std::slice::from_ref(&record)).await.unwrap();

    let hits = collection.query(&[1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.as_deref(), Some("second version"));
}

#[tokio::test]
async fn test_missing_collection_fails_descriptively() {
    let (tmp, _config) = setup_test_env();
    let store = open_store(&tmp).await;

    let err = OrientationCollection::open(store, "never_indexed")
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("never_indexed"), "got: {}", message);
    assert!(message.contains("orientation"), "got: {}", message);
}

// ============ Bridge ============

async fn seeded_bridge(tmp: &TempDir) -> Bridge {
    let store = open_store(tmp).await;

    let texture = TextureCollection::create(store.clone(), "fragments")
        .await
        .unwrap();
    let orientation = OrientationCollection::create(store, "compasses")
        .await
        .unwrap();

    let fragment = FragmentRecord {
        id: "frag1".to_string(),
        codex_id: "FIELD.201_example".to_string(),
        category: "FIELD".to_string(),
        index: "201".to_string(),
        slug: "example".to_string(),
        title: "Example".to_string(),
        segment: 0,
        content: "The field opens before the walker arrives.".to_string(),
        tags: Vec::new(),
        mood: None,
        voice: None,
        language: None,
        notes: None,
    };
    let compass = CompassRecord {
        id: "GEO.001_test::compass::1".to_string(),
        codex_id: "GEO.001_test".to_string(),
        source: "Test Geometry".to_string(),
        node_index: 1,
        node_label: "Axis".to_string(),
        node_summary: "the turning point".to_string(),
        field_index: 1,
        field_label: "Ground".to_string(),
        field_paragraph: "a quiet base".to_string(),
        geometry_pair: "icosa↔dodeca".to_string(),
        summary: "When the node 'Axis' meets the field 'Ground', language curves as the turning point and resonates through a quiet base.".to_string(),
    };

    let embedder = FakeEmbedder::new(8);
    let fragment_jsonl = serde_json::to_string(&fragment).unwrap() + "\n";
    index_cmd::index_fragments(Cursor::new(fragment_jsonl), &embedder, &texture, 64)
        .await
        .unwrap();
    let compass_jsonl = serde_json::to_string(&compass).unwrap() + "\n";
    index_cmd::index_compasses(Cursor::new(compass_jsonl), &embedder, &orientation, 64)
        .await
        .unwrap();

    Bridge::new(
        orientation,
        Box::new(FakeEmbedder::new(8)),
        texture,
        Box::new(FakeEmbedder::new(8)),
        5,
    )
}

#[tokio::test]
async fn test_bridge_returns_one_hit_per_hemisphere() {
    let (tmp, _config) = setup_test_env();
    let bridge = seeded_bridge(&tmp).await;

    let response = bridge.query("threshold states").await.unwrap();

    assert_eq!(response.query, "threshold states");
    assert_eq!(response.orientation.len(), 1);
    assert_eq!(response.texture.len(), 1);

    let orientation = &response.orientation[0];
    assert_eq!(orientation.codex_id, "GEO.001_test");
    assert_eq!(orientation.node_label, "Axis");
    assert_eq!(orientation.field_label, "Ground");
    assert_eq!(orientation.geometry_pair, "icosa↔dodeca");
    assert_eq!(orientation.source, "Test Geometry");

    let texture = &response.texture[0];
    assert_eq!(texture.codex_id, "FIELD.201_example");
    assert_eq!(texture.title, "Example");
    assert_eq!(texture.segment, 0);
    assert_eq!(texture.document, "The field opens before the walker arrives.");
}

#[tokio::test]
async fn test_bridge_rejects_empty_query_before_embedding() {
    let (tmp, _config) = setup_test_env();
    let store = open_store(&tmp).await;

    let texture = TextureCollection::create(store.clone(), "fragments")
        .await
        .unwrap();
    let orientation = OrientationCollection::create(store, "compasses")
        .await
        .unwrap();

    let orientation_embedder = FakeEmbedder::new(8);
    let texture_embedder = FakeEmbedder::new(8);
    let orientation_calls = orientation_embedder.calls.clone();
    let texture_calls = texture_embedder.calls.clone();

    let bridge = Bridge::new(
        orientation,
        Box::new(orientation_embedder),
        texture,
        Box::new(texture_embedder),
        5,
    );

    let err = bridge.query("   ").await.unwrap_err();
    assert_eq!(err.to_string(), "empty query");
    assert_eq!(orientation_calls.load(Ordering::SeqCst), 0);
    assert_eq!(texture_calls.load(Ordering::SeqCst), 0);
}

// ============ Full pipeline ============

#[tokio::test]
async fn test_ingest_index_query_end_to_end() {
    let (tmp, config) = setup_test_env();
    write_example_document(&tmp.path().join("raw_md"));
    ingest::run_ingest_fragments(&config).unwrap();

    let store = open_store(&tmp).await;
    store.ensure_collection("fragments").await.unwrap();
    let texture = TextureCollection::open(store.clone(), "fragments")
        .await
        .unwrap();
    let orientation = OrientationCollection::create(store, "compasses")
        .await
        .unwrap();

    let embedder = FakeEmbedder::new(16);
    let jsonl = fs::read_to_string(&config.ingest.fragments_out).unwrap();
    let summary = index_cmd::index_fragments(Cursor::new(jsonl), &embedder, &texture, 1)
        .await
        .unwrap();
    assert_eq!(summary.indexed, 2);
    assert_eq!(summary.skipped, 0);

    let bridge = Bridge::new(
        orientation,
        Box::new(FakeEmbedder::new(16)),
        texture,
        Box::new(FakeEmbedder::new(16)),
        5,
    );
    let response = bridge.query("survey markers").await.unwrap();

    assert!(response.orientation.is_empty());
    assert_eq!(response.texture.len(), 2);
    for hit in &response.texture {
        assert_eq!(hit.codex_id, "FIELD.201_example");
        assert!(!hit.document.is_empty());
    }
}
