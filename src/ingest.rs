//! Offline ingestion: raw source directories to JSONL record files.
//!
//! Two batch pipelines share this module: annotated markdown becomes
//! fragment records (texture layer) and geometry JSON becomes compass
//! records (orientation layer). Both walk their input directory in
//! deterministic order and write one JSON object per line.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::compass::{self, GeometryDoc};
use crate::config::Config;
use crate::models::FragmentRecord;
use crate::segment;

/// Provenance fields parsed from a source filename such as
/// `FIELD.201_threshold_states.md`.
#[derive(Debug, Clone)]
pub struct CodexName {
    pub codex_id: String,
    pub category: String,
    pub index: String,
    pub slug: String,
    pub title: String,
}

/// Parse category, index, and slug out of a source filename.
pub fn parse_codex_name(filename: &str) -> CodexName {
    let base = Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();

    let (prefix, slug) = match base.split_once('_') {
        Some((prefix, slug)) => (prefix.to_string(), slug.to_string()),
        None => (base, String::new()),
    };

    let (category, index) = match prefix.split_once('.') {
        Some((category, index)) => (category.to_string(), index.to_string()),
        None => ("UNCAT".to_string(), "000".to_string()),
    };

    let codex_id = format!("{}.{}_{}", category, index, slug);
    let title = if slug.is_empty() {
        codex_id.clone()
    } else {
        title_case(&slug)
    };

    CodexName {
        codex_id,
        category,
        index,
        slug,
        title,
    }
}

fn title_case(slug: &str) -> String {
    slug.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic fragment id: truncated SHA-256 over the identity tuple.
/// Re-running ingestion on unchanged input reproduces identical ids.
pub fn fragment_id(codex_id: &str, relpath: &str, title: &str, segment: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}/{}/{}/{}", codex_id, relpath, title, segment).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Collect matching files under `root`, sorted by relative path for
/// deterministic ordering.
fn scan_files(root: &Path, include: &GlobSet) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if !include.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn open_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Ingest annotated source documents into the fragments JSONL file.
pub fn run_ingest_fragments(config: &Config) -> Result<()> {
    let raw_dir = &config.ingest.raw_dir;
    if !raw_dir.exists() {
        bail!("Raw document directory does not exist: {}", raw_dir.display());
    }

    let include = build_globset(&config.ingest.include_globs)?;
    let files = scan_files(raw_dir, &include)?;
    let mut out = open_output(&config.ingest.fragments_out)?;
    let mut count = 0u64;

    for (path, rel) in &files {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;
        let (meta, body) = segment::split_front_matter(&raw);

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = parse_codex_name(&filename);
        let title = meta
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| segment::first_heading(body))
            .unwrap_or_else(|| name.title.clone());

        let cleaned = segment::clean_source(body);
        let paragraphs = segment::segment_paragraphs(&cleaned);
        println!("  ↳ {} fragments from {}", paragraphs.len(), rel);

        for (seg, paragraph) in paragraphs.iter().enumerate() {
            let record = FragmentRecord {
                id: fragment_id(&name.codex_id, rel, &title, seg as i64),
                codex_id: name.codex_id.clone(),
                category: name.category.clone(),
                index: name.index.clone(),
                slug: name.slug.clone(),
                title: title.clone(),
                segment: seg as i64,
                content: paragraph.clone(),
                tags: meta.tag_list(),
                mood: meta.mood.clone(),
                voice: meta.voice.clone(),
                language: meta.language.clone(),
                notes: meta.notes.clone(),
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
            count += 1;
        }
    }

    out.flush()?;
    println!("ingest fragments");
    println!("  files: {}", files.len());
    println!("  records: {}", count);
    println!("  output: {}", config.ingest.fragments_out.display());
    println!("ok");
    Ok(())
}

/// Ingest geometry metadata documents into the compasses JSONL file.
pub fn run_ingest_compasses(config: &Config) -> Result<()> {
    let geometry_dir = &config.ingest.geometry_dir;
    if !geometry_dir.exists() {
        bail!(
            "Geometry document directory does not exist: {}",
            geometry_dir.display()
        );
    }

    let include = build_globset(&["**/*.json".to_string()])?;
    let files = scan_files(geometry_dir, &include)?;
    let mut out = open_output(&config.ingest.compasses_out)?;
    let mut count = 0u64;
    let mut skipped = 0u64;

    for (path, rel) in &files {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read geometry file: {}", path.display()))?;
        let doc: GeometryDoc = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed geometry document: {}", path.display()))?;

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let records = compass::synthesize(&doc, &stem);
        if records.is_empty() {
            eprintln!("Warning: {} has no node/field pairs, skipped", rel);
            skipped += 1;
            continue;
        }

        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
            count += 1;
        }
    }

    out.flush()?;
    println!("ingest compasses");
    println!("  files: {}", files.len());
    println!("  records: {}", count);
    println!("  skipped: {}", skipped);
    println!("  output: {}", config.ingest.compasses_out.display());
    println!("ok");
    Ok(())
}
