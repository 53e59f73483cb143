//! Markdown cleaning and paragraph segmentation.
//!
//! Converts an annotated source document into the ordered sequence of
//! cleaned paragraph strings that the texture hemisphere indexes. Output
//! paragraphs are clusters of exactly three sentences (the final cluster
//! may hold one or two), a fixed granularity that keeps each unit long
//! enough to embed coherently and short enough to retrieve precisely.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Output paragraphs at or below this length are discarded.
const MIN_PARAGRAPH_CHARS: usize = 60;

/// Sentences grouped per output paragraph.
const SENTENCES_PER_PARAGRAPH: usize = 3;

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static HEADING_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").unwrap());
static FORMATTING: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_~>`#-]+").unwrap());
static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static FIRST_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#\s+(.+)").unwrap());

/// A sentence boundary: terminal punctuation, whitespace, then a capital
/// letter or an opening quote or parenthesis.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]\s+(["“(]?[A-Z])"#).unwrap());

/// Metadata block recognized at the top of a source document, delimited by
/// `---` markers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontMatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FrontMatter {
    /// Tag list, preferring `tags` over the `keywords` alias.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .clone()
            .or_else(|| self.keywords.clone())
            .unwrap_or_default()
    }
}

/// Split a raw document into its front matter and body.
///
/// Malformed front matter (invalid YAML) is swallowed and treated as empty
/// metadata; it never aborts ingestion of the body.
pub fn split_front_matter(raw: &str) -> (FrontMatter, &str) {
    if let Some(rest) = raw.strip_prefix("---") {
        if let Some(end) = rest.find("\n---") {
            let block = &rest[..end];
            let body = rest[end + 4..].trim_start();
            let meta = serde_yml::from_str(block).unwrap_or_default();
            return (meta, body);
        }
    }
    (FrontMatter::default(), raw)
}

/// First `# heading` text in the raw document, if any.
pub fn first_heading(raw: &str) -> Option<String> {
    FIRST_HEADING
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
}

/// Strip annotation markup and residual formatting punctuation.
///
/// Line structure is preserved so blank lines still delimit first-pass
/// paragraphs; only horizontal whitespace runs are collapsed.
pub fn clean_source(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = CODE_BLOCK.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING_MARK.replace_all(&text, "");
    let text = FORMATTING.replace_all(&text, " ");
    let text = HORIZONTAL_WS.replace_all(&text, " ");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.join("\n").trim().to_string()
}

/// Split a logical paragraph into sentences.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    for caps in SENTENCE_BOUNDARY.captures_iter(text) {
        // The terminal punctuation mark is a single byte; the sentence ends
        // right after it and the next one begins at the captured opener.
        let end = caps.get(0).unwrap().start() + 1;
        let next = caps.get(1).unwrap().start();
        sentences.push(text[start..end].trim());
        start = next;
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Segment a cleaned document into output paragraphs.
///
/// First pass joins consecutive non-blank lines into logical paragraphs at
/// blank-line boundaries. Second pass splits each logical paragraph into
/// sentences and regroups them three at a time. Paragraphs at or below the
/// minimum length are dropped; if that empties the result, the whole
/// cleaned document is kept as a single paragraph.
pub fn segment_paragraphs(cleaned: &str) -> Vec<String> {
    let mut combined: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in cleaned.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                combined.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        combined.push(current.join(" "));
    }

    let mut paragraphs: Vec<String> = Vec::new();
    for block in &combined {
        for group in split_sentences(block).chunks(SENTENCES_PER_PARAGRAPH) {
            paragraphs.push(group.join(" "));
        }
    }

    paragraphs.retain(|p| p.chars().count() > MIN_PARAGRAPH_CHARS);

    if paragraphs.is_empty() {
        let whole = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if !whole.is_empty() {
            paragraphs.push(whole);
        }
    }

    paragraphs
}
