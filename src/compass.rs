//! Compass synthesis: pairing geometry nodes with cycled fields.
//!
//! A geometry document carries two parallel sequences — mesh nodes and
//! pentagonal fields. Each node is fused with one field into a compass
//! record; fields are cycled when nodes outnumber them, so every node is
//! covered exactly once and every field is reused proportionally.

use serde::Deserialize;

use crate::models::CompassRecord;

/// Fixed tag describing the pairing geometry.
pub const GEOMETRY_PAIR: &str = "icosa↔dodeca";

/// A geometry metadata document as found on disk.
#[derive(Debug, Default, Deserialize)]
pub struct GeometryDoc {
    #[serde(default)]
    pub metadata: GeometryMeta,
    #[serde(default, rename = "ICOSA_MESH")]
    pub icosa_mesh: IcosaMesh,
    #[serde(default, rename = "DODECA_FIELD")]
    pub dodeca_field: DodecaField,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeometryMeta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IcosaMesh {
    #[serde(default)]
    pub nodes: Vec<GeometryNode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeometryNode {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Older documents carry the summary under this name.
    #[serde(default)]
    pub reflection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DodecaField {
    #[serde(default)]
    pub pentagonal_fields: Vec<GeometryField>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeometryField {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub paragraph: Option<String>,
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapse an optional field, treating blank values as absent.
fn clean_field(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_ws)
        .filter(|cleaned| !cleaned.is_empty())
}

/// Fuse one node/field pairing into the sentence embedded for retrieval.
pub fn fuse_summary(
    node_label: &str,
    node_summary: &str,
    field_label: &str,
    field_paragraph: &str,
) -> String {
    let base = format!(
        "When the node '{}' meets the field '{}', language curves as {} and resonates through {}.",
        node_label,
        field_label,
        node_summary.to_lowercase(),
        field_paragraph.to_lowercase()
    );
    collapse_ws(&base)
}

/// Synthesize one compass record per node.
///
/// Returns an empty list when either sequence is empty; such a document
/// contributes nothing but never fails the batch. `fallback_id` (the file
/// stem) is used when the document metadata carries no id.
pub fn synthesize(doc: &GeometryDoc, fallback_id: &str) -> Vec<CompassRecord> {
    let codex_id = doc
        .metadata
        .id
        .clone()
        .unwrap_or_else(|| fallback_id.to_string());
    let source = doc.metadata.title.clone().unwrap_or_else(|| codex_id.clone());

    let nodes = &doc.icosa_mesh.nodes;
    let fields = &doc.dodeca_field.pentagonal_fields;
    if nodes.is_empty() || fields.is_empty() {
        return Vec::new();
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let node_label = clean_field(node.label.as_deref())
                .unwrap_or_else(|| format!("Node {}", i + 1));
            let node_summary = clean_field(node.summary.as_deref())
                .or_else(|| clean_field(node.reflection.as_deref()))
                .unwrap_or_default();

            let field_pos = i % fields.len();
            let field = &fields[field_pos];
            let field_label = clean_field(field.label.as_deref())
                .unwrap_or_else(|| format!("Field {}", field_pos + 1));
            let field_paragraph = clean_field(field.paragraph.as_deref()).unwrap_or_default();

            let summary = fuse_summary(&node_label, &node_summary, &field_label, &field_paragraph);

            CompassRecord {
                id: format!("{}::compass::{}", codex_id, i + 1),
                codex_id: codex_id.clone(),
                source: source.clone(),
                node_index: (i + 1) as i64,
                node_label,
                node_summary,
                field_index: (field_pos + 1) as i64,
                field_label,
                field_paragraph,
                geometry_pair: GEOMETRY_PAIR.to_string(),
                summary,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(nodes: &[(&str, &str)], fields: &[(&str, &str)]) -> GeometryDoc {
        GeometryDoc {
            metadata: GeometryMeta {
                id: Some("GEO.001_test".to_string()),
                title: Some("Test Geometry".to_string()),
            },
            icosa_mesh: IcosaMesh {
                nodes: nodes
                    .iter()
                    .map(|(label, summary)| GeometryNode {
                        label: Some(label.to_string()),
                        summary: Some(summary.to_string()),
                        reflection: None,
                    })
                    .collect(),
            },
            dodeca_field: DodecaField {
                pentagonal_fields: fields
                    .iter()
                    .map(|(label, paragraph)| GeometryField {
                        label: Some(label.to_string()),
                        paragraph: Some(paragraph.to_string()),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_fields_cycle_when_nodes_outnumber() {
        let doc = doc(
            &[("N1", "s1"), ("N2", "s2"), ("N3", "s3")],
            &[("F1", "p1"), ("F2", "p2")],
        );
        let records = synthesize(&doc, "fallback");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].field_label, "F1");
        assert_eq!(records[1].field_label, "F2");
        assert_eq!(records[2].field_label, "F1");
    }

    #[test]
    fn test_field_index_invariant() {
        let doc = doc(
            &[("N1", "s"), ("N2", "s"), ("N3", "s"), ("N4", "s"), ("N5", "s")],
            &[("F1", "p"), ("F2", "p"), ("F3", "p")],
        );
        for record in synthesize(&doc, "fallback") {
            let field_count = 3;
            assert_eq!(
                record.field_index,
                (record.node_index - 1) % field_count + 1
            );
        }
    }

    #[test]
    fn test_empty_sequences_yield_no_records() {
        assert!(synthesize(&doc(&[], &[("F1", "p")]), "x").is_empty());
        assert!(synthesize(&doc(&[("N1", "s")], &[]), "x").is_empty());
    }

    #[test]
    fn test_summary_fuses_and_lowercases() {
        let doc = doc(&[("Axis", "The Turning Point")], &[("Ground", "A Quiet Base")]);
        let records = synthesize(&doc, "fallback");
        assert_eq!(
            records[0].summary,
            "When the node 'Axis' meets the field 'Ground', language curves as the turning point and resonates through a quiet base."
        );
    }

    #[test]
    fn test_ids_are_deterministic_per_node() {
        let doc = doc(&[("N1", "s"), ("N2", "s")], &[("F1", "p")]);
        let records = synthesize(&doc, "fallback");
        assert_eq!(records[0].id, "GEO.001_test::compass::1");
        assert_eq!(records[1].id, "GEO.001_test::compass::2");
    }

    #[test]
    fn test_fallback_id_and_blank_labels() {
        let geometry = GeometryDoc {
            metadata: GeometryMeta::default(),
            icosa_mesh: IcosaMesh {
                nodes: vec![GeometryNode {
                    label: Some("  ".to_string()),
                    summary: None,
                    reflection: Some("echoes  of  structure".to_string()),
                }],
            },
            dodeca_field: DodecaField {
                pentagonal_fields: vec![GeometryField {
                    label: None,
                    paragraph: Some("p".to_string()),
                }],
            },
        };
        let records = synthesize(&geometry, "GEO.002_bare");
        assert_eq!(records[0].codex_id, "GEO.002_bare");
        assert_eq!(records[0].source, "GEO.002_bare");
        assert_eq!(records[0].node_label, "Node 1");
        assert_eq!(records[0].field_label, "Field 1");
        assert_eq!(records[0].node_summary, "echoes of structure");
    }
}
