//! Bridge response formatting for the web front end.
//!
//! Pure string construction: renders the merged result into display lines,
//! truncating document previews to a fixed character budget.

use crate::models::BridgeResponse;

/// Preview budget for raw document text.
const PREVIEW_CHARS: usize = 180;

/// Render a bridge response as one display string.
pub fn render(response: &BridgeResponse) -> String {
    render_lines(response).join("\n")
}

/// Render a bridge response as display lines.
pub fn render_lines(response: &BridgeResponse) -> Vec<String> {
    let mut lines = vec!["✅ bridge complete".to_string()];

    lines.push(String::new());
    lines.push("🧭  Orientation layer — dual-geometry compasses:".to_string());
    for hit in &response.orientation {
        lines.push(format!(
            "  • {} — {} ↔ {}  ({}) [{}]",
            or_label(&hit.codex_id, "N/A"),
            or_label(&hit.node_label, "Unknown"),
            hit.field_label,
            hit.source,
            hit.geometry_pair
        ));
    }

    lines.push(String::new());
    lines.push("🌿  Texture layer — paragraph fragments:".to_string());
    for hit in &response.texture {
        lines.push(format!(
            "  • {} — {}  [segment {}]",
            or_label(&hit.codex_id, "N/A"),
            or_label(&hit.title, "Unknown"),
            hit.segment
        ));
        lines.push(format!("    → {}", preview(&hit.document)));
    }

    lines.push(String::new());
    lines.push("✅  bridge complete — two hemispheres queried in native geometry.".to_string());
    lines
}

fn or_label<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.is_empty() {
        return "(no text)".to_string();
    }
    let truncated: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", truncated)
}
