//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Job summaries and upload paths are user content; spans only ever carry
//! a bounded preview or the bare file name.

use std::path::Path;

const PREVIEW_CHARS: usize = 48;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// First few characters of a text on one line, with an ellipsis when cut.
pub fn preview_text(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut.trim_end())
}
