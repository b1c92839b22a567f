//! Sender identity and attachment renaming into the store's naming convention.

use std::path::Path;

use crate::documents::naming::{classify, DocumentKind};

pub const UNKNOWN_SENDER: &str = "Unknown";

/// Display name from a `From` header.
///
/// `"Jane Doe <jane@x.com>"` → `"JaneDoe"`, `"jane@x.com"` → `"jane"`,
/// anything else → `"Unknown"`. The result never contains characters that
/// would break `<Name>_<Kind>` grouping or escape the store directory.
pub fn sender_name(from: Option<&str>) -> String {
    let Some(from) = from.map(str::trim).filter(|f| !f.is_empty()) else {
        return UNKNOWN_SENDER.to_string();
    };

    let candidate = match from.find('<') {
        Some(idx) if idx > 0 => &from[..idx],
        _ => match from.find('@') {
            Some(idx) if idx > 0 => from.trim_start_matches('<').split('@').next().unwrap_or(""),
            _ => "",
        },
    };

    let cleaned: String = candidate
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '_' | '/' | '\\'))
        .collect();

    if cleaned.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        cleaned
    }
}

/// `<Sender>_CV<ext>`, `<Sender>_CoverLetter<ext>`, or `<Sender>_<original>`
/// when the original name says neither.
pub fn renamed_attachment(sender: &str, original: &str) -> String {
    // Keep only the final component of whatever the sender named the file
    let original = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");
    let path = Path::new(original);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(original);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    match classify(stem) {
        Some(DocumentKind::Cv) => format!("{sender}_CV{ext}"),
        Some(DocumentKind::CoverLetter) => format!("{sender}_CoverLetter{ext}"),
        None => format!("{sender}_{original}"),
    }
}
