//! Filename convention: `<Name>_<Kind>.<ext>`, e.g. `JaneDoe_CV.pdf` or
//! `JaneDoe_CoverLetter.txt`.

use std::path::Path;

/// Extensions the store will read. Anything else is skipped silently.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "doc", "docx"];

/// Separator between the applicant name and the document kind.
pub const NAME_SEPARATOR: char = '_';

const CV_KEYWORDS: &[&str] = &["cv", "resume"];
const COVER_LETTER_KEYWORDS: &[&str] = &["cover", "letter"];
/// Matched as a whole token only: `Bob_CL.pdf`, not `Declaration.pdf`.
const COVER_LETTER_ABBREVIATION: &str = "cl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Cv,
    CoverLetter,
}

/// A filename that follows the convention and has an allowed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub applicant: String,
    pub kind: DocumentKind,
    /// Lowercased, without the dot.
    pub extension: String,
}

/// Lowercased extension if it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Classifies the part after the name. CV keywords are tried first, so
/// `"cv_cover"` is a CV.
pub fn classify(remainder: &str) -> Option<DocumentKind> {
    let lower = remainder.to_lowercase();
    if CV_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(DocumentKind::Cv)
    } else if COVER_LETTER_KEYWORDS.iter().any(|k| lower.contains(k))
        || lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == COVER_LETTER_ABBREVIATION)
    {
        Some(DocumentKind::CoverLetter)
    } else {
        None
    }
}

/// Splits `filename` into applicant name and kind. Returns `None` for
/// disallowed extensions, names without a separator, an empty name part,
/// or an unrecognized kind.
pub fn parse_filename(filename: &str) -> Option<ParsedName> {
    let extension = allowed_extension(filename)?;
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let (applicant, remainder) = stem.split_once(NAME_SEPARATOR)?;
    if applicant.is_empty() {
        return None;
    }
    let kind = classify(remainder)?;

    Some(ParsedName {
        applicant: applicant.to_string(),
        kind,
        extension,
    })
}
