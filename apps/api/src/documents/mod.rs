//! DocumentStore — raw applicant files on disk, grouped into records by
//! filename convention (see `naming`).
//!
//! The store reads every matching file into memory on `list_records`; batch
//! size is bounded by whoever fills the store, not here.

pub mod extract;
pub mod naming;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::ApplicantRecord;

use self::extract::extract_text;
use self::naming::{parse_filename, DocumentKind};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DocumentError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| DocumentError::Io { path, source }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

/// Text and origin path of one extracted file.
type Extracted = (String, PathBuf);

#[derive(Default)]
struct Grouped {
    cv: Option<Extracted>,
    cover_letter: Option<Extracted>,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` under the store root and returns the stored path.
    /// Directory components in `name` are dropped; an existing file with the
    /// same name is overwritten.
    pub async fn save(&self, name: &str, content: &[u8]) -> Result<PathBuf, DocumentError> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| DocumentError::InvalidName(name.to_string()))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(DocumentError::io(&self.root))?;

        let path = self.root.join(file_name);
        tokio::fs::write(&path, content)
            .await
            .map_err(DocumentError::io(&path))?;

        debug!(path = %path.display(), bytes = content.len(), "saved document");
        Ok(path)
    }

    /// One record per applicant name that has a readable, non-empty CV,
    /// ordered by name. A missing store directory yields no records.
    ///
    /// Files with unknown names or extensions are skipped silently; files whose
    /// text cannot be extracted are skipped with a warning.
    pub async fn list_records(&self) -> Result<Vec<ApplicantRecord>, DocumentError> {
        let mut file_names = match self.file_names().await {
            Ok(names) => names,
            Err(DocumentError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };
        // Deterministic "last file of a kind wins"
        file_names.sort();

        let mut grouped: BTreeMap<String, Grouped> = BTreeMap::new();

        for file_name in file_names {
            let Some(parsed) = parse_filename(&file_name) else {
                debug!(file = %file_name, "skipping file outside naming convention");
                continue;
            };

            let path = self.root.join(&file_name);
            let bytes = tokio::fs::read(&path).await.map_err(DocumentError::io(&path))?;

            let extension = parsed.extension.clone();
            let text = match tokio::task::spawn_blocking(move || extract_text(&extension, &bytes)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(file = %file_name, error = %e, "skipping unreadable document");
                    continue;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "document extraction task failed");
                    continue;
                }
            };

            let entry = grouped.entry(parsed.applicant).or_default();
            match parsed.kind {
                DocumentKind::Cv => entry.cv = Some((text, path)),
                DocumentKind::CoverLetter => entry.cover_letter = Some((text, path)),
            }
        }

        let records: Vec<ApplicantRecord> = grouped
            .into_iter()
            .filter_map(|(name, group)| {
                let Some((cv_text, cv_path)) = group.cv.filter(|(t, _)| !t.trim().is_empty()) else {
                    if group.cover_letter.is_some() {
                        debug!(applicant = %name, "dropping applicant with cover letter but no CV");
                    }
                    return None;
                };
                let (cover_letter_text, cover_letter_path) = match group.cover_letter {
                    Some((text, path)) => (Some(text), Some(path)),
                    None => (None, None),
                };
                Some(ApplicantRecord {
                    name,
                    cv_text,
                    cv_path,
                    cover_letter_text,
                    cover_letter_path,
                })
            })
            .collect();

        info!(root = %self.root.display(), records = records.len(), "loaded applicant records");
        Ok(records)
    }

    /// Empties the store. Either the directory ends up empty or the error is
    /// returned.
    pub async fn clear(&self) -> Result<(), DocumentError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DocumentError::io(&self.root)(e)),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(DocumentError::io(&self.root))?;

        info!(root = %self.root.display(), "cleared document store");
        Ok(())
    }

    async fn file_names(&self) -> Result<Vec<String>, DocumentError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(DocumentError::io(&self.root))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(DocumentError::io(&self.root))? {
            let file_type = entry.file_type().await.map_err(DocumentError::io(entry.path()))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
