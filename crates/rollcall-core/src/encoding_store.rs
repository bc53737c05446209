//! Precomputed face encodings of every known student.
//!
//! Built offline from a directory of labelled images (`<student_id>.<ext>`),
//! persisted as a single JSON blob, and loaded read-only at daemon startup.
//! The store is always replaced wholesale; it is never patched in place.

use crate::analyzer::FaceAnalyzer;
use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Blob layout version. Bumped on any incompatible change.
pub const FORMAT_VERSION: u32 = 1;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: malformed encoding blob: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported encoding blob format version {found} (expected {FORMAT_VERSION}); re-run `rollcall encode`")]
    UnsupportedVersion { found: u32 },
    #[error("encoding store is empty: no student could be encoded")]
    Empty,
    #[error("student {student_id} has a {found}-dim embedding, expected {expected}")]
    MixedDimensions {
        student_id: String,
        expected: usize,
        found: usize,
    },
    #[error("student id {0} appears more than once")]
    DuplicateId(String),
    #[error("encoding store was built with model {store}, but {loaded} is loaded; re-run `rollcall encode`")]
    ModelMismatch { store: String, loaded: String },
    #[error("encoding store holds {found}-dim embeddings, the loaded model produces {expected}; re-run `rollcall encode`")]
    DimensionMismatch { expected: usize, found: usize },
}

/// One known student's face embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingEntry {
    pub student_id: String,
    pub embedding: Embedding,
}

/// The full set of known faces, one entry per student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingStore {
    pub format_version: u32,
    #[serde(default)]
    pub model_version: Option<String>,
    pub entries: Vec<EncodingEntry>,
}

/// Why an image in the source directory did not produce an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoFace,
    Unreadable(String),
    DuplicateId,
    NonUtf8Name,
    Analyzer(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoFace => write!(f, "no face detected"),
            SkipReason::Unreadable(e) => write!(f, "unreadable image: {e}"),
            SkipReason::DuplicateId => write!(f, "student id already encoded from another file"),
            SkipReason::NonUtf8Name => write!(f, "file name is not valid UTF-8"),
            SkipReason::Analyzer(e) => write!(f, "face analysis failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Summary of an offline encoding run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub encoded: Vec<String>,
    pub skipped: Vec<SkippedImage>,
}

impl EncodingStore {
    /// Wrap already-computed entries without validating them.
    pub fn from_entries(entries: Vec<EncodingEntry>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_version: None,
            entries,
        }
    }

    /// Encode every image in `dir`.
    ///
    /// Files are visited in file-name order so that re-running on an
    /// unchanged directory yields the same id sequence. Images without a
    /// detectable face, or on which the analyzer fails, are skipped and
    /// reported; with several faces the most confident one is used.
    pub fn build_from_dir<A: FaceAnalyzer>(
        dir: &Path,
        analyzer: &mut A,
    ) -> Result<(Self, BuildReport), StoreError> {
        let mut report = BuildReport::default();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for path in list_images(dir)? {
            let skip = |reason: SkipReason| SkippedImage {
                path: path.clone(),
                reason,
            };

            let Some(student_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                tracing::warn!(path = %path.display(), "skipping image with non UTF-8 name");
                report.skipped.push(skip(SkipReason::NonUtf8Name));
                continue;
            };

            if seen.contains(&student_id) {
                tracing::warn!(path = %path.display(), student_id = %student_id, "duplicate student id, skipping");
                report.skipped.push(skip(SkipReason::DuplicateId));
                continue;
            }

            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot decode image, skipping");
                    report.skipped.push(skip(SkipReason::Unreadable(e.to_string())));
                    continue;
                }
            };

            let faces = match analyzer.detect(&image) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "face detection failed, skipping");
                    report.skipped.push(skip(SkipReason::Analyzer(e.to_string())));
                    continue;
                }
            };
            let Some(face) = faces.first() else {
                tracing::warn!(path = %path.display(), student_id = %student_id, "no face detected, skipping");
                report.skipped.push(skip(SkipReason::NoFace));
                continue;
            };
            if faces.len() > 1 {
                tracing::debug!(student_id = %student_id, faces = faces.len(), "multiple faces, using the most confident");
            }

            let embedding = match analyzer.embed(&image, face) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "face embedding failed, skipping");
                    report.skipped.push(skip(SkipReason::Analyzer(e.to_string())));
                    continue;
                }
            };
            tracing::info!(student_id = %student_id, confidence = face.confidence, "encoded");

            seen.insert(student_id.clone());
            report.encoded.push(student_id.clone());
            entries.push(EncodingEntry {
                student_id,
                embedding,
            });
        }

        let mut store = Self::from_entries(entries);
        store.model_version = analyzer.model_version().map(str::to_string);
        Ok((store, report))
    }

    /// Load and validate a blob written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let store: Self = serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        store.validate()?;

        tracing::info!(
            path = %path.display(),
            entries = store.len(),
            model = store.model_version.as_deref().unwrap_or("unknown"),
            sha256 = %format!("{:x}", Sha256::digest(&bytes)),
            "encoding store loaded"
        );
        Ok(store)
    }

    /// Write the blob atomically (temporary file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec(self).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        tracing::info!(path = %path.display(), entries = self.len(), "encoding store written");
        Ok(())
    }

    /// Check the invariants a loaded store must satisfy.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: self.format_version,
            });
        }

        let first = self.entries.first().ok_or(StoreError::Empty)?;
        let expected = first.embedding.dim();
        let mut ids = HashSet::new();

        for entry in &self.entries {
            if entry.embedding.dim() != expected {
                return Err(StoreError::MixedDimensions {
                    student_id: entry.student_id.clone(),
                    expected,
                    found: entry.embedding.dim(),
                });
            }
            if !ids.insert(entry.student_id.as_str()) {
                return Err(StoreError::DuplicateId(entry.student_id.clone()));
            }
        }
        Ok(())
    }

    /// Check that `analyzer` produces embeddings comparable with this store.
    ///
    /// The model versions are compared only when both sides name one.
    pub fn check_compatible<A: FaceAnalyzer>(&self, analyzer: &A) -> Result<(), StoreError> {
        if let (Some(store), Some(loaded)) = (self.model_version.as_deref(), analyzer.model_version()) {
            if store != loaded {
                return Err(StoreError::ModelMismatch {
                    store: store.to_string(),
                    loaded: loaded.to_string(),
                });
            }
        }

        if let (Some(first), Some(expected)) = (self.entries.first(), analyzer.embedding_dim()) {
            let found = first.embedding.dim();
            if found != expected {
                return Err(StoreError::DimensionMismatch { expected, found });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Regular files in `dir` with an image extension, sorted by file name.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image {
            paths.push(path);
        } else {
            tracing::debug!(path = %path.display(), "not an image, ignoring");
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}
