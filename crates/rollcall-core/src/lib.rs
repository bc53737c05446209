//! rollcall-core: Face recognition engine for attendance.
//!
//! Detects faces with SCRFD and computes ArcFace embeddings through ONNX
//! Runtime, matches them against a precomputed encoding store, and turns a
//! camera frame into per-face match results.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod encoding_store;
pub mod frame_recognizer;
pub mod matcher;
pub mod recognizer;
pub mod settings;
pub mod types;

pub use analyzer::{FaceAnalyzer, OnnxFaceAnalyzer};
pub use encoding_store::{BuildReport, EncodingEntry, EncodingStore};
pub use frame_recognizer::{BgrImage, FrameRecognizer};
pub use matcher::{DistanceMatcher, FaceMatch, MatchError, Matcher};
pub use settings::Settings;
pub use types::{Embedding, FaceRegion, MatchResult};

use std::path::PathBuf;

/// Default location of the ONNX model files.
///
/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// Per-user data directory for the database and encoding blob.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
