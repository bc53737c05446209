//! Nearest-neighbour matching of a probe embedding against the encoding store.

use crate::encoding_store::EncodingStore;
use crate::types::Embedding;
use thiserror::Error;

/// Default acceptance distance for L2-normalised ArcFace embeddings.
///
/// Euclidean 1.10 corresponds to a cosine similarity of about 0.395.
pub const DEFAULT_TOLERANCE: f32 = 1.10;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("encoding store is empty; run `rollcall encode` before starting recognition")]
    EmptyStore,
    #[error("embedding dimension mismatch: probe has {probe}, store entry {student_id} has {entry}")]
    DimensionMismatch {
        student_id: String,
        probe: usize,
        entry: usize,
    },
}

/// Best entry for one probe.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub student_id: String,
    pub distance: f32,
    /// Whether `distance` is within the matcher's tolerance.
    pub accepted: bool,
}

/// Strategy for comparing a probe embedding against the known faces.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, store: &EncodingStore) -> Result<FaceMatch, MatchError>;
}

/// Euclidean arg-min matcher.
///
/// Always visits every entry. The nearest entry is accepted only when its
/// distance is `<= tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl DistanceMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

impl Matcher for DistanceMatcher {
    fn best_match(&self, probe: &Embedding, store: &EncodingStore) -> Result<FaceMatch, MatchError> {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in store.entries.iter().enumerate() {
            if entry.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    student_id: entry.student_id.clone(),
                    probe: probe.dim(),
                    entry: entry.embedding.dim(),
                });
            }
            let dist = probe.distance(&entry.embedding);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        let (idx, distance) = best.ok_or(MatchError::EmptyStore)?;
        Ok(FaceMatch {
            student_id: store.entries[idx].student_id.clone(),
            distance,
            accepted: distance <= self.tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding_store::EncodingEntry;

    fn store(entries: &[(&str, Vec<f32>)]) -> EncodingStore {
        EncodingStore::from_entries(
            entries
                .iter()
                .map(|(id, v)| EncodingEntry {
                    student_id: id.to_string(),
                    embedding: Embedding::new(v.clone()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_known_vector_matches_itself() {
        let s = store(&[
            ("1001", vec![0.0, 1.0, 0.0]),
            ("1002", vec![1.0, 0.0, 0.0]),
            ("1003", vec![0.0, 0.0, 1.0]),
        ]);
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);

        let m = DistanceMatcher::default().best_match(&probe, &s).unwrap();
        assert!(m.accepted);
        assert_eq!(m.student_id, "1002");
        assert!(m.distance.abs() < 1e-6);
    }

    #[test]
    fn test_far_probe_is_rejected() {
        let s = store(&[("1001", vec![1.0, 0.0]), ("1002", vec![0.0, 1.0])]);
        let probe = Embedding::new(vec![-5.0, -5.0]);

        let m = DistanceMatcher::new(0.6).best_match(&probe, &s).unwrap();
        assert!(!m.accepted);
        assert!(m.distance > 0.6);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let s = store(&[("1001", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5, 0.0]);
        let m = DistanceMatcher::new(0.5).best_match(&probe, &s).unwrap();
        assert!(m.accepted);
    }

    #[test]
    fn test_picks_nearest_of_several() {
        let s = store(&[
            ("a", vec![0.9, 0.0]),
            ("b", vec![0.2, 0.0]),
            ("c", vec![0.5, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let m = DistanceMatcher::new(0.3).best_match(&probe, &s).unwrap();
        assert_eq!(m.student_id, "b");
        assert!((m.distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_empty_store_is_configuration_error() {
        let s = store(&[]);
        let probe = Embedding::new(vec![1.0]);
        assert_eq!(
            DistanceMatcher::default().best_match(&probe, &s),
            Err(MatchError::EmptyStore)
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let s = store(&[("1001", vec![1.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![1.0, 0.0]);
        let err = DistanceMatcher::default().best_match(&probe, &s).unwrap_err();
        assert!(matches!(err, MatchError::DimensionMismatch { probe: 2, entry: 3, .. }));
    }
}
