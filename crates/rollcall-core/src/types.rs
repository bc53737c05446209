use serde::{Deserialize, Serialize};

/// A detected face in frame coordinates, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    /// Multiply every coordinate (box and landmarks) by `factor`.
    ///
    /// Used to map a region found on a downscaled frame back onto the
    /// full-resolution frame.
    pub fn scaled(&self, factor: f32) -> FaceRegion {
        FaceRegion {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }

    /// Integer (left, top, right, bottom) box for drawing overlays.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            (self.x + self.width).round() as i32,
            (self.y + self.height).round() as i32,
        )
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance. Smaller means more likely the same person.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of matching one detected face in one frame. Never persisted.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Face region in full-resolution frame coordinates.
    pub region: FaceRegion,
    /// Nearest student in the encoding store, whether or not accepted.
    pub student_id: Option<String>,
    /// Distance to the nearest store entry.
    pub distance: f32,
    pub accepted: bool,
}

impl MatchResult {
    /// Student id of an accepted match.
    pub fn accepted_id(&self) -> Option<&str> {
        if self.accepted {
            self.student_id.as_deref()
        } else {
            None
        }
    }
}
