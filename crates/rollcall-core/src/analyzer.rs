//! The face capability consumed by the recognizer and the offline encoder.
//!
//! Everything downstream treats face detection and embedding as a black box
//! behind [`FaceAnalyzer`]; [`OnnxFaceAnalyzer`] is the production backend.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceRegion};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Locate faces in an RGB image and turn each into an embedding.
pub trait FaceAnalyzer {
    /// Detected faces, highest confidence first.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, AnalyzerError>;

    /// Embedding for one face returned by [`detect`](Self::detect) on the same image.
    fn embed(&mut self, image: &RgbImage, face: &FaceRegion) -> Result<Embedding, AnalyzerError>;

    /// Identifier of the embedding model, recorded in the encoding store.
    fn model_version(&self) -> Option<&str> {
        None
    }

    /// Length of every embedding this analyzer produces, when fixed.
    fn embedding_dim(&self) -> Option<usize> {
        None
    }
}

/// SCRFD + ArcFace through ONNX Runtime.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    /// Load both models from `model_dir`. Fails if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, AnalyzerError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, face: &FaceRegion) -> Result<Embedding, AnalyzerError> {
        Ok(self.recognizer.extract(image, face)?)
    }

    fn model_version(&self) -> Option<&str> {
        Some(crate::recognizer::ARCFACE_MODEL_VERSION)
    }

    fn embedding_dim(&self) -> Option<usize> {
        Some(crate::recognizer::ARCFACE_EMBEDDING_DIM)
    }
}
