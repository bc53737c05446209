//! Per-frame recognition: camera frame in, one match result per face out.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::encoding_store::EncodingStore;
use crate::matcher::{DistanceMatcher, MatchError, Matcher};
use crate::types::MatchResult;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

/// Default downscale applied before detection.
pub const DEFAULT_DOWNSCALE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} BGR")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("{0}")]
    Match(#[from] MatchError),
}

/// Packed 8-bit BGR frame, the layout camera capture hands over.
#[derive(Debug, Clone)]
pub struct BgrImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BgrImage {
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RecognizeError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected || expected == 0 {
            return Err(RecognizeError::InvalidFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Resize by `factor`, then reorder channels to RGB.
    fn downscale_to_rgb(&self, factor: f32) -> Result<RgbImage, RecognizeError> {
        // Channel order is ignored by the resampler, so resize on the raw
        // BGR buffer and swap afterwards.
        let view: ImageBuffer<Rgb<u8>, &[u8]> = ImageBuffer::from_raw(self.width, self.height, &self.data[..])
            .ok_or(RecognizeError::InvalidFrame {
                width: self.width,
                height: self.height,
                expected: self.width as usize * self.height as usize * 3,
                actual: self.data.len(),
            })?;

        let w = ((self.width as f32 * factor).round() as u32).max(1);
        let h = ((self.height as f32 * factor).round() as u32).max(1);
        let mut small = imageops::resize(&view, w, h, FilterType::Triangle);

        for pixel in small.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        Ok(small)
    }
}

/// Runs detection, embedding and matching on one frame at a time.
///
/// Holds no state between frames: the same student yields a fresh result
/// on every call.
pub struct FrameRecognizer<A, M = DistanceMatcher> {
    analyzer: A,
    matcher: M,
    downscale: f32,
}

impl<A: FaceAnalyzer, M: Matcher> FrameRecognizer<A, M> {
    /// `downscale` outside (0, 1] falls back to [`DEFAULT_DOWNSCALE`].
    pub fn new(analyzer: A, matcher: M, downscale: f32) -> Self {
        let downscale = if downscale > 0.0 && downscale <= 1.0 {
            downscale
        } else {
            tracing::warn!(downscale, "invalid downscale factor, using {DEFAULT_DOWNSCALE}");
            DEFAULT_DOWNSCALE
        };
        Self {
            analyzer,
            matcher,
            downscale,
        }
    }

    pub fn downscale(&self) -> f32 {
        self.downscale
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Match every face in `frame` against `store`.
    ///
    /// Regions in the result are in full-resolution frame coordinates.
    pub fn recognize(&mut self, frame: &BgrImage, store: &EncodingStore) -> Result<Vec<MatchResult>, RecognizeError> {
        let small = frame.downscale_to_rgb(self.downscale)?;
        let faces = self.analyzer.detect(&small)?;
        let upscale = 1.0 / self.downscale;

        let mut results = Vec::with_capacity(faces.len());
        for face in &faces {
            let embedding = self.analyzer.embed(&small, face)?;
            let m = self.matcher.best_match(&embedding, store)?;
            tracing::trace!(
                student_id = %m.student_id,
                distance = m.distance,
                accepted = m.accepted,
                "face matched"
            );
            results.push(MatchResult {
                region: face.scaled(upscale),
                student_id: Some(m.student_id),
                distance: m.distance,
                accepted: m.accepted,
            });
        }
        Ok(results)
    }
}
