//! Frame type and pixel conversion to packed BGR24.

/// A captured colour frame, packed BGR24 (3 bytes per pixel, row-major).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Average luma (0.0–255.0), BT.601 weights.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.len() < 3 {
            return 0.0;
        }
        let pixels = self.data.len() / 3;
        let sum: f32 = self
            .data
            .chunks_exact(3)
            .map(|p| 0.114 * p[0] as f32 + 0.587 * p[1] as f32 + 0.299 * p[2] as f32)
            .sum();
        sum / pixels as f32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to BGR24 with BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    check_len(yuyv, pixels * 2)?;

    let mut bgr = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let c = 1.164 * (y as f32 - 16.0);
            bgr.push(clamp_u8(c + 2.018 * u));
            bgr.push(clamp_u8(c - 0.391 * u - 0.813 * v));
            bgr.push(clamp_u8(c + 1.596 * v));
        }
    }
    Ok(bgr)
}

/// Reorder packed RGB24 to BGR24.
pub fn rgb_to_bgr(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let len = (width * height) as usize * 3;
    check_len(rgb, len)?;
    Ok(rgb[..len]
        .chunks_exact(3)
        .flat_map(|p| [p[2], p[1], p[0]])
        .collect())
}

/// Copy a packed BGR24 buffer, trimming driver padding.
pub fn copy_bgr(bgr: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let len = (width * height) as usize * 3;
    check_len(bgr, len)?;
    Ok(bgr[..len].to_vec())
}
