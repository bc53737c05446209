//! rollcall-hw: Webcam capture for the recognition loop.
//!
//! Opens a V4L2 device, negotiates a colour format, and hands out packed
//! BGR24 frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
