//! Screen capture.
//!
//! Detection and recording read pixels through the [`ScreenCapture`] trait;
//! the GDI implementation is the production source on Windows, tests supply
//! their own.

use image::RgbaImage;
use thiserror::Error;

use crate::scenario::model::Region;

/// Errors surfaced by a capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture region ({0:?}) is outside the screen bounds")]
    RegionOffScreen(Region),
    #[error("screen capture failed: {0}")]
    Platform(String),
}

/// Source of screen pixels.
pub trait ScreenCapture {
    /// Captures the given screen region into an RGBA buffer.
    fn capture(&self, region: Region) -> Result<RgbaImage, CaptureError>;

    /// Primary screen dimensions in pixels.
    fn screen_size(&self) -> (i32, i32);
}

#[cfg(target_os = "windows")]
pub mod gdi;
#[cfg(target_os = "windows")]
pub use gdi::GdiCapture;
