//! Slide-related types and error definitions

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when working with slides
#[derive(Debug, Error)]
pub enum SlideError {
    #[error("Failed to open slide {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to read region at level {level} ({x},{y}) {width}x{height}: {reason}")]
    RegionRead {
        level: u32,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Invalid level: {0}")]
    InvalidLevel(u32),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Slide has no pyramid levels")]
    NoLevels,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Pixel dimensions of one pyramid level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDimensions {
    pub width: u64,
    pub height: u64,
}

/// A rectangular window to read from a slide
///
/// `x` and `y` are level-0 coordinates; `width` and `height` are the output
/// size in pixels of the given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    /// Byte length of a packed 32-bit buffer covering this region
    pub fn buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Pyramid metadata for a single slide file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideMetadata {
    /// File name of the slide (no directory components)
    pub name: String,
    /// Scanner vendor tag, empty when the decoder does not report one
    pub vendor: String,
    /// Dimensions indexed by level, level 0 first
    pub levels: Vec<LevelDimensions>,
    /// Calibration offset as raw JSON text (sidecar contents or `"0,0"`)
    pub offset: String,
}

impl SlideMetadata {
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
