//! SlideDecoder trait definition

use std::path::Path;

use super::types::{LevelDimensions, PixelRegion, SlideError};

/// Opens slide files (OpenSlide in production, fakes in tests)
pub trait SlideDecoder: Send + Sync {
    /// Open a slide. The returned handle is closed when dropped.
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError>;
}

/// An open slide, valid for the duration of a single request
pub trait SlideHandle {
    /// Scanner vendor, if the format reports one
    fn vendor(&self) -> Option<String>;

    /// Number of pyramid levels
    fn level_count(&self) -> Result<u32, SlideError>;

    /// Pixel dimensions of a level
    fn level_dimensions(&self, level: u32) -> Result<LevelDimensions, SlideError>;

    /// Read a region as packed 32-bit pixels.
    ///
    /// The buffer holds `width * height * 4` bytes, row-major with a stride of
    /// `width * 4`, each pixel stored as B, G, R, A (a little-endian ARGB word)
    /// with straight (non-premultiplied) alpha.
    fn read_region(&self, region: &PixelRegion) -> Result<Vec<u8>, SlideError>;
}
