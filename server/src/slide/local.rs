//! Local slide decoder using OpenSlide

use std::path::Path;
use std::time::Instant;

use image::RgbaImage;
use metrics::histogram;
use openslide_rs::{Address, OpenSlide, Region, Size};
use tracing::debug;

use super::decoder::{SlideDecoder, SlideHandle};
use super::types::{LevelDimensions, PixelRegion, SlideError};

/// Slide decoder backed by OpenSlide
///
/// Every call to [`SlideDecoder::open`] opens a fresh native handle; nothing
/// is pooled between requests.
#[derive(Debug, Clone, Default)]
pub struct OpenSlideDecoder;

impl OpenSlideDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SlideDecoder for OpenSlideDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError> {
        let open_start = Instant::now();
        let slide = OpenSlide::new(path).map_err(|e| SlideError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        histogram!("slidetile_slide_open_duration_seconds").record(open_start.elapsed());

        debug!("Opened slide {:?}", path);
        Ok(Box::new(OpenSlideHandle { slide }))
    }
}

/// Open OpenSlide handle; the native handle is closed on drop
struct OpenSlideHandle {
    slide: OpenSlide,
}

impl SlideHandle for OpenSlideHandle {
    fn vendor(&self) -> Option<String> {
        self.slide.get_property_value("openslide.vendor").ok()
    }

    fn level_count(&self) -> Result<u32, SlideError> {
        self.slide
            .get_level_count()
            .map_err(|e| SlideError::Decoder(e.to_string()))
    }

    fn level_dimensions(&self, level: u32) -> Result<LevelDimensions, SlideError> {
        let size = self
            .slide
            .get_level_dimensions(level)
            .map_err(|_| SlideError::InvalidLevel(level))?;
        Ok(LevelDimensions {
            width: size.w as u64,
            height: size.h as u64,
        })
    }

    fn read_region(&self, region: &PixelRegion) -> Result<Vec<u8>, SlideError> {
        if region.width == 0 || region.height == 0 {
            return Ok(Vec::new());
        }

        let mut pixels = vec![0u8; region.buffer_len()];
        let downsample = self.downsample(region.level)?;
        let Some(window) = addressable_window(region, downsample) else {
            debug!("Region {:?} lies outside the addressable area", region);
            return Ok(pixels);
        };

        let rgba: RgbaImage = self
            .slide
            .read_image_rgba(&window.source)
            .map_err(|e| region_error(region, e.to_string()))?;

        let mut source = rgba.into_raw();
        let expected = window.source.size.w as usize * window.source.size.h as usize * 4;
        if source.len() != expected {
            return Err(region_error(
                region,
                format!("decoder returned {} bytes, expected {}", source.len(), expected),
            ));
        }

        swap_red_blue(&mut source);
        copy_window(&mut pixels, region.width, &source, &window);
        Ok(pixels)
    }
}

impl OpenSlideHandle {
    /// Level-0 pixels covered by one pixel of `level`
    fn downsample(&self, level: u32) -> Result<f64, SlideError> {
        if level == 0 {
            return Ok(1.0);
        }
        let base = self.level_dimensions(0)?;
        let dims = self.level_dimensions(level)?;
        if dims.width == 0 || dims.height == 0 {
            return Err(SlideError::InvalidLevel(level));
        }
        let ratio_w = base.width as f64 / dims.width as f64;
        let ratio_h = base.height as f64 / dims.height as f64;
        Ok((ratio_w + ratio_h) / 2.0)
    }
}

/// Part of a requested region that OpenSlide can address
#[derive(Debug, Clone, PartialEq, Eq)]
struct Window {
    source: Region,
    /// Output column where the window starts
    dst_x: u32,
    /// Output row where the window starts
    dst_y: u32,
}

/// Clip a region to OpenSlide's unsigned 32-bit address space.
///
/// Origins are level-0 coordinates and sizes are pixels of the region's level,
/// so one output pixel spans `downsample` level-0 pixels. Output pixels outside
/// the address space stay transparent. Returns `None` when none is addressable.
fn addressable_window(region: &PixelRegion, downsample: f64) -> Option<Window> {
    let (x, dst_x, w) = axis_window(region.x, region.width, downsample)?;
    let (y, dst_y, h) = axis_window(region.y, region.height, downsample)?;
    Some(Window {
        source: Region {
            address: Address { x, y },
            level: region.level,
            size: Size { w, h },
        },
        dst_x,
        dst_y,
    })
}

/// Clip one axis to `(origin, skipped output pixels, kept output pixels)`
fn axis_window(origin: i64, size: u32, downsample: f64) -> Option<(u32, u32, u32)> {
    let limit = u32::MAX as f64;
    let origin_f = origin as f64;

    let skip = if origin < 0 {
        ((-origin_f) / downsample).ceil().min(size as f64) as u32
    } else {
        0
    };
    let start = (origin_f + skip as f64 * downsample).max(0.0).floor();
    if skip >= size || start > limit {
        return None;
    }

    let addressable = ((limit - start) / downsample).floor() + 1.0;
    let count = addressable.min((size - skip) as f64) as u32;
    if count == 0 {
        return None;
    }
    Some((start as u32, skip, count))
}

/// Copy a packed window into a packed buffer `dst_width` pixels wide
fn copy_window(dst: &mut [u8], dst_width: u32, src: &[u8], window: &Window) {
    let row_len = window.source.size.w as usize * 4;
    let dst_stride = dst_width as usize * 4;
    let dst_col = window.dst_x as usize * 4;

    for (row, src_row) in src.chunks_exact(row_len).enumerate() {
        let offset = (window.dst_y as usize + row) * dst_stride + dst_col;
        dst[offset..offset + row_len].copy_from_slice(src_row);
    }
}

fn region_error(region: &PixelRegion, reason: String) -> SlideError {
    SlideError::RegionRead {
        level: region.level,
        x: region.x,
        y: region.y,
        width: region.width,
        height: region.height,
        reason,
    }
}

/// Reorder RGBA pixels to BGRA (and back) in place
pub(crate) fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}
