//! Region renderer: decode a region from a slide and encode it

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::debug;

use crate::slide::{SlideDecoder, SlideError};

use super::encoder::{EncodeError, FormatEncoder};
use super::request::RegionRequest;

/// Reasons a region could not be rendered
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Slide unreadable: {0}")]
    SlideUnreadable(#[source] SlideError),

    #[error("Region read failed: {0}")]
    RegionRead(#[source] SlideError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Renders cache misses.
///
/// A slide is opened for each render and closed as soon as its pixels have
/// been read; handles are never reused across renders.
pub struct RegionRenderer {
    decoder: Arc<dyn SlideDecoder>,
    encoder: FormatEncoder,
}

impl RegionRenderer {
    pub fn new(decoder: Arc<dyn SlideDecoder>, encoder: FormatEncoder) -> Self {
        Self { decoder, encoder }
    }

    /// Produce the encoded bytes for a region of the slide at `slide_path`
    pub fn render(&self, slide_path: &Path, request: &RegionRequest) -> Result<Vec<u8>, RenderError> {
        let start = Instant::now();
        let result = self.render_inner(slide_path, request);

        histogram!("slidetile_render_duration_seconds").record(start.elapsed());
        counter!("slidetile_renders_total").increment(1);
        if result.is_err() {
            counter!("slidetile_render_errors_total").increment(1);
        }
        result
    }

    fn render_inner(
        &self,
        slide_path: &Path,
        request: &RegionRequest,
    ) -> Result<Vec<u8>, RenderError> {
        let region = request.pixel_region();

        let read_start = Instant::now();
        let pixels = {
            let slide = self
                .decoder
                .open(slide_path)
                .map_err(RenderError::SlideUnreadable)?;
            slide.read_region(&region).map_err(RenderError::RegionRead)?
        };
        histogram!("slidetile_render_phase_duration_seconds", "phase" => "read")
            .record(read_start.elapsed());

        let encode_start = Instant::now();
        let bytes = self.encoder.encode(
            request.format.encoding(),
            pixels,
            region.width,
            region.height,
        )?;
        histogram!("slidetile_render_phase_duration_seconds", "phase" => "encode")
            .record(encode_start.elapsed());

        debug!(
            "Rendered {:?} level={} ({},{}) {}x{} as {}: {} bytes",
            slide_path,
            region.level,
            region.x,
            region.y,
            region.width,
            region.height,
            request.format,
            bytes.len()
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeDecoder, FakeSlide};
    use crate::tile::request::OutputFormat;

    fn request(format: OutputFormat, width: u32, height: u32) -> RegionRequest {
        RegionRequest {
            case_id: "case1".to_string(),
            name: "slideA.svs".to_string(),
            level: 0,
            x: 100,
            y: 200,
            width,
            height,
            format,
        }
    }

    fn renderer_with_slide(path: &Path) -> (Arc<FakeDecoder>, RegionRenderer) {
        let decoder = Arc::new(FakeDecoder::new().with_slide(path, FakeSlide::three_levels()));
        let renderer = RegionRenderer::new(decoder.clone(), FormatEncoder::default());
        (decoder, renderer)
    }

    #[test]
    fn test_render_png() {
        let path = Path::new("/slides/case1/slideA.svs");
        let (decoder, renderer) = renderer_with_slide(path);

        let bytes = renderer
            .render(path, &request(OutputFormat::Png, 32, 16))
            .unwrap();

        assert_eq!(&bytes[..4], b"\x89PNG");
        assert_eq!(decoder.open_count(), 1);
        assert_eq!(decoder.read_count(), 1);
        assert_eq!(decoder.live_handles(), 0);
    }

    #[test]
    fn test_render_is_pure() {
        let path = Path::new("/slides/case1/slideA.svs");
        let (_, renderer) = renderer_with_slide(path);
        let req = request(OutputFormat::Jpeg, 40, 40);

        let first = renderer.render(path, &req).unwrap();
        let second = renderer.render(path, &req).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_raw_length() {
        let path = Path::new("/slides/case1/slideA.svs");
        let (_, renderer) = renderer_with_slide(path);

        let bytes = renderer
            .render(path, &request(OutputFormat::Raw, 33, 7))
            .unwrap();
        assert_eq!(bytes.len(), 33 * 7 * 4);
    }

    #[test]
    fn test_unrecognized_format_renders_raw() {
        let path = Path::new("/slides/case1/slideA.svs");
        let (_, renderer) = renderer_with_slide(path);

        let raw = renderer
            .render(path, &request(OutputFormat::Raw, 8, 8))
            .unwrap();
        let other = renderer
            .render(
                path,
                &request(OutputFormat::Unrecognized("tiff".to_string()), 8, 8),
            )
            .unwrap();
        assert_eq!(raw, other);
    }

    #[test]
    fn test_missing_slide_is_unreadable() {
        let decoder = Arc::new(FakeDecoder::new());
        let renderer = RegionRenderer::new(decoder.clone(), FormatEncoder::default());

        let result = renderer.render(
            Path::new("/slides/case1/missing.svs"),
            &request(OutputFormat::Png, 8, 8),
        );
        assert!(matches!(result, Err(RenderError::SlideUnreadable(_))));
        assert_eq!(decoder.read_count(), 0);
    }

    #[test]
    fn test_read_failure_closes_handle() {
        let path = Path::new("/slides/case1/broken.svs");
        let slide = FakeSlide {
            fail_reads: true,
            ..FakeSlide::three_levels()
        };
        let decoder = Arc::new(FakeDecoder::new().with_slide(path, slide));
        let renderer = RegionRenderer::new(decoder.clone(), FormatEncoder::default());

        let result = renderer.render(path, &request(OutputFormat::Png, 8, 8));
        assert!(matches!(result, Err(RenderError::RegionRead(_))));
        assert_eq!(decoder.live_handles(), 0);
    }
}
