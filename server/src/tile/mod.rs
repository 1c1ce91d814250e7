//! Region tile pipeline
//!
//! - `RegionRequest` parsing and validation
//! - `RegionCache`, the file-backed store of rendered regions
//! - `RegionRenderer`, which decodes a region and hands it to the `FormatEncoder`

pub mod cache;
pub mod encoder;
pub mod renderer;
pub mod request;

pub use cache::{CacheKey, RegionCache};
pub use encoder::{DEFAULT_JPEG_QUALITY, EncodeError, Encoding, FormatEncoder};
pub use renderer::{RegionRenderer, RenderError};
pub use request::{MAX_REGION_DIMENSION, OutputFormat, RegionRequest, RequestError};
