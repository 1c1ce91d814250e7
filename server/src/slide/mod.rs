//! Slide access for the tile server
//!
//! This module provides:
//! - `SlideDecoder` / `SlideHandle` traits abstracting the pyramid decoder
//! - `OpenSlideDecoder` for reading slides locally with OpenSlide
//! - Slide metadata for the `details` command
//! - Case and file enumeration for the `cases` and `list` commands

pub mod catalog;
mod decoder;
mod local;
pub mod metadata;
mod types;

pub use decoder::{SlideDecoder, SlideHandle};
pub use local::OpenSlideDecoder;
pub(crate) use local::swap_red_blue;
pub use metadata::describe_slide;
pub use types::{LevelDimensions, PixelRegion, SlideError, SlideMetadata};
