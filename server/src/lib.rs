//! Slidetile Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod config;
pub mod server;
pub mod slide;
pub mod tile;

mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use server::{AppState, Dispatcher, router};
pub use slide::{OpenSlideDecoder, SlideDecoder};
