//! Test Utilities Module
//!
//! In-memory slide decoder and temporary directory fixtures for unit tests.
//! This module is only compiled when running tests.

#![cfg(test)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::config::Config;
use crate::server::Dispatcher;
use crate::slide::{LevelDimensions, PixelRegion, SlideDecoder, SlideError, SlideHandle};

// ============================================================================
// Fake decoder
// ============================================================================

/// A slide served by `FakeDecoder`
#[derive(Debug, Clone)]
pub struct FakeSlide {
    pub vendor: Option<String>,
    pub levels: Vec<LevelDimensions>,
    pub fail_reads: bool,
    /// Every read waits here before producing pixels
    pub read_gate: Option<Arc<Barrier>>,
}

impl FakeSlide {
    /// A three level pyramid, each level a quarter of the previous one
    pub fn three_levels() -> Self {
        Self {
            vendor: Some("fake".to_string()),
            levels: vec![
                LevelDimensions {
                    width: 40000,
                    height: 30000,
                },
                LevelDimensions {
                    width: 10000,
                    height: 7500,
                },
                LevelDimensions {
                    width: 2500,
                    height: 1875,
                },
            ],
            fail_reads: false,
            read_gate: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    reads: AtomicUsize,
    live: AtomicUsize,
}

/// Decoder over registered in-memory slides.
///
/// Pixels are a deterministic function of position and level, so repeated
/// reads of a region return identical buffers.
#[derive(Debug, Default)]
pub struct FakeDecoder {
    slides: HashMap<PathBuf, FakeSlide>,
    counters: Arc<Counters>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slide(mut self, path: impl AsRef<Path>, slide: FakeSlide) -> Self {
        self.slides.insert(path.as_ref().to_path_buf(), slide);
        self
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Number of `read_region` calls
    pub fn read_count(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet dropped
    pub fn live_handles(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }
}

impl SlideDecoder for FakeDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError> {
        let slide = self
            .slides
            .get(path)
            .cloned()
            .ok_or_else(|| SlideError::Unreadable {
                path: path.to_path_buf(),
                reason: "no such slide".to_string(),
            })?;

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            slide,
            counters: self.counters.clone(),
        }))
    }
}

struct FakeHandle {
    slide: FakeSlide,
    counters: Arc<Counters>,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SlideHandle for FakeHandle {
    fn vendor(&self) -> Option<String> {
        self.slide.vendor.clone()
    }

    fn level_count(&self) -> Result<u32, SlideError> {
        Ok(self.slide.levels.len() as u32)
    }

    fn level_dimensions(&self, level: u32) -> Result<LevelDimensions, SlideError> {
        self.slide
            .levels
            .get(level as usize)
            .copied()
            .ok_or(SlideError::InvalidLevel(level))
    }

    fn read_region(&self, region: &PixelRegion) -> Result<Vec<u8>, SlideError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.slide.read_gate {
            gate.wait();
        }

        if self.slide.fail_reads {
            return Err(SlideError::RegionRead {
                level: region.level,
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                reason: "injected failure".to_string(),
            });
        }
        if region.level as usize >= self.slide.levels.len() {
            return Err(SlideError::InvalidLevel(region.level));
        }

        let mut pixels = Vec::with_capacity(region.buffer_len());
        for row in 0..region.height as i64 {
            for col in 0..region.width as i64 {
                pixels.extend_from_slice(&[
                    (region.x + col) as u8,
                    (region.y + row) as u8,
                    (region.level * 40) as u8,
                    255 - ((col + row) % 64) as u8,
                ]);
            }
        }
        Ok(pixels)
    }
}

// ============================================================================
// Directory fixture
// ============================================================================

/// Temporary slide root and cache directory wired to a `FakeDecoder`
pub struct TestFixture {
    dir: TempDir,
    pub decoder: Arc<FakeDecoder>,
}

impl TestFixture {
    /// Empty slide root and cache directory
    pub fn new() -> Self {
        Self::build(FakeDecoder::new(), |_| {})
    }

    /// Fixture holding a single slide at `<location>/<case_id>/<name>`
    pub fn with_slide(case_id: &str, name: &str, slide: FakeSlide) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let slide_path = dir.path().join("slides").join(case_id).join(name);
        let decoder = FakeDecoder::new().with_slide(&slide_path, slide);

        Self::build_in(dir, decoder, |_| {
            std::fs::create_dir_all(slide_path.parent().unwrap()).unwrap();
            std::fs::write(&slide_path, b"fake slide").unwrap();
        })
    }

    fn build(decoder: FakeDecoder, setup: impl FnOnce(&Path)) -> Self {
        Self::build_in(tempfile::tempdir().unwrap(), decoder, setup)
    }

    fn build_in(dir: TempDir, decoder: FakeDecoder, setup: impl FnOnce(&Path)) -> Self {
        std::fs::create_dir_all(dir.path().join("slides")).unwrap();
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        setup(dir.path());
        Self {
            dir,
            decoder: Arc::new(decoder),
        }
    }

    pub fn root(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn config(&self) -> Config {
        Config {
            location: self.dir.path().join("slides"),
            cache: format!("{}/cache/", self.root()),
            prefixes: vec![],
            ..Config::default()
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::new(self.config()), self.decoder.clone())
    }

    pub fn cache_file(&self, file_name: &str) -> PathBuf {
        self.dir.path().join("cache").join(file_name)
    }

    pub fn cache_entries(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("cache"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
