//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
};
use slidetile_server::config::Config;
use slidetile_server::server::{AppState, Dispatcher, UnboundedPool, router};
use slidetile_server::slide::{
    LevelDimensions, PixelRegion, SlideDecoder, SlideError, SlideHandle,
};
use tempfile::TempDir;
use tower::util::ServiceExt;
use tower_http::cors::{Any, CorsLayer};

/// Mock decoder serving registered slides with a solid colour per level
pub struct MockDecoder {
    slides: HashMap<PathBuf, Vec<LevelDimensions>>,
    reads: Arc<AtomicUsize>,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self {
            slides: HashMap::new(),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn register(&mut self, path: PathBuf, levels: Vec<LevelDimensions>) {
        self.slides.insert(path, levels);
    }

    /// Number of region reads performed so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SlideDecoder for MockDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError> {
        let levels = self
            .slides
            .get(path)
            .cloned()
            .ok_or_else(|| SlideError::Unreadable {
                path: path.to_path_buf(),
                reason: "not registered".to_string(),
            })?;
        Ok(Box::new(MockHandle {
            levels,
            reads: self.reads.clone(),
        }))
    }
}

struct MockHandle {
    levels: Vec<LevelDimensions>,
    reads: Arc<AtomicUsize>,
}

impl SlideHandle for MockHandle {
    fn vendor(&self) -> Option<String> {
        Some("mock".to_string())
    }

    fn level_count(&self) -> Result<u32, SlideError> {
        Ok(self.levels.len() as u32)
    }

    fn level_dimensions(&self, level: u32) -> Result<LevelDimensions, SlideError> {
        self.levels
            .get(level as usize)
            .copied()
            .ok_or(SlideError::InvalidLevel(level))
    }

    fn read_region(&self, region: &PixelRegion) -> Result<Vec<u8>, SlideError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if region.level as usize >= self.levels.len() {
            return Err(SlideError::InvalidLevel(region.level));
        }
        // Opaque BGRA, blue channel encodes the level
        let pixel = [(region.level * 60) as u8, 120, 200, 255];
        Ok(pixel.repeat(region.width as usize * region.height as usize))
    }
}

/// Standard three level pyramid
pub fn test_levels() -> Vec<LevelDimensions> {
    vec![
        LevelDimensions {
            width: 46000,
            height: 32914,
        },
        LevelDimensions {
            width: 11500,
            height: 8228,
        },
        LevelDimensions {
            width: 2875,
            height: 2057,
        },
    ]
}

/// A running application over temporary slide and cache directories
pub struct TestApp {
    pub dir: TempDir,
    pub router: Router,
    pub decoder: Arc<MockDecoder>,
}

/// Response parts collected by `TestApp::get`
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestApp {
    /// Build an app with `slides` (`(caseID, name)` pairs) present on disk
    pub fn with_slides(slides: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("slides");
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&location).unwrap();
        std::fs::create_dir_all(&cache).unwrap();

        let mut decoder = MockDecoder::new();
        for (case_id, name) in slides {
            let path = location.join(case_id).join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"slide").unwrap();
            decoder.register(path, test_levels());
        }
        let decoder = Arc::new(decoder);

        let config = Config {
            location,
            cache: format!("{}/", cache.display()),
            prefixes: vec!["http://127.0.0.1:0/".to_string()],
            ..Config::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(config), decoder.clone()));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let router = router(AppState::new(dispatcher, Arc::new(UnboundedPool))).layer(cors);

        Self {
            dir,
            router,
            decoder,
        }
    }

    pub fn slides_dir(&self) -> PathBuf {
        self.dir.path().join("slides")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl TestResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}
