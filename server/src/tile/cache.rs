//! Persistent region cache
//!
//! Rendered tiles are written to files under a cache root and read back
//! verbatim on later requests for the same region. Key points:
//! - The file name is derived from every field that affects the rendered
//!   bytes, lowercased, with the format as extension
//! - No locking and no atomic rename: two racing misses both render and both
//!   write identical bytes
//! - Nothing is ever evicted; the cache only grows

use std::io::ErrorKind;
use std::path::PathBuf;

use metrics::counter;
use tracing::debug;

use super::request::RegionRequest;

/// File name of a cached region, relative to the cache root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `lower(name&x=..&y=..&w=..&h=..&level=..).lower(format)`
    pub fn for_request(request: &RegionRequest) -> Self {
        let stem = format!(
            "{}&x={}&y={}&w={}&h={}&level={}",
            request.name, request.x, request.y, request.width, request.height, request.level
        );
        Self(format!(
            "{}.{}",
            stem.to_lowercase(),
            request.format.as_str().to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// File-backed region cache rooted at a path prefix
///
/// The root is a plain string prefix: entry paths are `root + key` with no
/// separator inserted, so the configured root normally ends with `/`.
#[derive(Debug, Clone)]
pub struct RegionCache {
    root: String,
}

impl RegionCache {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Location of the entry for a key
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        PathBuf::from(format!("{}{}", self.root, key.as_str()))
    }

    /// Read a cached entry if one exists
    pub fn lookup(&self, key: &CacheKey) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => {
                counter!("slidetile_cache_hits_total").increment(1);
                debug!("Cache hit: {:?} ({} bytes)", path, bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                counter!("slidetile_cache_misses_total").increment(1);
                debug!("Cache miss: {:?}", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create or overwrite the entry for a key
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.entry_path(key);
        std::fs::write(&path, bytes)?;
        counter!("slidetile_cache_bytes_written_total").increment(bytes.len() as u64);
        debug!("Cached {} bytes at {:?}", bytes.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::request::OutputFormat;

    fn request() -> RegionRequest {
        RegionRequest {
            case_id: "case1".to_string(),
            name: "SlideA.svs".to_string(),
            level: 0,
            x: 100,
            y: 200,
            width: 256,
            height: 256,
            format: OutputFormat::Png,
        }
    }

    #[test]
    fn test_cache_key_format() {
        let key = CacheKey::for_request(&request());
        assert_eq!(
            key.as_str(),
            "slidea.svs&x=100&y=200&w=256&h=256&level=0.png"
        );
    }

    #[test]
    fn test_cache_key_negative_origin() {
        let mut req = request();
        req.x = -64;
        let key = CacheKey::for_request(&req);
        assert!(key.as_str().contains("&x=-64&"));
    }

    #[test]
    fn test_cache_key_changes_with_every_field() {
        let base = CacheKey::for_request(&request());
        let variants: Vec<Box<dyn Fn(&mut RegionRequest)>> = vec![
            Box::new(|r: &mut RegionRequest| r.x += 1),
            Box::new(|r: &mut RegionRequest| r.y += 1),
            Box::new(|r: &mut RegionRequest| r.width += 1),
            Box::new(|r: &mut RegionRequest| r.height += 1),
            Box::new(|r: &mut RegionRequest| r.level += 1),
            Box::new(|r: &mut RegionRequest| r.format = OutputFormat::Jpeg),
            Box::new(|r: &mut RegionRequest| r.format = OutputFormat::Raw),
            Box::new(|r: &mut RegionRequest| r.name = "SlideB.svs".to_string()),
        ];

        for mutate in variants {
            let mut req = request();
            mutate(&mut req);
            assert_ne!(CacheKey::for_request(&req), base, "{:?}", req);
        }
    }

    #[test]
    fn test_cache_key_ignores_case_and_case_id() {
        let base = CacheKey::for_request(&request());

        let mut req = request();
        req.name = "SLIDEA.SVS".to_string();
        assert_eq!(CacheKey::for_request(&req), base);

        let mut req = request();
        req.format = OutputFormat::Unrecognized("png".to_string());
        assert_eq!(CacheKey::for_request(&req), base);

        let mut req = request();
        req.case_id = "other-case".to_string();
        assert_eq!(CacheKey::for_request(&req), base);
    }

    #[test]
    fn test_entry_path_concatenates_root() {
        let cache = RegionCache::new("/var/cache/tiles/");
        let key = CacheKey::for_request(&request());
        assert_eq!(
            cache.entry_path(&key),
            PathBuf::from("/var/cache/tiles/slidea.svs&x=100&y=200&w=256&h=256&level=0.png")
        );
    }

    #[test]
    fn test_lookup_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(format!("{}/", dir.path().display()));
        let key = CacheKey::for_request(&request());

        assert!(cache.lookup(&key).unwrap().is_none());

        cache.store(&key, &[1, 2, 3]).unwrap();
        assert_eq!(cache.lookup(&key).unwrap(), Some(vec![1, 2, 3]));

        cache.store(&key, &[4, 5]).unwrap();
        assert_eq!(cache.lookup(&key).unwrap(), Some(vec![4, 5]));
    }

    #[test]
    fn test_lookup_returns_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(format!("{}/", dir.path().display()));
        let key = CacheKey::for_request(&request());

        std::fs::write(cache.entry_path(&key), b"not really a png").unwrap();
        assert_eq!(
            cache.lookup(&key).unwrap().as_deref(),
            Some(&b"not really a png"[..])
        );
    }

    #[test]
    fn test_store_into_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionCache::new(format!("{}/missing/", dir.path().display()));
        let key = CacheKey::for_request(&request());
        assert!(cache.store(&key, &[0]).is_err());
    }
}
