//! Server configuration
//!
//! Configuration is read once at startup from a JSON file (`config.json`, or
//! the path in `SLIDETILE_CONFIG`) and can be overridden by environment
//! variables. The resulting `Config` is immutable for the process lifetime.

use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::{Host, Url};

use crate::tile::DEFAULT_JPEG_QUALITY;

/// Environment variable holding the config file path
pub const CONFIG_PATH_VAR: &str = "SLIDETILE_CONFIG";

/// Config file used when `SLIDETILE_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid listener prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Unsupported listener scheme in {0:?} (only http is served)")]
    UnsupportedScheme(String),
}

/// Main server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Slide storage root; slides live at `<location>/<caseID>/<name>`
    pub location: PathBuf,
    /// Cache root, used as a plain prefix of every cache file path
    pub cache: String,
    /// Listener prefixes such as `http://+:8080/`
    pub prefixes: Vec<String>,
    /// JPEG quality for `format=JPG`
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Upper bound on concurrently running requests (unbounded when absent)
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// Address for the Prometheus exporter (disabled when absent)
    #[serde(default)]
    pub metrics_address: Option<SocketAddr>,
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: PathBuf::from("slides"),
            cache: "cache/".to_string(),
            prefixes: vec!["http://+:8080/".to_string()],
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_workers: None,
            metrics_address: None,
        }
    }
}

impl Config {
    /// Parse a JSON config document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Load the config file named by the environment, then apply overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply `SLIDETILE_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(location) = lookup("SLIDETILE_LOCATION")
            && !location.is_empty()
        {
            self.location = PathBuf::from(location);
        }
        if let Some(cache) = lookup("SLIDETILE_CACHE")
            && !cache.is_empty()
        {
            self.cache = cache;
        }
        if let Some(val) = lookup("SLIDETILE_JPEG_QUALITY")
            && let Ok(quality) = val.parse()
        {
            self.jpeg_quality = quality;
        }
        if let Some(val) = lookup("SLIDETILE_MAX_WORKERS")
            && let Ok(workers) = val.parse::<usize>()
        {
            self.max_workers = (workers > 0).then_some(workers);
        }
        if let Some(val) = lookup("SLIDETILE_METRICS_ADDR")
            && let Ok(addr) = val.parse()
        {
            self.metrics_address = Some(addr);
        }
    }

    /// Socket addresses to listen on, one or more per prefix, deduplicated
    pub fn listen_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let mut addrs: Vec<SocketAddr> = Vec::new();
        for prefix in &self.prefixes {
            for addr in parse_prefix(prefix)? {
                if !addrs.contains(&addr) {
                    addrs.push(addr);
                }
            }
        }
        Ok(addrs)
    }

    /// Directory that must exist for cache entries to be written
    pub fn cache_dir(&self) -> PathBuf {
        if self.cache.ends_with('/') || self.cache.ends_with(std::path::MAIN_SEPARATOR) {
            PathBuf::from(&self.cache)
        } else {
            Path::new(&self.cache)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        }
    }
}

/// Resolve a listener prefix to socket addresses.
///
/// `+` and `*` are wildcard hosts binding every interface. The path part of
/// the prefix is ignored; every path is served by the command dispatcher.
pub fn parse_prefix(prefix: &str) -> Result<Vec<SocketAddr>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason,
    };

    let url = Url::parse(prefix).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(ConfigError::UnsupportedScheme(prefix.to_string()));
    }
    let port = url.port_or_known_default().unwrap_or(80);

    match url.host() {
        Some(Host::Ipv4(ip)) => Ok(vec![SocketAddr::from((ip, port))]),
        Some(Host::Ipv6(ip)) => Ok(vec![SocketAddr::from((ip, port))]),
        Some(Host::Domain("+" | "*")) => Ok(vec![SocketAddr::from(([0, 0, 0, 0], port))]),
        Some(Host::Domain(name)) => {
            let addrs: Vec<SocketAddr> = (name, port)
                .to_socket_addrs()
                .map_err(|e| invalid(e.to_string()))?
                .collect();
            if addrs.is_empty() {
                return Err(invalid(format!("{name} did not resolve")));
            }
            Ok(addrs)
        }
        None => Err(invalid("missing host".to_string())),
    }
}
