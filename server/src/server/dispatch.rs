//! Command dispatcher
//!
//! Every request names one of four commands in its `command` query
//! parameter. Each handler runs behind an error boundary: any failure is
//! logged and answered with an empty 400. Handlers are synchronous and block
//! on file I/O and slide decoding; they are run on the worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::slide::{SlideDecoder, SlideError, catalog, describe_slide};
use crate::tile::{CacheKey, FormatEncoder, RegionCache, RegionRenderer, RegionRequest, RequestError};

/// Decoded query string
pub type QueryParams = HashMap<String, String>;

/// Recognised values of the `command` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Image,
    List,
    Cases,
    Details,
}

impl Command {
    /// Match a `command` value exactly; anything else is unmapped
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value? {
            "image" => Some(Self::Image),
            "list" => Some(Self::List),
            "cases" => Some(Self::Cases),
            "details" => Some(Self::Details),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::List => "list",
            Self::Cases => "cases",
            Self::Details => "details",
        }
    }
}

/// Failures caught by the error boundary; all become HTTP 400
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    #[error("Cache I/O error: {0}")]
    Cache(#[source] std::io::Error),
}

/// A complete HTTP answer: status, optional content type and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl Reply {
    pub fn ok(content_type: Option<&'static str>, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type,
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::ok(Some("application/json"), body)
    }

    /// Status-only reply with no body
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.content_type {
            Some(content_type) => {
                (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
            }
            None => {
                let mut response = (self.status, self.body).into_response();
                // Bytes bodies default to application/octet-stream; keep the header absent
                response.headers_mut().remove(header::CONTENT_TYPE);
                response
            }
        }
    }
}

/// Routes commands to their handlers.
///
/// Owns the process configuration, handed in once at startup.
pub struct Dispatcher {
    config: Arc<Config>,
    decoder: Arc<dyn SlideDecoder>,
    cache: RegionCache,
    renderer: RegionRenderer,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, decoder: Arc<dyn SlideDecoder>) -> Self {
        let cache = RegionCache::new(config.cache.clone());
        let renderer = RegionRenderer::new(decoder.clone(), FormatEncoder::new(config.jpeg_quality));
        Self {
            config,
            decoder,
            cache,
            renderer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one command to completion
    pub fn dispatch(&self, command: Command, params: &QueryParams) -> Reply {
        counter!("slidetile_requests_total", "command" => command.as_str()).increment(1);

        let result = match command {
            Command::Image => self.handle_image(params),
            Command::List => self.handle_list(params),
            Command::Cases => self.handle_cases(),
            Command::Details => self.handle_details(params),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} request failed: {}", command.as_str(), e);
                counter!("slidetile_request_errors_total", "command" => command.as_str())
                    .increment(1);
                Reply::empty(StatusCode::BAD_REQUEST)
            }
        }
    }

    fn handle_image(&self, params: &QueryParams) -> Result<Reply, DispatchError> {
        let request = RegionRequest::from_query(params)?;
        info!(
            "Image: {}, level: {}, x: {}, y: {}, w: {}, h: {}, format: {}",
            request.name,
            request.level,
            request.x,
            request.y,
            request.width,
            request.height,
            request.format
        );

        let start = Instant::now();
        let key = CacheKey::for_request(&request);

        let bytes = match self.cache.lookup(&key).map_err(DispatchError::Cache)? {
            Some(bytes) => Some(bytes),
            None => {
                let slide_path = request.slide_path(&self.config.location);
                match self.renderer.render(&slide_path, &request) {
                    Ok(bytes) => {
                        self.cache
                            .store(&key, &bytes)
                            .map_err(DispatchError::Cache)?;
                        Some(bytes)
                    }
                    Err(e) => {
                        warn!("Failed to render {:?}: {}", slide_path, e);
                        None
                    }
                }
            }
        };

        debug!("Image request took {:?}", start.elapsed());

        Ok(match bytes {
            Some(bytes) => Reply::ok(request.format.content_type(), bytes),
            None => Reply::empty(StatusCode::NOT_FOUND),
        })
    }

    fn handle_details(&self, params: &QueryParams) -> Result<Reply, DispatchError> {
        let name = required(params, "name")?;
        let case_id = required(params, "caseID")?;
        let slide_path = self.config.location.join(case_id).join(name);

        match describe_slide(self.decoder.as_ref(), &slide_path) {
            Ok(metadata) => Ok(Reply::json(metadata.to_details_json())),
            Err(e @ SlideError::Unreadable { .. }) => {
                debug!("Details unavailable: {}", e);
                Ok(Reply::empty(StatusCode::NOT_FOUND))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_list(&self, params: &QueryParams) -> Result<Reply, DispatchError> {
        let case_id = required(params, "caseID")?;
        let images = catalog::list_images(&self.config.location, case_id)?;
        Ok(Reply::json(images.to_json()))
    }

    fn handle_cases(&self) -> Result<Reply, DispatchError> {
        let cases = catalog::list_cases(&self.config.location)?;
        Ok(Reply::json(cases.to_json()))
    }
}

fn required<'a>(params: &'a QueryParams, name: &'static str) -> Result<&'a str, DispatchError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or(DispatchError::Request(RequestError::MissingParameter(name)))
}
