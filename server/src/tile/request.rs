//! Region request parsing and validation

use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::slide::PixelRegion;

use super::encoder::Encoding;

/// Largest accepted region width or height in pixels
pub const MAX_REGION_DIMENSION: i32 = 10_000;

/// Errors raised while turning query parameters into a region request
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for {name}: {value:?}: {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Region out of bounds: level={level}, w={width}, h={height}")]
    OutOfBounds { level: i32, width: i32, height: i32 },
}

/// Requested output format
///
/// Unknown literals are kept so they still name the cache entry; they render
/// through the RAW path and carry no content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Bmp,
    Raw,
    Unrecognized(String),
}

impl OutputFormat {
    /// Interpret the `format` query parameter; absent means PNG
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            None | Some("PNG") => Self::Png,
            Some("JPG") => Self::Jpeg,
            Some("BMP") => Self::Bmp,
            Some("RAW") => Self::Raw,
            Some(other) => Self::Unrecognized(other.to_string()),
        }
    }

    /// The literal used in cache file names
    pub fn as_str(&self) -> &str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPG",
            Self::Bmp => "BMP",
            Self::Raw => "RAW",
            Self::Unrecognized(other) => other,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Bmp => Some("image/bmp"),
            Self::Raw => Some("application/octet-stream"),
            Self::Unrecognized(_) => None,
        }
    }

    /// Encoder variant used to render this format
    pub fn encoding(&self) -> Encoding {
        match self {
            Self::Png => Encoding::Png,
            Self::Jpeg => Encoding::Jpeg,
            Self::Bmp => Encoding::Bmp,
            Self::Raw | Self::Unrecognized(_) => Encoding::Raw,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request for one region of one slide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRequest {
    pub case_id: String,
    pub name: String,
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl RegionRequest {
    /// Parse and validate an `image` query.
    ///
    /// Every field is parsed before the bounds check, so a malformed number
    /// is reported even when another field is out of range.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, RequestError> {
        let name = required(params, "name")?.to_string();
        let case_id = required(params, "caseID")?.to_string();
        let level: i32 = parse_number(params, "level")?;
        let format = OutputFormat::from_param(params.get("format").map(String::as_str));
        let x: i64 = parse_number(params, "x")?;
        let y: i64 = parse_number(params, "y")?;
        let w: i32 = parse_number(params, "w")?;
        let h: i32 = parse_number(params, "h")?;

        let in_bounds = (0..=MAX_REGION_DIMENSION).contains(&w)
            && (0..=MAX_REGION_DIMENSION).contains(&h)
            && level >= 0;
        if !in_bounds {
            return Err(RequestError::OutOfBounds {
                level,
                width: w,
                height: h,
            });
        }

        Ok(Self {
            case_id,
            name,
            level: level as u32,
            x,
            y,
            width: w as u32,
            height: h as u32,
            format,
        })
    }

    /// `<location>/<caseID>/<name>`
    pub fn slide_path(&self, location: &Path) -> PathBuf {
        location.join(&self.case_id).join(&self.name)
    }

    pub fn pixel_region(&self) -> PixelRegion {
        PixelRegion {
            level: self.level,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

fn required<'a>(
    params: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, RequestError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or(RequestError::MissingParameter(name))
}

fn parse_number<T>(params: &HashMap<String, String>, name: &'static str) -> Result<T, RequestError>
where
    T: FromStr<Err = ParseIntError>,
{
    let value = required(params, name)?;
    value
        .trim()
        .parse()
        .map_err(|source| RequestError::InvalidNumber {
            name,
            value: value.to_string(),
            source,
        })
}
