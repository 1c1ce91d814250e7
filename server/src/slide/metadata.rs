//! Slide metadata for the `details` command
//!
//! Metadata is read from the slide on every call; nothing here is cached.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::decoder::SlideDecoder;
use super::types::{SlideError, SlideMetadata};

/// Offset reported when a slide has no calibration sidecar
pub const DEFAULT_OFFSET: &str = "\"0,0\"";

/// Path of the calibration sidecar: the slide path with `.txt` appended
pub fn sidecar_path(slide_path: &Path) -> PathBuf {
    let mut os: OsString = slide_path.as_os_str().to_owned();
    os.push(".txt");
    PathBuf::from(os)
}

/// Read the calibration offset for a slide.
///
/// The sidecar text is returned verbatim and ends up unescaped in the
/// `details` JSON.
pub fn load_offset(slide_path: &Path) -> Result<String, SlideError> {
    match std::fs::read_to_string(sidecar_path(slide_path)) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DEFAULT_OFFSET.to_string()),
        Err(e) => Err(SlideError::IoError(e)),
    }
}

/// Open a slide and collect its pyramid metadata
pub fn describe_slide(
    decoder: &dyn SlideDecoder,
    slide_path: &Path,
) -> Result<SlideMetadata, SlideError> {
    let slide = decoder.open(slide_path)?;

    let vendor = slide.vendor().unwrap_or_default();
    let level_count = slide.level_count()?;
    let levels = (0..level_count)
        .map(|level| slide.level_dimensions(level))
        .collect::<Result<Vec<_>, _>>()?;
    let offset = load_offset(slide_path)?;
    drop(slide);

    if levels.is_empty() {
        return Err(SlideError::NoLevels);
    }

    let name = slide_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!(
        "Described slide {:?}: vendor={:?}, levels={}",
        slide_path, vendor, level_count
    );

    Ok(SlideMetadata {
        name,
        vendor,
        levels,
        offset,
    })
}

impl SlideMetadata {
    /// Render the `details` response body.
    ///
    /// Field order, CRLF line breaks and tab indentation are part of the
    /// response format.
    pub fn to_details_json(&self) -> String {
        let dimensions = self
            .levels
            .iter()
            .enumerate()
            .map(|(level, dims)| format!("\"{},{},{}\"", level, dims.width, dims.height))
            .collect::<Vec<_>>()
            .join(",\r\n\t\t");

        let (width, height) = self
            .levels
            .first()
            .map(|d| (d.width, d.height))
            .unwrap_or((0, 0));

        format!(
            "{{\r\n\t\"Name\":{}, \r\n\t\"Vendor\":{}, \r\n\t\"Levels\":{}, \r\n\t\"Width\":{}, \r\n\t\"Height\":{}, \r\n\t\"Dimensions\":[\r\n\t\t{}\r\n\t], \r\n\t\"Offset\":{}\r\n}}",
            json_string(&self.name),
            json_string(&self.vendor),
            self.level_count(),
            width,
            height,
            dimensions,
            self.offset
        )
    }
}

/// Quote and escape a string as a JSON literal
pub(crate) fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::types::LevelDimensions;
    use crate::test_utils::{FakeDecoder, FakeSlide};

    fn sample_metadata(offset: &str) -> SlideMetadata {
        SlideMetadata {
            name: "slideA.svs".to_string(),
            vendor: "aperio".to_string(),
            levels: vec![
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
            ],
            offset: offset.to_string(),
        }
    }

    #[test]
    fn test_sidecar_path_appends_txt() {
        assert_eq!(
            sidecar_path(Path::new("/data/case1/slideA.svs")),
            PathBuf::from("/data/case1/slideA.svs.txt")
        );
    }

    #[test]
    fn test_details_json_shape() {
        let json = sample_metadata(DEFAULT_OFFSET).to_details_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["Name"], "slideA.svs");
        assert_eq!(value["Vendor"], "aperio");
        assert_eq!(value["Levels"], 3);
        assert_eq!(value["Width"], 46000);
        assert_eq!(value["Height"], 32914);
        assert_eq!(value["Offset"], "0,0");

        let dims = value["Dimensions"].as_array().unwrap();
        assert_eq!(dims.len(), 3);
        assert_eq!(dims[0], "0,46000,32914");
        assert_eq!(dims[1], "1,11500,8228");
        assert_eq!(dims[2], "2,2875,2057");
    }

    #[test]
    fn test_details_json_field_order() {
        let json = sample_metadata(DEFAULT_OFFSET).to_details_json();
        let positions: Vec<usize> = [
            "\"Name\"",
            "\"Vendor\"",
            "\"Levels\"",
            "\"Width\"",
            "\"Height\"",
            "\"Dimensions\"",
            "\"Offset\"",
        ]
        .iter()
        .map(|field| json.find(field).unwrap())
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_details_json_inserts_offset_verbatim() {
        let json = sample_metadata("[12.5, -3]").to_details_json();
        assert!(json.ends_with("\"Offset\":[12.5, -3]\r\n}"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Offset"][0], 12.5);
    }

    #[test]
    fn test_describe_slide_reads_levels_and_default_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slideA.svs");
        let decoder = FakeDecoder::new().with_slide(&path, FakeSlide::three_levels());

        let meta = describe_slide(&decoder, &path).unwrap();

        assert_eq!(meta.name, "slideA.svs");
        assert_eq!(meta.vendor, "fake");
        assert_eq!(meta.level_count(), 3);
        assert_eq!(meta.offset, DEFAULT_OFFSET);
        assert_eq!(decoder.open_count(), 1);
        assert_eq!(decoder.live_handles(), 0);
    }

    #[test]
    fn test_describe_slide_uses_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slideA.svs");
        std::fs::write(sidecar_path(&path), "\"120,-45\"").unwrap();
        let decoder = FakeDecoder::new().with_slide(&path, FakeSlide::three_levels());

        let meta = describe_slide(&decoder, &path).unwrap();
        assert_eq!(meta.offset, "\"120,-45\"");
    }

    #[test]
    fn test_describe_missing_slide_is_unreadable() {
        let decoder = FakeDecoder::new();
        let result = describe_slide(&decoder, Path::new("/nowhere/missing.svs"));
        assert!(matches!(result, Err(SlideError::Unreadable { .. })));
    }

    #[test]
    fn test_describe_slide_without_vendor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let slide = FakeSlide {
            vendor: None,
            ..FakeSlide::three_levels()
        };
        let decoder = FakeDecoder::new().with_slide(&path, slide);

        let meta = describe_slide(&decoder, &path).unwrap();
        assert_eq!(meta.vendor, "");
        assert!(meta.to_details_json().contains("\"Vendor\":\"\""));
    }
}
