//! Case and slide file enumeration for the `cases` and `list` commands
//!
//! Entries are returned in the order the filesystem yields them. Symlinked
//! directories and files are followed.

use std::path::Path;

use tracing::debug;

use super::metadata::json_string;
use super::types::SlideError;

/// Response body for `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageList {
    pub images: Vec<String>,
}

/// Response body for `cases`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseList {
    pub cases: Vec<String>,
}

impl ImageList {
    /// `{"Images":[...]}` in the same CRLF/tab layout as `details`
    pub fn to_json(&self) -> String {
        name_list_json("Images", &self.images)
    }
}

impl CaseList {
    /// `{"Cases":[...]}` in the same CRLF/tab layout as `details`
    pub fn to_json(&self) -> String {
        name_list_json("Cases", &self.cases)
    }
}

fn name_list_json(key: &str, names: &[String]) -> String {
    let entries = names
        .iter()
        .map(|name| format!("\t\t{}", json_string(name)))
        .collect::<Vec<_>>()
        .join(", \r\n");
    format!("{{\r\n\t\"{key}\":[\r\n{entries}\r\n\t]\r\n}}")
}

/// Names of the case directories directly under the slide root
pub fn list_cases(location: &Path) -> Result<CaseList, SlideError> {
    let cases = entry_names(location, Path::is_dir)?;
    debug!("Found {} cases in {:?}", cases.len(), location);
    Ok(CaseList { cases })
}

/// Names of the files directly inside one case directory
pub fn list_images(location: &Path, case_id: &str) -> Result<ImageList, SlideError> {
    let case_dir = location.join(case_id);
    let images = entry_names(&case_dir, Path::is_file)?;
    debug!("Found {} files in {:?}", images.len(), case_dir);
    Ok(ImageList { images })
}

fn entry_names(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<String>, SlideError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if keep(&entry.path()) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}
