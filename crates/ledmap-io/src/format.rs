//! Text serialization formats
//!
//! Show and recording files are plain serde documents; the format is picked
//! from the file extension.

use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{IoError, Result};

/// Serialization format of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
    Ron,
}

impl FileFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            "ron" => Ok(FileFormat::Ron),
            other => Err(IoError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        Ok(match self {
            FileFormat::Toml => toml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
            FileFormat::Ron => ron::from_str(content)?,
        })
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self {
            FileFormat::Toml => toml::to_string_pretty(value)?,
            FileFormat::Json => serde_json::to_string_pretty(value)?,
            FileFormat::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?,
        })
    }
}

/// Read a text file, refusing anything larger than `limit` bytes.
pub fn read_limited(path: &Path, limit: u64) -> Result<String> {
    let size = fs::metadata(path)?.len();
    if size > limit {
        return Err(IoError::FileTooLarge { size, limit });
    }
    Ok(fs::read_to_string(path)?)
}

/// Parse `path` in the format its extension names.
pub fn load_document<T: DeserializeOwned>(path: &Path, limit: u64) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    let content = read_limited(path, limit)?;
    format.parse(&content)
}

/// Write `value` to `path` in the format its extension names.
pub fn save_document<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let format = FileFormat::from_path(path)?;
    let content = format.render(value)?;
    fs::write(path, content)?;
    Ok(())
}
