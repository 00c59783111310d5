//! Data-file management types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an uploaded CSV on the statistical backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFileKind {
    /// County table with features and treatment columns.
    Main,
    /// Precomputed preset patterns.
    Pattern,
}

impl DataFileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFileKind::Main => "main",
            DataFileKind::Pattern => "pattern",
        }
    }
}

impl fmt::Display for DataFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataFileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(DataFileKind::Main),
            "pattern" => Ok(DataFileKind::Pattern),
            other => Err(format!("unknown data file type '{}'", other)),
        }
    }
}

/// A file to push to the backend's data directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFileUpload {
    pub file_name: String,
    pub kind: DataFileKind,
    pub bytes: Vec<u8>,
}

/// Which files the backend should load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFileSelection {
    pub main_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_file: Option<String>,
}

/// Backend acknowledgement of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
}
