//! Error types for table handling, configuration and per-field analysis.

use std::path::PathBuf;

/// Errors returned by the library entry points.
#[derive(Debug)]
pub enum Error {
    /// Filesystem failure.
    Io(std::io::Error),
    /// Delimited-table read/write failure.
    Csv(csv::Error),
    /// JSON (config or report) failure.
    Json(serde_json::Error),
    /// PNG encoding failure.
    Image(image::ImageError),
    /// The dot table lacks required columns.
    MissingColumns(Vec<String>),
    /// A cell of the dot table could not be parsed.
    InvalidValue {
        /// Zero-based data row (header excluded).
        row: usize,
        /// Column name.
        column: String,
        /// Offending raw value.
        value: String,
    },
    /// Invalid configuration value.
    Config(String),
    /// One or more fields of view failed and the run was configured to stop.
    FieldsFailed(Vec<u32>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::Csv(e) => write!(f, "table error: {}", e),
            Self::Json(e) => write!(f, "json error: {}", e),
            Self::Image(e) => write!(f, "image error: {}", e),
            Self::MissingColumns(cols) => {
                write!(f, "some required columns are missing: {}", cols.join(", "))
            }
            Self::InvalidValue { row, column, value } => write!(
                f,
                "invalid value '{}' in column '{}' at row {}",
                value, column, row
            ),
            Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Self::FieldsFailed(fovs) => {
                let ids: Vec<String> = fovs.iter().map(|i| i.to_string()).collect();
                write!(f, "analysis failed for fields of view: {}", ids.join(", "))
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}

/// Failure of a single field-of-view analysis.
///
/// These never abort the run on their own; the driver records them next to
/// the field id and leaves that field's dots undefined.
#[derive(Debug, Clone, PartialEq)]
pub enum FovError {
    /// No file in the image directory matches the field id.
    NoMatchingImage,
    /// The stack could not be opened or decoded.
    Read {
        /// Image path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
    /// The decoded stack has no voxels.
    EmptyStack,
    /// Pixel format the decoder cannot turn into intensities.
    UnsupportedSampleFormat,
    /// Binarization produced no usable mask.
    Binarize(String),
}

impl std::fmt::Display for FovError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatchingImage => write!(f, "no image matches the field id"),
            Self::Read { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            Self::EmptyStack => write!(f, "image stack is empty"),
            Self::UnsupportedSampleFormat => write!(f, "unsupported sample format"),
            Self::Binarize(msg) => write!(f, "binarization failed: {}", msg),
        }
    }
}

impl std::error::Error for FovError {}

pub type Result<T> = std::result::Result<T, Error>;
