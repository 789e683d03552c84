//! Error types for the visual regression engine

use std::path::PathBuf;
use thiserror::Error;

use crate::resolution::Resolution;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while checking screenshots
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid setup, raised before any session work starts
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The automation driver or a capture primitive failed
    #[error("Capture failed{}: {source}", at_resolution(.resolution))]
    Capture {
        resolution: Option<Resolution>,
        #[source]
        source: anyhow::Error,
    },

    /// Reading, writing or deleting an artifact failed
    #[error("Storage error on {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image-diff primitive could not compare the images
    #[error("Comparison failed: {0}")]
    Comparison(String),
}

impl Error {
    pub fn capture(resolution: Option<&Resolution>, source: impl Into<anyhow::Error>) -> Self {
        Error::Capture {
            resolution: resolution.cloned(),
            source: source.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Comparison(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Comparison(format!("captured image is not valid base64: {}", err))
    }
}

fn at_resolution(resolution: &Option<Resolution>) -> String {
    match resolution {
        Some(resolution) => format!(" at {}", resolution),
        None => String::new(),
    }
}
