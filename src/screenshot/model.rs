use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::Result;

/// A captured screenshot, kept base64-encoded as the capture primitives return it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    image_data: String,
}

impl CapturedImage {
    /// Wraps base64-encoded image data
    pub fn new(image_data: impl Into<String>) -> Self {
        Self {
            image_data: image_data.into(),
        }
    }

    /// Creates a CapturedImage from raw image bytes
    pub fn from_raw(raw_data: &[u8]) -> Self {
        Self {
            image_data: BASE64.encode(raw_data),
        }
    }

    pub fn as_base64(&self) -> &str {
        &self.image_data
    }

    /// Decodes the image bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(self.image_data.trim())?)
    }
}
