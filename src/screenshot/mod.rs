mod client;
mod config;
mod context;
mod model;
pub mod regions;
pub mod webdriver;

use anyhow::{anyhow, Result};
use tracing::debug;

pub use config::DEFAULT_WEBDRIVER_URL;
pub use context::{
    BrowserInfo, CaptureType, CheckOptions, Meta, ScreenshotContext, ScreenshotContextBuilder,
    TestDetails,
};
pub use model::CapturedImage;

/// Raw screenshot primitives of a session
#[allow(async_fn_in_trait)]
pub trait Capture {
    async fn capture_element(&mut self, selector: &str, options: &CheckOptions) -> Result<CapturedImage>;

    /// Full scrollable page
    async fn capture_document(&mut self, options: &CheckOptions) -> Result<CapturedImage>;

    /// Visible part of the page only
    async fn capture_viewport(&mut self, options: &CheckOptions) -> Result<CapturedImage>;
}

/// Calls the primitive matching `capture_type`
pub async fn capture<C: Capture>(
    session: &mut C,
    capture_type: CaptureType,
    selector: Option<&str>,
    options: &CheckOptions,
) -> Result<CapturedImage> {
    debug!("Capturing {} screenshot", capture_type);
    match capture_type {
        CaptureType::Element => {
            let selector = selector.ok_or_else(|| anyhow!("element capture needs a selector"))?;
            session.capture_element(selector, options).await
        }
        CaptureType::Document => session.capture_document(options).await,
        CaptureType::Viewport => session.capture_viewport(options).await,
    }
}
