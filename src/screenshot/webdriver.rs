use anyhow::{Context, Result};
use fantoccini::{Client, Locator};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, trace, warn};

use crate::resolution::{Orientation, Viewport};
use crate::screenshot::client::{create_client, desired_capabilities};
use crate::screenshot::{Capture, CapturedImage, CheckOptions};
use crate::session::Session;

const INNER_SIZE_SCRIPT: &str = "return [window.innerWidth, window.innerHeight];";
const DOCUMENT_SIZE_SCRIPT: &str = "const el = document.documentElement; \
     return [Math.max(el.scrollWidth, document.body ? document.body.scrollWidth : 0), \
             Math.max(el.scrollHeight, document.body ? document.body.scrollHeight : 0)];";

/// A WebDriver browser session driven through fantoccini
pub struct WebDriverSession {
    client: Client,
    mobile: bool,
    capabilities: Map<String, Value>,
}

impl fmt::Debug for WebDriverSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverSession")
            .field("mobile", &self.mobile)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl WebDriverSession {
    /// Opens a new browser session
    ///
    /// With `mobile_device` set the session emulates that device and checks run
    /// per orientation instead of per viewport. `initial_viewport` sizes the
    /// window right after the handshake.
    pub async fn connect(
        webdriver_url: &str,
        headless: bool,
        mobile_device: Option<&str>,
        initial_viewport: Option<Viewport>,
    ) -> Result<Self> {
        let capabilities = desired_capabilities(headless, mobile_device);
        let client = create_client(webdriver_url, capabilities.clone(), initial_viewport).await?;
        info!("WebDriver session opened (mobile: {})", mobile_device.is_some());
        Ok(Self {
            client,
            mobile: mobile_device.is_some(),
            capabilities,
        })
    }

    /// Capabilities the session was requested with
    pub fn desired_capabilities(&self) -> &Map<String, Value> {
        &self.capabilities
    }

    pub async fn goto(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to URL: {}", url);
        self.client
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        self.client
            .wait()
            .for_element(Locator::Css("body"))
            .await
            .context("Failed to wait for page to load")?;
        Ok(())
    }

    /// Ends the browser session
    pub async fn close(self) -> Result<()> {
        info!("Closing WebDriver session");
        self.client.close().await.context("Failed to close WebDriver session")
    }

    async fn window_size(&self) -> Result<(u32, u32)> {
        let (width, height) = self.client.get_window_size().await?;
        Ok((width as u32, height as u32))
    }

    async fn inner_size(&self) -> Result<(u32, u32)> {
        let value = self.client.execute(INNER_SIZE_SCRIPT, vec![]).await?;
        let (width, height): (u32, u32) =
            serde_json::from_value(value).context("Unexpected inner size probe result")?;
        Ok((width, height))
    }
}

impl Session for WebDriverSession {
    async fn get_url(&mut self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.client.execute(script, args).await?)
    }

    fn is_mobile(&self) -> bool {
        self.mobile
    }

    /// Resizes the window so that the inner viewport ends up at `viewport`
    async fn set_viewport_size(&mut self, viewport: Viewport) -> Result<()> {
        self.client
            .set_window_size(viewport.width, viewport.height)
            .await
            .with_context(|| format!("Failed to set window size to {}", viewport))?;

        let (inner_width, inner_height) = self.inner_size().await?;
        if (inner_width, inner_height) != (viewport.width, viewport.height) {
            let width = viewport.width + viewport.width.saturating_sub(inner_width);
            let height = viewport.height + viewport.height.saturating_sub(inner_height);
            trace!("Compensating window chrome, resizing to {}x{}", width, height);
            self.client.set_window_size(width, height).await?;
        }
        Ok(())
    }

    async fn set_orientation(&mut self, orientation: Orientation) -> Result<()> {
        let (width, height) = self.window_size().await?;
        let landscape = width > height;
        if landscape == (orientation == Orientation::Landscape) {
            trace!("Already in {} orientation", orientation);
            return Ok(());
        }
        debug!("Rotating device to {}", orientation);
        self.client
            .set_window_size(height, width)
            .await
            .with_context(|| format!("Failed to rotate to {}", orientation))?;
        Ok(())
    }
}

impl Capture for WebDriverSession {
    async fn capture_element(&mut self, selector: &str, _options: &CheckOptions) -> Result<CapturedImage> {
        let element = self
            .client
            .find(Locator::Css(selector))
            .await
            .with_context(|| format!("Element {} not found", selector))?;
        let data = element.screenshot().await.context("Failed to capture element")?;
        trace!("Element screenshot captured, {} bytes", data.len());
        Ok(CapturedImage::from_raw(&data))
    }

    /// Grows the window to the document's scroll size for one screenshot
    async fn capture_document(&mut self, _options: &CheckOptions) -> Result<CapturedImage> {
        let original = self.window_size().await?;
        let (inner_width, inner_height) = self.inner_size().await?;
        let value = self.client.execute(DOCUMENT_SIZE_SCRIPT, vec![]).await?;
        let (doc_width, doc_height): (u32, u32) =
            serde_json::from_value(value).context("Unexpected document size probe result")?;

        let width = doc_width.max(inner_width) + original.0.saturating_sub(inner_width);
        let height = doc_height.max(inner_height) + original.1.saturating_sub(inner_height);
        debug!("Expanding window to {}x{} for document capture", width, height);
        self.client.set_window_size(width, height).await?;

        let captured = self.client.screenshot().await;
        if let Err(e) = self.client.set_window_size(original.0, original.1).await {
            warn!("Failed to restore window size after document capture: {}", e);
        }
        let data = captured.context("Failed to capture document")?;
        trace!("Document screenshot captured, {} bytes", data.len());
        Ok(CapturedImage::from_raw(&data))
    }

    async fn capture_viewport(&mut self, _options: &CheckOptions) -> Result<CapturedImage> {
        let data = self.client.screenshot().await.context("Failed to capture viewport")?;
        trace!("Viewport screenshot captured, {} bytes", data.len());
        Ok(CapturedImage::from_raw(&data))
    }
}
