//! Browser session seam
//!
//! The engine never talks to a browser directly. Anything that can report its
//! URL, run a script in page context and change its viewport or orientation can
//! drive a check; [`crate::screenshot::webdriver::WebDriverSession`] is the
//! WebDriver-backed implementation.

use anyhow::Result;
use serde_json::Value;
use tracing::trace;

use crate::resolution::{Orientation, Resolution, Viewport};

/// Script returning the browser's user agent string
pub const USER_AGENT_SCRIPT: &str = "return window.navigator.userAgent;";

/// An active browser-automation session
#[allow(async_fn_in_trait)]
pub trait Session {
    /// URL currently loaded in the session
    async fn get_url(&mut self) -> Result<String>;

    /// Runs `script` in page context; `args` are exposed as `arguments[n]`
    async fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Whether the session drives a mobile device (orientation mode)
    fn is_mobile(&self) -> bool;

    async fn set_viewport_size(&mut self, viewport: Viewport) -> Result<()>;

    async fn set_orientation(&mut self, orientation: Orientation) -> Result<()>;

    /// Resizes the viewport or rotates the device, depending on the resolution kind
    async fn apply_resolution(&mut self, resolution: &Resolution) -> Result<()> {
        trace!("Applying resolution {}", resolution);
        match resolution {
            Resolution::Viewport(viewport) => self.set_viewport_size(*viewport).await,
            Resolution::Orientation(orientation) => self.set_orientation(*orientation).await,
        }
    }
}
