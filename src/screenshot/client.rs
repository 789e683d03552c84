use anyhow::{anyhow, Context, Result};
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, error, trace};

use crate::resolution::Viewport;
use crate::screenshot::config;

/// Builds Chrome capabilities for a visual regression session
///
/// The flags keep screenshots comparable between runs. With `mobile_device`
/// set, Chrome emulates that device instead of using a desktop window.
pub fn desired_capabilities(headless: bool, mobile_device: Option<&str>) -> Map<String, Value> {
    let mut caps = Map::new();
    let mut chrome_opts = Map::new();

    debug!("Configuring Chrome options with headless={}", headless);
    let args = config::chrome_arguments(headless);
    trace!("Setting Chrome arguments: {:?}", args);
    chrome_opts.insert("args".to_string(), Value::Array(
        args.into_iter().map(Value::String).collect()
    ));

    if let Some(device) = mobile_device {
        debug!("Emulating mobile device {}", device);
        chrome_opts.insert(
            "mobileEmulation".to_string(),
            Value::Object(config::mobile_emulation(device)),
        );
    }

    caps.insert("browserName".to_string(), "chrome".into());
    caps.insert("goog:chromeOptions".to_string(), Value::Object(chrome_opts));
    caps
}

/// Creates a new WebDriver client
///
/// # Arguments
/// * `webdriver_url` - WebDriver server URL
/// * `caps` - Capabilities requested for the new session
/// * `viewport` - Optional initial window dimensions
pub async fn create_client(
    webdriver_url: &str,
    caps: Map<String, Value>,
    viewport: Option<Viewport>,
) -> Result<Client> {
    trace!("Creating new WebDriver client connecting to {}", webdriver_url);
    debug!("Connecting to WebDriver at {}", webdriver_url);
    let mut builder = ClientBuilder::native();
    builder.capabilities(caps);
    let client = match timeout(config::CONNECTION_TIMEOUT, builder.connect(webdriver_url)).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => {
            error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
            return Err(e).context(format!("Failed to connect to WebDriver at {}", webdriver_url));
        }
        Err(_) => {
            error!("Timed out connecting to WebDriver at {}", webdriver_url);
            return Err(anyhow!("Timed out after {:?} connecting to {}", config::CONNECTION_TIMEOUT, webdriver_url));
        }
    };

    if let Some(viewport) = viewport {
        debug!("Setting initial window size to {}", viewport);
        client
            .set_window_size(viewport.width, viewport.height)
            .await
            .with_context(|| format!("Failed to set window size to {}", viewport))?;
    }

    trace!("Successfully created WebDriver client");
    Ok(client)
}
