use std::time::Duration;

// WebDriver session defaults
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10); // Timeout for the WebDriver handshake

// Chrome arguments that keep rendering stable between runs
pub fn chrome_arguments(headless: bool) -> Vec<String> {
    vec![
        "--no-sandbox",
        "--disable-gpu",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-notifications",
        "--disable-infobars",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--disable-features=TranslateUI",
        "--force-color-profile=srgb",
        "--force-device-scale-factor=1",
        "--font-render-hinting=none",
        "--hide-scrollbars",
        "--mute-audio",
        if headless { "--headless=new" } else { "" }
    ].into_iter()
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

// Chrome mobile emulation settings for orientation checks
pub fn mobile_emulation(device_name: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut emulation = serde_json::Map::new();
    emulation.insert("deviceName".to_string(), device_name.into());
    emulation
}
