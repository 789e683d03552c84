use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::compare::{IgnoreStrategy, DEFAULT_MIS_MATCH_TOLERANCE};
use crate::error::{Error, Result};
use crate::resolution::{Orientation, Viewport};
use crate::screenshot::DEFAULT_WEBDRIVER_URL;

/// Prefix of environment variables overriding file settings,
/// e.g. `VISUAL_REGRESSION_VIEWPORT_CHANGE_PAUSE_MS=250`
pub const ENV_PREFIX: &str = "VISUAL_REGRESSION";

/// Default settle delay after a resolution change
pub const DEFAULT_VIEWPORT_CHANGE_PAUSE_MS: u64 = 100;

/// Configuration for a visual regression run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualRegressionConfig {
    /// Viewports checked on desktop sessions
    pub viewports: Vec<Viewport>,

    /// Orientations checked on mobile sessions
    pub orientations: Vec<Orientation>,

    /// Wait after each viewport or orientation change
    pub viewport_change_pause_ms: u64,

    /// Settings of the local compare strategy
    pub compare: CompareSettings,

    /// WebDriver server URL
    pub webdriver_url: String,

    /// Whether to run the browser in headless mode
    pub headless: bool,

    /// Chrome device to emulate; makes the session a mobile one
    pub mobile_device: Option<String>,

    /// Directory for log files; logs go to stderr when unset
    pub log_dir: Option<String>,
}

impl Default for VisualRegressionConfig {
    fn default() -> Self {
        Self {
            viewports: vec![Viewport::new(1280, 800)],
            orientations: vec![Orientation::Portrait, Orientation::Landscape],
            viewport_change_pause_ms: DEFAULT_VIEWPORT_CHANGE_PAUSE_MS,
            compare: CompareSettings::default(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            mobile_device: None,
            log_dir: None,
        }
    }
}

/// Where [`crate::compare::LocalCompare`] keeps artifacts and how strict it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    pub screenshot_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub diff_dir: PathBuf,
    /// In `(0, 100]`; zero is a configuration error, not "use the default"
    pub mis_match_tolerance: f64,
    pub ignore_comparison: IgnoreStrategy,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("screenshots/taken"),
            reference_dir: PathBuf::from("screenshots/reference"),
            diff_dir: PathBuf::from("screenshots/diff"),
            mis_match_tolerance: DEFAULT_MIS_MATCH_TOLERANCE,
            ignore_comparison: IgnoreStrategy::Nothing,
        }
    }
}

impl CompareSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.mis_match_tolerance > 0.0 && self.mis_match_tolerance <= 100.0) {
            return Err(Error::Configuration(format!(
                "compare.mis_match_tolerance must be in (0, 100], got {}",
                self.mis_match_tolerance
            )));
        }
        for (name, dir) in [
            ("screenshot_dir", &self.screenshot_dir),
            ("reference_dir", &self.reference_dir),
            ("diff_dir", &self.diff_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(Error::Configuration(format!("compare.{} is empty", name)));
            }
        }
        Ok(())
    }
}

impl VisualRegressionConfig {
    /// Loads settings from an optional TOML/JSON/YAML file, then applies
    /// `VISUAL_REGRESSION_*` environment overrides (`__` separates nested keys)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn viewport_change_pause(&self) -> Duration {
        Duration::from_millis(self.viewport_change_pause_ms)
    }

    pub fn is_mobile(&self) -> bool {
        self.mobile_device.is_some()
    }

    /// Window size to open desktop sessions with; mobile sessions keep the
    /// emulated device's size
    pub fn initial_viewport(&self) -> Option<Viewport> {
        if self.is_mobile() {
            None
        } else {
            self.viewports.first().copied()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(viewport) = self.viewports.iter().find(|v| v.width == 0 || v.height == 0) {
            return Err(Error::Configuration(format!("invalid viewport {}", viewport)));
        }
        url::Url::parse(&self.webdriver_url).map_err(|e| {
            Error::Configuration(format!("invalid webdriver_url {:?}: {}", self.webdriver_url, e))
        })?;
        self.compare.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = VisualRegressionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.viewport_change_pause(), Duration::from_millis(100));
        assert_eq!(config.compare.mis_match_tolerance, 0.01);
        assert!(!config.is_mobile());
    }

    #[test]
    fn test_load_from_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
viewport_change_pause_ms = 250
viewports = [{{ width = 600, height = 1000 }}, {{ width = 320, height = 480 }}]

[compare]
reference_dir = "refs"
ignore_comparison = "antialiasing"
"#
        )
        .unwrap();

        let config = VisualRegressionConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.viewport_change_pause_ms, 250);
        assert_eq!(config.viewports, vec![Viewport::new(600, 1000), Viewport::new(320, 480)]);
        assert_eq!(config.orientations.len(), 2);
        assert_eq!(config.compare.reference_dir, PathBuf::from("refs"));
        assert_eq!(config.compare.diff_dir, PathBuf::from("screenshots/diff"));
        assert_eq!(config.compare.ignore_comparison, IgnoreStrategy::Antialiasing);
    }

    #[test]
    fn test_initial_viewport_follows_session_kind() {
        let mut config = VisualRegressionConfig::default();
        config.viewports = vec![Viewport::new(600, 1000), Viewport::new(320, 480)];
        assert_eq!(config.initial_viewport(), Some(Viewport::new(600, 1000)));

        config.mobile_device = Some("Pixel 7".to_string());
        assert_eq!(config.initial_viewport(), None);

        config.mobile_device = None;
        config.viewports.clear();
        assert_eq!(config.initial_viewport(), None);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = VisualRegressionConfig::default();
        config.compare.mis_match_tolerance = 0.0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = VisualRegressionConfig::default();
        config.webdriver_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = VisualRegressionConfig::default();
        config.viewports.push(Viewport::new(0, 100));
        assert!(config.validate().is_err());
    }
}
