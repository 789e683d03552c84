use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::compare::IgnoreStrategy;
use crate::error::{Error, Result};
use crate::resolution::{Orientation, Resolution, Viewport};

/// What a screenshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureType {
    Element,
    Document,
    Viewport,
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureType::Element => write!(f, "element"),
            CaptureType::Document => write!(f, "document"),
            CaptureType::Viewport => write!(f, "viewport"),
        }
    }
}

/// Identity of the browser under test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub user_agent: Option<String>,
}

/// Suite and test the current check runs under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDetails {
    pub suite: Option<String>,
    pub test: Option<String>,
}

impl TestDetails {
    pub fn new(suite: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            suite: Some(suite.into()),
            test: Some(test.into()),
        }
    }
}

/// Per-call options of the check commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    /// Selectors painted over after capture
    pub exclude: Vec<String>,
    /// Selectors made invisible during capture, keeping their layout box
    pub hide: Vec<String>,
    /// Selectors taken out of the layout during capture
    pub remove: Vec<String>,
    /// Settle delay after a resolution change, in milliseconds
    pub viewport_change_pause: Option<u64>,
    /// Mismatch percentage a capture must stay below, in `(0, 100]`.
    /// Zero is rejected by [`CheckOptions::validate`] rather than treated as
    /// unset; leave it `None` to use the configured tolerance.
    pub tolerance: Option<f64>,
    pub ignore_comparison: Option<IgnoreStrategy>,
    pub viewports: Option<Vec<Viewport>>,
    pub orientations: Option<Vec<Orientation>>,
}

impl CheckOptions {
    pub fn exclude(mut self, selector: impl Into<String>) -> Self {
        self.exclude.push(selector.into());
        self
    }

    pub fn hide(mut self, selector: impl Into<String>) -> Self {
        self.hide.push(selector.into());
        self
    }

    pub fn remove(mut self, selector: impl Into<String>) -> Self {
        self.remove.push(selector.into());
        self
    }

    pub fn viewport_change_pause(mut self, pause: Duration) -> Self {
        self.viewport_change_pause = Some(pause.as_millis() as u64);
        self
    }

    /// Overrides the configured tolerance; zero is rejected, see the `tolerance` field
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn ignore_comparison(mut self, strategy: impl Into<IgnoreStrategy>) -> Self {
        self.ignore_comparison = Some(strategy.into());
        self
    }

    pub fn viewports(mut self, viewports: Vec<Viewport>) -> Self {
        self.viewports = Some(viewports);
        self
    }

    pub fn orientations(mut self, orientations: Vec<Orientation>) -> Self {
        self.orientations = Some(orientations);
        self
    }

    /// Rejects option values no check could honour
    pub fn validate(&self) -> Result<()> {
        if let Some(tolerance) = self.tolerance {
            if !(tolerance > 0.0 && tolerance <= 100.0) {
                return Err(Error::Configuration(format!(
                    "tolerance must be in (0, 100], got {}",
                    tolerance
                )));
            }
        }
        if matches!(&self.viewports, Some(v) if v.is_empty()) {
            return Err(Error::Configuration("viewports override is empty".to_string()));
        }
        if matches!(&self.orientations, Some(o) if o.is_empty()) {
            return Err(Error::Configuration("orientations override is empty".to_string()));
        }
        if let Some(viewport) = self
            .viewports
            .iter()
            .flatten()
            .find(|v| v.width == 0 || v.height == 0)
        {
            return Err(Error::Configuration(format!("invalid viewport {}", viewport)));
        }
        Ok(())
    }
}

/// Where and how a screenshot was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub url: String,
    pub element: Option<String>,
    pub exclude: Vec<String>,
    pub hide: Vec<String>,
    pub remove: Vec<String>,
    #[serde(flatten)]
    pub resolution: Resolution,
}

/// Everything known about one capture; naming functions derive artifact paths from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotContext {
    #[serde(rename = "type")]
    pub capture_type: CaptureType,
    pub browser: BrowserInfo,
    pub desired_capabilities: Map<String, Value>,
    pub suite: Option<String>,
    pub test: Option<String>,
    pub meta: Meta,
    pub options: CheckOptions,
}

impl ScreenshotContext {
    pub fn builder(capture_type: CaptureType, resolution: Resolution) -> ScreenshotContextBuilder {
        ScreenshotContextBuilder {
            context: ScreenshotContext {
                capture_type,
                browser: BrowserInfo::default(),
                desired_capabilities: Map::new(),
                suite: None,
                test: None,
                meta: Meta {
                    url: String::new(),
                    element: None,
                    exclude: Vec::new(),
                    hide: Vec::new(),
                    remove: Vec::new(),
                    resolution,
                },
                options: CheckOptions::default(),
            },
        }
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.options.tolerance
    }

    pub fn ignore_comparison(&self) -> Option<IgnoreStrategy> {
        self.options.ignore_comparison
    }
}

pub struct ScreenshotContextBuilder {
    context: ScreenshotContext,
}

impl ScreenshotContextBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.context.meta.url = url.into();
        self
    }

    pub fn element(mut self, selector: Option<&str>) -> Self {
        self.context.meta.element = selector.map(str::to_string);
        self
    }

    pub fn browser(mut self, browser: BrowserInfo) -> Self {
        self.context.browser = browser;
        self
    }

    pub fn desired_capabilities(mut self, capabilities: Map<String, Value>) -> Self {
        self.context.desired_capabilities = capabilities;
        self
    }

    pub fn test(mut self, details: &TestDetails) -> Self {
        self.context.suite = details.suite.clone();
        self.context.test = details.test.clone();
        self
    }

    /// Sets the per-call options and copies their region lists into the meta
    pub fn options(mut self, options: &CheckOptions) -> Self {
        self.context.meta.exclude = options.exclude.clone();
        self.context.meta.hide = options.hide.clone();
        self.context.meta.remove = options.remove.clone();
        self.context.options = options.clone();
        self
    }

    pub fn build(self) -> ScreenshotContext {
        self.context
    }
}
