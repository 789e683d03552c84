pub mod diff;
mod local;
mod naming;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::Result;
use crate::launcher::RunContext;
use crate::screenshot::{CapturedImage, ScreenshotContext};

pub use diff::{DiffReport, ImageComparator, ResembleComparator};
pub use local::{LocalCompare, LocalCompareBuilder, DEFAULT_MIS_MATCH_TOLERANCE};
pub use naming::{file_name, Naming};

/// Outcome of comparing one screenshot against its reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub mis_match_percentage: f64,
    pub is_within_tolerance: bool,
    pub is_same_dimensions: bool,
    pub reference_existed: bool,
}

impl ComparisonResult {
    /// Result reported when a capture becomes the new reference
    pub fn bootstrapped() -> Self {
        Self {
            mis_match_percentage: 0.0,
            is_within_tolerance: true,
            is_same_dimensions: true,
            reference_existed: false,
        }
    }

    pub fn is_exact_same_image(&self) -> bool {
        self.mis_match_percentage == 0.0
    }

    /// Whether the check passes
    pub fn is_match(&self) -> bool {
        self.is_same_dimensions && self.is_within_tolerance
    }
}

/// Difference classes the image comparison may discount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IgnoreStrategy {
    /// Strict per-channel comparison
    #[default]
    Nothing,
    /// Compare brightness only
    Colors,
    /// Tolerate antialiased edges
    Antialiasing,
}

impl From<&str> for IgnoreStrategy {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "nothing" => IgnoreStrategy::Nothing,
            "colors" => IgnoreStrategy::Colors,
            "antialiasing" => IgnoreStrategy::Antialiasing,
            other => {
                warn!("Unknown ignore strategy {:?}, comparing strictly", other);
                IgnoreStrategy::Nothing
            }
        }
    }
}

impl From<String> for IgnoreStrategy {
    fn from(name: String) -> Self {
        IgnoreStrategy::from(name.as_str())
    }
}

impl From<IgnoreStrategy> for String {
    fn from(strategy: IgnoreStrategy) -> Self {
        strategy.to_string()
    }
}

impl fmt::Display for IgnoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreStrategy::Nothing => write!(f, "nothing"),
            IgnoreStrategy::Colors => write!(f, "colors"),
            IgnoreStrategy::Antialiasing => write!(f, "antialiasing"),
        }
    }
}

/// Pluggable compare step of the check commands
///
/// Only `process_screenshot` is required; every other hook defaults to doing
/// nothing. The launcher calls `on_prepare` and `before` once per session,
/// `before_screenshot`, `after_screenshot` and `process_screenshot` once per
/// resolution, and `after` and `on_complete` when the run ends.
#[allow(async_fn_in_trait)]
pub trait CompareStrategy {
    async fn on_prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn before(&self, _context: &RunContext) -> Result<()> {
        Ok(())
    }

    async fn before_screenshot(&self, _context: &ScreenshotContext) -> Result<()> {
        Ok(())
    }

    async fn after_screenshot(&self, _context: &ScreenshotContext, _image: &CapturedImage) -> Result<()> {
        Ok(())
    }

    async fn process_screenshot(
        &self,
        context: &ScreenshotContext,
        image: &CapturedImage,
    ) -> Result<ComparisonResult>;

    async fn after(&self) -> Result<()> {
        Ok(())
    }

    async fn on_complete(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ignore_strategy_is_strict() {
        assert_eq!(IgnoreStrategy::from("colors"), IgnoreStrategy::Colors);
        assert_eq!(IgnoreStrategy::from("Antialiasing"), IgnoreStrategy::Antialiasing);
        assert_eq!(IgnoreStrategy::from("nothing"), IgnoreStrategy::Nothing);
        assert_eq!(IgnoreStrategy::from("less"), IgnoreStrategy::Nothing);

        let parsed: IgnoreStrategy = serde_json::from_str("\"everything\"").unwrap();
        assert_eq!(parsed, IgnoreStrategy::Nothing);
        assert_eq!(serde_json::to_string(&IgnoreStrategy::Colors).unwrap(), "\"colors\"");
    }

    #[test]
    fn test_result_match_needs_dimensions_and_tolerance() {
        let mut result = ComparisonResult::bootstrapped();
        assert!(result.is_match());
        assert!(result.is_exact_same_image());

        result.is_same_dimensions = false;
        assert!(!result.is_match());
    }
}
