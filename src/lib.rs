//! Visual regression checks for WebDriver sessions.
//!
//! A check command captures an element, the whole document or the viewport
//! at every configured resolution and hands each capture to a
//! [`CompareStrategy`]. [`LocalCompare`] keeps references on disk, writes a
//! diff image whenever a capture drifts beyond tolerance and bootstraps
//! missing references from the first capture.

pub mod compare;
pub mod error;
pub mod launcher;
pub mod resolution;
pub mod screenshot;
pub mod session;
pub mod storage;
pub mod utils;

pub use compare::{
    CompareStrategy, ComparisonResult, IgnoreStrategy, ImageComparator, LocalCompare, Naming,
    ResembleComparator,
};
pub use error::{Error, Result};
pub use launcher::config::{CompareSettings, VisualRegressionConfig};
pub use launcher::{RunContext, VisualRegression};
pub use resolution::{Orientation, Resolution, ResolutionMode, Viewport};
pub use screenshot::{
    Capture, CaptureType, CapturedImage, CheckOptions, ScreenshotContext, TestDetails,
};
pub use session::Session;
pub use storage::{FsStorage, Storage};
