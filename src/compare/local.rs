use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use crate::compare::diff::{ImageComparator, ResembleComparator};
use crate::compare::naming::Naming;
use crate::compare::{CompareStrategy, ComparisonResult, IgnoreStrategy};
use crate::error::{Error, Result};
use crate::launcher::config::CompareSettings;
use crate::screenshot::{CapturedImage, ScreenshotContext};
use crate::storage::{FsStorage, Storage};

/// Tolerance used when neither the call nor the strategy sets one
pub const DEFAULT_MIS_MATCH_TOLERANCE: f64 = 0.01;

/// Compares screenshots against reference images kept on disk
///
/// The first capture for a context becomes its reference. Later captures are
/// diffed against it; a diff image is kept while they differ beyond the
/// tolerance and removed once they match again. References are never
/// replaced.
#[derive(Debug)]
pub struct LocalCompare<C = ResembleComparator, S = FsStorage> {
    naming: Naming,
    mis_match_tolerance: f64,
    ignore_comparison: IgnoreStrategy,
    comparator: C,
    storage: S,
}

impl LocalCompare {
    pub fn builder() -> LocalCompareBuilder {
        LocalCompareBuilder::default()
    }

    /// Strategy keeping artifacts in the configured directories
    pub fn from_settings(settings: &CompareSettings) -> Result<Self> {
        settings.validate()?;
        Self::builder()
            .naming(Naming::in_directories(
                &settings.screenshot_dir,
                &settings.reference_dir,
                &settings.diff_dir,
            ))
            .mis_match_tolerance(settings.mis_match_tolerance)
            .ignore_comparison(settings.ignore_comparison)
            .build()
    }
}

impl<C, S> LocalCompare<C, S> {
    pub fn with_comparator<C2: ImageComparator>(self, comparator: C2) -> LocalCompare<C2, S> {
        LocalCompare {
            naming: self.naming,
            mis_match_tolerance: self.mis_match_tolerance,
            ignore_comparison: self.ignore_comparison,
            comparator,
            storage: self.storage,
        }
    }

    pub fn with_storage<S2: Storage>(self, storage: S2) -> LocalCompare<C, S2> {
        LocalCompare {
            naming: self.naming,
            mis_match_tolerance: self.mis_match_tolerance,
            ignore_comparison: self.ignore_comparison,
            comparator: self.comparator,
            storage,
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }
}

impl<C: ImageComparator, S: Storage> LocalCompare<C, S> {
    async fn compare_with_reference(
        &self,
        context: &ScreenshotContext,
        reference_path: PathBuf,
        captured: &[u8],
    ) -> Result<ComparisonResult> {
        let reference = self.storage.read(&reference_path).await?;
        let ignore = context.ignore_comparison().unwrap_or(self.ignore_comparison);
        let report = self.comparator.compare(&reference, captured, ignore)?;

        let mis_match_percentage = report.mis_match_percentage();
        let is_same_dimensions = report.is_same_dimensions;
        let tolerance = context.tolerance().unwrap_or(self.mis_match_tolerance);
        let is_within_tolerance = mis_match_percentage < tolerance;

        let diff_path = self.naming.diff_path(context);
        if is_same_dimensions && is_within_tolerance {
            debug!("Image is within tolerance or the same");
            self.storage.remove_file(&diff_path).await?;
        } else {
            warn!(
                "Image is different! {}% (tolerance {}%, same dimensions: {})",
                mis_match_percentage, tolerance, is_same_dimensions
            );
            let png = report.into_png()?;
            self.storage.write_file(&diff_path, &png).await?;
            debug!("Diff written to {}", diff_path.display());
        }

        Ok(ComparisonResult {
            mis_match_percentage,
            is_within_tolerance,
            is_same_dimensions,
            reference_existed: true,
        })
    }
}

impl<C: ImageComparator, S: Storage> CompareStrategy for LocalCompare<C, S> {
    #[instrument(skip_all, fields(resolution = %context.meta.resolution))]
    async fn process_screenshot(
        &self,
        context: &ScreenshotContext,
        image: &CapturedImage,
    ) -> Result<ComparisonResult> {
        let captured = image.decode()?;
        let screenshot_path = self.naming.screenshot_path(context);
        let reference_path = self.naming.reference_path(context);

        self.storage.write_file(&screenshot_path, &captured).await?;

        if self.storage.exists(&reference_path).await? {
            debug!("Reference exists, comparing it with the new capture");
            self.compare_with_reference(context, reference_path, &captured).await
        } else {
            info!("First run, creating reference {}", reference_path.display());
            self.storage.write_file(&reference_path, &captured).await?;
            Ok(ComparisonResult::bootstrapped())
        }
    }
}

/// Collects the injected naming functions and defaults for [`LocalCompare`]
#[derive(Default)]
pub struct LocalCompareBuilder {
    naming: Option<Naming>,
    mis_match_tolerance: Option<f64>,
    ignore_comparison: Option<IgnoreStrategy>,
}

impl LocalCompareBuilder {
    pub fn naming(mut self, naming: Naming) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn mis_match_tolerance(mut self, tolerance: f64) -> Self {
        self.mis_match_tolerance = Some(tolerance);
        self
    }

    pub fn ignore_comparison(mut self, strategy: impl Into<IgnoreStrategy>) -> Self {
        self.ignore_comparison = Some(strategy.into());
        self
    }

    pub fn build(self) -> Result<LocalCompare> {
        let naming = self.naming.ok_or_else(|| {
            Error::Configuration("LocalCompare needs screenshot, reference and diff naming".to_string())
        })?;
        let mis_match_tolerance = self.mis_match_tolerance.unwrap_or(DEFAULT_MIS_MATCH_TOLERANCE);
        if !(mis_match_tolerance > 0.0 && mis_match_tolerance <= 100.0) {
            return Err(Error::Configuration(format!(
                "mis_match_tolerance must be in (0, 100], got {}",
                mis_match_tolerance
            )));
        }
        Ok(LocalCompare {
            naming,
            mis_match_tolerance,
            ignore_comparison: self.ignore_comparison.unwrap_or_default(),
            comparator: ResembleComparator,
            storage: FsStorage,
        })
    }
}
