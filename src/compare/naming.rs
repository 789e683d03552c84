use sanitize_filename::sanitize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::screenshot::ScreenshotContext;
use crate::utils::to_snake_case;

/// Bytes of the identity digest kept in file names
const DIGEST_BYTES: usize = 6;

type NameFn = Box<dyn Fn(&ScreenshotContext) -> PathBuf + Send + Sync>;

/// Artifact paths for a screenshot context
pub struct Naming {
    screenshot: NameFn,
    reference: NameFn,
    diff: NameFn,
}

impl fmt::Debug for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Naming").finish_non_exhaustive()
    }
}

impl Naming {
    pub fn new(
        screenshot: impl Fn(&ScreenshotContext) -> PathBuf + Send + Sync + 'static,
        reference: impl Fn(&ScreenshotContext) -> PathBuf + Send + Sync + 'static,
        diff: impl Fn(&ScreenshotContext) -> PathBuf + Send + Sync + 'static,
    ) -> Self {
        Self {
            screenshot: Box::new(screenshot),
            reference: Box::new(reference),
            diff: Box::new(diff),
        }
    }

    /// Same [`file_name`] in one directory per artifact kind
    pub fn in_directories(
        screenshot_dir: impl AsRef<Path>,
        reference_dir: impl AsRef<Path>,
        diff_dir: impl AsRef<Path>,
    ) -> Self {
        let in_dir = |dir: &Path| {
            let dir = dir.to_path_buf();
            move |context: &ScreenshotContext| dir.join(file_name(context))
        };
        Self::new(
            in_dir(screenshot_dir.as_ref()),
            in_dir(reference_dir.as_ref()),
            in_dir(diff_dir.as_ref()),
        )
    }

    pub fn screenshot_path(&self, context: &ScreenshotContext) -> PathBuf {
        (self.screenshot)(context)
    }

    pub fn reference_path(&self, context: &ScreenshotContext) -> PathBuf {
        (self.reference)(context)
    }

    pub fn diff_path(&self, context: &ScreenshotContext) -> PathBuf {
        (self.diff)(context)
    }
}

/// File name unique per suite, test, capture type, element, browser and resolution
///
/// The readable stem is lossy, so a digest of the raw parts is appended to
/// keep distinct identities on distinct files.
pub fn file_name(context: &ScreenshotContext) -> String {
    let parts = [
        context.suite.clone(),
        context.test.clone(),
        Some(context.capture_type.to_string()),
        context.meta.element.clone(),
        context.browser.name.clone(),
        Some(context.meta.resolution.to_string()),
    ];

    let stem = parts
        .iter()
        .flatten()
        .map(|part| to_snake_case(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    sanitize(format!("{}_{}.png", stem, identity_digest(&parts)))
}

fn identity_digest(parts: &[Option<String>]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        match part {
            Some(part) => {
                hasher.update([1u8]);
                hasher.update((part.len() as u64).to_le_bytes());
                hasher.update(part.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    let digest = hasher.finalize();
    digest[..DIGEST_BYTES].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{Orientation, Resolution, Viewport};
    use crate::screenshot::{BrowserInfo, CaptureType, TestDetails};

    fn context(capture_type: CaptureType, resolution: Resolution) -> ScreenshotContext {
        ScreenshotContext::builder(capture_type, resolution)
            .test(&TestDetails::new("Landing Page", "shows the hero"))
            .build()
    }

    fn stem(name: &str) -> &str {
        let (stem, digest) = name
            .strip_suffix(".png")
            .and_then(|n| n.rsplit_once('_'))
            .unwrap();
        assert_eq!(digest.len(), DIGEST_BYTES * 2);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        stem
    }

    fn element(selector: &str) -> ScreenshotContext {
        ScreenshotContext::builder(CaptureType::Element, Resolution::Viewport(Viewport::new(600, 1000)))
            .element(Some(selector))
            .build()
    }

    #[test]
    fn test_file_name_covers_identity() {
        let ctx = context(CaptureType::Document, Resolution::Viewport(Viewport::new(600, 1000)));
        assert_eq!(stem(&file_name(&ctx)), "landing_page_shows_the_hero_document_600x1000");
        assert_eq!(file_name(&ctx), file_name(&ctx.clone()));

        let ctx = ScreenshotContext::builder(
            CaptureType::Element,
            Resolution::Orientation(Orientation::Landscape),
        )
        .element(Some("#main > .card"))
        .browser(BrowserInfo {
            name: Some("Chrome".to_string()),
            ..Default::default()
        })
        .build();
        assert_eq!(stem(&file_name(&ctx)), "element_main_card_chrome_landscape");
    }

    #[test]
    fn test_lossy_stems_stay_distinct() {
        let document = |suite: &str, test: &str| {
            ScreenshotContext::builder(CaptureType::Document, Resolution::Viewport(Viewport::new(600, 1000)))
                .test(&TestDetails::new(suite, test))
                .build()
        };

        let login = file_name(&document("ログイン", "表示"));
        let search = file_name(&document("検索", "結果"));
        assert_eq!(stem(&login), "ログイン_表示_document_600x1000");
        assert_ne!(login, search);

        assert_ne!(file_name(&element("#main > .card")), file_name(&element("#main .card")));
        assert_ne!(file_name(&element(".nav-item")), file_name(&element(".nav_item")));
        assert_ne!(file_name(&document("a b", "c")), file_name(&document("a", "b c")));
        assert_eq!(stem(&file_name(&document("a b", "c"))), stem(&file_name(&document("a", "b c"))));
    }

    #[test]
    fn test_distinct_resolutions_get_distinct_paths() {
        let naming = Naming::in_directories("shots", "refs", "diffs");
        let wide = context(CaptureType::Viewport, Resolution::Viewport(Viewport::new(1280, 800)));
        let narrow = context(CaptureType::Viewport, Resolution::Viewport(Viewport::new(320, 480)));

        assert_ne!(naming.reference_path(&wide), naming.reference_path(&narrow));
        assert_eq!(naming.diff_path(&wide), PathBuf::from("diffs").join(file_name(&wide)));
        assert!(naming.screenshot_path(&narrow).starts_with("shots"));
    }
}
