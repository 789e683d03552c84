use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::screenshot::{CapturedImage, ScreenshotContext};
use crate::session::Session;

/// Browser viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Device orientation for mobile sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

/// One entry of the resolution matrix
///
/// Serializes as `{"viewport": {"width": .., "height": ..}}` or
/// `{"orientation": "portrait"}` so naming functions can key on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Viewport(Viewport),
    Orientation(Orientation),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Viewport(viewport) => viewport.fmt(f),
            Resolution::Orientation(orientation) => orientation.fmt(f),
        }
    }
}

/// Resolution matrix of a session, picked once from its mobile flag
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionMode {
    Viewport(Vec<Viewport>),
    Orientation(Vec<Orientation>),
}

impl ResolutionMode {
    pub fn resolve(is_mobile: bool, viewports: &[Viewport], orientations: &[Orientation]) -> Self {
        if is_mobile {
            ResolutionMode::Orientation(orientations.to_vec())
        } else {
            ResolutionMode::Viewport(viewports.to_vec())
        }
    }

    /// Resolutions to check for one command; a per-call list of the matching
    /// kind replaces the configured one entirely
    pub fn select(
        &self,
        viewports: Option<&[Viewport]>,
        orientations: Option<&[Orientation]>,
    ) -> Vec<Resolution> {
        match self {
            ResolutionMode::Viewport(default) => viewports
                .unwrap_or(default)
                .iter()
                .copied()
                .map(Resolution::Viewport)
                .collect(),
            ResolutionMode::Orientation(default) => orientations
                .unwrap_or(default)
                .iter()
                .copied()
                .map(Resolution::Orientation)
                .collect(),
        }
    }
}

/// Capture and process halves of a multi-resolution check
#[allow(async_fn_in_trait)]
pub trait ResolutionPipeline<S> {
    type Output;

    /// Takes the screenshot for `resolution`, which is already applied to the session
    async fn capture(
        &mut self,
        session: &mut S,
        resolution: &Resolution,
    ) -> Result<(ScreenshotContext, CapturedImage)>;

    async fn process(
        &mut self,
        context: ScreenshotContext,
        image: CapturedImage,
    ) -> Result<Self::Output>;
}

/// Applies each resolution in turn, waits for the layout to settle, then
/// captures and processes a screenshot.
///
/// Resolutions run strictly one after another since they all mutate the same
/// session. The first failure aborts the whole run and nothing collected so
/// far is returned.
pub async fn iterate<S, P>(
    session: &mut S,
    settle_delay: Duration,
    resolutions: &[Resolution],
    pipeline: &mut P,
) -> Result<Vec<P::Output>>
where
    S: Session,
    P: ResolutionPipeline<S>,
{
    if resolutions.is_empty() {
        return Err(Error::Configuration(
            "at least one viewport or orientation is required".to_string(),
        ));
    }

    let mut results = Vec::with_capacity(resolutions.len());
    for (index, resolution) in resolutions.iter().enumerate() {
        debug!("Resolution {}/{}: {}", index + 1, resolutions.len(), resolution);
        session
            .apply_resolution(resolution)
            .await
            .map_err(|e| Error::capture(Some(resolution), e))?;

        trace!("Waiting {:?} for layout to settle", settle_delay);
        sleep(settle_delay).await;

        let (context, image) = pipeline.capture(session, resolution).await?;
        results.push(pipeline.process(context, image).await?);
    }

    info!("Checked {} resolutions", results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screenshot::CaptureType;
    use anyhow::anyhow;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingSession {
        mobile: bool,
        calls: Vec<String>,
        fail_on: Option<Resolution>,
    }

    impl Session for RecordingSession {
        async fn get_url(&mut self) -> anyhow::Result<String> {
            Ok("http://localhost/".to_string())
        }

        async fn execute(&mut self, _script: &str, _args: Vec<Value>) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        fn is_mobile(&self) -> bool {
            self.mobile
        }

        async fn set_viewport_size(&mut self, viewport: Viewport) -> anyhow::Result<()> {
            if self.fail_on == Some(Resolution::Viewport(viewport)) {
                return Err(anyhow!("window manager refused"));
            }
            self.calls.push(format!("resize {}", viewport));
            Ok(())
        }

        async fn set_orientation(&mut self, orientation: Orientation) -> anyhow::Result<()> {
            self.calls.push(format!("rotate {}", orientation));
            Ok(())
        }
    }

    /// Captures with a per-resolution latency and echoes the resolution back
    #[derive(Default)]
    struct EchoPipeline {
        latencies_ms: Vec<u64>,
        fail_capture_at: Option<usize>,
        captured: usize,
        processed: Vec<String>,
    }

    impl ResolutionPipeline<RecordingSession> for EchoPipeline {
        type Output = String;

        async fn capture(
            &mut self,
            session: &mut RecordingSession,
            resolution: &Resolution,
        ) -> Result<(ScreenshotContext, CapturedImage)> {
            let index = self.captured;
            self.captured += 1;
            if let Some(latency) = self.latencies_ms.get(index) {
                sleep(Duration::from_millis(*latency)).await;
            }
            if self.fail_capture_at == Some(index) {
                return Err(Error::capture(Some(resolution), anyhow!("screenshot timed out")));
            }
            session.calls.push(format!("capture {}", resolution));
            let context = ScreenshotContext::builder(CaptureType::Viewport, *resolution)
                .url("http://localhost/")
                .build();
            Ok((context, CapturedImage::new(resolution.to_string())))
        }

        async fn process(
            &mut self,
            context: ScreenshotContext,
            image: CapturedImage,
        ) -> Result<String> {
            self.processed.push(image.as_base64().to_string());
            Ok(context.meta.resolution.to_string())
        }
    }

    fn viewports(sizes: &[(u32, u32)]) -> Vec<Resolution> {
        sizes
            .iter()
            .map(|(w, h)| Resolution::Viewport(Viewport::new(*w, *h)))
            .collect()
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let mut session = RecordingSession::default();
        let mut pipeline = EchoPipeline {
            latencies_ms: vec![30, 1, 15],
            ..Default::default()
        };
        let resolutions = viewports(&[(1024, 768), (600, 1000), (320, 480)]);

        let results = iterate(&mut session, Duration::from_millis(1), &resolutions, &mut pipeline)
            .await
            .unwrap();

        assert_eq!(results, vec!["1024x768", "600x1000", "320x480"]);
        assert_eq!(
            session.calls,
            vec![
                "resize 1024x768",
                "capture 1024x768",
                "resize 600x1000",
                "capture 600x1000",
                "resize 320x480",
                "capture 320x480",
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_failure_aborts_run() {
        let mut session = RecordingSession::default();
        let mut pipeline = EchoPipeline {
            fail_capture_at: Some(1),
            ..Default::default()
        };
        let resolutions = viewports(&[(1024, 768), (600, 1000), (320, 480)]);

        let err = iterate(&mut session, Duration::ZERO, &resolutions, &mut pipeline)
            .await
            .unwrap_err();

        match err {
            Error::Capture { resolution, .. } => {
                assert_eq!(resolution, Some(Resolution::Viewport(Viewport::new(600, 1000))));
            }
            other => panic!("expected capture error, got {other:?}"),
        }
        assert_eq!(pipeline.processed, vec!["1024x768"]);
        assert!(!session.calls.iter().any(|c| c.contains("320x480")));
    }

    #[tokio::test]
    async fn test_apply_failure_carries_resolution() {
        let mut session = RecordingSession {
            fail_on: Some(Resolution::Viewport(Viewport::new(320, 480))),
            ..Default::default()
        };
        let mut pipeline = EchoPipeline::default();
        let resolutions = viewports(&[(600, 1000), (320, 480)]);

        let err = iterate(&mut session, Duration::ZERO, &resolutions, &mut pipeline)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("320x480"));
        assert_eq!(pipeline.captured, 1);
    }

    #[tokio::test]
    async fn test_orientations_rotate_device() {
        let mut session = RecordingSession {
            mobile: true,
            ..Default::default()
        };
        let mode = ResolutionMode::resolve(
            session.is_mobile(),
            &[Viewport::new(1280, 800)],
            &[Orientation::Portrait, Orientation::Landscape],
        );
        let resolutions = mode.select(None, None);
        let mut pipeline = EchoPipeline::default();

        let results = iterate(&mut session, Duration::ZERO, &resolutions, &mut pipeline)
            .await
            .unwrap();

        assert_eq!(results, vec!["portrait", "landscape"]);
        assert_eq!(session.calls[0], "rotate portrait");
        assert_eq!(session.calls[2], "rotate landscape");
    }

    #[tokio::test]
    async fn test_empty_resolutions_rejected() {
        let mut session = RecordingSession::default();
        let mut pipeline = EchoPipeline::default();

        let err = iterate(&mut session, Duration::ZERO, &[], &mut pipeline)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_override_replaces_configured_list() {
        let mode = ResolutionMode::Viewport(vec![Viewport::new(1280, 800)]);
        let custom = [Viewport::new(320, 480), Viewport::new(768, 1024)];

        assert_eq!(mode.select(None, None), viewports(&[(1280, 800)]));
        assert_eq!(
            mode.select(Some(&custom), None),
            viewports(&[(320, 480), (768, 1024)])
        );
        // an orientation override means nothing to a desktop session
        assert_eq!(
            mode.select(None, Some(&[Orientation::Landscape])),
            viewports(&[(1280, 800)])
        );
    }

    #[test]
    fn test_resolution_serializes_by_kind() {
        let viewport = serde_json::to_value(Resolution::Viewport(Viewport::new(600, 1000))).unwrap();
        assert_eq!(viewport, serde_json::json!({"viewport": {"width": 600, "height": 1000}}));

        let orientation = serde_json::to_value(Resolution::Orientation(Orientation::Portrait)).unwrap();
        assert_eq!(orientation, serde_json::json!({"orientation": "portrait"}));
    }
}
