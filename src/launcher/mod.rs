pub mod config;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::compare::{CompareStrategy, ComparisonResult};
use crate::error::{Error, Result};
use crate::launcher::config::VisualRegressionConfig;
use crate::resolution::{iterate, Resolution, ResolutionMode, ResolutionPipeline};
use crate::screenshot::{
    self, regions, BrowserInfo, Capture, CaptureType, CapturedImage, CheckOptions,
    ScreenshotContext, TestDetails,
};
use crate::session::{Session, USER_AGENT_SCRIPT};

/// Session-wide details handed to the compare strategy's `before` hook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub browser: BrowserInfo,
    pub desired_capabilities: Map<String, Value>,
}

#[derive(Debug)]
struct SessionState {
    context: RunContext,
    mode: ResolutionMode,
}

/// Runs element, document and viewport checks against one browser session
///
/// Call [`VisualRegression::before`] once the session is up; the check
/// commands refuse to run until then.
#[derive(Debug)]
pub struct VisualRegression<C> {
    config: VisualRegressionConfig,
    compare: C,
    session: Option<SessionState>,
}

impl<C: CompareStrategy> VisualRegression<C> {
    pub fn new(config: VisualRegressionConfig, compare: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            compare,
            session: None,
        })
    }

    pub fn config(&self) -> &VisualRegressionConfig {
        &self.config
    }

    pub fn compare(&self) -> &C {
        &self.compare
    }

    /// Runs once before any session is started
    pub async fn on_prepare(&self) -> Result<()> {
        debug!("Running on_prepare hook");
        self.compare.on_prepare().await
    }

    /// Probes the browser and fixes the resolution mode for this session
    pub async fn before<S: Session>(
        &mut self,
        session: &mut S,
        desired_capabilities: Map<String, Value>,
    ) -> Result<()> {
        let user_agent = session
            .execute(USER_AGENT_SCRIPT, Vec::new())
            .await
            .map_err(|e| Error::capture(None, e))?;
        let browser = BrowserInfo {
            name: capability(&desired_capabilities, &["browserName"]),
            version: capability(&desired_capabilities, &["browserVersion", "version"]),
            user_agent: user_agent.as_str().map(str::to_string),
        };

        let mode = ResolutionMode::resolve(
            session.is_mobile(),
            &self.config.viewports,
            &self.config.orientations,
        );
        let configured = match &mode {
            ResolutionMode::Viewport(viewports) => viewports.len(),
            ResolutionMode::Orientation(orientations) => orientations.len(),
        };
        if configured == 0 {
            return Err(Error::Configuration(format!(
                "no {} configured for this session",
                if session.is_mobile() { "orientations" } else { "viewports" }
            )));
        }
        info!("Session ready: {:?} on {:?}", browser.name, mode);

        let context = RunContext {
            browser,
            desired_capabilities,
        };
        self.compare.before(&context).await?;
        self.session = Some(SessionState { context, mode });
        Ok(())
    }

    /// Checks one element, matched by CSS `selector`, at every resolution
    pub async fn check_element<S: Session + Capture>(
        &self,
        session: &mut S,
        test: &TestDetails,
        selector: &str,
        options: &CheckOptions,
    ) -> Result<Vec<ComparisonResult>> {
        self.check(session, test, CaptureType::Element, Some(selector), options)
            .await
    }

    /// Checks the whole scrollable document at every resolution
    pub async fn check_document<S: Session + Capture>(
        &self,
        session: &mut S,
        test: &TestDetails,
        options: &CheckOptions,
    ) -> Result<Vec<ComparisonResult>> {
        self.check(session, test, CaptureType::Document, None, options).await
    }

    /// Checks the visible viewport at every resolution
    pub async fn check_viewport<S: Session + Capture>(
        &self,
        session: &mut S,
        test: &TestDetails,
        options: &CheckOptions,
    ) -> Result<Vec<ComparisonResult>> {
        self.check(session, test, CaptureType::Viewport, None, options).await
    }

    /// Runs once the session's tests are done
    pub async fn after(&mut self) -> Result<()> {
        debug!("Running after hook");
        self.session = None;
        self.compare.after().await
    }

    /// Runs once before the process exits
    pub async fn on_complete(&self) -> Result<()> {
        debug!("Running on_complete hook");
        self.compare.on_complete().await
    }

    /// Runs [`after`](Self::after) and then [`on_complete`](Self::on_complete)
    ///
    /// `on_complete` runs even when `after` fails; the first error is returned.
    pub async fn finish(&mut self) -> Result<()> {
        let after = self.after().await;
        if let Err(e) = &after {
            warn!("after hook failed: {}", e);
        }
        let complete = self.on_complete().await;
        after.and(complete)
    }

    #[instrument(skip(self, session, test, options), fields(test = ?test.test))]
    async fn check<S: Session + Capture>(
        &self,
        session: &mut S,
        test: &TestDetails,
        capture_type: CaptureType,
        selector: Option<&str>,
        options: &CheckOptions,
    ) -> Result<Vec<ComparisonResult>> {
        let state = self.session.as_ref().ok_or_else(|| {
            Error::Configuration("before() must run before any check command".to_string())
        })?;
        options.validate()?;

        let url = session.get_url().await.map_err(|e| Error::capture(None, e))?;
        let resolutions = state
            .mode
            .select(options.viewports.as_deref(), options.orientations.as_deref());
        let pause = options
            .viewport_change_pause
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.viewport_change_pause());
        info!(
            "Checking {} of {} at {} resolutions",
            capture_type,
            url,
            resolutions.len()
        );

        let mut pipeline = CheckPipeline {
            compare: &self.compare,
            run: &state.context,
            test,
            capture_type,
            selector,
            options,
            url,
        };
        let results = iterate(session, pause, &resolutions, &mut pipeline).await?;

        let failed = results.iter().filter(|r| !r.is_match()).count();
        if failed > 0 {
            warn!("{} of {} screenshots differ from their reference", failed, results.len());
        }
        Ok(results)
    }
}

fn capability(capabilities: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| capabilities.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Capture and compare steps of one check command
struct CheckPipeline<'a, C> {
    compare: &'a C,
    run: &'a RunContext,
    test: &'a TestDetails,
    capture_type: CaptureType,
    selector: Option<&'a str>,
    options: &'a CheckOptions,
    url: String,
}

impl<'a, C, S> ResolutionPipeline<S> for CheckPipeline<'a, C>
where
    C: CompareStrategy,
    S: Session + Capture,
{
    type Output = ComparisonResult;

    async fn capture(
        &mut self,
        session: &mut S,
        resolution: &Resolution,
    ) -> Result<(ScreenshotContext, CapturedImage)> {
        let context = ScreenshotContext::builder(self.capture_type, *resolution)
            .url(self.url.as_str())
            .element(self.selector)
            .browser(self.run.browser.clone())
            .desired_capabilities(self.run.desired_capabilities.clone())
            .test(self.test)
            .options(self.options)
            .build();

        self.compare.before_screenshot(&context).await?;

        if let Err(e) = regions::conceal(session, &context.meta).await {
            // styles applied before the failure must not leak into later captures
            if let Err(restore) = regions::reveal(session, &context.meta).await {
                warn!("Failed to restore page styles: {:#}", restore);
            }
            return Err(Error::capture(Some(resolution), e));
        }
        let captured = async {
            let image =
                screenshot::capture(session, self.capture_type, self.selector, self.options).await?;
            let rects = regions::excluded_rects(session, self.capture_type, &context.meta).await?;
            regions::paint(&image, &rects)
        }
        .await;
        let revealed = regions::reveal(session, &context.meta).await;
        let image = captured.map_err(|e| Error::capture(Some(resolution), e))?;
        revealed.map_err(|e| Error::capture(Some(resolution), e))?;

        self.compare.after_screenshot(&context, &image).await?;
        Ok((context, image))
    }

    async fn process(
        &mut self,
        context: ScreenshotContext,
        image: CapturedImage,
    ) -> Result<ComparisonResult> {
        self.compare.process_screenshot(&context, &image).await
    }
}
