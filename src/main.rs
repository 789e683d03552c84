use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use visual_regression::screenshot::webdriver::WebDriverSession;
use visual_regression::utils::logger::init_logger;
use visual_regression::{
    CheckOptions, ComparisonResult, LocalCompare, TestDetails, VisualRegression,
    VisualRegressionConfig,
};

/// Checks a page against its reference screenshots
#[derive(Debug, Parser)]
#[command(name = "visual_regression", version)]
struct Args {
    /// Page to check
    url: String,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Check this element instead of the whole document
    #[arg(short, long)]
    selector: Option<String>,

    /// Check only the visible viewport instead of the whole document
    #[arg(long, conflicts_with = "selector")]
    viewport: bool,

    #[arg(long, default_value = "cli")]
    suite: String,

    #[arg(long, default_value = "page")]
    test: String,

    /// Selectors painted over in the capture
    #[arg(long)]
    exclude: Vec<String>,

    /// Selectors hidden during the capture
    #[arg(long)]
    hide: Vec<String>,

    /// Selectors removed from the layout during the capture
    #[arg(long)]
    remove: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = VisualRegressionConfig::load(args.config.as_deref())?;
    init_logger(config.log_dir.as_deref())?;

    let mut session = WebDriverSession::connect(
        &config.webdriver_url,
        config.headless,
        config.mobile_device.as_deref(),
        config.initial_viewport(),
    )
    .await?;

    let outcome = run(&args, config, &mut session).await;
    if let Err(e) = session.close().await {
        error!("Failed to close session: {:#}", e);
    }
    let results = outcome?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    let failed = results.iter().filter(|r| !r.is_match()).count();
    if failed > 0 {
        bail!("{} of {} screenshots differ from their reference", failed, results.len());
    }
    Ok(())
}

async fn run(
    args: &Args,
    config: VisualRegressionConfig,
    session: &mut WebDriverSession,
) -> Result<Vec<ComparisonResult>> {
    let compare = LocalCompare::from_settings(&config.compare)?;
    let mut regression = VisualRegression::new(config, compare)?;
    regression.on_prepare().await?;

    let outcome = check(args, &mut regression, session).await;
    let finished = regression.finish().await;
    let results = outcome?;
    finished?;
    Ok(results)
}

async fn check(
    args: &Args,
    regression: &mut VisualRegression<LocalCompare>,
    session: &mut WebDriverSession,
) -> Result<Vec<ComparisonResult>> {
    session.goto(&args.url).await?;
    let capabilities = session.desired_capabilities().clone();
    regression.before(session, capabilities).await?;

    let test = TestDetails::new(&args.suite, &args.test);
    let mut options = CheckOptions::default();
    options.exclude = args.exclude.clone();
    options.hide = args.hide.clone();
    options.remove = args.remove.clone();

    info!("Checking {}", args.url);
    let results = match &args.selector {
        Some(selector) => regression.check_element(session, &test, selector, &options).await,
        None if args.viewport => regression.check_viewport(session, &test, &options).await,
        None => regression.check_document(session, &test, &options).await,
    }
    .with_context(|| format!("Check of {} failed", args.url))?;
    Ok(results)
}
