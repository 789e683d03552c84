use anyhow::Result;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global tracing subscriber
///
/// With a `log_dir` the output goes to a timestamped file inside it,
/// otherwise to stderr. `RUST_LOG` controls the filter, defaulting to `info`.
pub fn init_logger(log_dir: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    match log_dir {
        Some(log_dir) => {
            if !Path::new(log_dir).exists() {
                fs::create_dir_all(log_dir)?;
            }
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            let log_file = Path::new(log_dir).join(format!("visual_regression_{}.log", timestamp));
            let subscriber = builder
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(fs::File::create(&log_file)?)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
            info!("Logging to {}", log_file.display());
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
