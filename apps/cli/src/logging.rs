use anyhow::{Context as _, Result};
use std::{fs, path::Path};
use tracing_appender::{
	non_blocking::WorkerGuard,
	rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs to stderr and to a daily rotated `tsync.log` in `logs_dir`.
///
/// `RUST_LOG` wins over `default_filter`. Keep the returned guard alive until exit or buffered
/// file lines are lost.
pub fn init(logs_dir: &Path, default_filter: &str) -> Result<WorkerGuard> {
	fs::create_dir_all(logs_dir)
		.with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

	let (file_writer, guard) = tracing_appender::non_blocking(RollingFileAppender::new(
		Rotation::DAILY,
		logs_dir,
		"tsync.log",
	));

	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_filter))
		.context("Invalid log filter")?;

	tracing_subscriber::registry()
		.with(filter)
		// stdout is reserved for command output
		.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
		.with(
			fmt::layer()
				.with_target(true)
				.with_thread_ids(true)
				.with_ansi(false)
				.with_writer(file_writer),
		)
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(guard)
}
