mod args;

use anyhow::Result;
use serde::Serialize;
use std::{fmt::Write as _, sync::Arc};
use tracing::warn;
use tsync_core::{BatchSummary, DeviceSyncReport, Error, LocalDispatcher, SkipReason};

use crate::context::{Context, OutputFormat};

pub use self::args::UploadArgs;

type DeviceResults = [(String, Result<DeviceSyncReport, Error>)];

/// Fused run: every device is synced in this process before returning.
pub async fn run(ctx: &Context, args: UploadArgs) -> Result<()> {
	let credentials = ctx.read_uploads(&args.files).await?;
	let orchestrator = ctx.orchestrator().await?;

	let report = orchestrator.run_batch(credentials).await;

	print!("{}", render_results(ctx.format, &report.devices)?);

	if ctx.format == OutputFormat::Human {
		println!(
			"{} device(s) processed, {} failed, {} observation(s) forwarded",
			report.devices_processed(),
			report.devices_failed(),
			report.observations_forwarded()
		);
	}

	fail_on_errors(report.devices_failed())
}

/// Two-phase run: windows are computed and devices triggered first, then the local dispatcher
/// runs them.
pub async fn trigger(ctx: &Context, args: UploadArgs) -> Result<()> {
	let credentials = ctx.read_uploads(&args.files).await?;
	let orchestrator = ctx.orchestrator().await?;
	let dispatcher = LocalDispatcher::new(Arc::clone(&orchestrator));

	let summary = match orchestrator.trigger_batch(credentials, &dispatcher).await {
		Ok(summary) => summary,
		Err(e) => {
			// Devices triggered before the failure still run to completion
			dispatcher.join().await;
			return Err(e.into());
		}
	};

	print!("{}", render_summary(ctx.format, &summary)?);

	let results = {
		let join = dispatcher.join();
		tokio::pin!(join);

		tokio::select! {
			results = &mut join => results,
			_ = tokio::signal::ctrl_c() => {
				warn!("Interrupted, letting running devices finish and dropping queued ones");
				dispatcher.close();
				join.await
			}
		}
	};

	print!("{}", render_results(ctx.format, &results)?);

	fail_on_errors(
		summary.devices_failed() + results.iter().filter(|(_, res)| res.is_err()).count(),
	)
}

#[derive(Serialize)]
struct DeviceRow<'a> {
	device_id: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	report: Option<&'a DeviceSyncReport>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
	devices_triggered: usize,
	duplicates_skipped: usize,
	failed: Vec<DeviceRow<'a>>,
}

fn render_summary(format: OutputFormat, summary: &BatchSummary) -> Result<String> {
	let mut out = String::new();

	match format {
		OutputFormat::Human => {
			writeln!(out, "{} device(s) triggered", summary.devices_triggered)?;
			if summary.duplicates_skipped > 0 {
				writeln!(
					out,
					"{} repeated device id(s) skipped",
					summary.duplicates_skipped
				)?;
			}
			for (device_id, e) in &summary.failed {
				writeln!(out, "- {device_id}: NOT TRIGGERED: {e}")?;
			}
		}
		OutputFormat::Json => {
			let row = SummaryRow {
				devices_triggered: summary.devices_triggered,
				duplicates_skipped: summary.duplicates_skipped,
				failed: summary
					.failed
					.iter()
					.map(|(device_id, e)| DeviceRow {
						device_id,
						report: None,
						error: Some(e.to_string()),
					})
					.collect(),
			};
			writeln!(out, "{}", serde_json::to_string_pretty(&row)?)?;
		}
	}

	Ok(out)
}

fn render_results(format: OutputFormat, results: &DeviceResults) -> Result<String> {
	let mut out = String::new();

	match format {
		OutputFormat::Human => {
			for (device_id, res) in results {
				match res {
					Ok(DeviceSyncReport {
						skipped: Some(reason),
						..
					}) => {
						let reason = match reason {
							SkipReason::Forbidden => "access denied",
							SkipReason::NotFound => "unknown device",
						};
						writeln!(out, "- {device_id}: skipped ({reason})")?;
					}
					Ok(report) => writeln!(
						out,
						"- {device_id}: extracted {}, forwarded {}, cursor {}",
						report.observations_extracted,
						report.observations_forwarded,
						report
							.cursor
							.map_or_else(|| "(not set)".to_string(), |c| c.to_rfc3339())
					)?,
					Err(e) => writeln!(out, "- {device_id}: FAILED: {e}")?,
				}
			}
		}
		OutputFormat::Json => {
			let rows = results
				.iter()
				.map(|(device_id, res)| DeviceRow {
					device_id,
					report: res.as_ref().ok(),
					error: res.as_ref().err().map(ToString::to_string),
				})
				.collect::<Vec<_>>();

			writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
		}
	}

	Ok(out)
}

fn fail_on_errors(failed: usize) -> Result<()> {
	if failed > 0 {
		anyhow::bail!("{failed} device(s) failed, their cursors were left in place");
	}

	Ok(())
}
