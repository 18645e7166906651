use crate::{
	batch,
	config::SyncConfig,
	credentials::CredentialSet,
	cursor::{CursorKey, CursorStore},
	dispatch::{DeviceSyncTask, Dispatcher, FETCH_TASK_NAME},
	forwarder::Forwarder,
	locks::DeviceLocks,
	observation::transform,
	upstream::UpstreamClient,
	window::SyncWindow,
	Error,
};

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use tsync_source_api::Outcome;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
	Forbidden,
	NotFound,
}

/// What a single device's run did.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceSyncReport {
	pub device_id: String,
	pub observations_extracted: usize,
	/// Sum of the accepted counts downstream reported, can be below `observations_extracted`.
	pub observations_forwarded: usize,
	/// Cursor after the run; `None` when the device never had one.
	pub cursor: Option<DateTime<Utc>>,
	pub skipped: Option<SkipReason>,
}

impl DeviceSyncReport {
	fn nothing_new(device_id: &str, cursor: Option<DateTime<Utc>>) -> Self {
		Self {
			device_id: device_id.to_string(),
			observations_extracted: 0,
			observations_forwarded: 0,
			cursor,
			skipped: None,
		}
	}
}

/// What the first phase of a two-phase run handed to the dispatcher.
#[derive(Debug, Default)]
pub struct BatchSummary {
	pub devices_triggered: usize,
	/// Repeated device ids, dropped after their first entry.
	pub duplicates_skipped: usize,
	/// Devices whose window could not be resolved or whose task the dispatcher refused.
	pub failed: Vec<(String, Error)>,
}

impl BatchSummary {
	#[must_use]
	pub fn devices_failed(&self) -> usize {
		self.failed.len()
	}
}

/// Per-device results of a fused run, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
	pub devices: Vec<(String, Result<DeviceSyncReport, Error>)>,
}

impl BatchReport {
	#[must_use]
	pub fn devices_processed(&self) -> usize {
		self.devices.iter().filter(|(_, res)| res.is_ok()).count()
	}

	#[must_use]
	pub fn devices_failed(&self) -> usize {
		self.devices.len() - self.devices_processed()
	}

	#[must_use]
	pub fn observations_extracted(&self) -> usize {
		self.reports().map(|r| r.observations_extracted).sum()
	}

	#[must_use]
	pub fn observations_forwarded(&self) -> usize {
		self.reports().map(|r| r.observations_forwarded).sum()
	}

	pub fn reports(&self) -> impl Iterator<Item = &DeviceSyncReport> {
		self.devices.iter().filter_map(|(_, res)| res.as_ref().ok())
	}

	#[must_use]
	pub fn get(&self, device_id: &str) -> Option<&Result<DeviceSyncReport, Error>> {
		self.devices
			.iter()
			.find(|(id, _)| id == device_id)
			.map(|(_, res)| res)
	}
}

/// Drives synchronization for one integration.
///
/// The cursor store, source API and downstream forwarder are handed in once and shared by every
/// device task.
pub struct Orchestrator {
	config: SyncConfig,
	cursors: Arc<dyn CursorStore>,
	upstream: Arc<dyn UpstreamClient>,
	forwarder: Arc<dyn Forwarder>,
	locks: DeviceLocks,
}

impl Orchestrator {
	pub fn new(
		config: SyncConfig,
		cursors: Arc<dyn CursorStore>,
		upstream: Arc<dyn UpstreamClient>,
		forwarder: Arc<dyn Forwarder>,
	) -> Result<Self, Error> {
		config.validate()?;

		Ok(Self {
			config,
			cursors,
			upstream,
			forwarder,
			locks: DeviceLocks::default(),
		})
	}

	#[must_use]
	pub const fn config(&self) -> &SyncConfig {
		&self.config
	}

	#[must_use]
	pub fn cursor_key(&self, device_id: &str) -> CursorKey {
		CursorKey::new(
			self.config.integration_id.as_str(),
			self.config.stream_id.as_str(),
			device_id,
		)
	}

	pub async fn window_for(&self, key: &CursorKey) -> Result<SyncWindow, Error> {
		let cursor = self.cursors.get(key).await?;

		Ok(SyncWindow::resolve(
			cursor,
			Utc::now(),
			self.config.default_lookback(),
		))
	}

	/// Fused shape: syncs every device in-process, at most `max_concurrent_devices` at a time.
	///
	/// Device failures are reported per device and never stop the rest of the batch.
	pub async fn run_batch(&self, credentials: Vec<CredentialSet>) -> BatchReport {
		if credentials.is_empty() {
			info!(
				integration_id = %self.config.integration_id,
				"Empty credential batch, nothing to sync",
			);
			return BatchReport::default();
		}

		let total = credentials.len();

		let devices = stream::iter(credentials)
			.map(|credentials| async move {
				let res = self.sync_from_cursor(&credentials).await;

				if let Err(e) = &res {
					error!(
						integration_id = %self.config.integration_id,
						device_id = %credentials.device_id(),
						?e,
						"Device sync failed",
					);
				}

				(credentials.device_id().to_string(), res)
			})
			.buffered(self.config.max_concurrent_devices.get())
			.collect::<Vec<_>>()
			.await;

		let report = BatchReport { devices };

		info!(
			integration_id = %self.config.integration_id,
			total,
			processed = report.devices_processed(),
			failed = report.devices_failed(),
			observations_extracted = report.observations_extracted(),
			observations_forwarded = report.observations_forwarded(),
			"Finished credential batch",
		);

		report
	}

	/// First phase of the two-phase shape: resolves every device's window and hands one task per
	/// device to `dispatcher`.
	///
	/// A device listed more than once is triggered only once, since all windows are resolved
	/// before any task runs. Failures to resolve a window or to trigger a task are collected per
	/// device; only batch-fatal errors end the batch early.
	pub async fn trigger_batch(
		&self,
		credentials: Vec<CredentialSet>,
		dispatcher: &dyn Dispatcher,
	) -> Result<BatchSummary, Error> {
		let mut summary = BatchSummary::default();
		let mut seen = HashSet::with_capacity(credentials.len());

		for credentials in credentials {
			let device_id = credentials.device_id().to_string();

			if !seen.insert(device_id.clone()) {
				warn!(%device_id, "Device listed more than once, triggering it once");
				summary.duplicates_skipped += 1;
				continue;
			}

			match self.trigger_device(credentials, dispatcher).await {
				Ok(()) => summary.devices_triggered += 1,
				Err(e) if e.is_batch_fatal() => return Err(e),
				Err(e) => summary.failed.push((device_id, e)),
			}
		}

		info!(
			integration_id = %self.config.integration_id,
			devices_triggered = summary.devices_triggered,
			devices_failed = summary.devices_failed(),
			duplicates_skipped = summary.duplicates_skipped,
			"Triggered device syncs",
		);

		Ok(summary)
	}

	async fn trigger_device(
		&self,
		credentials: CredentialSet,
		dispatcher: &dyn Dispatcher,
	) -> Result<(), Error> {
		let key = self.cursor_key(credentials.device_id());

		let window = self.window_for(&key).await.map_err(|e| {
			error!(%key, ?e, "Failed to resolve sync window, device not triggered");
			e
		})?;

		debug!(
			%key,
			start = %window.start,
			from_cursor = window.from_cursor,
			"Triggering device sync",
		);

		dispatcher
			.trigger(
				&self.config.integration_id,
				FETCH_TASK_NAME,
				DeviceSyncTask {
					credentials,
					start: window.start,
				},
			)
			.await
			.map_err(|e| {
				error!(%key, ?e, "Failed to trigger device sync");
				e.into()
			})
	}

	/// Second phase of the two-phase shape: syncs one device from the window computed when it
	/// was triggered.
	pub async fn sync_device(&self, task: DeviceSyncTask) -> Result<DeviceSyncReport, Error> {
		let key = self.cursor_key(task.credentials.device_id());

		let res = {
			let _guard = self.locks.lock(&key).await;
			self.sync_window(&key, &task.credentials, task.start).await
		};

		self.locks.prune().await;

		res
	}

	async fn sync_from_cursor(
		&self,
		credentials: &CredentialSet,
	) -> Result<DeviceSyncReport, Error> {
		let key = self.cursor_key(credentials.device_id());

		let res = {
			let _guard = self.locks.lock(&key).await;

			match self.window_for(&key).await {
				Ok(window) => self.sync_window(&key, credentials, window.start).await,
				Err(e) => Err(e),
			}
		};

		self.locks.prune().await;

		res
	}

	/// Fetch, transform, forward, then advance. Callers hold the device lock.
	#[instrument(
		skip_all,
		fields(
			integration_id = %self.config.integration_id,
			device_id = %credentials.device_id(),
			%since,
		),
	)]
	async fn sync_window(
		&self,
		key: &CursorKey,
		credentials: &CredentialSet,
		since: DateTime<Utc>,
	) -> Result<DeviceSyncReport, Error> {
		let device_id = credentials.device_id();

		let outcome = self.upstream.fetch(credentials, since).await.map_err(|e| {
			error!(?e, "Failed to fetch observations from source API");
			e
		})?;

		let records = match outcome {
			Outcome::Records(records) => records,
			Outcome::Empty => {
				info!("No new observations");
				let cursor = self.cursors.get(key).await?;
				return Ok(DeviceSyncReport::nothing_new(device_id, cursor));
			}
			Outcome::Forbidden { body } => {
				warn!(%body, "Source API denied access to device, skipping");
				let cursor = self.cursors.get(key).await?;
				return Ok(DeviceSyncReport {
					skipped: Some(SkipReason::Forbidden),
					..DeviceSyncReport::nothing_new(device_id, cursor)
				});
			}
			Outcome::NotFound { body } => {
				warn!(%body, "Source API doesn't know this device, skipping");
				let cursor = self.cursors.get(key).await?;
				return Ok(DeviceSyncReport {
					skipped: Some(SkipReason::NotFound),
					..DeviceSyncReport::nothing_new(device_id, cursor)
				});
			}
		};

		info!(records = records.len(), "Fetched observations");

		let observations = records.iter().map(transform).collect::<Vec<_>>();

		let mut forwarded = 0;
		for (index, batch) in batch::split(&observations, self.config.batch_size).enumerate() {
			let accepted = self.forwarder.send(batch).await.map_err(|e| {
				error!(
					?e,
					batch_index = index,
					forwarded_so_far = forwarded,
					"Failed to forward batch, cursor stays put",
				);
				e
			})?;

			if accepted < batch.len() {
				warn!(
					batch_index = index,
					sent = batch.len(),
					accepted,
					"Downstream accepted fewer observations than sent",
				);
			}

			forwarded += accepted;
		}

		let latest = records.iter().map(|record| record.acquisition_time).max();

		let cursor = match latest {
			Some(latest) => Some(self.advance_cursor(key, latest).await?),
			None => self.cursors.get(key).await?,
		};

		info!(
			extracted = observations.len(),
			forwarded,
			cursor = ?cursor,
			"Device sync finished",
		);

		Ok(DeviceSyncReport {
			device_id: device_id.to_string(),
			observations_extracted: observations.len(),
			observations_forwarded: forwarded,
			cursor,
			skipped: None,
		})
	}

	/// Moves the cursor to `latest` unless it already is at or past it.
	async fn advance_cursor(
		&self,
		key: &CursorKey,
		latest: DateTime<Utc>,
	) -> Result<DateTime<Utc>, Error> {
		match self.cursors.get(key).await? {
			Some(current) if current >= latest => {
				debug!(%current, %latest, "Cursor already ahead of fetched records, keeping it");
				Ok(current)
			}
			previous => {
				self.cursors.set(key, latest).await?;
				debug!(?previous, %latest, "Advanced cursor");
				Ok(latest)
			}
		}
	}
}
