//! In-memory stand-ins for the source API and the downstream sink.

#![allow(dead_code)]

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use tsync_core::{
	CanonicalObservation, CredentialSet, CursorKey, CursorStore, CursorStoreError, DeviceMetadata,
	ForwardError, Forwarder, MemoryCursorStore, Orchestrator, Outcome, SourceRecord, SyncConfig,
	UpstreamClient,
};
use tsync_utils::error::FileIOError;

pub const INTEGRATION_ID: &str = "integration";

pub fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2024, 6, day, hour, min, 0).unwrap()
}

pub fn creds(device_id: &str) -> CredentialSet {
	CredentialSet::new(device_id, format!("key-{device_id}"), DeviceMetadata::default()).unwrap()
}

pub fn records(device_id: &str, times: &[DateTime<Utc>]) -> Vec<SourceRecord> {
	times
		.iter()
		.enumerate()
		.map(|(i, time)| {
			#[allow(clippy::cast_precision_loss)]
			let offset = i as f64 / 1000.0;
			SourceRecord::new(device_id, *time, -1.0 + offset, 36.0 + offset)
		})
		.collect()
}

/// Responses that override the recorded data for a device.
#[derive(Debug, Clone)]
pub enum Scripted {
	Forbidden,
	NotFound,
	Status(StatusCode),
}

/// Serves each device's records strictly after `since`, like the real source does.
#[derive(Default)]
pub struct FakeSource {
	records: Mutex<HashMap<String, Vec<SourceRecord>>>,
	scripted: Mutex<HashMap<String, Scripted>>,
	calls: Mutex<Vec<(String, DateTime<Utc>)>>,
	delay: Option<Duration>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl FakeSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(delay: Duration) -> Self {
		Self {
			delay: Some(delay),
			..Self::default()
		}
	}

	pub fn push(&self, device_id: &str, records: Vec<SourceRecord>) {
		self.records
			.lock()
			.unwrap()
			.entry(device_id.to_string())
			.or_default()
			.extend(records);
	}

	pub fn script(&self, device_id: &str, response: Scripted) {
		self.scripted
			.lock()
			.unwrap()
			.insert(device_id.to_string(), response);
	}

	pub fn calls(&self) -> Vec<(String, DateTime<Utc>)> {
		self.calls.lock().unwrap().clone()
	}

	pub fn calls_for(&self, device_id: &str) -> Vec<DateTime<Utc>> {
		self.calls()
			.into_iter()
			.filter(|(id, _)| id == device_id)
			.map(|(_, since)| since)
			.collect()
	}

	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl UpstreamClient for FakeSource {
	async fn fetch(
		&self,
		credentials: &CredentialSet,
		since: DateTime<Utc>,
	) -> Result<Outcome, tsync_source_api::Error> {
		let device_id = credentials.device_id().to_string();
		self.calls.lock().unwrap().push((device_id.clone(), since));

		let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(running, Ordering::SeqCst);

		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}

		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		let scripted = self.scripted.lock().unwrap().get(&device_id).cloned();
		match scripted {
			Some(Scripted::Forbidden) => {
				return Ok(Outcome::Forbidden {
					body: "invalid collar key".to_string(),
				})
			}
			Some(Scripted::NotFound) => {
				return Ok(Outcome::NotFound {
					body: "unknown collar".to_string(),
				})
			}
			Some(Scripted::Status(status)) => {
				return Err(tsync_source_api::Error::Status {
					status,
					body: "boom".to_string(),
				})
			}
			None => {}
		}

		let fresh = self
			.records
			.lock()
			.unwrap()
			.get(&device_id)
			.map(|records| {
				records
					.iter()
					.filter(|r| r.acquisition_time > since)
					.cloned()
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		Ok(if fresh.is_empty() {
			Outcome::Empty
		} else {
			Outcome::Records(fresh)
		})
	}
}

/// Keeps every batch it receives.
#[derive(Default)]
pub struct RecordingSink {
	batches: Mutex<Vec<Vec<CanonicalObservation>>>,
	/// Zero based index of the `send` call that fails.
	fail_on_call: Option<usize>,
	/// Caps the acknowledged count per batch.
	accept_at_most: Option<usize>,
	calls: AtomicUsize,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn failing_on_call(n: usize) -> Self {
		Self {
			fail_on_call: Some(n),
			..Self::default()
		}
	}

	pub fn accepting_at_most(n: usize) -> Self {
		Self {
			accept_at_most: Some(n),
			..Self::default()
		}
	}

	pub fn batches(&self) -> Vec<Vec<CanonicalObservation>> {
		self.batches.lock().unwrap().clone()
	}

	pub fn batch_sizes(&self) -> Vec<usize> {
		self.batches().iter().map(Vec::len).collect()
	}

	pub fn total(&self) -> usize {
		self.batch_sizes().iter().sum()
	}
}

#[async_trait]
impl Forwarder for RecordingSink {
	async fn send(&self, batch: &[CanonicalObservation]) -> Result<usize, ForwardError> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);

		if self.fail_on_call == Some(call) {
			return Err(ForwardError::Status {
				status: StatusCode::BAD_GATEWAY,
				body: "downstream unavailable".to_string(),
			});
		}

		self.batches.lock().unwrap().push(batch.to_vec());

		Ok(self
			.accept_at_most
			.map_or(batch.len(), |cap| batch.len().min(cap)))
	}
}

/// Memory store whose reads fail for the listed devices, as if the cursor file went away.
pub struct UnreadableCursors {
	inner: Arc<MemoryCursorStore>,
	unreadable: Vec<String>,
}

#[async_trait]
impl CursorStore for UnreadableCursors {
	async fn get(&self, key: &CursorKey) -> Result<Option<DateTime<Utc>>, CursorStoreError> {
		if self.unreadable.contains(&key.device_id) {
			return Err(FileIOError::from_std_io_err(
				"cursors.json",
				std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
			)
			.into());
		}

		self.inner.get(key).await
	}

	async fn set(&self, key: &CursorKey, updated_at: DateTime<Utc>) -> Result<(), CursorStoreError> {
		self.inner.set(key, updated_at).await
	}
}

pub struct Harness {
	pub orchestrator: Arc<Orchestrator>,
	pub cursors: Arc<MemoryCursorStore>,
	pub source: Arc<FakeSource>,
	pub sink: Arc<RecordingSink>,
}

impl Harness {
	pub fn new(source: FakeSource, sink: RecordingSink) -> Self {
		Self::with_config(SyncConfig::new(INTEGRATION_ID), source, sink)
	}

	pub fn with_config(config: SyncConfig, source: FakeSource, sink: RecordingSink) -> Self {
		let cursors = Arc::new(MemoryCursorStore::new());
		let store = Arc::clone(&cursors) as Arc<dyn CursorStore>;

		Self::build(config, cursors, store, source, sink)
	}

	pub fn with_unreadable_cursors(
		unreadable: &[&str],
		source: FakeSource,
		sink: RecordingSink,
	) -> Self {
		let cursors = Arc::new(MemoryCursorStore::new());
		let store = Arc::new(UnreadableCursors {
			inner: Arc::clone(&cursors),
			unreadable: unreadable.iter().map(ToString::to_string).collect(),
		}) as Arc<dyn CursorStore>;

		Self::build(
			SyncConfig::new(INTEGRATION_ID),
			cursors,
			store,
			source,
			sink,
		)
	}

	fn build(
		config: SyncConfig,
		cursors: Arc<MemoryCursorStore>,
		store: Arc<dyn CursorStore>,
		source: FakeSource,
		sink: RecordingSink,
	) -> Self {
		let source = Arc::new(source);
		let sink = Arc::new(sink);

		let orchestrator = Arc::new(
			Orchestrator::new(
				config,
				store,
				Arc::clone(&source) as Arc<dyn UpstreamClient>,
				Arc::clone(&sink) as Arc<dyn Forwarder>,
			)
			.unwrap(),
		);

		Self {
			orchestrator,
			cursors,
			source,
			sink,
		}
	}

	pub async fn cursor(&self, device_id: &str) -> Option<DateTime<Utc>> {
		self.cursors
			.get(&self.orchestrator.cursor_key(device_id))
			.await
			.unwrap()
	}

	pub async fn set_cursor(&self, device_id: &str, at: DateTime<Utc>) {
		self.cursors
			.set(&self.orchestrator.cursor_key(device_id), at)
			.await
			.unwrap();
	}
}
