use crate::{
	credentials::CredentialSet,
	orchestrator::{DeviceSyncReport, Orchestrator},
	Error,
};

use std::{mem, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{
	sync::{Mutex, Semaphore},
	task::JoinHandle,
};
use tracing::{debug, error};

/// Name under which the per-device sync task is triggered.
pub const FETCH_TASK_NAME: &str = "fetch_device_observations";

/// Everything a device task needs: who to fetch for and from when.
#[derive(Debug, Clone)]
pub struct DeviceSyncTask {
	pub credentials: CredentialSet,
	pub start: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
	#[error("dispatcher is closed")]
	Closed,
	#[error("unknown integration <integration_id='{0}'>")]
	UnknownIntegration(String),
	#[error("unknown task <task_name='{0}'>")]
	UnknownTask(String),
}

/// Hands device tasks to whatever runs them: a local task pool, a queue, a remote worker.
#[async_trait]
pub trait Dispatcher: Send + Sync {
	async fn trigger(
		&self,
		integration_id: &str,
		task_name: &str,
		task: DeviceSyncTask,
	) -> Result<(), DispatchError>;
}

type TaskHandle = JoinHandle<Result<DeviceSyncReport, Error>>;

/// Runs triggered tasks on the tokio runtime, bounded by the orchestrator's
/// `max_concurrent_devices`.
pub struct LocalDispatcher {
	orchestrator: Arc<Orchestrator>,
	permits: Arc<Semaphore>,
	handles: Mutex<Vec<(String, TaskHandle)>>,
}

impl LocalDispatcher {
	#[must_use]
	pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
		let permits = Arc::new(Semaphore::new(
			orchestrator.config().max_concurrent_devices.get(),
		));

		Self {
			orchestrator,
			permits,
			handles: Mutex::default(),
		}
	}

	/// Stops accepting tasks. Tasks still waiting for a permit finish with [`DispatchError::Closed`].
	pub fn close(&self) {
		self.permits.close();
	}

	/// Waits for every task triggered so far, in trigger order.
	pub async fn join(&self) -> Vec<(String, Result<DeviceSyncReport, Error>)> {
		let handles = mem::take(&mut *self.handles.lock().await);

		let mut results = Vec::with_capacity(handles.len());
		for (device_id, handle) in handles {
			let res = match handle.await {
				Ok(res) => res,
				Err(e) => {
					error!(%device_id, ?e, "Device sync task panicked");
					Err(Error::TaskPanic(device_id.clone()))
				}
			};

			results.push((device_id, res));
		}

		results
	}
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
	async fn trigger(
		&self,
		integration_id: &str,
		task_name: &str,
		task: DeviceSyncTask,
	) -> Result<(), DispatchError> {
		if integration_id != self.orchestrator.config().integration_id {
			return Err(DispatchError::UnknownIntegration(integration_id.to_string()));
		}

		if task_name != FETCH_TASK_NAME {
			return Err(DispatchError::UnknownTask(task_name.to_string()));
		}

		if self.permits.is_closed() {
			return Err(DispatchError::Closed);
		}

		let device_id = task.credentials.device_id().to_string();
		let orchestrator = Arc::clone(&self.orchestrator);
		let permits = Arc::clone(&self.permits);

		let handle = tokio::spawn(async move {
			let _permit = permits
				.acquire_owned()
				.await
				.map_err(|_| DispatchError::Closed)?;

			let device_id = task.credentials.device_id().to_string();
			orchestrator.sync_device(task).await.map_err(|e| {
				error!(%device_id, ?e, "Device sync task failed");
				e
			})
		});

		debug!(%device_id, "Spawned device sync task");

		self.handles.lock().await.push((device_id, handle));

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::{
		config::SyncConfig, cursor::MemoryCursorStore, forwarder::ForwardError,
		forwarder::Forwarder, observation::CanonicalObservation, upstream::UpstreamClient,
		DeviceMetadata,
	};

	use tsync_source_api::Outcome;

	struct NothingNew;

	#[async_trait]
	impl UpstreamClient for NothingNew {
		async fn fetch(
			&self,
			_: &CredentialSet,
			_: DateTime<Utc>,
		) -> Result<Outcome, tsync_source_api::Error> {
			Ok(Outcome::Empty)
		}
	}

	struct Sink;

	#[async_trait]
	impl Forwarder for Sink {
		async fn send(&self, batch: &[CanonicalObservation]) -> Result<usize, ForwardError> {
			Ok(batch.len())
		}
	}

	fn dispatcher() -> LocalDispatcher {
		LocalDispatcher::new(Arc::new(
			Orchestrator::new(
				SyncConfig::new("integration"),
				Arc::new(MemoryCursorStore::new()),
				Arc::new(NothingNew),
				Arc::new(Sink),
			)
			.unwrap(),
		))
	}

	fn task(device_id: &str) -> DeviceSyncTask {
		DeviceSyncTask {
			credentials: CredentialSet::new(device_id, "key", DeviceMetadata::default()).unwrap(),
			start: Utc::now(),
		}
	}

	#[tokio::test]
	async fn rejects_unknown_integration_and_task() {
		let dispatcher = dispatcher();

		assert!(matches!(
			dispatcher.trigger("other", FETCH_TASK_NAME, task("1")).await,
			Err(DispatchError::UnknownIntegration(id)) if id == "other"
		));
		assert!(matches!(
			dispatcher.trigger("integration", "nope", task("1")).await,
			Err(DispatchError::UnknownTask(name)) if name == "nope"
		));
		assert!(dispatcher.join().await.is_empty());
	}

	#[tokio::test]
	async fn join_returns_results_in_trigger_order() {
		let dispatcher = dispatcher();

		for id in ["3", "1", "2"] {
			dispatcher
				.trigger("integration", FETCH_TASK_NAME, task(id))
				.await
				.unwrap();
		}

		let results = dispatcher.join().await;
		assert_eq!(
			results.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
			["3", "1", "2"]
		);
		assert!(results.iter().all(|(_, res)| res.is_ok()));

		// Handles are drained
		assert!(dispatcher.join().await.is_empty());
	}

	#[tokio::test]
	async fn closed_dispatcher_refuses_work() {
		let dispatcher = dispatcher();
		dispatcher.close();

		assert!(matches!(
			dispatcher
				.trigger("integration", FETCH_TASK_NAME, task("1"))
				.await,
			Err(DispatchError::Closed)
		));
	}
}
