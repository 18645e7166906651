use crate::cursor::CursorKey;

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per cursor key, so a device's read-fetch-forward-write cycle never
/// interleaves with another run for the same device.
#[derive(Debug, Default, Clone)]
pub(crate) struct DeviceLocks {
	locks: Arc<Mutex<HashMap<CursorKey, Arc<Mutex<()>>>>>,
}

impl DeviceLocks {
	pub(crate) async fn lock(&self, key: &CursorKey) -> OwnedMutexGuard<()> {
		let lock = Arc::clone(
			self.locks
				.lock()
				.await
				.entry(key.clone())
				.or_insert_with(Arc::default),
		);

		lock.lock_owned().await
	}

	/// Forgets keys nobody is holding or waiting on.
	pub(crate) async fn prune(&self) {
		self.locks
			.lock()
			.await
			.retain(|_, lock| Arc::strong_count(lock) > 1);
	}

	#[cfg(test)]
	pub(crate) async fn len(&self) -> usize {
		self.locks.lock().await.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::time::Duration;

	use tokio::time::timeout;

	#[tokio::test]
	async fn same_key_is_exclusive() {
		let locks = DeviceLocks::default();
		let key = CursorKey::new("i", "s", "1");

		let guard = locks.lock(&key).await;

		assert!(timeout(Duration::from_millis(50), locks.lock(&key))
			.await
			.is_err());

		drop(guard);

		assert!(timeout(Duration::from_millis(50), locks.lock(&key))
			.await
			.is_ok());
	}

	#[tokio::test]
	async fn different_keys_do_not_contend() {
		let locks = DeviceLocks::default();

		let _a = locks.lock(&CursorKey::new("i", "s", "1")).await;

		assert!(timeout(
			Duration::from_millis(50),
			locks.lock(&CursorKey::new("i", "s", "2"))
		)
		.await
		.is_ok());
	}

	#[tokio::test]
	async fn prune_keeps_held_locks() {
		let locks = DeviceLocks::default();

		let held = locks.lock(&CursorKey::new("i", "s", "1")).await;
		drop(locks.lock(&CursorKey::new("i", "s", "2")).await);

		locks.prune().await;
		assert_eq!(locks.len().await, 1);

		drop(held);
		locks.prune().await;
		assert_eq!(locks.len().await, 0);
	}
}
