//! Per-device synchronization cursors.
//!
//! A cursor is the acquisition time of the newest record that was fully forwarded for a
//! device. Stores are plain get/set maps; serializing access per key is the caller's job.

use tsync_utils::{error::FileIOError, fs::write_atomically};

use std::{
	collections::{BTreeMap, HashMap},
	fmt,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
	fs,
	sync::{Mutex, RwLock},
};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorKey {
	pub integration_id: String,
	pub stream_id: String,
	pub device_id: String,
}

impl CursorKey {
	pub fn new(
		integration_id: impl Into<String>,
		stream_id: impl Into<String>,
		device_id: impl Into<String>,
	) -> Self {
		Self {
			integration_id: integration_id.into(),
			stream_id: stream_id.into(),
			device_id: device_id.into(),
		}
	}
}

impl fmt::Display for CursorKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}/{}/{}",
			self.integration_id, self.stream_id, self.device_id
		)
	}
}

#[derive(thiserror::Error, Debug)]
pub enum CursorStoreError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("failed to serialize cursors: {0}")]
	Serialize(#[source] serde_json::Error),
	#[error("cursor file is corrupted <path='{}'>: {source}", .path.display())]
	Corrupted {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
}

#[async_trait]
pub trait CursorStore: Send + Sync {
	async fn get(&self, key: &CursorKey) -> Result<Option<DateTime<Utc>>, CursorStoreError>;

	async fn set(&self, key: &CursorKey, updated_at: DateTime<Utc>) -> Result<(), CursorStoreError>;
}

/// Process-local store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
	cursors: RwLock<HashMap<CursorKey, DateTime<Utc>>>,
}

impl MemoryCursorStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.cursors.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.cursors.read().await.is_empty()
	}
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
	async fn get(&self, key: &CursorKey) -> Result<Option<DateTime<Utc>>, CursorStoreError> {
		Ok(self.cursors.read().await.get(key).copied())
	}

	async fn set(&self, key: &CursorKey, updated_at: DateTime<Utc>) -> Result<(), CursorStoreError> {
		self.cursors.write().await.insert(key.clone(), updated_at);
		Ok(())
	}
}

const CURSOR_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Default)]
struct CursorFile {
	version: u32,
	cursors: BTreeMap<String, DateTime<Utc>>,
}

/// Durable store backed by a single JSON document, rewritten atomically on every `set`.
///
/// Writes are serialized so each one starts from the previous document. Reads only see the
/// in-memory map and never wait on the disk.
#[derive(Debug)]
pub struct FileCursorStore {
	path: PathBuf,
	cursors: RwLock<BTreeMap<String, DateTime<Utc>>>,
	writer: Mutex<()>,
}

impl FileCursorStore {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self, CursorStoreError> {
		let path = path.as_ref();

		let cursors = match fs::read(path).await {
			Ok(bytes) => {
				let file = serde_json::from_slice::<CursorFile>(&bytes).map_err(|source| {
					CursorStoreError::Corrupted {
						path: path.into(),
						source,
					}
				})?;

				info!(
					path = %path.display(),
					version = file.version,
					cursors = file.cursors.len(),
					"Loaded cursor file",
				);

				file.cursors
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!(path = %path.display(), "No cursor file yet, starting empty");
				BTreeMap::new()
			}
			Err(e) => {
				return Err(FileIOError::from_std_io_err_with_msg(
					path,
					e,
					"failed to read cursor file",
				)
				.into())
			}
		};

		Ok(Self {
			path: path.to_path_buf(),
			cursors: RwLock::new(cursors),
			writer: Mutex::new(()),
		})
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl CursorStore for FileCursorStore {
	async fn get(&self, key: &CursorKey) -> Result<Option<DateTime<Utc>>, CursorStoreError> {
		Ok(self.cursors.read().await.get(&key.to_string()).copied())
	}

	async fn set(&self, key: &CursorKey, updated_at: DateTime<Utc>) -> Result<(), CursorStoreError> {
		let _writer = self.writer.lock().await;

		let mut next = self.cursors.read().await.clone();
		next.insert(key.to_string(), updated_at);

		let bytes = serde_json::to_vec_pretty(&CursorFile {
			version: CURSOR_FILE_VERSION,
			cursors: next,
		})
		.map_err(CursorStoreError::Serialize)?;

		write_atomically(&self.path, &bytes).await?;

		// Only visible once it is on disk
		self.cursors
			.write()
			.await
			.insert(key.to_string(), updated_at);

		debug!(%key, %updated_at, "Persisted cursor");

		Ok(())
	}
}
