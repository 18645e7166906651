use crate::error::FileIOError;

use std::path::Path;

use tokio::{fs, io::AsyncWriteExt};
use tracing::trace;

/// Writes `contents` to a sibling temporary file and renames it over `path`, so readers
/// never observe a half written file.
pub async fn write_atomically(path: impl AsRef<Path>, contents: &[u8]) -> Result<(), FileIOError> {
	let path = path.as_ref();

	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).await.map_err(|e| {
			FileIOError::from_std_io_err_with_msg(parent, e, "failed to create parent directory")
		})?;
	}

	let tmp_path = path.with_extension("tmp");

	let mut file = fs::File::create(&tmp_path)
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e)))?;

	file.write_all(contents)
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e)))?;

	file.sync_all()
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e)))?;

	fs::rename(&tmp_path, path).await.map_err(|e| {
		FileIOError::from_std_io_err_with_msg(path, e, "failed to move temporary file into place")
	})?;

	trace!(path = %path.display(), bytes = contents.len(), "Wrote file atomically");

	Ok(())
}
