use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;

const DIR_NAME: &str = "tsync";

/// Platform-specific data directory resolution
pub fn default_data_dir() -> Result<PathBuf> {
	#[cfg(any(target_os = "macos", target_os = "windows"))]
	let dir = dirs::data_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join(DIR_NAME);

	#[cfg(not(any(target_os = "macos", target_os = "windows")))]
	let dir = dirs::data_local_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join(DIR_NAME);

	// Create directory if it doesn't exist
	fs::create_dir_all(&dir)?;

	Ok(dir)
}

/// Versioned on-disk configuration that upgrades itself one schema step at a time.
pub trait Migrate {
	fn current_version(&self) -> u32;

	fn target_version() -> u32;

	/// Runs every step from `current_version` up to `target_version`.
	fn migrate(&mut self) -> Result<()>;

	fn needs_migration(&self) -> bool {
		self.current_version() < Self::target_version()
	}
}

/// Refuses files written by a newer build instead of silently dropping their fields.
pub fn ensure_supported<M: Migrate>(config: &M) -> Result<()> {
	if config.current_version() > M::target_version() {
		return Err(anyhow!(
			"Config version {} is newer than supported version {}",
			config.current_version(),
			M::target_version()
		));
	}

	Ok(())
}
