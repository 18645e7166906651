//! CLI configuration stored in the data directory

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::{
	fs,
	path::{Path, PathBuf},
};
use tracing::{info, warn};
use tsync_config::{ensure_supported, Migrate};
use tsync_core::{ForwarderConfig, SyncConfig};
use tsync_source_api::ClientConfig;

pub const CONFIG_FILE: &str = "tsync.json";

const DEFAULT_LOG_FILTER: &str = "info,tsync_core=debug,tsync_source_api=debug";
const DEFAULT_CURSOR_FILE: &str = "cursors.json";

/// Everything one `tsync` invocation needs to reach the source, the sink and the cursor file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
	/// Config schema version
	#[serde(default)]
	pub version: u32,

	/// Tracing directives used when `RUST_LOG` isn't set
	#[serde(default = "default_log_filter")]
	pub log_filter: String,

	/// Relative paths resolve against the data directory
	#[serde(default = "default_cursor_file")]
	pub cursor_file: PathBuf,

	pub sync: SyncConfig,

	#[serde(default)]
	pub source: ClientConfig,

	#[serde(default)]
	pub forwarder: ForwarderConfig,
}

fn default_log_filter() -> String {
	DEFAULT_LOG_FILTER.to_string()
}

fn default_cursor_file() -> PathBuf {
	PathBuf::from(DEFAULT_CURSOR_FILE)
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			version: Self::target_version(),
			log_filter: default_log_filter(),
			cursor_file: default_cursor_file(),
			// Left empty on purpose, running a sync without one fails validation
			sync: SyncConfig::new(""),
			source: ClientConfig::default(),
			forwarder: ForwarderConfig::default(),
		}
	}
}

/// Per-invocation values from flags or environment, never written back.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub integration_id: Option<String>,
	pub source_url: Option<String>,
	pub forward_url: Option<String>,
	pub forward_api_key: Option<String>,
}

impl AppConfig {
	pub fn config_path(data_dir: &Path) -> PathBuf {
		data_dir.join(CONFIG_FILE)
	}

	/// Loads the config, writing defaults first when there is none.
	pub fn load(data_dir: &Path) -> Result<Self> {
		let config_path = Self::config_path(data_dir);

		if !config_path.exists() {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default();
			config.save(data_dir)?;
			return Ok(config);
		}

		let json = fs::read_to_string(&config_path)
			.with_context(|| format!("Failed to read config at {}", config_path.display()))?;
		let mut config: Self = serde_json::from_str(&json)
			.with_context(|| format!("Invalid config at {}", config_path.display()))?;

		ensure_supported(&config)?;

		if config.needs_migration() {
			info!(
				"Migrating config from v{} to v{}",
				config.version,
				Self::target_version()
			);
			config.migrate()?;
			config.save(data_dir)?;
		}

		Ok(config)
	}

	/// Save CLI config to the data directory
	pub fn save(&self, data_dir: &Path) -> Result<()> {
		fs::create_dir_all(data_dir)?;

		let config_path = Self::config_path(data_dir);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)
			.with_context(|| format!("Failed to write config at {}", config_path.display()))?;

		Ok(())
	}

	pub fn apply(&mut self, overrides: Overrides) {
		if let Some(integration_id) = overrides.integration_id {
			self.sync.integration_id = integration_id;
		}
		if let Some(url) = overrides.source_url {
			self.source.base_url = url;
		}
		if let Some(url) = overrides.forward_url {
			self.forwarder.url = url;
		}
		if let Some(api_key) = overrides.forward_api_key {
			self.forwarder.api_key = Some(api_key);
		}
	}

	pub fn cursor_path(&self, data_dir: &Path) -> PathBuf {
		if self.cursor_file.is_absolute() {
			self.cursor_file.clone()
		} else {
			data_dir.join(&self.cursor_file)
		}
	}

	pub fn logs_dir(data_dir: &Path) -> PathBuf {
		data_dir.join("logs")
	}
}

impl Migrate for AppConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		1
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				// Unversioned files predate the field; every other key already matches v1
				self.version = 1;
				self.migrate()
			}
			1 => Ok(()),
			v => Err(anyhow::anyhow!("Unknown config version: {}", v)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use serde_json::json;

	#[test]
	fn creates_default_when_missing() {
		let dir = tempfile::tempdir().unwrap();

		let config = AppConfig::load(dir.path()).unwrap();

		assert_eq!(config.version, AppConfig::target_version());
		assert!(AppConfig::config_path(dir.path()).exists());
		assert_eq!(config.sync.batch_size.get(), 200);
	}

	#[test]
	fn migrates_unversioned_file() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			AppConfig::config_path(dir.path()),
			json!({ "sync": { "integration_id": "abc" } }).to_string(),
		)
		.unwrap();

		let config = AppConfig::load(dir.path()).unwrap();
		assert_eq!(config.version, 1);
		assert_eq!(config.sync.integration_id, "abc");
		assert_eq!(config.cursor_file, PathBuf::from(DEFAULT_CURSOR_FILE));

		// Migration is persisted
		let saved: serde_json::Value =
			serde_json::from_str(&fs::read_to_string(AppConfig::config_path(dir.path())).unwrap())
				.unwrap();
		assert_eq!(saved["version"], 1);
	}

	#[test]
	fn refuses_newer_file() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			AppConfig::config_path(dir.path()),
			json!({ "version": 99, "sync": { "integration_id": "abc" } }).to_string(),
		)
		.unwrap();

		assert!(AppConfig::load(dir.path()).is_err());
	}

	#[test]
	fn overrides_win_and_cursor_path_resolves() {
		let mut config = AppConfig::default();
		config.apply(Overrides {
			integration_id: Some("xyz".to_string()),
			forward_api_key: Some("secret".to_string()),
			..Default::default()
		});

		assert_eq!(config.sync.integration_id, "xyz");
		assert_eq!(config.forwarder.api_key.as_deref(), Some("secret"));
		assert_eq!(
			config.cursor_path(Path::new("/data")),
			Path::new("/data").join(DEFAULT_CURSOR_FILE)
		);
	}
}
