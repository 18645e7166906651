use std::num::NonZeroUsize;

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STREAM_ID: &str = "pull_observations";
pub const DEFAULT_LOOKBACK_HOURS: u32 = 12;
/// Ten years.
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 365 * 10;

// Both are non-zero constants.
const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
	Some(n) => n,
	None => unreachable!(),
};
const DEFAULT_MAX_CONCURRENT_DEVICES: NonZeroUsize = match NonZeroUsize::new(4) {
	Some(n) => n,
	None => unreachable!(),
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("integration id must not be empty")]
	EmptyIntegrationId,
	#[error("stream id must not be empty")]
	EmptyStreamId,
	#[error("default lookback of {hours}h exceeds the maximum of {max}h")]
	LookbackTooLarge { hours: u32, max: u32 },
}

/// Settings for one integration's synchronization runs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
	pub integration_id: String,
	/// Scopes cursors so several sync streams of one integration don't share progress.
	#[serde(default = "default_stream_id")]
	pub stream_id: String,
	/// How far back the first-ever run for a device looks.
	#[serde(default = "default_lookback_hours")]
	pub default_lookback_hours: u32,
	#[serde(default = "default_batch_size")]
	pub batch_size: NonZeroUsize,
	#[serde(default = "default_max_concurrent_devices")]
	pub max_concurrent_devices: NonZeroUsize,
}

fn default_stream_id() -> String {
	DEFAULT_STREAM_ID.to_string()
}

const fn default_lookback_hours() -> u32 {
	DEFAULT_LOOKBACK_HOURS
}

const fn default_batch_size() -> NonZeroUsize {
	DEFAULT_BATCH_SIZE
}

const fn default_max_concurrent_devices() -> NonZeroUsize {
	DEFAULT_MAX_CONCURRENT_DEVICES
}

impl SyncConfig {
	pub fn new(integration_id: impl Into<String>) -> Self {
		Self {
			integration_id: integration_id.into(),
			stream_id: default_stream_id(),
			default_lookback_hours: DEFAULT_LOOKBACK_HOURS,
			batch_size: DEFAULT_BATCH_SIZE,
			max_concurrent_devices: DEFAULT_MAX_CONCURRENT_DEVICES,
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.integration_id.trim().is_empty() {
			return Err(ConfigError::EmptyIntegrationId);
		}

		if self.stream_id.trim().is_empty() {
			return Err(ConfigError::EmptyStreamId);
		}

		if self.default_lookback_hours > MAX_LOOKBACK_HOURS {
			return Err(ConfigError::LookbackTooLarge {
				hours: self.default_lookback_hours,
				max: MAX_LOOKBACK_HOURS,
			});
		}

		Ok(())
	}

	#[must_use]
	pub fn default_lookback(&self) -> Duration {
		Duration::hours(i64::from(self.default_lookback_hours))
	}
}
