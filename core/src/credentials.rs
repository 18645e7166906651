use std::fmt;

use serde::Serialize;

/// Descriptor metadata that travels with a device but plays no part in synchronization.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
	pub device_kind: Option<String>,
	pub com_id: Option<String>,
	pub com_type: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
	"invalid credential descriptor{}: missing or empty '{field}'",
	.index.map(|i| format!(" <entry={i}>")).unwrap_or_default()
)]
pub struct ValidationError {
	pub index: Option<usize>,
	pub field: &'static str,
}

impl ValidationError {
	#[must_use]
	pub const fn missing(field: &'static str) -> Self {
		Self { index: None, field }
	}

	#[must_use]
	pub const fn at(self, index: usize) -> Self {
		Self {
			index: Some(index),
			..self
		}
	}
}

/// A validated device credential: both the id and the secret are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
	device_id: String,
	device_secret: String,
	metadata: DeviceMetadata,
}

impl CredentialSet {
	pub fn new(
		device_id: impl Into<String>,
		device_secret: impl Into<String>,
		metadata: DeviceMetadata,
	) -> Result<Self, ValidationError> {
		let device_id = device_id.into().trim().to_string();
		let device_secret = device_secret.into().trim().to_string();

		if device_id.is_empty() {
			return Err(ValidationError::missing("device_id"));
		}

		if device_secret.is_empty() {
			return Err(ValidationError::missing("device_secret"));
		}

		Ok(Self {
			device_id,
			device_secret,
			metadata,
		})
	}

	#[must_use]
	pub fn device_id(&self) -> &str {
		&self.device_id
	}

	#[must_use]
	pub fn device_secret(&self) -> &str {
		&self.device_secret
	}

	#[must_use]
	pub const fn metadata(&self) -> &DeviceMetadata {
		&self.metadata
	}
}

// Secrets stay out of logs.
impl fmt::Debug for CredentialSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CredentialSet")
			.field("device_id", &self.device_id)
			.field("device_secret", &"<redacted>")
			.field("metadata", &self.metadata)
			.finish()
	}
}
