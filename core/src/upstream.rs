use crate::credentials::CredentialSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tsync_source_api::{Client, Error, Outcome};

/// Source of telemetry records for a device.
///
/// Forbidden and not-found responses come back as [`Outcome`] variants, never as errors, so
/// callers must decide what they mean.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
	async fn fetch(
		&self,
		credentials: &CredentialSet,
		since: DateTime<Utc>,
	) -> Result<Outcome, Error>;
}

#[async_trait]
impl UpstreamClient for Client {
	async fn fetch(
		&self,
		credentials: &CredentialSet,
		since: DateTime<Utc>,
	) -> Result<Outcome, Error> {
		Self::fetch(
			self,
			credentials.device_id(),
			credentials.device_secret(),
			since,
		)
		.await
	}
}
