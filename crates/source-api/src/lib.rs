#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Client for the tracking-device source API.
//!
//! Every call resolves to either an [`Outcome`] (records, nothing new, or one of the two
//! per-device soft failures) or an [`Error`] for anything the caller should treat as fatal.

mod record;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub use record::{parse_timestamp, SourceRecord};

#[derive(Clone, Debug)]
pub struct RequestConfig {
	pub client: reqwest::Client,
	pub api_url: String,
}

/// Connection settings for the source API.
///
/// `request_timeout` bounds the whole exchange (write + read) since reqwest has no
/// separate read and write deadlines.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
	pub base_url: String,
	pub connect_timeout_secs: u64,
	pub request_timeout_secs: u64,
	pub pool_idle_timeout_secs: u64,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: "https://api.vectronic-wildlife.com".to_string(),
			connect_timeout_secs: 10,
			request_timeout_secs: 45,
			pool_idle_timeout_secs: 5,
		}
	}
}

impl ClientConfig {
	pub fn build(&self) -> Result<RequestConfig, Error> {
		let client = reqwest::Client::builder()
			.connect_timeout(Duration::from_secs(self.connect_timeout_secs))
			.timeout(Duration::from_secs(self.request_timeout_secs))
			.pool_idle_timeout(Duration::from_secs(self.pool_idle_timeout_secs))
			.build()?;

		Ok(RequestConfig {
			client,
			api_url: self.base_url.trim_end_matches('/').to_string(),
		})
	}
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("source API responded with status {status}: {body}")]
	Status { status: StatusCode, body: String },
	#[error("request to source API failed: {0}")]
	Request(#[from] reqwest::Error),
	#[error("failed to decode source API response: {0}")]
	Decode(#[from] serde_json::Error),
}

/// Non-fatal results of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Records(Vec<SourceRecord>),
	/// 2xx with an empty, `null` or `[]` body.
	Empty,
	/// 403, usually a revoked or mistyped device key.
	Forbidden { body: String },
	/// 404, usually an unknown device id.
	NotFound { body: String },
}

impl Outcome {
	#[must_use]
	pub fn is_soft_failure(&self) -> bool {
		matches!(self, Self::Forbidden { .. } | Self::NotFound { .. })
	}
}

/// Maps a raw response onto the outcome taxonomy.
pub fn classify(status: StatusCode, body: String) -> Result<Outcome, Error> {
	match status {
		StatusCode::FORBIDDEN => Ok(Outcome::Forbidden { body }),
		StatusCode::NOT_FOUND => Ok(Outcome::NotFound { body }),
		status if status.is_success() => {
			if body.trim().is_empty() {
				return Ok(Outcome::Empty);
			}

			match serde_json::from_str::<Option<Vec<SourceRecord>>>(&body)? {
				Some(records) if !records.is_empty() => Ok(Outcome::Records(records)),
				_ => Ok(Outcome::Empty),
			}
		}
		status => Err(Error::Status { status, body }),
	}
}

/// Renders a window start the way the source API expects it: UTC wall clock time with no
/// zone suffix, microseconds only when present.
#[must_use]
pub fn format_since(since: DateTime<Utc>) -> String {
	if since.timestamp_subsec_nanos() == 0 {
		since.format("%Y-%m-%dT%H:%M:%S").to_string()
	} else {
		since.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
	}
}

pub mod collar {
	use super::*;

	pub use gps::exec as gps;
	pub mod gps {
		use super::*;

		use tracing::{error, info};

		pub fn request(
			config: &RequestConfig,
			device_id: &str,
			device_secret: &str,
			since: DateTime<Utc>,
		) -> reqwest::RequestBuilder {
			config
				.client
				.get(format!("{}/v2/collar/{device_id}/gps", config.api_url))
				.query(&[
					("collarkey", device_secret.to_string()),
					("afterScts", format_since(since)),
				])
		}

		pub async fn exec(
			config: &RequestConfig,
			device_id: &str,
			device_secret: &str,
			since: DateTime<Utc>,
		) -> Result<Outcome, Error> {
			info!(%device_id, since = %format_since(since), "Getting observations");

			let response = request(config, device_id, device_secret, since)
				.send()
				.await?;

			let status = response.status();
			let body = response.text().await?;

			if !status.is_success() {
				error!(%device_id, %status, %body, "Source API returned an error response");
			}

			classify(status, body)
		}
	}
}

/// Thin handle over a built [`RequestConfig`].
#[derive(Clone, Debug)]
pub struct Client {
	config: RequestConfig,
}

impl Client {
	pub fn new(config: &ClientConfig) -> Result<Self, Error> {
		config.build().map(|config| Self { config })
	}

	#[must_use]
	pub const fn request_config(&self) -> &RequestConfig {
		&self.config
	}

	pub async fn fetch(
		&self,
		device_id: &str,
		device_secret: &str,
		since: DateTime<Utc>,
	) -> Result<Outcome, Error> {
		collar::gps(&self.config, device_id, device_secret, since).await
	}
}
