use crate::observation::CanonicalObservation;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

#[derive(thiserror::Error, Debug)]
pub enum ForwardError {
	#[error("request to downstream failed: {0}")]
	Request(#[from] reqwest::Error),
	#[error("downstream responded with status {status}: {body}")]
	Status { status: StatusCode, body: String },
	#[error("downstream acknowledged {accepted} observations out of {sent} sent")]
	InvalidAck { sent: usize, accepted: usize },
}

/// Downstream sink for canonical observations.
#[async_trait]
pub trait Forwarder: Send + Sync {
	/// Sends one batch and returns how many observations downstream accepted, which may be
	/// fewer than sent when downstream deduplicates.
	async fn send(&self, batch: &[CanonicalObservation]) -> Result<usize, ForwardError>;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ForwarderConfig {
	pub url: String,
	pub api_key: Option<String>,
	pub timeout_secs: u64,
}

impl Default for ForwarderConfig {
	fn default() -> Self {
		Self {
			url: "http://localhost:8080/v2/observations/".to_string(),
			api_key: None,
			timeout_secs: 30,
		}
	}
}

/// Posts each batch as a JSON list.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
	client: reqwest::Client,
	url: String,
	api_key: Option<String>,
}

impl HttpForwarder {
	pub fn new(config: &ForwarderConfig) -> Result<Self, ForwardError> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(Duration::from_secs(config.timeout_secs))
				.build()?,
			url: config.url.clone(),
			api_key: config.api_key.clone(),
		})
	}
}

/// Reads the accepted count out of a 2xx acknowledgement body.
///
/// Understands `{"accepted": n}` and a JSON list of accepted items; anything else counts the
/// whole batch as accepted.
pub fn accepted_count(body: &str, sent: usize) -> Result<usize, ForwardError> {
	let accepted = match serde_json::from_str::<Value>(body.trim()) {
		Ok(Value::Object(map)) => map
			.get("accepted")
			.and_then(Value::as_u64)
			.and_then(|n| usize::try_from(n).ok())
			.unwrap_or(sent),
		Ok(Value::Array(items)) => items.len(),
		_ => sent,
	};

	if accepted > sent {
		return Err(ForwardError::InvalidAck { sent, accepted });
	}

	Ok(accepted)
}

#[async_trait]
impl Forwarder for HttpForwarder {
	async fn send(&self, batch: &[CanonicalObservation]) -> Result<usize, ForwardError> {
		let mut req = self.client.post(&self.url).json(batch);

		if let Some(api_key) = &self.api_key {
			req = req.header("apikey", api_key);
		}

		let response = req.send().await?;
		let status = response.status();
		let body = response.text().await?;

		if !status.is_success() {
			error!(%status, %body, sent = batch.len(), "Downstream rejected batch");
			return Err(ForwardError::Status { status, body });
		}

		let accepted = accepted_count(&body, batch.len())?;

		debug!(sent = batch.len(), accepted, "Forwarded batch");

		Ok(accepted)
	}
}
