use crate::config::AppConfig;
use anyhow::{Context as _, Result};
use std::{path::PathBuf, sync::Arc};
use tsync_core::{
	CredentialSet, CursorKey, CursorStore, FileCursorStore, Forwarder, HttpForwarder, Orchestrator,
	UpstreamClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub data_dir: PathBuf,
	pub config: AppConfig,
	pub format: OutputFormat,
}

impl Context {
	pub const fn new(data_dir: PathBuf, config: AppConfig, format: OutputFormat) -> Self {
		Self {
			data_dir,
			config,
			format,
		}
	}

	pub async fn cursor_store(&self) -> Result<Arc<FileCursorStore>> {
		let path = self.config.cursor_path(&self.data_dir);

		FileCursorStore::open(&path)
			.await
			.map(Arc::new)
			.with_context(|| format!("Failed to open cursor file {}", path.display()))
	}

	pub fn cursor_key(&self, device_id: &str) -> Result<CursorKey> {
		self.config
			.sync
			.validate()
			.context("Set sync.integration_id in the config file or pass --integration-id")?;

		let device_id = device_id.trim();
		if device_id.is_empty() {
			anyhow::bail!("Device id must not be empty");
		}

		Ok(CursorKey::new(
			self.config.sync.integration_id.as_str(),
			self.config.sync.stream_id.as_str(),
			device_id,
		))
	}

	/// Wires the file cursor store, the HTTP source client and the HTTP forwarder.
	pub async fn orchestrator(&self) -> Result<Arc<Orchestrator>> {
		let cursors = self.cursor_store().await?;

		let upstream = tsync_source_api::Client::new(&self.config.source)
			.context("Failed to build source API client")?;

		let forwarder =
			HttpForwarder::new(&self.config.forwarder).context("Failed to build forwarder")?;

		Orchestrator::new(
			self.config.sync.clone(),
			cursors as Arc<dyn CursorStore>,
			Arc::new(upstream) as Arc<dyn UpstreamClient>,
			Arc::new(forwarder) as Arc<dyn Forwarder>,
		)
		.map(Arc::new)
		.context("Set sync.integration_id in the config file or pass --integration-id")
	}

	/// Reads every upload file and decodes the whole credential batch up front.
	pub async fn read_uploads(&self, files: &[PathBuf]) -> Result<Vec<CredentialSet>> {
		let mut contents = Vec::with_capacity(files.len());
		for file in files {
			contents.push(
				tokio::fs::read_to_string(file)
					.await
					.with_context(|| format!("Failed to read upload {}", file.display()))?,
			);
		}

		tsync_core::extract_credentials(&contents).context("Rejected upload batch")
	}
}
