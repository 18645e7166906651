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

//!
//! # tsync core
//!
//! Pulls new telemetry for a batch of tracking devices from the source API, maps every record
//! to a [`CanonicalObservation`], forwards them downstream in bounded batches and then moves
//! the device's cursor forward.
//!
//! A device's cursor only moves after every batch for that device was forwarded, so an
//! interrupted run replays the same window next time. One device failing never stops its
//! siblings; a malformed upload stops the whole batch before anything is fetched.
//!
//! Two deployment shapes are supported:
//! - fused: [`Orchestrator::run_batch`] syncs every device in-process;
//! - two-phase: [`Orchestrator::trigger_batch`] hands one [`DeviceSyncTask`] per device to a
//!   [`Dispatcher`], which later calls [`Orchestrator::sync_device`].

pub mod batch;
pub mod config;
pub mod credentials;
pub mod cursor;
pub mod dispatch;
pub mod forwarder;
pub mod observation;
pub mod orchestrator;
pub mod upload;
pub mod upstream;
pub mod window;

mod locks;

pub use config::{ConfigError, SyncConfig};
pub use credentials::{CredentialSet, DeviceMetadata, ValidationError};
pub use cursor::{CursorKey, CursorStore, CursorStoreError, FileCursorStore, MemoryCursorStore};
pub use dispatch::{DeviceSyncTask, DispatchError, Dispatcher, LocalDispatcher};
pub use forwarder::{ForwardError, Forwarder, ForwarderConfig, HttpForwarder};
pub use observation::{transform, CanonicalObservation, Location};
pub use orchestrator::{BatchReport, BatchSummary, DeviceSyncReport, Orchestrator, SkipReason};
pub use upload::{extract_credentials, UploadError};
pub use upstream::UpstreamClient;
pub use window::SyncWindow;

pub use tsync_source_api::{Outcome, SourceRecord};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Validation(#[from] ValidationError),
	#[error(transparent)]
	Upload(#[from] UploadError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("source API failure: {0}")]
	Upstream(#[from] tsync_source_api::Error),
	#[error(transparent)]
	Forward(#[from] ForwardError),
	#[error(transparent)]
	Cursor(#[from] CursorStoreError),
	#[error(transparent)]
	Dispatch(#[from] DispatchError),
	#[error("device sync task panicked <device_id='{0}'>")]
	TaskPanic(String),
}

impl Error {
	/// Whether this error invalidates the whole input batch rather than a single device.
	#[must_use]
	pub const fn is_batch_fatal(&self) -> bool {
		matches!(self, Self::Validation(_) | Self::Upload(_) | Self::Config(_))
	}
}
