use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tsync_source_api::SourceRecord;

pub const OBSERVATION_TYPE: &str = "tracking-device";
pub const SUBJECT_TYPE: &str = "wildlife";

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Location {
	pub lat: f64,
	pub lon: f64,
}

/// Normalized observation shape accepted downstream.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CanonicalObservation {
	pub source: String,
	pub source_name: String,
	#[serde(rename = "type")]
	pub kind: &'static str,
	pub subject_type: &'static str,
	pub recorded_at: DateTime<Utc>,
	pub location: Location,
	pub additional: BTreeMap<String, Value>,
}

#[allow(clippy::float_cmp)]
fn non_zero(v: f64) -> bool {
	v != 0.0 && !v.is_nan()
}

/// Maps a source record 1:1 onto a [`CanonicalObservation`].
///
/// The identifying fields (device id, acquisition time, latitude, longitude) are promoted to
/// top level fields and never repeated in `additional`; auxiliary fields only show up there when
/// present and non-zero / non-empty.
#[must_use]
pub fn transform(record: &SourceRecord) -> CanonicalObservation {
	let mut additional = BTreeMap::new();

	if let Some(origin_code) = record.origin_code.as_ref().filter(|s| !s.is_empty()) {
		additional.insert("originCode".to_string(), Value::from(origin_code.as_str()));
	}

	for (key, value) in [
		("ecefX", record.ecef_x),
		("ecefY", record.ecef_y),
		("ecefZ", record.ecef_z),
	] {
		if let Some(v) = value.filter(|v| *v != 0) {
			additional.insert(key.to_string(), Value::from(v));
		}
	}

	for (key, value) in [
		("height", record.height),
		("dop", record.dop),
		("mainVoltage", record.main_voltage),
		("backupVoltage", record.backup_voltage),
		("temperature", record.temperature),
	] {
		if let Some(v) = value.filter(|v| non_zero(*v)) {
			additional.insert(key.to_string(), Value::from(v));
		}
	}

	CanonicalObservation {
		source: record.id_collar.clone(),
		source_name: record.id_collar.clone(),
		kind: OBSERVATION_TYPE,
		subject_type: SUBJECT_TYPE,
		recorded_at: record.acquisition_time,
		location: Location {
			lat: record.latitude,
			lon: record.longitude,
		},
		additional,
	}
}
